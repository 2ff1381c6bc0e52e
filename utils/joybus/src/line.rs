use std::cell::RefCell;
use std::rc::Rc;

/// Single bidirectional open-drain data line
pub trait Line {
    /// Drive the line (`enabled`) to `value`, or release it to the pull-up.
    fn set_drive(&mut self, enabled: bool, value: bool);

    /// Sensed line level, `true` when high.
    fn sense(&self) -> bool;
}

#[derive(Debug, Default)]
struct WireState {
    // Drive value per attached end, `None` while released
    drivers: Vec<Option<bool>>,
}

impl WireState {
    fn level(&self) -> bool {
        !self.drivers.iter().any(|drive| *drive == Some(false))
    }
}

/// Simulated pulled-up wire shared between a host and a device.
///
/// The level is low whenever any attached end drives low, and high
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct Wire {
    state: Rc<RefCell<WireState>>,
}

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new end to the wire, initially released
    pub fn attach(&self) -> WireEnd {
        let mut state = self.state.borrow_mut();
        state.drivers.push(None);
        WireEnd {
            id: state.drivers.len() - 1,
            state: Rc::clone(&self.state),
        }
    }

    pub fn level(&self) -> bool {
        self.state.borrow().level()
    }
}

/// One end of a [`Wire`]
#[derive(Debug)]
pub struct WireEnd {
    id: usize,
    state: Rc<RefCell<WireState>>,
}

impl WireEnd {
    pub fn is_driving(&self) -> bool {
        self.state.borrow().drivers[self.id].is_some()
    }
}

impl Line for WireEnd {
    fn set_drive(&mut self, enabled: bool, value: bool) {
        self.state.borrow_mut().drivers[self.id] = enabled.then_some(value);
    }

    fn sense(&self) -> bool {
        self.state.borrow().level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulled_up_when_released() {
        let wire = Wire::new();
        let host = wire.attach();
        let device = wire.attach();
        assert!(wire.level());
        assert!(host.sense());
        assert!(device.sense());
        assert!(!host.is_driving());
    }

    #[test]
    fn any_end_pulls_low() {
        let wire = Wire::new();
        let mut host = wire.attach();
        let mut device = wire.attach();

        host.set_drive(true, true);
        device.set_drive(true, false);
        assert!(!wire.level());

        device.set_drive(false, false);
        assert!(host.sense());

        host.set_drive(true, false);
        assert!(!device.sense());
        host.set_drive(false, false);
        assert!(device.sense());
    }
}
