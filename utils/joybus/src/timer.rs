use crate::error::{Error, Result};

/// Joybus timing unit rate: one unit per microsecond
pub const UNIT_HZ: u64 = 1_000_000;

/// Units per transmitted bit
pub const UNITS_PER_BIT: u8 = 4;

/// Host ticks making up one timing unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    ticks_per_unit: u32,
}

impl Timing {
    pub fn new(ticks_per_unit: u32) -> Result<Self> {
        if ticks_per_unit == 0 {
            return Err(Error::Config("ticks_per_unit must be at least 1".into()));
        }
        Ok(Self { ticks_per_unit })
    }

    /// Derive the unit period from the host tick frequency, rounded to the
    /// nearest whole tick.
    pub fn from_host_clock(host_hz: u64) -> Result<Self> {
        if host_hz < UNIT_HZ {
            return Err(Error::ClockTooSlow { host_hz });
        }
        let ticks = (host_hz + UNIT_HZ / 2) / UNIT_HZ;
        let ticks = u32::try_from(ticks)
            .map_err(|_| Error::Config(format!("host clock {host_hz} Hz is out of range")))?;
        Self::new(ticks)
    }

    pub fn ticks_per_unit(&self) -> u32 {
        self.ticks_per_unit
    }

    /// Convert a unit count into host ticks
    pub fn units_to_ticks(&self, units: u32) -> u64 {
        units as u64 * self.ticks_per_unit as u64
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self { ticks_per_unit: 1 }
    }
}

/// Free-running unit timer.
///
/// A tick down-counter reloads to `ticks_per_unit` every time it reaches
/// zero; each reload completes one unit and decrements the quarter-bit
/// countdown, which wraps from 0 back to 3.
#[derive(Debug, Clone)]
pub struct UnitTimer {
    period: u32,
    remaining: u32,
    quarter: u8,
}

impl UnitTimer {
    pub fn new(timing: Timing) -> Self {
        Self {
            period: timing.ticks_per_unit(),
            remaining: timing.ticks_per_unit(),
            quarter: UNITS_PER_BIT - 1,
        }
    }

    /// Advance one host tick.
    ///
    /// Returns the quarter that just finished when a unit boundary is
    /// crossed.
    pub fn tick(&mut self) -> Option<u8> {
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }

        self.remaining = self.period;
        let finished = self.quarter;
        self.quarter = if finished == 0 {
            UNITS_PER_BIT - 1
        } else {
            finished - 1
        };
        Some(finished)
    }

    /// Align a fresh bit window: full unit ahead, quarter 3.
    pub fn restart(&mut self) {
        self.remaining = self.period;
        self.quarter = UNITS_PER_BIT - 1;
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_ticks_from_host_clock() {
        assert_eq!(Timing::from_host_clock(48_000_000).unwrap().ticks_per_unit(), 48);
        assert_eq!(Timing::from_host_clock(30_000_000).unwrap().ticks_per_unit(), 30);
        // 1.6 ticks per microsecond rounds up
        assert_eq!(Timing::from_host_clock(1_600_000).unwrap().ticks_per_unit(), 2);
    }

    #[test]
    fn rejects_slow_clock() {
        assert!(matches!(
            Timing::from_host_clock(999_999),
            Err(Error::ClockTooSlow { host_hz: 999_999 })
        ));
        assert!(Timing::new(0).is_err());
    }

    #[test]
    fn unit_boundary_every_period() {
        let mut timer = UnitTimer::new(Timing::new(3).unwrap());
        let finished: Vec<_> = (0..12).map(|_| timer.tick()).collect();
        assert_eq!(
            finished,
            vec![
                None,
                None,
                Some(3),
                None,
                None,
                Some(2),
                None,
                None,
                Some(1),
                None,
                None,
                Some(0),
            ]
        );
        assert_eq!(timer.quarter(), 3);
    }

    #[test]
    fn restart_realigns_window() {
        let mut timer = UnitTimer::new(Timing::new(2).unwrap());
        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.quarter(), 2);
        timer.restart();
        assert_eq!(timer.quarter(), 3);
        assert_eq!(timer.tick(), None);
        assert_eq!(timer.tick(), Some(3));
    }
}
