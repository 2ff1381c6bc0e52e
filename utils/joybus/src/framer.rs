use std::collections::VecDeque;

/// Longest command one poll cycle transmits
pub const MAX_COMMAND_LEN: usize = 7;

/// Accumulates the next command from the input queue.
#[derive(Debug, Clone, Default)]
pub struct CommandFramer {
    buffer: [u8; MAX_COMMAND_LEN],
    len: usize,
}

impl CommandFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull queued bytes into the buffer.
    ///
    /// Returns `true` once a command is framed: at least one byte is held
    /// and either the queue ran dry or the buffer is full. Bytes beyond the
    /// frame stay queued for the next cycle.
    pub fn pull(&mut self, queue: &mut VecDeque<u8>) -> bool {
        while self.len < MAX_COMMAND_LEN {
            let Some(byte) = queue.pop_front() else {
                break;
            };
            self.buffer[self.len] = byte;
            self.len += 1;
        }

        self.len > 0 && (queue.is_empty() || self.len == MAX_COMMAND_LEN)
    }

    pub fn command(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_never_frames() {
        let mut framer = CommandFramer::new();
        let mut queue = VecDeque::new();
        assert!(!framer.pull(&mut queue));
        assert!(framer.is_empty());
    }

    #[test]
    fn frames_at_end_of_input() {
        let mut framer = CommandFramer::new();
        let mut queue = VecDeque::from([0x40, 0x03, 0x02]);
        assert!(framer.pull(&mut queue));
        assert_eq!(framer.command(), &[0x40, 0x03, 0x02]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_stays_queued() {
        let mut framer = CommandFramer::new();
        let mut queue: VecDeque<u8> = (1..=9).collect();
        assert!(framer.pull(&mut queue));
        assert_eq!(framer.command(), &[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(queue, VecDeque::from([8, 9]));

        framer.reset();
        assert!(framer.pull(&mut queue));
        assert_eq!(framer.command(), &[8, 9]);
    }
}
