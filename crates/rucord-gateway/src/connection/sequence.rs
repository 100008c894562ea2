//! Last dispatch sequence number of a session

use parking_lot::Mutex;

/// Highest sequence number seen on the current session
///
/// Shared with the heartbeat driver, which reports it on every beat.
#[derive(Debug, Default)]
pub struct SequenceCell {
    value: Mutex<Option<u64>>,
}

impl SequenceCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        *self.value.lock()
    }

    /// Record a dispatch sequence number
    ///
    /// Returns `false` and leaves the value untouched when `seq` is not newer
    /// than the current one.
    pub fn advance(&self, seq: u64) -> bool {
        let mut value = self.value.lock();
        match *value {
            Some(current) if seq <= current => false,
            _ => {
                *value = Some(seq);
                true
            }
        }
    }

    /// Forget the sequence, for a fresh session
    pub fn reset(&self) {
        *self.value.lock() = None;
    }
}
