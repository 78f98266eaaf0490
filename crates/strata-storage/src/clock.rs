//! Monotonic commit clock
//!
//! Hands out the valid time of each commit. Two commits never share a valid
//! time, even when the wall clock stalls or steps backwards.

use strata_core::ValidTime;

/// Commit clock state; callers serialize access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitClock {
    last_micros: i64,
    next_tx: u64,
}

impl CommitClock {
    /// Start a clock that has not committed anything yet
    pub fn new() -> Self {
        Self::resume(i64::MIN, 1)
    }

    /// Resume a clock from persisted state
    pub fn resume(last_micros: i64, next_tx: u64) -> Self {
        Self {
            last_micros,
            next_tx,
        }
    }

    /// Valid time of the latest commit in microseconds
    pub fn last_micros(&self) -> i64 {
        self.last_micros
    }

    /// Sequence number the next commit will receive
    pub fn next_tx(&self) -> u64 {
        self.next_tx
    }

    /// Allocate the transaction id and valid time of the next commit
    pub fn tick(&mut self) -> (u64, ValidTime) {
        self.tick_at(ValidTime::now().as_micros())
    }

    /// Like `tick`, reading the wall clock from `now_micros`
    pub fn tick_at(&mut self, now_micros: i64) -> (u64, ValidTime) {
        let micros = now_micros.max(self.last_micros.saturating_add(1));
        self.last_micros = micros;
        let tx_id = self.next_tx;
        self.next_tx += 1;
        (tx_id, ValidTime::from_micros(micros))
    }
}

impl Default for CommitClock {
    fn default() -> Self {
        Self::new()
    }
}
