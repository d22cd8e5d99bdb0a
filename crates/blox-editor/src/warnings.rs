//! Debounced warning-text updates.
//!
//! Warning icons are re-rendered on every change, so while a drag is in
//! flight updates are held back and applied once the pointer settles.

use blox_core::id::BlockId;

#[derive(Debug, Clone)]
pub struct WarningScheduler {
    delay_ms: u64,
    /// (block, text, due time). One entry per block.
    pending: Vec<(BlockId, Option<String>, u64)>,
}

impl Default for WarningScheduler {
    fn default() -> Self {
        Self::new(100)
    }
}

impl WarningScheduler {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: Vec::new(),
        }
    }

    /// Schedule `text` for `id`. A later call for the same block replaces
    /// the earlier one and restarts its delay.
    pub fn schedule(&mut self, id: BlockId, text: Option<String>, now_ms: u64) {
        let due = now_ms + self.delay_ms;
        match self.pending.iter_mut().find(|(b, ..)| *b == id) {
            Some(entry) => *entry = (id, text, due),
            None => self.pending.push((id, text, due)),
        }
    }

    /// Remove and return every update due at `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<(BlockId, Option<String>)> {
        let mut due = Vec::new();
        self.pending.retain(|(id, text, at)| {
            if *at <= now_ms {
                due.push((*id, text.clone()));
                false
            } else {
                true
            }
        });
        due
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }
}
