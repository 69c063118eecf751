//! Step budget helpers for the per-lead sub-loop.

/// Counts executed steps against a hard limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    limit: u32,
    used: u32,
}

impl StepBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Record one executed step.
    pub fn spend(&mut self) {
        self.used = self.used.saturating_add(1);
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}
