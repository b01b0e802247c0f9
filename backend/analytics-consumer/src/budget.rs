use std::time::{Duration, Instant};

/// Source of the remaining execution time for one consumer run
pub trait ExecutionBudget: Send + Sync {
    fn remaining(&self) -> Duration;
}

/// Wall-clock budget ending at a fixed deadline
#[derive(Debug, Clone, Copy)]
pub struct DeadlineBudget {
    deadline: Instant,
}

impl DeadlineBudget {
    /// Budget of `total` starting now
    pub fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
        }
    }

    pub fn until(deadline: Instant) -> Self {
        Self { deadline }
    }
}

impl ExecutionBudget for DeadlineBudget {
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
