//! Wall-clock budget for one run.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Deadline measured from run entry, checked at node boundaries.
///
/// The check is advisory between nodes, never preemptive: a node that is
/// already executing finishes, and Persist runs even after expiry so the
/// terminal record still lands.
#[derive(Debug, Clone, Copy)]
pub struct RunDeadline {
    at: Instant,
}

impl RunDeadline {
    pub fn from_now(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Remaining budget, or an error once the deadline has passed.
    pub fn remaining(&self) -> Result<Duration> {
        let remaining = self
            .at
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            return Err(anyhow!("run deadline exceeded"));
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_has_budget_left() {
        let deadline = RunDeadline::from_now(Duration::from_secs(60));
        let remaining = deadline.remaining().expect("budget left");
        assert!(remaining > Duration::from_secs(50));
    }

    #[test]
    fn zero_budget_is_already_exceeded() {
        let deadline = RunDeadline::from_now(Duration::ZERO);
        let err = deadline.remaining().expect_err("must be exceeded");
        assert!(err.to_string().contains("deadline exceeded"));
    }
}
