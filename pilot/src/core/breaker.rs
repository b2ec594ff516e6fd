//! Per-operation-class circuit breaker.
//!
//! Process-local liveness guard: after enough consecutive transport failures
//! the circuit opens and calls fail fast until a cooldown elapses, then one
//! half-open trial decides whether to close or reopen. State is never
//! persisted; a process restart starts closed.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// An open circuit transitions to half-open once the cooldown has
    /// elapsed, admitting the single trial call.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Record a transport-class failure.
    ///
    /// A failed half-open trial reopens immediately and restarts the
    /// cooldown.
    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    self.trip();
                }
            }
            // Calls are denied while open; a straggler outcome changes nothing.
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }
}
