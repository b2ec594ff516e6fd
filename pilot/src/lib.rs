//! Deterministic pilot for a desktop-automation deployment.
//!
//! This crate drives a fixed node graph (scan repositories, plan work,
//! select one task, act on a desktop surface, validate evidence, persist)
//! with a durable checkpoint after every node, so an interrupted run
//! resumes instead of repeating mutations. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (run state, topology, backoff,
//!   circuit breaker, allow-list, time budget). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (settings, checkpoints, heartbeat,
//!   lock file, repo scanning, git, plan loading, the reasoner subprocess,
//!   episode traces). Isolated to enable substitution in tests.
//! - **[`adapter`]**: the automation-surface client with its reliability
//!   policy and the two wire transports.
//!
//! Orchestration modules ([`engine`], [`nodes`], [`gate`], [`watchdog`],
//! [`run`]) coordinate core logic with I/O to implement CLI commands.

pub mod adapter;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod logging;
pub mod nodes;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod watchdog;
