//! Deterministic, pure logic shared by the orchestration core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod allowlist;
pub mod backoff;
pub mod breaker;
pub mod budget;
pub mod state;
pub mod topology;
