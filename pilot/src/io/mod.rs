//! Side-effecting layers: filesystem state, subprocesses, git.

pub mod checkpoint;
pub mod config;
pub mod git;
pub mod heartbeat;
pub mod lock;
pub mod plan;
pub mod process;
pub mod reasoner;
pub mod scan;
pub mod trace;
