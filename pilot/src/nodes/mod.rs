//! Node implementations for the fixed run topology.
//!
//! Each node reads the current run state and produces a state patch (or a
//! report, for the action node). Routing between nodes lives in
//! [`crate::core::topology`]; nothing here decides what runs next.

pub mod act;
pub mod persist;
pub mod plan;
pub mod reason;
pub mod recover;
pub mod scan;
pub mod validate;
