//! Task, runtime and clock plumbing shared by the oracle relay crates.

pub mod runtime;
pub mod task;
pub mod time;
