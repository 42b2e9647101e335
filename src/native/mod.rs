/// Native module contains implementations of core traits and storage
/// backed directly by the local filesystem and child processes.
pub mod catalog;
pub mod invocation;
pub mod solver;
pub mod store;
