pub mod catalog;
pub mod solver;
pub mod store;
