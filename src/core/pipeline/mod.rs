pub mod analysis;
pub mod planning;
pub mod processing;
pub mod scheduling;
