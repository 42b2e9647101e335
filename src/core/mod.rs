pub mod aggregation;
pub mod domain;
pub mod metrics;
pub mod ordering;
pub mod outcome;
pub mod pipeline;
pub mod snapshot;
pub mod traits;
