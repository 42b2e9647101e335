pub const CONFIG_FILE: &str = "_config.json";
pub const PARAMETERS_EXT: &str = "json";
pub const STDOUT_EXT: &str = "out";
pub const STDERR_EXT: &str = "err";
pub const INSTANCE_EXT: &str = "pddl";

/// Value of a catalogue metric the artifact does not report.
pub const MISSING_METRIC: &str = "?";
/// Report cell for an undefined aggregate.
pub const UNDEFINED_CELL: &str = "-";

pub const DEFAULT_PARALLELISM: usize = 12;
pub const DEFAULT_REPORT_METRICS: &str = "total_expansions,total_generations,closed_peak_size";

pub const SEMAPHORE_ERR: &str = "run semaphore is never closed";
