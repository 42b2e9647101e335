use std::cmp::Ordering;

use crate::core::domain::Configuration;

/// Report column order.
///
/// Columns are grouped by suite, cost system and heuristic, then ascend by
/// time and memory budget. Limited open lists come before unlimited ones and
/// ascend by their percentage. Within that, plain algorithms precede the
/// `pe`, `edd` and `ipc` variants. The grouping key breaks remaining ties so
/// the order is total and agrees with equality.
impl Ord for Configuration {
    fn cmp(&self, other: &Self) -> Ordering {
        let has = |configuration: &Configuration, variant: &str| {
            configuration.algorithm.contains(variant)
        };

        self.suite
            .cmp(&other.suite)
            .then_with(|| self.cost_system.cmp(&other.cost_system))
            .then_with(|| self.heuristic.cmp(&other.heuristic))
            .then_with(|| self.time_limit.seconds().cmp(&other.time_limit.seconds()))
            .then_with(|| self.memory_limit.bytes().cmp(&other.memory_limit.bytes()))
            .then_with(|| {
                self.open_list_limit
                    .is_unlimited()
                    .cmp(&other.open_list_limit.is_unlimited())
            })
            .then_with(|| {
                match (self.open_list_limit.percent(), other.open_list_limit.percent()) {
                    (Some(own), Some(theirs)) => own.cmp(&theirs),
                    _ => Ordering::Equal,
                }
            })
            .then_with(|| has(self, "pe").cmp(&has(other, "pe")))
            .then_with(|| has(self, "edd").cmp(&has(other, "edd")))
            .then_with(|| has(self, "ipc").cmp(&has(other, "ipc")))
            .then_with(|| self.grouping_key().cmp(&other.grouping_key()))
    }
}

impl PartialOrd for Configuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
