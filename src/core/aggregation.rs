//! Instance → Domain → SuperDomain → Suite summaries.
//!
//! Every level answers the same questions for a configuration index. Counts
//! add up the tree; metrics combine as the shifted geometric mean
//! `exp(mean(ln(v + 1))) - 1` over covered children only, so a zero metric
//! stays meaningful and an uncovered group has no aggregate at all.

use std::collections::BTreeMap;

use crate::core::metrics::Metric;
use crate::core::outcome::Classification;

pub fn shifted_geometric_mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (count, log_sum) = values
        .into_iter()
        .fold((0usize, 0.0), |(count, sum), value| {
            (count + 1, sum + (value + 1.0).ln())
        });
    (count > 0).then(|| (log_sum / count as f64).exp() - 1.0)
}

/// Super-domain a domain belongs to: the name up to the first `_` or `-`,
/// without trailing digits. `elevators-opt08-strips` and `elevators08`
/// both map to `elevators`.
pub fn super_domain_name(domain: &str) -> &str {
    let stem = domain.split('_').next().unwrap_or(domain);
    let stem = stem.split('-').next().unwrap_or(stem);
    stem.trim_end_matches(|c: char| c.is_ascii_digit())
}

pub trait Node {
    fn name(&self) -> &str;

    fn number_of_instances(&self) -> usize;

    /// Leaves covered under every configuration.
    fn coverage(&self) -> usize;

    /// Leaves covered under configuration `index`.
    fn coverage_at(&self, index: usize) -> usize;

    fn count(&self, index: usize, predicate: fn(&Classification) -> bool) -> usize;

    fn metric_aggregation(&self, index: usize, metric: Metric) -> Option<f64>;

    fn number_of_solutions_found(&self, index: usize) -> usize {
        self.count(index, Classification::found_solution)
    }

    fn number_of_insolutions_found(&self, index: usize) -> usize {
        self.count(index, Classification::found_insolution)
    }

    fn number_of_failures_by_memory(&self, index: usize) -> usize {
        self.count(index, Classification::failed_by_memory)
    }

    fn number_of_failures_by_time(&self, index: usize) -> usize {
        self.count(index, Classification::failed_by_time)
    }
}

/// Leaf: one problem instance with a classification per configuration index.
#[derive(Clone, Debug)]
pub struct Instance {
    name: String,
    results: Vec<Classification>,
}

impl Instance {
    pub fn new(name: impl Into<String>, results: Vec<Classification>) -> Self {
        Self {
            name: name.into(),
            results,
        }
    }

    /// Covered only when every configuration covered it.
    pub fn covered(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|result| result.fully_covered)
    }
}

impl Node for Instance {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_of_instances(&self) -> usize {
        1
    }

    fn coverage(&self) -> usize {
        usize::from(self.covered())
    }

    fn coverage_at(&self, index: usize) -> usize {
        self.results
            .get(index)
            .map_or(0, |result| usize::from(result.fully_covered))
    }

    fn count(&self, index: usize, predicate: fn(&Classification) -> bool) -> usize {
        self.results
            .get(index)
            .map_or(0, |result| usize::from(predicate(result)))
    }

    fn metric_aggregation(&self, index: usize, metric: Metric) -> Option<f64> {
        if !self.covered() {
            return None;
        }
        self.results.get(index)?.metric(metric)
    }
}

/// Inner node owning its children.
#[derive(Clone, Debug)]
pub struct Group<C> {
    name: String,
    children: Vec<C>,
}

pub type Domain = Group<Instance>;
pub type SuperDomain = Group<Domain>;
pub type Suite = Group<SuperDomain>;

impl<C: Node> Group<C> {
    pub fn new(name: impl Into<String>, children: Vec<C>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    pub fn children(&self) -> &[C] {
        &self.children
    }
}

impl Suite {
    /// Groups domains under their super-domain, both sorted by name.
    pub fn from_domains(name: impl Into<String>, domains: Vec<Domain>) -> Self {
        let mut grouped: BTreeMap<String, Vec<Domain>> = BTreeMap::new();
        for domain in domains {
            grouped
                .entry(super_domain_name(domain.name()).to_string())
                .or_default()
                .push(domain);
        }

        let super_domains = grouped
            .into_iter()
            .map(|(name, mut domains)| {
                domains.sort_by(|a, b| a.name.cmp(&b.name));
                SuperDomain::new(name, domains)
            })
            .collect();

        Suite::new(name, super_domains)
    }
}

impl<C: Node> Node for Group<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_of_instances(&self) -> usize {
        self.children.iter().map(Node::number_of_instances).sum()
    }

    fn coverage(&self) -> usize {
        self.children.iter().map(Node::coverage).sum()
    }

    fn coverage_at(&self, index: usize) -> usize {
        self.children.iter().map(|child| child.coverage_at(index)).sum()
    }

    fn count(&self, index: usize, predicate: fn(&Classification) -> bool) -> usize {
        self.children
            .iter()
            .map(|child| child.count(index, predicate))
            .sum()
    }

    fn metric_aggregation(&self, index: usize, metric: Metric) -> Option<f64> {
        shifted_geometric_mean(
            self.children
                .iter()
                .filter(|child| child.coverage() > 0)
                .filter_map(|child| child.metric_aggregation(index, metric)),
        )
    }
}
