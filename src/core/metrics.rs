use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric statistics the solver prints. New variants go at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SolutionCost,
    SolutionLength,
    SearchTime,
    TotalExpansions,
    FirstPhaseExpansions,
    SecondPhaseExpansions,
    TotalGenerations,
    FirstPhaseGenerations,
    SecondPhaseGenerations,
    SecondPhaseIterations,
    OpenPeakSize,
    ClosedPeakSize,
    MinFAtPhaseChange,
    MeanFAtPhaseChange,
    MaxFAtPhaseChange,
    PctMinFAtPhaseChange,
    MinDepthAtPhaseChange,
    MeanDepthAtPhaseChange,
    MaxDepthAtPhaseChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    /// Floating point, with an optional unit character trailing the number.
    Float { unit: Option<char> },
}

#[derive(Clone, Copy, Debug)]
pub struct MetricEntry {
    pub metric: Metric,
    pub name: &'static str,
    pub marker: &'static str,
    pub kind: ValueKind,
}

const fn entry(
    metric: Metric,
    name: &'static str,
    marker: &'static str,
    kind: ValueKind,
) -> MetricEntry {
    MetricEntry {
        metric,
        name,
        marker,
        kind,
    }
}

const INTEGER: ValueKind = ValueKind::Integer;
const FLOAT: ValueKind = ValueKind::Float { unit: None };
const SECONDS: ValueKind = ValueKind::Float { unit: Some('s') };

pub const CATALOGUE: &[MetricEntry] = &[
    entry(Metric::SolutionCost, "solution_cost", "Plan cost:", INTEGER),
    entry(Metric::SolutionLength, "solution_length", "Plan length:", INTEGER),
    entry(Metric::SearchTime, "search_time", "Search time:", SECONDS),
    entry(Metric::TotalExpansions, "total_expansions", "Expanded", INTEGER),
    entry(
        Metric::FirstPhaseExpansions,
        "first_phase_expansions",
        "Number of first phase expansions:",
        INTEGER,
    ),
    entry(
        Metric::SecondPhaseExpansions,
        "second_phase_expansions",
        "Number of second phase expansions:",
        INTEGER,
    ),
    entry(Metric::TotalGenerations, "total_generations", "Generated", INTEGER),
    entry(
        Metric::FirstPhaseGenerations,
        "first_phase_generations",
        "Number of first phase generations:",
        INTEGER,
    ),
    entry(
        Metric::SecondPhaseGenerations,
        "second_phase_generations",
        "Number of second phase generations:",
        INTEGER,
    ),
    entry(
        Metric::SecondPhaseIterations,
        "second_phase_iterations",
        "Number of second phase iterations:",
        INTEGER,
    ),
    entry(Metric::OpenPeakSize, "open_peak_size", "Open peak size:", INTEGER),
    entry(Metric::ClosedPeakSize, "closed_peak_size", "Closed peak size:", INTEGER),
    entry(
        Metric::MinFAtPhaseChange,
        "min_f_at_phase_change",
        "Mininum F-value at phase transition:",
        INTEGER,
    ),
    entry(
        Metric::MeanFAtPhaseChange,
        "mean_f_at_phase_change",
        "Mean F-value at phase transition:",
        FLOAT,
    ),
    entry(
        Metric::MaxFAtPhaseChange,
        "max_f_at_phase_change",
        "Maximum F-value at phase transition:",
        INTEGER,
    ),
    entry(
        Metric::PctMinFAtPhaseChange,
        "pct_min_f_at_phase_change",
        "Percentage of minimum F-values at phase transition:",
        FLOAT,
    ),
    entry(
        Metric::MinDepthAtPhaseChange,
        "min_depth_at_phase_change",
        "Mininum depth at phase transition:",
        INTEGER,
    ),
    entry(
        Metric::MeanDepthAtPhaseChange,
        "mean_depth_at_phase_change",
        "Mean depth at phase transition:",
        FLOAT,
    ),
    entry(
        Metric::MaxDepthAtPhaseChange,
        "max_depth_at_phase_change",
        "Maximum depth at phase transition:",
        INTEGER,
    ),
];

impl Metric {
    pub fn entry(self) -> &'static MetricEntry {
        CATALOGUE
            .iter()
            .find(|entry| entry.metric == self)
            .expect("every metric has a catalogue entry")
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn all() -> impl Iterator<Item = Metric> {
        CATALOGUE.iter().map(|entry| entry.metric)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric `{0}`")]
pub struct UnknownMetric(String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        CATALOGUE
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.metric)
            .ok_or_else(|| UnknownMetric(name.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Integer(value) => *value as f64,
            MetricValue::Float(value) => *value,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetricValue::Integer(value) => u64::try_from(*value).ok(),
            MetricValue::Float(_) => None,
        }
    }
}

impl From<MetricValue> for serde_json::Value {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Integer(value) => value.into(),
            MetricValue::Float(value) => value.into(),
        }
    }
}

pub type Metrics = BTreeMap<Metric, MetricValue>;

/// The word following the marker: `"[t=0.1s] Expanded 46 state(s)."`
/// yields `"46"` for marker `"Expanded"`.
fn value_token<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.split(marker).nth(1)?.split(' ').nth(1)
}

fn parse_value(token: &str, kind: ValueKind) -> Option<MetricValue> {
    match kind {
        ValueKind::Integer => token.parse().ok().map(MetricValue::Integer),
        ValueKind::Float { unit } => {
            let number = unit
                .and_then(|unit| token.strip_suffix(unit))
                .unwrap_or(token);
            number
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(MetricValue::Float)
        }
    }
}

/// Scans `text` line by line for every catalogue marker.
///
/// A later parsable occurrence of a marker replaces an earlier one; tokens
/// that do not parse are skipped, so a metric is either present with a
/// valid value or absent.
pub fn extract(text: &str) -> Metrics {
    let mut metrics = Metrics::new();
    for line in text.lines() {
        for entry in CATALOGUE {
            if let Some(value) =
                value_token(line, entry.marker).and_then(|token| parse_value(token, entry.kind))
            {
                metrics.insert(entry.metric, value);
            }
        }
    }
    metrics
}
