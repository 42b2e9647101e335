use std::fmt;

use crate::core::domain::CapturedOutput;
use crate::core::metrics::{self, Metric, Metrics};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitKind {
    SearchTime,
    SearchMemory,
    TranslateTime,
    TranslateMemory,
    ExpansionCount,
}

impl LimitKind {
    pub fn is_time(&self) -> bool {
        matches!(self, LimitKind::SearchTime | LimitKind::TranslateTime)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, LimitKind::SearchMemory | LimitKind::TranslateMemory)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Search component killed by SIGKILL.
    SearchKilled,
    /// Search component terminated by SIGSEGV.
    SearchSegfault,
    /// Translator killed by SIGKILL.
    TranslateKilled,
    PatternOverflow,
    InvalidArgument,
    MissingFile,
    Unknown,
}

/// Terminal classification of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    FoundSolution,
    FoundInsolution,
    FailedByLimit(LimitKind),
    FailedByError(ErrorKind),
    Interrupted,
    Nonexistent,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::FoundSolution => "solved",
            Outcome::FoundInsolution => "unsolvable",
            Outcome::FailedByLimit(LimitKind::SearchTime) => "search timeout",
            Outcome::FailedByLimit(LimitKind::SearchMemory) => "search memory out",
            Outcome::FailedByLimit(LimitKind::TranslateTime) => "translate timeout",
            Outcome::FailedByLimit(LimitKind::TranslateMemory) => "translate memory out",
            Outcome::FailedByLimit(LimitKind::ExpansionCount) => "expansion limit",
            Outcome::FailedByError(ErrorKind::SearchKilled) => "search error -9",
            Outcome::FailedByError(ErrorKind::SearchSegfault) => "search error -11",
            Outcome::FailedByError(ErrorKind::TranslateKilled) => "translate error -9",
            Outcome::FailedByError(ErrorKind::PatternOverflow) => "pattern too large",
            Outcome::FailedByError(ErrorKind::InvalidArgument) => "invalid argument",
            Outcome::FailedByError(ErrorKind::MissingFile) => "file not found",
            Outcome::FailedByError(ErrorKind::Unknown) => "unknown error",
            Outcome::Interrupted => "interrupted",
            Outcome::Nonexistent => "not run",
        };
        f.write_str(label)
    }
}

pub const INTERRUPT_MARKER: &str = "KeyboardInterrupt";

/// Marker phrases in priority order. The first phrase found in the captured
/// text decides the outcome, whatever else the text contains.
pub const MARKERS: &[(&str, Outcome)] = &[
    ("Solution found!", Outcome::FoundSolution),
    ("Insolution found!", Outcome::FoundInsolution),
    ("Initial state is a dead end", Outcome::FoundInsolution),
    (
        "Time limit reached. Abort search.",
        Outcome::FailedByLimit(LimitKind::SearchTime),
    ),
    (
        "Time limit has been reached",
        Outcome::FailedByLimit(LimitKind::SearchTime),
    ),
    (
        "Memory limit has been reached",
        Outcome::FailedByLimit(LimitKind::SearchMemory),
    ),
    (
        "Translator hit the time limit",
        Outcome::FailedByLimit(LimitKind::TranslateTime),
    ),
    (
        "Translator ran out of memory",
        Outcome::FailedByLimit(LimitKind::TranslateMemory),
    ),
    (
        "Expansion limit reached",
        Outcome::FailedByLimit(LimitKind::ExpansionCount),
    ),
    (INTERRUPT_MARKER, Outcome::Interrupted),
    (
        "search exit code: -9",
        Outcome::FailedByError(ErrorKind::SearchKilled),
    ),
    (
        "search exit code: -11",
        Outcome::FailedByError(ErrorKind::SearchSegfault),
    ),
    (
        "translate exit code: -9",
        Outcome::FailedByError(ErrorKind::TranslateKilled),
    ),
    (
        "Given pattern is too large! (Overflow occured):",
        Outcome::FailedByError(ErrorKind::PatternOverflow),
    ),
    (
        "std::invalid_argument",
        Outcome::FailedByError(ErrorKind::InvalidArgument),
    ),
    (
        "FileNotFoundError",
        Outcome::FailedByError(ErrorKind::MissingFile),
    ),
];

pub fn classify_text(text: &str) -> Outcome {
    MARKERS
        .iter()
        .find(|(marker, _)| text.contains(marker))
        .map(|(_, outcome)| *outcome)
        .unwrap_or(Outcome::FailedByError(ErrorKind::Unknown))
}

/// Outcome of a possibly missing artifact, without metric extraction.
pub fn status(output: Option<&CapturedOutput>) -> Outcome {
    match output {
        Some(output) => classify_text(&output.combined()),
        None => Outcome::Nonexistent,
    }
}

pub fn indicates_interrupt(output: &CapturedOutput) -> bool {
    output.stderr.contains(INTERRUPT_MARKER) || output.stdout.contains(INTERRUPT_MARKER)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub outcome: Outcome,
    pub metrics: Metrics,
    /// Solved or proven unsolvable, with every required metric extracted.
    pub fully_covered: bool,
}

impl Classification {
    pub fn found_solution(&self) -> bool {
        self.outcome == Outcome::FoundSolution
    }

    pub fn found_insolution(&self) -> bool {
        self.outcome == Outcome::FoundInsolution
    }

    pub fn failed_by_memory(&self) -> bool {
        matches!(self.outcome, Outcome::FailedByLimit(kind) if kind.is_memory())
    }

    pub fn failed_by_time(&self) -> bool {
        matches!(self.outcome, Outcome::FailedByLimit(kind) if kind.is_time())
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).map(|value| value.as_f64())
    }
}

/// Classifies a stored artifact and extracts its metrics.
///
/// `required` lists the metrics the current report tracks; a run missing any
/// of them keeps its outcome but is not fully covered.
pub fn classify(output: Option<&CapturedOutput>, required: &[Metric]) -> Classification {
    let Some(output) = output else {
        return Classification {
            outcome: Outcome::Nonexistent,
            metrics: Metrics::new(),
            fully_covered: false,
        };
    };

    let text = output.combined();
    let outcome = classify_text(&text);
    let metrics = metrics::extract(&text);
    let fully_covered = matches!(outcome, Outcome::FoundSolution | Outcome::FoundInsolution)
        && required.iter().all(|metric| metrics.contains_key(metric));

    Classification {
        outcome,
        metrics,
        fully_covered,
    }
}
