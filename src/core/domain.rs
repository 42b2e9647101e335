use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::core::traits::catalog::InstanceEntry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitParseError {
    #[error("limit `{0}` does not start with a whole number")]
    Amount(String),
    #[error("limit `{0}` has an unknown unit suffix")]
    Unit(String),
    #[error("open-list limit `{0}` is not `unlimited`, `limited-N` or `limited-N-pebound-M`")]
    OpenList(String),
    #[error("limit `{0}` does not fit in 64 bits once converted to base units")]
    Overflow(String),
}

/// Splits `"10m"` into `(10, 'm')`.
fn split_unit(value: &str) -> Result<(u64, char), LimitParseError> {
    let unit = value
        .chars()
        .last()
        .ok_or_else(|| LimitParseError::Unit(value.to_string()))?;
    let amount = value[..value.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| LimitParseError::Amount(value.to_string()))?;
    Ok((amount, unit))
}

/// Rejects amounts whose base-unit value does not fit in a `u64`.
fn checked_amount(value: &str, amount: u64, factor: u64) -> Result<u64, LimitParseError> {
    amount
        .checked_mul(factor)
        .map(|_| amount)
        .ok_or_else(|| LimitParseError::Overflow(value.to_string()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 60 * 60,
        }
    }
}

/// Wall-clock budget written as `<n>s`, `<n>m` or `<n>h`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeLimit {
    amount: u64,
    unit: TimeUnit,
}

impl TimeLimit {
    pub fn minutes(amount: u64) -> Self {
        Self {
            amount,
            unit: TimeUnit::Minutes,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.amount.saturating_mul(self.unit.seconds())
    }
}

impl FromStr for TimeLimit {
    type Err = LimitParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (amount, unit) = split_unit(value)?;
        let unit = match unit {
            's' => TimeUnit::Seconds,
            'm' => TimeUnit::Minutes,
            'h' => TimeUnit::Hours,
            _ => return Err(LimitParseError::Unit(value.to_string())),
        };
        let amount = checked_amount(value, amount, unit.seconds())?;
        Ok(Self { amount, unit })
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeUnit::Seconds => 's',
            TimeUnit::Minutes => 'm',
            TimeUnit::Hours => 'h',
        };
        write!(f, "{}{}", self.amount, unit)
    }
}

impl TryFrom<String> for TimeLimit {
    type Error = LimitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeLimit> for String {
    fn from(value: TimeLimit) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryUnit {
    Kilo,
    Mega,
    Giga,
}

impl MemoryUnit {
    fn bytes(self) -> u64 {
        match self {
            MemoryUnit::Kilo => 1000,
            MemoryUnit::Mega => 1000 * 1000,
            MemoryUnit::Giga => 1000 * 1000 * 1000,
        }
    }
}

/// Memory budget written as `<n>K`, `<n>M` or `<n>G` (decimal multiples).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryLimit {
    amount: u64,
    unit: MemoryUnit,
}

impl MemoryLimit {
    pub fn bytes(&self) -> u64 {
        self.amount.saturating_mul(self.unit.bytes())
    }
}

impl FromStr for MemoryLimit {
    type Err = LimitParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (amount, unit) = split_unit(value)?;
        let unit = match unit {
            'K' => MemoryUnit::Kilo,
            'M' => MemoryUnit::Mega,
            'G' => MemoryUnit::Giga,
            _ => return Err(LimitParseError::Unit(value.to_string())),
        };
        let amount = checked_amount(value, amount, unit.bytes())?;
        Ok(Self { amount, unit })
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            MemoryUnit::Kilo => 'K',
            MemoryUnit::Mega => 'M',
            MemoryUnit::Giga => 'G',
        };
        write!(f, "{}{}", self.amount, unit)
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = LimitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemoryLimit> for String {
    fn from(value: MemoryLimit) -> Self {
        value.to_string()
    }
}

/// How the frontier of the search is bounded.
///
/// `Limited` caps the open list at a percentage of the peak size the
/// unlimited baseline reached on the same instance. `LimitedPeBound`
/// additionally seeds the second phase with a lower bound taken from the
/// partial-expansion run limited at `pebound` percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OpenListLimit {
    Unlimited,
    Limited { percent: u32 },
    LimitedPeBound { percent: u32, pebound: u32 },
}

impl OpenListLimit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, OpenListLimit::Unlimited)
    }

    pub fn percent(&self) -> Option<u32> {
        match self {
            OpenListLimit::Unlimited => None,
            OpenListLimit::Limited { percent } | OpenListLimit::LimitedPeBound { percent, .. } => {
                Some(*percent)
            }
        }
    }

    pub fn pebound(&self) -> Option<u32> {
        match self {
            OpenListLimit::LimitedPeBound { pebound, .. } => Some(*pebound),
            _ => None,
        }
    }
}

impl FromStr for OpenListLimit {
    type Err = LimitParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || LimitParseError::OpenList(value.to_string());
        let number = |part: &str| part.parse::<u32>().map_err(|_| invalid());

        match value.split('-').collect::<Vec<_>>().as_slice() {
            ["unlimited"] => Ok(OpenListLimit::Unlimited),
            ["limited", percent] => Ok(OpenListLimit::Limited {
                percent: number(percent)?,
            }),
            ["limited", percent, "pebound", pebound] => Ok(OpenListLimit::LimitedPeBound {
                percent: number(percent)?,
                pebound: number(pebound)?,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for OpenListLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenListLimit::Unlimited => write!(f, "unlimited"),
            OpenListLimit::Limited { percent } => write!(f, "limited-{percent}"),
            OpenListLimit::LimitedPeBound { percent, pebound } => {
                write!(f, "limited-{percent}-pebound-{pebound}")
            }
        }
    }
}

impl TryFrom<String> for OpenListLimit {
    type Error = LimitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OpenListLimit> for String {
    fn from(value: OpenListLimit) -> Self {
        value.to_string()
    }
}

/// Parameters shared by every run of one report column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub suite: String,
    pub cost_system: String,
    pub heuristic: String,
    pub algorithm: String,
    #[serde(rename = "open_limitness")]
    pub open_list_limit: OpenListLimit,
    pub memory_limit: MemoryLimit,
    pub time_limit: TimeLimit,
}

impl Configuration {
    /// Directory-safe identity of the configuration.
    ///
    /// Fields are joined with `,` in alphabetical field-name order. `%`, `,`
    /// and `/` inside a field are percent-escaped, so distinct configurations
    /// never share a key and plain values produce the bare comma-joined form.
    pub fn grouping_key(&self) -> String {
        [
            self.algorithm.clone(),
            self.cost_system.clone(),
            self.heuristic.clone(),
            self.memory_limit.to_string(),
            self.open_list_limit.to_string(),
            self.suite.clone(),
            self.time_limit.to_string(),
        ]
        .iter()
        .map(|field| escape_key_field(field))
        .join(",")
    }

    /// Whether `other` matches this configuration in every field but the heuristic.
    pub fn differs_only_by_heuristic(&self, other: &Configuration) -> bool {
        self.heuristic != other.heuristic
            && *self
                == Configuration {
                    heuristic: self.heuristic.clone(),
                    ..other.clone()
                }
    }
}

fn escape_key_field(field: &str) -> String {
    field
        .replace('%', "%25")
        .replace(',', "%2C")
        .replace('/', "%2F")
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.grouping_key())
    }
}

/// One experiment: a configuration applied to a single problem instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    #[serde(flatten)]
    pub configuration: Configuration,
    pub domain: String,
    #[serde(rename = "domain_pddl")]
    pub domain_file: String,
    #[serde(rename = "instance_pddl")]
    pub instance: String,
    pub instance_index: usize,
    pub time_limit_seconds: u64,
    pub memory_limit_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_phase_lower_bound: Option<u64>,
}

impl RunDescriptor {
    pub fn new(configuration: Configuration, entry: &InstanceEntry) -> Self {
        Self {
            time_limit_seconds: configuration.time_limit.seconds(),
            memory_limit_bytes: configuration.memory_limit.bytes(),
            configuration,
            domain: entry.domain.clone(),
            domain_file: entry.domain_file.clone(),
            instance: entry.instance.clone(),
            instance_index: entry.index,
            open_limit: None,
            second_phase_lower_bound: None,
        }
    }

    pub fn run_key(&self) -> RunKey {
        RunKey::new(&self.configuration, &self.domain, &self.instance)
    }

    pub fn uses_partial_expansion(&self) -> bool {
        self.configuration.algorithm.contains("pe")
    }
}

/// Storage identity of a run: `(grouping key, domain, instance)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub grouping_key: String,
    pub domain: String,
    pub instance: String,
}

impl RunKey {
    pub fn new(configuration: &Configuration, domain: &str, instance: &str) -> Self {
        Self {
            grouping_key: configuration.grouping_key(),
            domain: domain.to_string(),
            instance: instance.to_string(),
        }
    }

    /// File stem shared by the three artifacts of the run.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.domain, self.instance)
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.grouping_key, self.stem())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Everything persisted for one executed run.
#[derive(Clone, Debug)]
pub struct RunArtifact {
    pub descriptor: RunDescriptor,
    pub output: CapturedOutput,
}
