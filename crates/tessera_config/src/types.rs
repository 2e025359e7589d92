//! Configuration types deserialized from `tessera.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use tessera_common::SimTime;

/// Default ceiling on settlement passes per settle call.
pub const DEFAULT_MAX_SETTLE_PASSES: u32 = 10_000;

/// Default ceiling on zero-delay rounds within one simulated instant.
pub const DEFAULT_MAX_DELTAS: u32 = 10_000;

/// The top-level simulation configuration parsed from `tessera.toml`.
///
/// Every section is optional; an empty file yields [`SimConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Iteration ceilings and run limits.
    #[serde(default)]
    pub simulation: SimulationSection,
    /// Trace destinations, each written concurrently.
    #[serde(default)]
    pub trace: Vec<TraceConfig>,
}

/// The `[simulation]` section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Settlement passes allowed before reporting a combinational loop.
    #[serde(default = "default_max_settle_passes")]
    pub max_settle_passes: u32,
    /// Zero-delay rounds allowed within one instant.
    #[serde(default = "default_max_deltas")]
    pub max_deltas: u32,
    /// Simulated time at which `run()` stops even if processes remain.
    ///
    /// Accepts a unit-suffixed string (`"10us"`) or a femtosecond integer.
    #[serde(default, deserialize_with = "deserialize_time_limit")]
    pub time_limit: Option<SimTime>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            max_settle_passes: DEFAULT_MAX_SETTLE_PASSES,
            max_deltas: DEFAULT_MAX_DELTAS,
            time_limit: None,
        }
    }
}

fn default_max_settle_passes() -> u32 {
    DEFAULT_MAX_SETTLE_PASSES
}

fn default_max_deltas() -> u32 {
    DEFAULT_MAX_DELTAS
}

/// Deserializes a time limit given either as `"10ns"`-style text or as a
/// bare integer count of femtoseconds.
fn deserialize_time_limit<'de, D>(deserializer: D) -> Result<Option<SimTime>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimeLimit;

    impl<'de> Visitor<'de> for TimeLimit {
        type Value = Option<SimTime>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a time such as \"10ns\" or an integer number of femtoseconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse::<SimTime>().map(Some).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(|fs| Some(SimTime::from_fs(fs)))
                .map_err(|_| E::custom(format!("time limit must not be negative, got {v}")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(SimTime::from_fs(v)))
        }
    }

    deserializer.deserialize_any(TimeLimit)
}

/// One `[[trace]]` destination.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TraceConfig {
    /// Output file.
    pub path: PathBuf,
    /// Output format.
    #[serde(default)]
    pub format: TraceFormat,
    /// Gzip the output stream.
    #[serde(default)]
    pub compress: bool,
    /// Signal names to record; all signals when absent.
    ///
    /// Accepts a single name or a list of names.
    #[serde(default, deserialize_with = "deserialize_signal_filter")]
    pub signals: Option<Vec<String>>,
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_signal_filter<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Option<Vec<String>>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a signal name or a list of signal names")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(vec![v.to_string()]))
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(Some(vec))
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Trace output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// Value Change Dump (IEEE 1364), human readable (default).
    #[default]
    Vcd,
    /// One JSON object per line, machine readable.
    Jsonl,
}
