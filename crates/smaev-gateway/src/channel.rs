// ── Channel record model ──
//
// In-memory representation of the charger's two channel sets. Channel
// identifiers are dotted hierarchical paths ("Parameter.Chrg.ActChaMod");
// within one fetched set an identifier appears at most once. Measurement
// channels carry a newest-first list of timestamped samples; parameter
// channels carry a single value plus optional bounds and an optional list
// of admissible discrete values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── ChannelValue ────────────────────────────────────────────────────

/// A value in the charger's native encoding.
///
/// The device reports numbers, enum tag codes, and free text
/// interchangeably as JSON numbers or strings; writes always go out as
/// strings. This type preserves whichever form arrived and converts on
/// demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Number(f64),
    Text(String),
}

impl ChannelValue {
    /// Numeric view: native numbers directly, numeric text parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Textual view; `None` for native numbers.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

/// Device-native encoding, as used for writes and tag-code lookups.
/// Integral numbers print without a fractional part.
impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ChannelValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ChannelValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ChannelValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ── Measurement channels ────────────────────────────────────────────

/// One timestamped reading. A `null` value means the reading is
/// momentarily absent (no vehicle connected, meter warming up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: Option<ChannelValue>,
}

/// A measurement channel as returned by `request_measurements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub channel_id: String,
    /// Samples, newest first.
    pub values: Vec<Sample>,
}

impl MeasurementRecord {
    /// The most recent sample, if the device reported any.
    pub fn latest(&self) -> Option<&Sample> {
        self.values.first()
    }
}

// ── Parameter channels ──────────────────────────────────────────────

/// A parameter channel as returned by `request_parameters`.
///
/// `min`/`max` are present on bounded numeric parameters and may drift at
/// runtime (the charger re-derives them from its own state, e.g. phase
/// switchover changes the admissible current range). `possible_values`
/// is present on enumerable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    pub channel_id: String,
    pub value: ChannelValue,
    #[serde(default)]
    pub min: Option<ChannelValue>,
    #[serde(default)]
    pub max: Option<ChannelValue>,
    #[serde(default)]
    pub possible_values: Option<Vec<ChannelValue>>,
}

// ── Device identity ─────────────────────────────────────────────────

/// Static identity reported by `device_info`. The serial is the only
/// stable unique key a charger exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub serial: String,
    pub sw_version: String,
}
