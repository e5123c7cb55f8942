// ── Channel snapshot ──
//
// One atomically installed view of the charger's channel sets. A snapshot
// is built from exactly one successful poll cycle and replaced wholesale
// by the next -- records from different cycles never mix. Entities read
// it, nothing mutates it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use smaev_gateway::{ChannelValue, MeasurementRecord, ParameterRecord};

use crate::error::CoreError;

// ── ChannelKind ─────────────────────────────────────────────────────

/// Which of the two channel sets an identifier belongs to. Resolved once
/// at entity construction, not re-inspected per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Measurement,
    Parameter,
}

impl ChannelKind {
    /// Current value of `channel_id` within this set: the latest sample
    /// for measurements, the parameter value otherwise. An empty sample
    /// list or a null sample reads as channel-not-found for the cycle.
    pub fn value<'snap>(
        self,
        snapshot: &'snap ChannelSnapshot,
        channel_id: &str,
    ) -> Result<&'snap ChannelValue, CoreError> {
        match self {
            Self::Measurement => snapshot
                .measurement(channel_id)?
                .latest()
                .and_then(|sample| sample.value.as_ref())
                .ok_or_else(|| CoreError::ChannelNotFound { channel_id: channel_id.to_owned() }),
            Self::Parameter => Ok(&snapshot.parameter(channel_id)?.value),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measurement => write!(f, "measurement"),
            Self::Parameter => write!(f, "parameter"),
        }
    }
}

// ── ChannelSnapshot ─────────────────────────────────────────────────

/// Immutable per-cycle view of both channel sets, indexed by identifier.
/// Channel identifiers are unique within their own set for a given cycle.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    measurements: HashMap<String, MeasurementRecord>,
    parameters: HashMap<String, ParameterRecord>,
    taken_at: DateTime<Utc>,
}

impl ChannelSnapshot {
    /// Index the raw channel lists fetched in one poll cycle.
    pub fn new(measurements: Vec<MeasurementRecord>, parameters: Vec<ParameterRecord>) -> Self {
        Self {
            measurements: measurements
                .into_iter()
                .map(|record| (record.channel_id.clone(), record))
                .collect(),
            parameters: parameters
                .into_iter()
                .map(|record| (record.channel_id.clone(), record))
                .collect(),
            taken_at: Utc::now(),
        }
    }

    /// When the producing cycle completed.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Look up a measurement channel by identifier.
    pub fn measurement(&self, channel_id: &str) -> Result<&MeasurementRecord, CoreError> {
        self.measurements
            .get(channel_id)
            .ok_or_else(|| CoreError::ChannelNotFound { channel_id: channel_id.to_owned() })
    }

    /// Look up a parameter channel by identifier.
    pub fn parameter(&self, channel_id: &str) -> Result<&ParameterRecord, CoreError> {
        self.parameters
            .get(channel_id)
            .ok_or_else(|| CoreError::ChannelNotFound { channel_id: channel_id.to_owned() })
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// `true` when both sets carry data. Cycles that would install an
    /// incomplete snapshot fail instead, so installed snapshots always
    /// report `true`.
    pub fn is_complete(&self) -> bool {
        !self.measurements.is_empty() && !self.parameters.is_empty()
    }
}

// ── ChannelAvailability ─────────────────────────────────────────────

/// Channels the configured account may read, fetched once at setup from
/// the gateway's permission queries. Entity construction filters against
/// this; it is not re-validated per cycle.
#[derive(Debug, Clone, Default)]
pub struct ChannelAvailability {
    measurements: HashSet<String>,
    parameters: HashSet<String>,
}

impl ChannelAvailability {
    pub fn new(measurements: HashSet<String>, parameters: HashSet<String>) -> Self {
        Self { measurements, parameters }
    }

    /// Whether `channel_id` is readable within the given set.
    pub fn contains(&self, kind: ChannelKind, channel_id: &str) -> bool {
        match kind {
            ChannelKind::Measurement => self.measurements.contains(channel_id),
            ChannelKind::Parameter => self.parameters.contains(channel_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use smaev_gateway::Sample;

    fn measurement(channel_id: &str, value: Option<ChannelValue>) -> MeasurementRecord {
        MeasurementRecord {
            channel_id: channel_id.into(),
            values: vec![Sample { time: Utc::now(), value }],
        }
    }

    fn parameter(channel_id: &str, value: &str) -> ParameterRecord {
        ParameterRecord {
            channel_id: channel_id.into(),
            value: ChannelValue::from(value),
            min: None,
            max: None,
            possible_values: None,
        }
    }

    #[test]
    fn lookup_by_kind_reads_the_right_set() {
        let snapshot = ChannelSnapshot::new(
            vec![measurement("Measurement.ChaSess.WhIn", Some(ChannelValue::Number(7320.0)))],
            vec![parameter("Parameter.Chrg.ActChaMod", "4719")],
        );

        let value = ChannelKind::Measurement
            .value(&snapshot, "Measurement.ChaSess.WhIn")
            .expect("measurement value");
        assert_eq!(value.as_f64(), Some(7320.0));

        let value = ChannelKind::Parameter
            .value(&snapshot, "Parameter.Chrg.ActChaMod")
            .expect("parameter value");
        assert_eq!(value.as_str(), Some("4719"));
    }

    #[test]
    fn missing_channel_is_recoverable_not_found() {
        let snapshot = ChannelSnapshot::new(vec![], vec![]);
        let err = snapshot.measurement("Measurement.GridMs.Hz").expect_err("missing");
        assert!(matches!(err, CoreError::ChannelNotFound { .. }));
    }

    #[test]
    fn null_sample_reads_as_not_found() {
        let snapshot =
            ChannelSnapshot::new(vec![measurement("Measurement.GridMs.A.phsA", None)], vec![]);
        let err = ChannelKind::Measurement
            .value(&snapshot, "Measurement.GridMs.A.phsA")
            .expect_err("null sample");
        assert!(matches!(err, CoreError::ChannelNotFound { .. }));
    }

    #[test]
    fn empty_sample_list_reads_as_not_found() {
        let record = MeasurementRecord { channel_id: "Measurement.Chrg.ModSw".into(), values: vec![] };
        let snapshot = ChannelSnapshot::new(vec![record], vec![]);
        assert!(ChannelKind::Measurement.value(&snapshot, "Measurement.Chrg.ModSw").is_err());
    }

    #[test]
    fn completeness_requires_both_sets() {
        let full = ChannelSnapshot::new(
            vec![measurement("Measurement.GridMs.Hz", Some(ChannelValue::Number(49.98)))],
            vec![parameter("Parameter.Sys.DevSigBri", "423")],
        );
        assert!(full.is_complete());

        let half = ChannelSnapshot::new(
            vec![measurement("Measurement.GridMs.Hz", Some(ChannelValue::Number(49.98)))],
            vec![],
        );
        assert!(!half.is_complete());
    }

    #[test]
    fn availability_is_per_set() {
        let availability = ChannelAvailability::new(
            ["Measurement.GridMs.Hz".to_owned()].into(),
            ["Parameter.Chrg.Plan.En".to_owned()].into(),
        );

        assert!(availability.contains(ChannelKind::Measurement, "Measurement.GridMs.Hz"));
        assert!(!availability.contains(ChannelKind::Parameter, "Measurement.GridMs.Hz"));
        assert!(availability.contains(ChannelKind::Parameter, "Parameter.Chrg.Plan.En"));
    }
}
