// ── Entity reconciliation ──
//
// One reconciler per exposed channel projects the installed snapshot into
// typed presentation state. Reconcilers live inside the coordinator's
// subscriber list and run on its driver task; the host holds the matching
// handle (Sensor, Number, ...) and observes state through a watch channel.

mod datetime;
mod number;
mod select;
mod sensor;
mod switch;

pub use datetime::{DATETIME_DESCRIPTIONS, DateTimeDescription, DateTimeEntity, DateTimeState};
pub use number::{DEFAULT_MAX, DEFAULT_MIN, NUMBER_DESCRIPTIONS, Number, NumberDescription, NumberState};
pub use select::{SELECT_DESCRIPTIONS, Select, SelectDescription, SelectState};
pub use sensor::{SENSOR_DESCRIPTIONS, Sensor, SensorDescription, SensorState};
pub use switch::{SWITCH_DESCRIPTIONS, Switch, SwitchDescription, SwitchState};

use serde::Serialize;

use smaev_gateway::ChannelValue;

use crate::coordinator::Coordinator;
use crate::snapshot::ChannelSnapshot;

// ── Reconciliation contract ─────────────────────────────────────────

/// Subscriber side of an entity: invoked by the coordinator after every
/// cycle, on the driver task. Implementations only read the snapshot and
/// mutate their own published state; they must not block or perform I/O.
pub trait Reconcile: Send {
    /// Channel this reconciler projects, for logging.
    fn channel_id(&self) -> &str;

    /// Project the freshly installed snapshot into presentation state.
    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation;

    /// The cycle failed; presentation values stay stale and availability
    /// drops.
    fn cycle_failed(&mut self);
}

/// Outcome of one reconciliation pass over one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Presentation state now reflects the snapshot.
    Updated,
    /// Channel missing or value uninterpretable; prior state kept.
    Skipped,
    /// Bounds or options drifted; reconcile once more after the pass.
    Deferred,
}

// ── Presentation metadata ───────────────────────────────────────────

/// Where the host platform files the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Primary control/telemetry surface.
    #[default]
    Primary,
    /// Diagnostic detail, hidden by default in most dashboards.
    Diagnostic,
}

/// Display unit attached to numeric presentation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    WattHour,
    KilowattHour,
    Watt,
    Ampere,
    Volt,
    Hertz,
    Minute,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::WattHour => "Wh",
            Self::KilowattHour => "kWh",
            Self::Watt => "W",
            Self::Ampere => "A",
            Self::Volt => "V",
            Self::Hertz => "Hz",
            Self::Minute => "min",
        }
    }
}

// ── Value mappings ──────────────────────────────────────────────────

/// Fixed bidirectional mapping between device tag codes and presentation
/// labels for one enumerable channel. Tables are `'static`; membership is
/// small enough that linear scans beat hashing.
#[derive(Debug, Clone, Copy)]
pub struct ValueMapping {
    entries: &'static [(&'static str, &'static str)],
}

impl ValueMapping {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    /// Device code -> label. Accepts either encoding of the code (the
    /// charger reports `4718` and `"4718"` interchangeably).
    pub fn decode(&self, value: &ChannelValue) -> Option<&'static str> {
        let code = value.to_string();
        self.entries.iter().find(|(c, _)| *c == code).map(|(_, label)| *label)
    }

    /// Label -> device code.
    pub fn encode(&self, label: &str) -> Option<&'static str> {
        self.entries.iter().find(|(_, l)| *l == label).map(|(code, _)| *code)
    }

    /// Presentation labels in table order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(_, label)| *label)
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }
}

// ── Catalogue setup ─────────────────────────────────────────────────

/// Every entity one charger exposes, built from the static description
/// tables. Channels the account cannot read are skipped with a warning
/// and never become entities.
pub struct Entities {
    pub sensors: Vec<Sensor>,
    pub numbers: Vec<Number>,
    pub selects: Vec<Select>,
    pub switches: Vec<Switch>,
    pub datetimes: Vec<DateTimeEntity>,
}

/// Build the full catalogue against a connected coordinator.
pub fn setup(coordinator: &Coordinator) -> Entities {
    Entities {
        sensors: SENSOR_DESCRIPTIONS
            .iter()
            .filter_map(|description| Sensor::create(coordinator, *description))
            .collect(),
        numbers: NUMBER_DESCRIPTIONS
            .iter()
            .filter_map(|description| Number::create(coordinator, *description))
            .collect(),
        selects: SELECT_DESCRIPTIONS
            .iter()
            .filter_map(|description| Select::create(coordinator, *description))
            .collect(),
        switches: SWITCH_DESCRIPTIONS
            .iter()
            .filter_map(|description| Switch::create(coordinator, *description))
            .collect(),
        datetimes: DATETIME_DESCRIPTIONS
            .iter()
            .filter_map(|description| DateTimeEntity::create(coordinator, *description))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mapping_round_trips() {
        let tables = SENSOR_DESCRIPTIONS
            .iter()
            .filter_map(|d| d.value_mapping)
            .chain(SELECT_DESCRIPTIONS.iter().map(|d| d.value_mapping));

        for mapping in tables {
            for (code, label) in mapping.entries() {
                assert_eq!(mapping.encode(label), Some(*code));
                assert_eq!(mapping.decode(&ChannelValue::from(*code)), Some(*label));
            }
        }
    }

    #[test]
    fn decode_accepts_numeric_encoding() {
        let mapping = SELECT_DESCRIPTIONS[0].value_mapping;
        assert_eq!(mapping.decode(&ChannelValue::Number(4719.0)), Some("optimized_charging"));
    }

    #[test]
    fn unknown_label_does_not_encode() {
        let mapping = SELECT_DESCRIPTIONS[0].value_mapping;
        assert_eq!(mapping.encode("panic_charging"), None);
    }
}
