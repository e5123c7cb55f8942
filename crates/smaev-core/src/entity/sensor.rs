// ── Sensor entities ──
//
// Read-only projections of one channel each. Enumerable channels go
// through a fixed tag-code mapping; everything else passes the channel
// value straight into presentation state.

use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

use smaev_gateway::{ChannelValue, values};

use crate::coordinator::Coordinator;
use crate::entity::{EntityCategory, Reconcile, Reconciliation, Unit, ValueMapping};
use crate::snapshot::{ChannelKind, ChannelSnapshot};

// ── Mappings ────────────────────────────────────────────────────────

const ROTARY_SWITCH: ValueMapping = ValueMapping::new(&[
    (values::measurement::SMART_CHARGING, "smart_charging"),
    (values::measurement::BOOST_CHARGING, "boost_charging"),
]);

const CHARGE_SESSION: ValueMapping = ValueMapping::new(&[
    (values::measurement::NOT_CONNECTED, "not_connected"),
    (values::measurement::SLEEP_MODE, "sleep_mode"),
    (values::measurement::ACTIVE_MODE, "active_mode"),
    (values::measurement::STATION_LOCKED, "station_locked"),
]);

const HEALTH: ValueMapping = ValueMapping::new(&[
    (values::measurement::OK, "ok"),
    (values::measurement::WARNING, "warning"),
    (values::measurement::ALARM, "alarm"),
    (values::measurement::OFF, "off"),
]);

// ── Description ─────────────────────────────────────────────────────

/// Static description of one sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorDescription {
    pub key: &'static str,
    pub kind: ChannelKind,
    pub channel: &'static str,
    pub unit: Option<Unit>,
    pub value_mapping: Option<ValueMapping>,
    pub category: EntityCategory,
    pub enabled_default: bool,
}

/// The charger's sensor catalogue.
pub const SENSOR_DESCRIPTIONS: &[SensorDescription] = &[
    SensorDescription {
        key: "charging_session_energy",
        kind: ChannelKind::Measurement,
        channel: "Measurement.ChaSess.WhIn",
        unit: Some(Unit::WattHour),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "position_of_rotary_switch",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Chrg.ModSw",
        unit: None,
        value_mapping: Some(ROTARY_SWITCH),
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "grid_current_phase_l1",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.A.phsA",
        unit: Some(Unit::Ampere),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_current_phase_l2",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.A.phsB",
        unit: Some(Unit::Ampere),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_current_phase_l3",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.A.phsC",
        unit: Some(Unit::Ampere),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_voltage_phase_l1",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.PhV.phsA",
        unit: Some(Unit::Volt),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_voltage_phase_l2",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.PhV.phsB",
        unit: Some(Unit::Volt),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_voltage_phase_l3",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.PhV.phsC",
        unit: Some(Unit::Volt),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "grid_frequency",
        kind: ChannelKind::Measurement,
        channel: "Measurement.GridMs.Hz",
        unit: Some(Unit::Hertz),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: false,
    },
    SensorDescription {
        key: "charging_station_power",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Metering.GridMs.TotWIn.ChaSta",
        unit: Some(Unit::Watt),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "charging_station_meter_reading",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Metering.GridMs.TotWhIn.ChaSta",
        unit: Some(Unit::WattHour),
        value_mapping: None,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "charging_session_status",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Operation.EVeh.ChaStt",
        unit: None,
        value_mapping: Some(CHARGE_SESSION),
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "connected_vehicle_status",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Operation.EVeh.Health",
        unit: None,
        value_mapping: Some(HEALTH),
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "charging_station_status",
        kind: ChannelKind::Measurement,
        channel: "Measurement.Operation.Health",
        unit: None,
        value_mapping: Some(HEALTH),
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SensorDescription {
        key: "mac_address",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Nameplate.MacId",
        unit: None,
        value_mapping: None,
        category: EntityCategory::Diagnostic,
        enabled_default: true,
    },
    SensorDescription {
        key: "wifi_mac_address",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Nameplate.WlMacId",
        unit: None,
        value_mapping: None,
        category: EntityCategory::Diagnostic,
        enabled_default: true,
    },
];

// ── State & handle ──────────────────────────────────────────────────

/// Presentation state of one sensor. Mapped channels carry the label as
/// `ChannelValue::Text`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SensorState {
    pub value: Option<ChannelValue>,
    pub available: bool,
}

/// Host-facing sensor handle.
pub struct Sensor {
    description: SensorDescription,
    rx: watch::Receiver<SensorState>,
}

impl Sensor {
    /// Build the sensor and subscribe its reconciler, or skip it (with a
    /// warning) when the account cannot read the channel.
    pub fn create(coordinator: &Coordinator, description: SensorDescription) -> Option<Self> {
        if !coordinator.availability().contains(description.kind, description.channel) {
            warn!(
                channel = description.channel,
                kind = %description.kind,
                "channel not accessible -- skipping entity",
            );
            return None;
        }

        let (tx, rx) = watch::channel(SensorState::default());
        coordinator.subscribe_entity(Box::new(SensorReconciler { description, tx }));
        Some(Self { description, rx })
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    /// Current presentation state.
    pub fn state(&self) -> SensorState {
        self.rx.borrow().clone()
    }

    /// Subscribe to presentation state changes.
    pub fn watch(&self) -> watch::Receiver<SensorState> {
        self.rx.clone()
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

struct SensorReconciler {
    description: SensorDescription,
    tx: watch::Sender<SensorState>,
}

impl Reconcile for SensorReconciler {
    fn channel_id(&self) -> &str {
        self.description.channel
    }

    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation {
        let Ok(value) = self.description.kind.value(snapshot, self.description.channel) else {
            // Recoverable: channel absent this cycle, prior value stands.
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        let value = match &self.description.value_mapping {
            Some(mapping) => match mapping.decode(value) {
                Some(label) => ChannelValue::from(label),
                None => {
                    warn!(
                        channel = self.description.channel,
                        value = %value,
                        "unmapped device value -- keeping previous state",
                    );
                    self.tx.send_modify(|state| state.available = true);
                    return Reconciliation::Skipped;
                }
            },
            None => value.clone(),
        };

        self.tx.send_modify(|state| {
            state.available = true;
            state.value = Some(value);
        });
        Reconciliation::Updated
    }

    fn cycle_failed(&mut self) {
        self.tx.send_modify(|state| state.available = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use smaev_gateway::{MeasurementRecord, ParameterRecord, Sample};

    fn find(key: &str) -> SensorDescription {
        *SENSOR_DESCRIPTIONS
            .iter()
            .find(|d| d.key == key)
            .expect("description")
    }

    fn reconciler(key: &str) -> (SensorReconciler, watch::Receiver<SensorState>) {
        let (tx, rx) = watch::channel(SensorState::default());
        (SensorReconciler { description: find(key), tx }, rx)
    }

    fn snapshot_with_measurement(channel_id: &str, value: ChannelValue) -> ChannelSnapshot {
        ChannelSnapshot::new(
            vec![MeasurementRecord {
                channel_id: channel_id.into(),
                values: vec![Sample { time: Utc::now(), value: Some(value) }],
            }],
            vec![],
        )
    }

    #[test]
    fn plain_sensor_takes_latest_sample() {
        let (mut sensor, rx) = reconciler("charging_session_energy");
        let snapshot =
            snapshot_with_measurement("Measurement.ChaSess.WhIn", ChannelValue::Number(7320.0));

        assert_eq!(sensor.reconcile(&snapshot), Reconciliation::Updated);
        let state = rx.borrow().clone();
        assert_eq!(state.value, Some(ChannelValue::Number(7320.0)));
        assert!(state.available);
    }

    #[test]
    fn mapped_sensor_decodes_tag_code() {
        let (mut sensor, rx) = reconciler("charging_session_status");
        let snapshot = snapshot_with_measurement(
            "Measurement.Operation.EVeh.ChaStt",
            ChannelValue::from("200112"),
        );

        assert_eq!(sensor.reconcile(&snapshot), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(ChannelValue::from("sleep_mode")));
    }

    #[test]
    fn unmapped_code_keeps_previous_state() {
        let (mut sensor, rx) = reconciler("charging_station_status");
        let snapshot =
            snapshot_with_measurement("Measurement.Operation.Health", ChannelValue::from("307"));
        sensor.reconcile(&snapshot);
        assert_eq!(rx.borrow().value, Some(ChannelValue::from("ok")));

        let drifted =
            snapshot_with_measurement("Measurement.Operation.Health", ChannelValue::from("99999"));
        assert_eq!(sensor.reconcile(&drifted), Reconciliation::Skipped);

        let state = rx.borrow().clone();
        assert_eq!(state.value, Some(ChannelValue::from("ok")));
        assert!(state.available);
    }

    #[test]
    fn parameter_sensor_reads_parameter_set() {
        let (mut sensor, rx) = reconciler("mac_address");
        let snapshot = ChannelSnapshot::new(
            vec![],
            vec![ParameterRecord {
                channel_id: "Parameter.Nameplate.MacId".into(),
                value: ChannelValue::from("00:15:bb:01:02:03"),
                min: None,
                max: None,
                possible_values: None,
            }],
        );

        assert_eq!(sensor.reconcile(&snapshot), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(ChannelValue::from("00:15:bb:01:02:03")));
    }

    #[test]
    fn missing_channel_skips_and_failure_drops_availability() {
        let (mut sensor, rx) = reconciler("grid_frequency");
        let empty = ChannelSnapshot::new(vec![], vec![]);

        assert_eq!(sensor.reconcile(&empty), Reconciliation::Skipped);
        assert!(rx.borrow().available);

        sensor.cycle_failed();
        assert!(!rx.borrow().available);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let (mut sensor, rx) = reconciler("charging_station_power");
        let snapshot = snapshot_with_measurement(
            "Measurement.Metering.GridMs.TotWIn.ChaSta",
            ChannelValue::Number(11000.0),
        );

        sensor.reconcile(&snapshot);
        let first = rx.borrow().clone();
        sensor.reconcile(&snapshot);
        assert_eq!(*rx.borrow(), first);
    }
}
