// ── Select entities ──
//
// Enumerable parameters. The admissible option set comes from the
// device's `possibleValues` list and can drift at runtime, so it gets the
// same record-then-defer treatment as number bounds before the current
// selection is trusted.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use smaev_gateway::values;

use crate::coordinator::Coordinator;
use crate::entity::{EntityCategory, Reconcile, Reconciliation, ValueMapping};
use crate::error::CoreError;
use crate::snapshot::{ChannelKind, ChannelSnapshot};

// ── Mappings ────────────────────────────────────────────────────────

const CHARGING_MODE: ValueMapping = ValueMapping::new(&[
    (values::parameter::BOOST_CHARGING, "boost_charging"),
    (values::parameter::OPTIMIZED_CHARGING, "optimized_charging"),
    (values::parameter::SETPOINT_CHARGING, "setpoint_charging"),
    (values::parameter::CHARGE_STOP, "charge_stop"),
]);

const LED_BRIGHTNESS: ValueMapping = ValueMapping::new(&[
    (values::parameter::LED_LOW, "low"),
    (values::parameter::LED_AVERAGE, "average"),
    (values::parameter::LED_HIGH, "high"),
]);

// ── Description ─────────────────────────────────────────────────────

/// Static description of one enumerable parameter.
#[derive(Debug, Clone, Copy)]
pub struct SelectDescription {
    pub key: &'static str,
    pub kind: ChannelKind,
    pub channel: &'static str,
    pub value_mapping: ValueMapping,
    pub category: EntityCategory,
    pub enabled_default: bool,
}

/// The charger's select catalogue.
pub const SELECT_DESCRIPTIONS: &[SelectDescription] = &[
    SelectDescription {
        key: "operating_mode_of_charge_session",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.ActChaMod",
        value_mapping: CHARGING_MODE,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SelectDescription {
        key: "led_brightness",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Sys.DevSigBri",
        value_mapping: LED_BRIGHTNESS,
        category: EntityCategory::Diagnostic,
        enabled_default: true,
    },
];

// ── State & handle ──────────────────────────────────────────────────

/// Presentation state of one select: the current label and the options
/// the device currently admits.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SelectState {
    pub current: Option<String>,
    pub options: Vec<String>,
    pub available: bool,
}

/// Host-facing select handle.
pub struct Select {
    description: SelectDescription,
    coordinator: Coordinator,
    tx: Arc<watch::Sender<SelectState>>,
    rx: watch::Receiver<SelectState>,
}

impl Select {
    /// Build the entity and subscribe its reconciler, or skip it (with a
    /// warning) when the account cannot read the channel.
    pub fn create(coordinator: &Coordinator, description: SelectDescription) -> Option<Self> {
        if !coordinator.availability().contains(description.kind, description.channel) {
            warn!(
                channel = description.channel,
                kind = %description.kind,
                "channel not accessible -- skipping entity",
            );
            return None;
        }

        let (tx, rx) = watch::channel(SelectState::default());
        let tx = Arc::new(tx);
        coordinator
            .subscribe_entity(Box::new(SelectReconciler { description, tx: Arc::clone(&tx) }));
        Some(Self { description, coordinator: coordinator.clone(), tx, rx })
    }

    pub fn description(&self) -> &SelectDescription {
        &self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    pub fn state(&self) -> SelectState {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SelectState> {
        self.rx.clone()
    }

    /// Select an option by label: encode through the inverse mapping,
    /// write, update presentation optimistically, converge with one
    /// immediate refresh. Unknown labels fail before any gateway call.
    pub async fn select(&self, label: &str) -> Result<(), CoreError> {
        let Some(code) = self.description.value_mapping.encode(label) else {
            return Err(CoreError::UnmappedValue {
                channel_id: self.description.channel.to_owned(),
                value: label.to_owned(),
            });
        };
        self.coordinator.set_parameter(code, self.description.channel).await?;
        self.tx.send_modify(|state| state.current = Some(label.to_owned()));
        if let Err(error) = self.coordinator.refresh_now().await {
            debug!(channel = self.description.channel, %error, "post-write refresh failed");
        }
        Ok(())
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

struct SelectReconciler {
    description: SelectDescription,
    tx: Arc<watch::Sender<SelectState>>,
}

impl Reconcile for SelectReconciler {
    fn channel_id(&self) -> &str {
        self.description.channel
    }

    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation {
        let Ok(record) = snapshot.parameter(self.description.channel) else {
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        let Some(possible) = record.possible_values.as_ref() else {
            warn!(
                channel = self.description.channel,
                "parameter reports no possible values -- keeping previous state",
            );
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        // Map the admissible set; an unmapped member means the firmware
        // speaks a dialect this table does not know.
        let mut options = Vec::with_capacity(possible.len());
        for value in possible {
            match self.description.value_mapping.decode(value) {
                Some(label) => options.push(label.to_owned()),
                None => {
                    warn!(
                        channel = self.description.channel,
                        value = %value,
                        "unmapped option code -- keeping previous state",
                    );
                    self.tx.send_modify(|state| state.available = true);
                    return Reconciliation::Skipped;
                }
            }
        }

        // Option drift gets the bounds treatment: record, defer.
        if options != self.tx.borrow().options {
            debug!(
                channel = self.description.channel,
                options = options.len(),
                "options drifted -- deferring selection update",
            );
            self.tx.send_modify(|state| {
                state.available = true;
                state.options = options;
            });
            return Reconciliation::Deferred;
        }

        let Some(label) = self.description.value_mapping.decode(&record.value) else {
            warn!(
                channel = self.description.channel,
                value = %record.value,
                "unmapped device value -- keeping previous state",
            );
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        self.tx.send_modify(|state| {
            state.available = true;
            state.current = Some(label.to_owned());
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
    use pretty_assertions::assert_eq;
    use smaev_gateway::{ChannelValue, ParameterRecord};

    fn reconciler() -> (SelectReconciler, watch::Receiver<SelectState>) {
        let (tx, rx) = watch::channel(SelectState::default());
        (SelectReconciler { description: SELECT_DESCRIPTIONS[0], tx: Arc::new(tx) }, rx)
    }

    fn snapshot(value: &str, possible: &[&str]) -> ChannelSnapshot {
        ChannelSnapshot::new(
            vec![],
            vec![ParameterRecord {
                channel_id: "Parameter.Chrg.ActChaMod".into(),
                value: ChannelValue::from(value),
                min: None,
                max: None,
                possible_values: Some(possible.iter().map(|v| ChannelValue::from(*v)).collect()),
            }],
        )
    }

    #[test]
    fn first_options_report_defers_then_settles() {
        let (mut select, rx) = reconciler();
        let snap = snapshot("4719", &["4718", "4719", "4720", "4721"]);

        assert_eq!(select.reconcile(&snap), Reconciliation::Deferred);
        let state = rx.borrow().clone();
        assert_eq!(state.current, None);
        assert_eq!(
            state.options,
            vec!["boost_charging", "optimized_charging", "setpoint_charging", "charge_stop"],
        );

        assert_eq!(select.reconcile(&snap), Reconciliation::Updated);
        assert_eq!(rx.borrow().current.as_deref(), Some("optimized_charging"));
    }

    #[test]
    fn option_drift_defers_selection_update() {
        let (mut select, rx) = reconciler();
        let full = snapshot("4719", &["4718", "4719", "4720", "4721"]);
        select.reconcile(&full);
        select.reconcile(&full);

        let narrowed = snapshot("4721", &["4719", "4721"]);
        assert_eq!(select.reconcile(&narrowed), Reconciliation::Deferred);
        let state = rx.borrow().clone();
        assert_eq!(state.current.as_deref(), Some("optimized_charging"));
        assert_eq!(state.options, vec!["optimized_charging", "charge_stop"]);

        assert_eq!(select.reconcile(&narrowed), Reconciliation::Updated);
        assert_eq!(rx.borrow().current.as_deref(), Some("charge_stop"));
    }

    #[test]
    fn unmapped_current_value_is_skipped() {
        let (mut select, rx) = reconciler();
        let snap = snapshot("4719", &["4718", "4719", "4720", "4721"]);
        select.reconcile(&snap);
        select.reconcile(&snap);

        let unknown = snapshot("9999", &["4718", "4719", "4720", "4721"]);
        assert_eq!(select.reconcile(&unknown), Reconciliation::Skipped);
        assert_eq!(rx.borrow().current.as_deref(), Some("optimized_charging"));
    }

    #[test]
    fn unmapped_option_code_is_skipped() {
        let (mut select, _rx) = reconciler();
        let snap = snapshot("4719", &["4718", "9999"]);
        assert_eq!(select.reconcile(&snap), Reconciliation::Skipped);
    }

    #[test]
    fn missing_possible_values_is_skipped() {
        let (mut select, _rx) = reconciler();
        let record = ParameterRecord {
            channel_id: "Parameter.Chrg.ActChaMod".into(),
            value: ChannelValue::from("4719"),
            min: None,
            max: None,
            possible_values: None,
        };
        let snap = ChannelSnapshot::new(vec![], vec![record]);
        assert_eq!(select.reconcile(&snap), Reconciliation::Skipped);
    }
}
