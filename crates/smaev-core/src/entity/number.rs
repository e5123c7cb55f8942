// ── Number entities ──
//
// Bounded numeric parameters. The charger re-derives min/max from its own
// state at runtime (plan duration limits follow the configured departure
// time, for example), so every cycle compares the reported bounds against
// the last-recorded ones before trusting the value. On drift the bounds
// are recorded first and the value update is deferred to one extra
// reconciliation after the notification pass -- a value parsed under
// stale bounds is worse than a value that arrives a beat later.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use smaev_gateway::ChannelValue;

use crate::coordinator::Coordinator;
use crate::entity::{EntityCategory, Reconcile, Reconciliation, Unit};
use crate::error::CoreError;
use crate::snapshot::{ChannelKind, ChannelSnapshot};

/// Lower bound assumed until the device reports one.
pub const DEFAULT_MIN: f64 = 0.0;
/// Upper bound assumed until the device reports one.
pub const DEFAULT_MAX: f64 = 10_000_000_000.0;

// ── Description ─────────────────────────────────────────────────────

/// Static description of one bounded numeric parameter.
#[derive(Debug, Clone, Copy)]
pub struct NumberDescription {
    pub key: &'static str,
    pub kind: ChannelKind,
    pub channel: &'static str,
    pub unit: Option<Unit>,
    /// Presentation step size. Integral steps round the parsed value.
    pub step: f64,
    pub category: EntityCategory,
    pub enabled_default: bool,
}

/// The charger's number catalogue.
pub const NUMBER_DESCRIPTIONS: &[NumberDescription] = &[
    NumberDescription {
        key: "standby_charge_disconnect",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.StpWhenFlTm",
        unit: Some(Unit::Minute),
        step: 1.0,
        category: EntityCategory::Diagnostic,
        enabled_default: true,
    },
    NumberDescription {
        key: "duration_of_charge_session",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.Plan.DurTmm",
        unit: Some(Unit::Minute),
        step: 1.0,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    NumberDescription {
        key: "energy_of_charge_session",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.Plan.En",
        unit: Some(Unit::KilowattHour),
        step: 1.0,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
];

// ── State & handle ──────────────────────────────────────────────────

/// Presentation state of one number. Bounds are the last ones the device
/// reported, with wide defaults until then.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberState {
    pub value: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub available: bool,
}

impl Default for NumberState {
    fn default() -> Self {
        Self { value: None, min: DEFAULT_MIN, max: DEFAULT_MAX, available: false }
    }
}

/// Host-facing number handle.
pub struct Number {
    description: NumberDescription,
    coordinator: Coordinator,
    tx: Arc<watch::Sender<NumberState>>,
    rx: watch::Receiver<NumberState>,
}

impl Number {
    /// Build the entity and subscribe its reconciler, or skip it (with a
    /// warning) when the account cannot read the channel.
    pub fn create(coordinator: &Coordinator, description: NumberDescription) -> Option<Self> {
        if !coordinator.availability().contains(description.kind, description.channel) {
            warn!(
                channel = description.channel,
                kind = %description.kind,
                "channel not accessible -- skipping entity",
            );
            return None;
        }

        let (tx, rx) = watch::channel(NumberState::default());
        let tx = Arc::new(tx);
        coordinator
            .subscribe_entity(Box::new(NumberReconciler { description, tx: Arc::clone(&tx) }));
        Some(Self { description, coordinator: coordinator.clone(), tx, rx })
    }

    pub fn description(&self) -> &NumberDescription {
        &self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    pub fn state(&self) -> NumberState {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<NumberState> {
        self.rx.clone()
    }

    /// Write a new value: encode to device-native form, write through the
    /// coordinator, update presentation optimistically, then request one
    /// immediate refresh to converge on the canonical value.
    pub async fn set_value(&self, value: f64) -> Result<(), CoreError> {
        let encoded = if integer_step(self.description.step) {
            format!("{value:.0}")
        } else {
            value.to_string()
        };
        self.coordinator.set_parameter(&encoded, self.description.channel).await?;
        self.tx.send_modify(|state| state.value = Some(value));
        if let Err(error) = self.coordinator.refresh_now().await {
            debug!(channel = self.description.channel, %error, "post-write refresh failed");
        }
        Ok(())
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

struct NumberReconciler {
    description: NumberDescription,
    tx: Arc<watch::Sender<NumberState>>,
}

impl Reconcile for NumberReconciler {
    fn channel_id(&self) -> &str {
        self.description.channel
    }

    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation {
        let Ok(record) = snapshot.parameter(self.description.channel) else {
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        // Bounds drift check runs before the value is trusted. Both
        // bounds must be present; a record without them keeps whatever
        // bounds are recorded.
        let reported = record
            .min
            .as_ref()
            .and_then(ChannelValue::as_f64)
            .zip(record.max.as_ref().and_then(ChannelValue::as_f64));
        if let Some((min, max)) = reported {
            let recorded = {
                let state = self.tx.borrow();
                (state.min, state.max)
            };
            if bounds_differ(recorded, (min, max)) {
                debug!(
                    channel = self.description.channel,
                    min, max, "bounds drifted -- deferring value update",
                );
                self.tx.send_modify(|state| {
                    state.available = true;
                    state.min = min;
                    state.max = max;
                });
                return Reconciliation::Deferred;
            }
        }

        let Some(value) = record.value.as_f64() else {
            warn!(
                channel = self.description.channel,
                value = %record.value,
                "unparsable numeric value -- keeping previous state",
            );
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };
        let value = if integer_step(self.description.step) { value.round() } else { value };

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

fn integer_step(step: f64) -> bool {
    step.fract().abs() < f64::EPSILON
}

fn bounds_differ(recorded: (f64, f64), reported: (f64, f64)) -> bool {
    (recorded.0 - reported.0).abs() >= f64::EPSILON
        || (recorded.1 - reported.1).abs() >= f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smaev_gateway::{ChannelValue, ParameterRecord};

    fn description() -> NumberDescription {
        NUMBER_DESCRIPTIONS[2] // energy_of_charge_session
    }

    fn reconciler() -> (NumberReconciler, watch::Receiver<NumberState>) {
        let (tx, rx) = watch::channel(NumberState::default());
        (NumberReconciler { description: description(), tx: Arc::new(tx) }, rx)
    }

    fn snapshot(value: &str, min: Option<f64>, max: Option<f64>) -> ChannelSnapshot {
        ChannelSnapshot::new(
            vec![],
            vec![ParameterRecord {
                channel_id: "Parameter.Chrg.Plan.En".into(),
                value: ChannelValue::from(value),
                min: min.map(ChannelValue::Number),
                max: max.map(ChannelValue::Number),
                possible_values: None,
            }],
        )
    }

    #[test]
    fn first_bounds_report_defers_then_settles() {
        let (mut number, rx) = reconciler();
        let snap = snapshot("27", Some(0.0), Some(100.0));

        // Pass 1: defaults (0, 1e10) differ from (0, 100) -- bounds
        // recorded, value untouched.
        assert_eq!(number.reconcile(&snap), Reconciliation::Deferred);
        let state = rx.borrow().clone();
        assert_eq!(state.value, None);
        assert_eq!((state.min, state.max), (0.0, 100.0));

        // Deferred pass: bounds now match, value lands.
        assert_eq!(number.reconcile(&snap), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(27.0));
    }

    #[test]
    fn bounds_drift_between_cycles_defers_again() {
        let (mut number, rx) = reconciler();
        let first = snapshot("27", Some(0.0), Some(100.0));
        number.reconcile(&first);
        number.reconcile(&first);
        assert_eq!(rx.borrow().value, Some(27.0));

        let second = snapshot("30", Some(0.0), Some(32.0));
        assert_eq!(number.reconcile(&second), Reconciliation::Deferred);
        let state = rx.borrow().clone();
        assert_eq!(state.value, Some(27.0), "value must not move during the drift pass");
        assert_eq!((state.min, state.max), (0.0, 32.0));

        assert_eq!(number.reconcile(&second), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(30.0));
    }

    #[test]
    fn stable_bounds_update_value_directly() {
        let (mut number, rx) = reconciler();
        let first = snapshot("10", Some(0.0), Some(100.0));
        number.reconcile(&first);
        number.reconcile(&first);

        let second = snapshot("11", Some(0.0), Some(100.0));
        assert_eq!(number.reconcile(&second), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(11.0));
    }

    #[test]
    fn integral_step_rounds_the_parsed_value() {
        let (mut number, rx) = reconciler();
        let snap = snapshot("27.6", None, None);
        assert_eq!(number.reconcile(&snap), Reconciliation::Updated);
        assert_eq!(rx.borrow().value, Some(28.0));
    }

    #[test]
    fn missing_bounds_keep_recorded_ones() {
        let (mut number, rx) = reconciler();
        let snap = snapshot("5", None, None);
        assert_eq!(number.reconcile(&snap), Reconciliation::Updated);
        let state = rx.borrow().clone();
        assert_eq!((state.min, state.max), (DEFAULT_MIN, DEFAULT_MAX));
        assert_eq!(state.value, Some(5.0));
    }

    #[test]
    fn unparsable_value_is_skipped() {
        let (mut number, rx) = reconciler();
        let snap = snapshot("garbage", None, None);
        assert_eq!(number.reconcile(&snap), Reconciliation::Skipped);
        assert_eq!(rx.borrow().value, None);
        assert!(rx.borrow().available);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let (mut number, rx) = reconciler();
        let snap = snapshot("27", Some(0.0), Some(100.0));
        number.reconcile(&snap);
        number.reconcile(&snap);
        let settled = rx.borrow().clone();
        number.reconcile(&snap);
        assert_eq!(*rx.borrow(), settled);
    }
}
