// ── Date-time entities ──
//
// Parameters carrying an epoch-seconds timestamp, presented in UTC.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::entity::{EntityCategory, Reconcile, Reconciliation};
use crate::error::CoreError;
use crate::snapshot::{ChannelKind, ChannelSnapshot};

/// Static description of one timestamp parameter.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeDescription {
    pub key: &'static str,
    pub kind: ChannelKind,
    pub channel: &'static str,
    pub category: EntityCategory,
    pub enabled_default: bool,
}

/// The charger's date-time catalogue.
pub const DATETIME_DESCRIPTIONS: &[DateTimeDescription] = &[DateTimeDescription {
    key: "end_of_charging_process",
    kind: ChannelKind::Parameter,
    channel: "Parameter.Chrg.Plan.StopTm",
    category: EntityCategory::Primary,
    enabled_default: true,
}];

/// Presentation state of one date-time parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateTimeState {
    pub value: Option<DateTime<Utc>>,
    pub available: bool,
}

/// Host-facing date-time handle. (`Entity` suffix keeps it apart from
/// `chrono::DateTime`.)
pub struct DateTimeEntity {
    description: DateTimeDescription,
    coordinator: Coordinator,
    tx: Arc<watch::Sender<DateTimeState>>,
    rx: watch::Receiver<DateTimeState>,
}

impl DateTimeEntity {
    /// Build the entity and subscribe its reconciler, or skip it (with a
    /// warning) when the account cannot read the channel.
    pub fn create(coordinator: &Coordinator, description: DateTimeDescription) -> Option<Self> {
        if !coordinator.availability().contains(description.kind, description.channel) {
            warn!(
                channel = description.channel,
                kind = %description.kind,
                "channel not accessible -- skipping entity",
            );
            return None;
        }

        let (tx, rx) = watch::channel(DateTimeState::default());
        let tx = Arc::new(tx);
        coordinator
            .subscribe_entity(Box::new(DateTimeReconciler { description, tx: Arc::clone(&tx) }));
        Some(Self { description, coordinator: coordinator.clone(), tx, rx })
    }

    pub fn description(&self) -> &DateTimeDescription {
        &self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    pub fn state(&self) -> DateTimeState {
        *self.rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<DateTimeState> {
        self.rx.clone()
    }

    /// Write a new timestamp as epoch seconds.
    pub async fn set_value(&self, value: DateTime<Utc>) -> Result<(), CoreError> {
        let encoded = value.timestamp().to_string();
        self.coordinator.set_parameter(&encoded, self.description.channel).await?;
        self.tx.send_modify(|state| state.value = Some(value));
        if let Err(error) = self.coordinator.refresh_now().await {
            debug!(channel = self.description.channel, %error, "post-write refresh failed");
        }
        Ok(())
    }
}

struct DateTimeReconciler {
    description: DateTimeDescription,
    tx: Arc<watch::Sender<DateTimeState>>,
}

impl Reconcile for DateTimeReconciler {
    fn channel_id(&self) -> &str {
        self.description.channel
    }

    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation {
        let Ok(record) = snapshot.parameter(self.description.channel) else {
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        // Epoch seconds, sometimes reported with a fractional part.
        #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
        let parsed = record
            .value
            .as_f64()
            .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0));
        let Some(value) = parsed else {
            warn!(
                channel = self.description.channel,
                value = %record.value,
                "unparsable timestamp -- keeping previous state",
            );
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
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
    use smaev_gateway::{ChannelValue, ParameterRecord};

    fn reconciler() -> (DateTimeReconciler, watch::Receiver<DateTimeState>) {
        let (tx, rx) = watch::channel(DateTimeState::default());
        (DateTimeReconciler { description: DATETIME_DESCRIPTIONS[0], tx: Arc::new(tx) }, rx)
    }

    fn snapshot(value: ChannelValue) -> ChannelSnapshot {
        ChannelSnapshot::new(
            vec![],
            vec![ParameterRecord {
                channel_id: "Parameter.Chrg.Plan.StopTm".into(),
                value,
                min: None,
                max: None,
                possible_values: None,
            }],
        )
    }

    #[test]
    fn epoch_seconds_parse_to_utc() {
        let (mut entity, rx) = reconciler();
        entity.reconcile(&snapshot(ChannelValue::from("1700000000")));

        let expected = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp");
        assert_eq!(rx.borrow().value, Some(expected));
    }

    #[test]
    fn numeric_encoding_also_parses() {
        let (mut entity, rx) = reconciler();
        entity.reconcile(&snapshot(ChannelValue::Number(1_700_000_000.0)));
        assert!(rx.borrow().value.is_some());
    }

    #[test]
    fn garbage_timestamp_is_skipped() {
        let (mut entity, rx) = reconciler();
        let result = entity.reconcile(&snapshot(ChannelValue::from("soon")));
        assert_eq!(result, Reconciliation::Skipped);
        assert_eq!(rx.borrow().value, None);
    }
}
