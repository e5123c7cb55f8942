// ── Switch entities ──
//
// Two-state parameters with fixed on/off tag codes.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use smaev_gateway::values;

use crate::coordinator::Coordinator;
use crate::entity::{EntityCategory, Reconcile, Reconciliation};
use crate::error::CoreError;
use crate::snapshot::{ChannelKind, ChannelSnapshot};

/// Static description of one two-state parameter.
#[derive(Debug, Clone, Copy)]
pub struct SwitchDescription {
    pub key: &'static str,
    pub kind: ChannelKind,
    pub channel: &'static str,
    pub on_code: &'static str,
    pub off_code: &'static str,
    pub category: EntityCategory,
    pub enabled_default: bool,
}

/// The charger's switch catalogue.
pub const SWITCH_DESCRIPTIONS: &[SwitchDescription] = &[
    SwitchDescription {
        key: "manual_charging_release",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.ChrgApv",
        on_code: values::parameter::CHARGING_RELEASE,
        off_code: values::parameter::CHARGING_LOCK,
        category: EntityCategory::Primary,
        enabled_default: true,
    },
    SwitchDescription {
        key: "charging_stop_when_full",
        kind: ChannelKind::Parameter,
        channel: "Parameter.Chrg.StpWhenFl",
        on_code: values::parameter::YES,
        off_code: values::parameter::NO,
        category: EntityCategory::Diagnostic,
        enabled_default: true,
    },
];

/// Presentation state of one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SwitchState {
    pub on: Option<bool>,
    pub available: bool,
}

/// Host-facing switch handle.
pub struct Switch {
    description: SwitchDescription,
    coordinator: Coordinator,
    tx: Arc<watch::Sender<SwitchState>>,
    rx: watch::Receiver<SwitchState>,
}

impl Switch {
    /// Build the entity and subscribe its reconciler, or skip it (with a
    /// warning) when the account cannot read the channel.
    pub fn create(coordinator: &Coordinator, description: SwitchDescription) -> Option<Self> {
        if !coordinator.availability().contains(description.kind, description.channel) {
            warn!(
                channel = description.channel,
                kind = %description.kind,
                "channel not accessible -- skipping entity",
            );
            return None;
        }

        let (tx, rx) = watch::channel(SwitchState::default());
        let tx = Arc::new(tx);
        coordinator
            .subscribe_entity(Box::new(SwitchReconciler { description, tx: Arc::clone(&tx) }));
        Some(Self { description, coordinator: coordinator.clone(), tx, rx })
    }

    pub fn description(&self) -> &SwitchDescription {
        &self.description
    }

    pub fn key(&self) -> &'static str {
        self.description.key
    }

    pub fn state(&self) -> SwitchState {
        *self.rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SwitchState> {
        self.rx.clone()
    }

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.set_state(true).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.set_state(false).await
    }

    async fn set_state(&self, on: bool) -> Result<(), CoreError> {
        let code = if on { self.description.on_code } else { self.description.off_code };
        self.coordinator.set_parameter(code, self.description.channel).await?;
        self.tx.send_modify(|state| state.on = Some(on));
        if let Err(error) = self.coordinator.refresh_now().await {
            debug!(channel = self.description.channel, %error, "post-write refresh failed");
        }
        Ok(())
    }
}

struct SwitchReconciler {
    description: SwitchDescription,
    tx: Arc<watch::Sender<SwitchState>>,
}

impl Reconcile for SwitchReconciler {
    fn channel_id(&self) -> &str {
        self.description.channel
    }

    fn reconcile(&mut self, snapshot: &ChannelSnapshot) -> Reconciliation {
        let Ok(record) = snapshot.parameter(self.description.channel) else {
            self.tx.send_modify(|state| state.available = true);
            return Reconciliation::Skipped;
        };

        let code = record.value.to_string();
        let on = if code == self.description.on_code {
            true
        } else if code == self.description.off_code {
            false
        } else {
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
            state.on = Some(on);
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

    fn reconciler(index: usize) -> (SwitchReconciler, watch::Receiver<SwitchState>) {
        let (tx, rx) = watch::channel(SwitchState::default());
        let description = SWITCH_DESCRIPTIONS[index];
        (SwitchReconciler { description, tx: Arc::new(tx) }, rx)
    }

    fn snapshot(channel_id: &str, code: &str) -> ChannelSnapshot {
        ChannelSnapshot::new(
            vec![],
            vec![ParameterRecord {
                channel_id: channel_id.into(),
                value: ChannelValue::from(code),
                min: None,
                max: None,
                possible_values: None,
            }],
        )
    }

    #[test]
    fn decodes_release_and_lock_codes() {
        let (mut switch, rx) = reconciler(0);

        switch.reconcile(&snapshot("Parameter.Chrg.ChrgApv", "5172"));
        assert_eq!(rx.borrow().on, Some(true));

        switch.reconcile(&snapshot("Parameter.Chrg.ChrgApv", "5171"));
        assert_eq!(rx.borrow().on, Some(false));
    }

    #[test]
    fn yes_no_codes_for_stop_when_full() {
        let (mut switch, rx) = reconciler(1);

        switch.reconcile(&snapshot("Parameter.Chrg.StpWhenFl", "1129"));
        assert_eq!(rx.borrow().on, Some(true));

        switch.reconcile(&snapshot("Parameter.Chrg.StpWhenFl", "1130"));
        assert_eq!(rx.borrow().on, Some(false));
    }

    #[test]
    fn unknown_code_keeps_previous_state() {
        let (mut switch, rx) = reconciler(0);
        switch.reconcile(&snapshot("Parameter.Chrg.ChrgApv", "5172"));

        let result = switch.reconcile(&snapshot("Parameter.Chrg.ChrgApv", "1234"));
        assert_eq!(result, Reconciliation::Skipped);
        assert_eq!(rx.borrow().on, Some(true));
    }
}
