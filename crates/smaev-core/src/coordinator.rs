// ── Update coordinator ──
//
// One coordinator owns the polling cadence for one charger: it fetches
// both channel sets, installs the snapshot atomically, and fans updates
// out to the subscribed entity reconcilers. The gateway session is owned
// exclusively by a spawned driver task; on-demand refreshes and parameter
// writes reach it as messages, which is what serializes them against the
// periodic schedule -- at most one fetch cycle runs at any time.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use smaev_gateway::{DeviceGateway, DeviceInfo};

use crate::config::DeviceConfig;
use crate::entity::{Reconcile, Reconciliation};
use crate::error::CoreError;
use crate::snapshot::{ChannelAvailability, ChannelSnapshot};
use crate::stream::UpdateStream;

const WRITE_CHANNEL_SIZE: usize = 16;

/// Channel accepting the restart sentinel; the charger reboots on
/// `EXECUTE`.
const RESTART_CHANNEL: &str = "Parameter.Sys.DevRstr";

// ── Observable outcome ──────────────────────────────────────────────

/// Result of the most recent poll cycle, published through
/// [`Coordinator::updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UpdateOutcome {
    /// No cycle has completed yet.
    Pending,
    Success {
        completed_at: DateTime<Utc>,
    },
    Failure {
        kind: FailureKind,
        completed_at: DateTime<Utc>,
    },
}

/// Why a poll cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient transport loss; retried on the next tick.
    Connection,
    /// Both fetches answered but a channel set came back empty.
    NoData,
    /// Session rejected by the charger; nothing retried automatically.
    AuthRequired,
}

fn failure_kind(error: &CoreError) -> FailureKind {
    match error {
        CoreError::AuthenticationRequired { .. } => FailureKind::AuthRequired,
        CoreError::NoData => FailureKind::NoData,
        _ => FailureKind::Connection,
    }
}

// ── Device identity ─────────────────────────────────────────────────

/// Stable identity of one charger. The serial is the only unique key the
/// device exposes, so it doubles as the registry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub info: DeviceInfo,
}

impl DeviceIdentity {
    fn new(info: DeviceInfo) -> Self {
        Self { id: info.serial.clone(), info }
    }
}

// ── Shared state & handle ───────────────────────────────────────────

type RefreshReply = oneshot::Sender<Result<(), CoreError>>;

struct WriteRequest {
    value: String,
    channel_id: String,
    reply: oneshot::Sender<Result<(), CoreError>>,
}

struct CoordinatorShared {
    device: DeviceIdentity,
    availability: ChannelAvailability,
    snapshot: watch::Sender<Option<Arc<ChannelSnapshot>>>,
    updates: watch::Sender<UpdateOutcome>,
    entities: StdMutex<Vec<Box<dyn Reconcile>>>,
    refresh_tx: mpsc::UnboundedSender<RefreshReply>,
    write_tx: mpsc::Sender<WriteRequest>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one running update coordinator. Cheap to clone; every clone
/// addresses the same driver task.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorShared>,
}

impl Coordinator {
    /// Open the gateway session, read the device identity and channel
    /// permissions, run the first poll cycle, then start the periodic
    /// schedule. A failed first cycle fails setup.
    pub async fn connect<G>(config: &DeviceConfig, mut gateway: G) -> Result<Self, CoreError>
    where
        G: DeviceGateway + 'static,
    {
        if config.scan_interval.is_zero() {
            return Err(CoreError::Config { message: "scan_interval must be positive".into() });
        }

        if gateway.is_closed() {
            gateway.open().await?;
        }
        let device = DeviceIdentity::new(gateway.device_info().await?);

        let measurements = gateway.get_measurement_channels().await?;
        let parameters = gateway.get_parameter_channels().await?;
        let availability = ChannelAvailability::new(measurements, parameters);

        let (snapshot_tx, _) = watch::channel(None);
        let (updates_tx, _) = watch::channel(UpdateOutcome::Pending);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::channel(WRITE_CHANNEL_SIZE);

        let inner = Arc::new(CoordinatorShared {
            device,
            availability,
            snapshot: snapshot_tx,
            updates: updates_tx,
            entities: StdMutex::new(Vec::new()),
            refresh_tx,
            write_tx,
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
        });

        let mut driver = Driver {
            gateway,
            shared: Arc::clone(&inner),
            refresh_rx,
            write_rx,
            auth_required: false,
        };

        if let Err(error) = driver.run_cycle(Vec::new()).await {
            let _ = driver.gateway.close().await;
            return Err(error);
        }

        let coordinator = Self { inner };
        let handle = tokio::spawn(driver.run(config.scan_interval));
        *coordinator.inner.driver.lock().await = Some(handle);
        info!(
            device = %coordinator.inner.device.id,
            interval_secs = config.scan_interval.as_secs(),
            "coordinator connected",
        );
        Ok(coordinator)
    }

    /// Stable identity of the charger this coordinator drives.
    pub fn device(&self) -> &DeviceIdentity {
        &self.inner.device
    }

    /// Channels the configured account may read.
    pub fn availability(&self) -> &ChannelAvailability {
        &self.inner.availability
    }

    /// The currently installed snapshot, if any cycle has succeeded.
    pub fn snapshot(&self) -> Option<Arc<ChannelSnapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch snapshot installations.
    pub fn snapshots(&self) -> watch::Receiver<Option<Arc<ChannelSnapshot>>> {
        self.inner.snapshot.subscribe()
    }

    /// Outcome of the most recent poll cycle.
    pub fn last_update(&self) -> UpdateOutcome {
        *self.inner.updates.borrow()
    }

    /// Watch poll cycle outcomes.
    pub fn updates(&self) -> watch::Receiver<UpdateOutcome> {
        self.inner.updates.subscribe()
    }

    /// Poll cycle outcomes as a `Stream`.
    pub fn update_stream(&self) -> UpdateStream {
        UpdateStream::new(self.inner.updates.subscribe())
    }

    /// Register an entity reconciler. It is reconciled against the
    /// current snapshot immediately (honoring drift deferral), so
    /// entities built after `connect` do not wait out a full interval.
    pub fn subscribe_entity(&self, mut entity: Box<dyn Reconcile>) {
        if let Some(snapshot) = self.snapshot() {
            if entity.reconcile(&snapshot) == Reconciliation::Deferred {
                entity.reconcile(&snapshot);
            }
        }
        self.inner
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entity);
    }

    /// Trigger one immediate poll cycle without disturbing the periodic
    /// schedule, and observe its outcome. Requests arriving while a
    /// cycle is in flight are coalesced into a single follow-up cycle.
    pub async fn refresh_now(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner.refresh_tx.send(tx).map_err(|_| CoreError::CoordinatorStopped)?;
        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    /// Write one parameter in device-native encoding through the driver's
    /// session.
    pub async fn set_parameter(&self, value: &str, channel_id: &str) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .write_tx
            .send(WriteRequest {
                value: value.to_owned(),
                channel_id: channel_id.to_owned(),
                reply: tx,
            })
            .await
            .map_err(|_| CoreError::CoordinatorStopped)?;
        rx.await.map_err(|_| CoreError::CoordinatorStopped)?
    }

    /// Ask the charger to restart itself, then converge the snapshot.
    pub async fn restart_device(&self) -> Result<(), CoreError> {
        self.set_parameter(smaev_gateway::values::parameter::EXECUTE, RESTART_CHANNEL).await?;
        if let Err(error) = self.refresh_now().await {
            debug!(device = %self.inner.device.id, %error, "post-restart refresh failed");
        }
        Ok(())
    }

    /// Stop the schedule and release the session. An in-flight cycle
    /// finishes first; after this returns nothing is installed, nobody is
    /// notified, and the session has been closed exactly once. Idempotent.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.driver.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!(device = %self.inner.device.id, "coordinator stopped");
        }
    }
}

// ── Driver task ─────────────────────────────────────────────────────

struct Driver<G> {
    gateway: G,
    shared: Arc<CoordinatorShared>,
    refresh_rx: mpsc::UnboundedReceiver<RefreshReply>,
    write_rx: mpsc::Receiver<WriteRequest>,
    /// Latched after the charger rejects credentials: the schedule keeps
    /// ticking but every cycle is skipped and requests fail fast until
    /// the user reconnects with new credentials.
    auth_required: bool,
}

impl<G: DeviceGateway> Driver<G> {
    async fn run(mut self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        // No catch-up bursts after a slow cycle.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => break,
                _ = interval.tick() => {
                    if self.auth_required {
                        debug!("reauthentication pending -- skipping scheduled cycle");
                        continue;
                    }
                    let waiters = self.drain_refresh_requests(Vec::new());
                    let _ = self.run_cycle(waiters).await;
                }
                Some(reply) = self.refresh_rx.recv() => {
                    let waiters = self.drain_refresh_requests(vec![reply]);
                    if self.auth_required {
                        reply_all(waiters, &Err(auth_latched()));
                        continue;
                    }
                    let _ = self.run_cycle(waiters).await;
                }
                Some(request) = self.write_rx.recv() => {
                    self.handle_write(request).await;
                }
            }
        }

        self.shutdown().await;
    }

    /// Batch every queued refresh request onto one cycle. Requests that
    /// arrived while the previous cycle was in flight end up here.
    fn drain_refresh_requests(&mut self, mut waiters: Vec<RefreshReply>) -> Vec<RefreshReply> {
        while let Ok(reply) = self.refresh_rx.try_recv() {
            waiters.push(reply);
        }
        waiters
    }

    /// One full poll cycle: ensure the session, fetch both channel sets,
    /// validate, install, notify. Every waiter observes this cycle's
    /// outcome.
    async fn run_cycle(&mut self, waiters: Vec<RefreshReply>) -> Result<(), CoreError> {
        let outcome = self.fetch_snapshot().await;
        match &outcome {
            Ok(snapshot) => self.install(snapshot),
            Err(error) => self.publish_failure(error),
        }
        let result = outcome.map(|_| ());
        reply_all(waiters, &result);
        result
    }

    async fn fetch_snapshot(&mut self) -> Result<Arc<ChannelSnapshot>, CoreError> {
        self.ensure_open().await?;

        // Both sets are always attempted; errors are evaluated after, so
        // a parameter failure cannot mask a measurement failure.
        let measurements = self.gateway.request_measurements().await;
        let parameters = self.gateway.request_parameters().await;
        let measurements = measurements.map_err(CoreError::from)?;
        let parameters = parameters.map_err(CoreError::from)?;

        if measurements.is_empty() || parameters.is_empty() {
            return Err(CoreError::NoData);
        }
        Ok(Arc::new(ChannelSnapshot::new(measurements, parameters)))
    }

    /// Reopen the session if a prior failure closed it. An authentication
    /// rejection latches `auth_required`.
    async fn ensure_open(&mut self) -> Result<(), CoreError> {
        if !self.gateway.is_closed() {
            return Ok(());
        }
        info!(device = %self.shared.device.id, "reopening charger session");
        match self.gateway.open().await {
            Ok(()) => Ok(()),
            Err(error) => {
                let error = CoreError::from(error);
                if matches!(error, CoreError::AuthenticationRequired { .. }) {
                    warn!(
                        device = %self.shared.device.id,
                        %error,
                        "charger rejected credentials -- latching until reconfigured",
                    );
                    self.auth_required = true;
                }
                Err(error)
            }
        }
    }

    fn install(&self, snapshot: &Arc<ChannelSnapshot>) {
        debug!(
            device = %self.shared.device.id,
            measurements = snapshot.measurement_count(),
            parameters = snapshot.parameter_count(),
            "installing channel snapshot",
        );
        self.shared.snapshot.send_modify(|current| *current = Some(Arc::clone(snapshot)));
        self.shared
            .updates
            .send_modify(|outcome| *outcome = UpdateOutcome::Success { completed_at: Utc::now() });
        self.notify_entities(snapshot);
    }

    /// Synchronous fan-out over the subscribed reconcilers, then one
    /// drain of the entities that deferred on bounds/option drift. The
    /// deferred pass runs against the same snapshot, after the main pass
    /// completes -- never re-entrantly within it.
    fn notify_entities(&self, snapshot: &ChannelSnapshot) {
        let mut entities =
            self.shared.entities.lock().unwrap_or_else(PoisonError::into_inner);

        let mut deferred = Vec::new();
        for (index, entity) in entities.iter_mut().enumerate() {
            if entity.reconcile(snapshot) == Reconciliation::Deferred {
                debug!(channel = entity.channel_id(), "re-reconciling after drift");
                deferred.push(index);
            }
        }
        for index in deferred {
            if let Some(entity) = entities.get_mut(index) {
                entity.reconcile(snapshot);
            }
        }
    }

    fn publish_failure(&self, error: &CoreError) {
        let kind = failure_kind(error);
        match kind {
            FailureKind::NoData => {
                warn!(device = %self.shared.device.id, "charger returned no valid data");
            }
            FailureKind::Connection => {
                warn!(device = %self.shared.device.id, %error, "poll cycle failed");
            }
            // ensure_open already logged the latch.
            FailureKind::AuthRequired => {}
        }
        self.shared.updates.send_modify(|outcome| {
            *outcome = UpdateOutcome::Failure { kind, completed_at: Utc::now() };
        });

        let mut entities =
            self.shared.entities.lock().unwrap_or_else(PoisonError::into_inner);
        for entity in entities.iter_mut() {
            entity.cycle_failed();
        }
    }

    async fn handle_write(&mut self, request: WriteRequest) {
        if self.auth_required {
            let _ = request.reply.send(Err(auth_latched()));
            return;
        }
        if let Err(error) = self.ensure_open().await {
            let _ = request.reply.send(Err(error));
            return;
        }

        let result = self
            .gateway
            .set_parameter(&request.value, &request.channel_id)
            .await
            .map_err(CoreError::from);
        match &result {
            Ok(()) => debug!(
                channel = %request.channel_id,
                value = %request.value,
                "parameter written",
            ),
            Err(error) => warn!(
                channel = %request.channel_id,
                %error,
                "parameter write failed",
            ),
        }
        let _ = request.reply.send(result);
    }

    /// Fail anything still queued, then release the session exactly once.
    async fn shutdown(&mut self) {
        self.refresh_rx.close();
        self.write_rx.close();
        while let Ok(reply) = self.refresh_rx.try_recv() {
            let _ = reply.send(Err(CoreError::CoordinatorStopped));
        }
        while let Ok(request) = self.write_rx.try_recv() {
            let _ = request.reply.send(Err(CoreError::CoordinatorStopped));
        }

        if !self.gateway.is_closed() {
            if let Err(error) = self.gateway.close().await {
                warn!(device = %self.shared.device.id, %error, "session close failed");
            }
        }
        debug!(device = %self.shared.device.id, "driver task finished");
    }
}

fn reply_all(waiters: Vec<RefreshReply>, result: &Result<(), CoreError>) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}

fn auth_latched() -> CoreError {
    CoreError::AuthenticationRequired {
        message: "credentials were rejected; reconnect after reconfiguring".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            manufacturer: "SMA".into(),
            model: "EVC22-3AC-10".into(),
            name: "Garage".into(),
            serial: "1234567890".into(),
            sw_version: "1.2.23.R".into(),
        }
    }

    #[test]
    fn identity_is_keyed_by_serial() {
        let identity = DeviceIdentity::new(info());
        assert_eq!(identity.id, "1234567890");
        assert_eq!(identity.info.model, "EVC22-3AC-10");
    }

    #[test]
    fn failure_kinds_classify_the_taxonomy() {
        assert_eq!(
            failure_kind(&CoreError::ConnectionFailed { message: "x".into() }),
            FailureKind::Connection,
        );
        assert_eq!(failure_kind(&CoreError::NoData), FailureKind::NoData);
        assert_eq!(
            failure_kind(&CoreError::AuthenticationRequired { message: "x".into() }),
            FailureKind::AuthRequired,
        );
    }

    #[test]
    fn outcomes_serialize_tagged() {
        let pending = serde_json::to_value(UpdateOutcome::Pending).expect("pending");
        assert_eq!(pending["outcome"], "pending");

        let failure = serde_json::to_value(UpdateOutcome::Failure {
            kind: FailureKind::AuthRequired,
            completed_at: Utc::now(),
        })
        .expect("failure");
        assert_eq!(failure["outcome"], "failure");
        assert_eq!(failure["kind"], "auth_required");
    }
}
