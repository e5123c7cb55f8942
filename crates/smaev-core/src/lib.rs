//! Update coordination layer between a `smaev-gateway` implementation and
//! a home-automation host.
//!
//! This crate owns the polling, snapshot, and entity-reconciliation logic
//! for SMA EV charging stations:
//!
//! - **[`Coordinator`]** — Central facade managing one charger's
//!   lifecycle: [`connect()`](Coordinator::connect) opens the session,
//!   reads the device identity and channel permissions, runs the first
//!   poll cycle, then spawns a driver task that owns the gateway and
//!   executes the fixed-period schedule. On-demand refreshes
//!   ([`refresh_now()`](Coordinator::refresh_now)) and parameter writes
//!   are messages into that task, so at most one fetch cycle is ever in
//!   flight.
//!
//! - **[`ChannelSnapshot`]** — Immutable per-cycle view of the charger's
//!   measurement and parameter channel sets, installed wholesale behind a
//!   `watch` channel. Either a cycle produces a complete snapshot or it
//!   fails and the previous one stands.
//!
//! - **Entities** ([`entity`]) — Typed projections of single channels
//!   (sensors, numbers, selects, switches, date-times) built from static
//!   description tables. Each entity pairs a host-facing handle with a
//!   reconciler the coordinator drives after every cycle; bounds and
//!   option drift defer the value update to one extra pass.
//!
//! - **[`DeviceRegistry`]** — Explicit id-to-coordinator map for
//!   device-targeted commands such as restart.
//!
//! - **[`UpdateStream`]** — `Stream` subscription over poll cycle
//!   outcomes for reactive hosts.

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod registry;
pub mod snapshot;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_SCAN_INTERVAL, DeviceConfig};
pub use coordinator::{Coordinator, DeviceIdentity, FailureKind, UpdateOutcome};
pub use error::CoreError;
pub use registry::DeviceRegistry;
pub use snapshot::{ChannelAvailability, ChannelKind, ChannelSnapshot};
pub use stream::{UpdateStream, UpdateWatchStream};

// Re-export the entity surface at the crate root for ergonomics.
pub use entity::{
    DateTimeEntity,
    DateTimeState,
    Entities,
    EntityCategory,
    Number,
    NumberState,
    Reconcile,
    Reconciliation,
    Select,
    SelectState,
    Sensor,
    SensorState,
    Switch,
    SwitchState,
    Unit,
    ValueMapping,
    setup,
};
