use thiserror::Error;

/// Top-level error type for the `smaev-core` crate.
///
/// Cycle-level failures (`ConnectionFailed`, `AuthenticationRequired`,
/// `NoData`) never escape the coordinator except as the outcome observed
/// by refresh waiters and the published [`UpdateOutcome`]; entity-level
/// failures (`ChannelNotFound`, `UnmappedValue`) never propagate past the
/// affected entity's reconciliation step.
///
/// [`UpdateOutcome`]: crate::coordinator::UpdateOutcome
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Cycle failures ──────────────────────────────────────────────
    /// Transient loss of connectivity. The previous snapshot is retained
    /// and the fetch is retried on the next scheduled cycle.
    #[error("Cannot reach charger: {message}")]
    ConnectionFailed { message: String },

    /// The charger rejected the session credentials. Latched: nothing is
    /// retried automatically until the user re-authenticates.
    #[error("Charger requires re-authentication: {message}")]
    AuthenticationRequired { message: String },

    /// Both channel fetches succeeded but a set came back empty.
    #[error("No valid data received from charger")]
    NoData,

    // ── Entity-level failures ───────────────────────────────────────
    /// Channel absent from the current snapshot. Recoverable: the entity
    /// skips its update for the cycle.
    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    /// No entry for a value in the entity's fixed tag-code mapping, in
    /// either direction (device code on read, label on write).
    #[error("No mapping for value {value:?} on channel {channel_id}")]
    UnmappedValue { channel_id: String, value: String },

    // ── Lifecycle / routing ─────────────────────────────────────────
    /// No coordinator registered under this device id.
    #[error("Unknown device: {device_id}")]
    DeviceNotFound { device_id: String },

    /// The coordinator has been stopped (or its driver is gone).
    #[error("Coordinator is not running")]
    CoordinatorStopped,

    /// Invalid runtime configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl From<smaev_gateway::Error> for CoreError {
    fn from(err: smaev_gateway::Error) -> Self {
        match err {
            smaev_gateway::Error::Connection { message } => Self::ConnectionFailed { message },
            smaev_gateway::Error::Authentication { message } => {
                Self::AuthenticationRequired { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_onto_core_taxonomy() {
        let conn: CoreError = smaev_gateway::Error::Connection { message: "timeout".into() }.into();
        assert!(matches!(conn, CoreError::ConnectionFailed { .. }));

        let auth: CoreError =
            smaev_gateway::Error::Authentication { message: "rejected".into() }.into();
        assert!(matches!(auth, CoreError::AuthenticationRequired { .. }));
    }
}
