use thiserror::Error;

/// Failure modes a [`DeviceGateway`](crate::DeviceGateway) implementation
/// may surface.
///
/// The taxonomy is deliberately small: everything a charger session can do
/// wrong is either a connectivity problem (worth retrying on the next poll)
/// or a credential problem (fatal to the session until the user
/// re-authenticates). `smaev-core` maps these onto its own error type and
/// drives the retry/latch behavior.
#[derive(Debug, Error)]
pub enum Error {
    /// Session could not be established or was lost mid-request
    /// (connection refused, DNS failure, timeout, device rebooting).
    #[error("Connection to charger failed: {message}")]
    Connection { message: String },

    /// The charger rejected the configured credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if re-authentication is required before any further
    /// request can succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
