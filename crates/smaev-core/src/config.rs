// ── Runtime connection configuration ──
//
// Describes *how* to reach one charging station. Carries credential data
// and polling cadence, but never touches disk -- the host platform builds
// a `DeviceConfig` from its own config entry and hands it in, both to the
// gateway implementation it constructs and to `Coordinator::connect`.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Poll cadence used when the host does not override it.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for connecting to a single charging station.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Hostname or IP of the charger's local web interface.
    pub host: String,
    /// Local account username.
    pub username: String,
    /// Local account password.
    pub password: SecretString,
    /// Connect over https. Chargers ship with TLS enabled.
    pub use_ssl: bool,
    /// Verify the charger's certificate (self-signed out of the box).
    pub verify_ssl: bool,
    /// Fixed period of the coordinator's poll schedule.
    pub scan_interval: Duration,
}

impl DeviceConfig {
    /// Base URL of the charger's local API, derived from `host` and the
    /// TLS flag.
    pub fn base_url(&self) -> Result<Url, CoreError> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}", self.host)).map_err(|err| CoreError::Config {
            message: format!("invalid charger host {:?}: {err}", self.host),
        })
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: SecretString::from(String::new()),
            use_ssl: true,
            verify_ssl: false,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> DeviceConfig {
        DeviceConfig { host: host.into(), ..DeviceConfig::default() }
    }

    #[test]
    fn base_url_follows_tls_flag() {
        let secure = config("192.168.2.100");
        assert_eq!(secure.base_url().expect("url").as_str(), "https://192.168.2.100/");

        let plain = DeviceConfig { use_ssl: false, ..config("ev-charger.local") };
        assert_eq!(plain.base_url().expect("url").as_str(), "http://ev-charger.local/");
    }

    #[test]
    fn invalid_host_is_a_config_error() {
        let bad = config("not a host");
        assert!(matches!(bad.base_url(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn default_cadence_is_five_seconds() {
        assert_eq!(DeviceConfig::default().scan_interval, Duration::from_secs(5));
    }
}
