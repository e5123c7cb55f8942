// ── Device-native tag codes ──
//
// Enumerable channels report and accept opaque numeric tag codes, encoded
// as strings. These are the codes the charger firmware uses; entity value
// mappings in `smaev-core` translate them to presentation labels.

/// Codes observed on measurement channels.
pub mod measurement {
    /// `Measurement.Operation.Health` / `Measurement.Operation.EVeh.Health`.
    pub const OK: &str = "307";
    pub const WARNING: &str = "455";
    pub const ALARM: &str = "35";
    pub const OFF: &str = "303";

    /// `Measurement.Operation.EVeh.ChaStt` -- charge session state.
    pub const NOT_CONNECTED: &str = "200111";
    pub const SLEEP_MODE: &str = "200112";
    pub const ACTIVE_MODE: &str = "200113";
    pub const STATION_LOCKED: &str = "5169";

    /// `Measurement.Chrg.ModSw` -- rotary switch position.
    pub const SMART_CHARGING: &str = "4950";
    pub const BOOST_CHARGING: &str = "4718";
}

/// Codes written to and reported on parameter channels.
pub mod parameter {
    /// `Parameter.Chrg.ActChaMod` -- active charging mode.
    pub const BOOST_CHARGING: &str = "4718";
    pub const OPTIMIZED_CHARGING: &str = "4719";
    pub const SETPOINT_CHARGING: &str = "4720";
    pub const CHARGE_STOP: &str = "4721";

    /// `Parameter.Sys.DevSigBri` -- LED brightness.
    pub const LED_LOW: &str = "422";
    pub const LED_AVERAGE: &str = "423";
    pub const LED_HIGH: &str = "424";

    /// `Parameter.Chrg.ChrgApv` -- manual charging approval.
    pub const CHARGING_LOCK: &str = "5171";
    pub const CHARGING_RELEASE: &str = "5172";

    /// Generic yes/no toggle codes.
    pub const YES: &str = "1129";
    pub const NO: &str = "1130";

    /// Sentinel accepted by action channels such as `Parameter.Sys.DevRstr`.
    pub const EXECUTE: &str = "1146";
}
