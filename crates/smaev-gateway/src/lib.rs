//! Device-facing surface for SMA EV charging stations.
//!
//! Defines the channel record model shared by every layer above, the
//! device-native tag code tables, and the [`DeviceGateway`] trait that a
//! transport implementation fulfils. `smaev-core` drives one charger
//! through this contract; nothing here performs I/O.

pub mod channel;
pub mod error;
pub mod gateway;
pub mod values;

pub use channel::{ChannelValue, DeviceInfo, MeasurementRecord, ParameterRecord, Sample};
pub use error::Error;
pub use gateway::DeviceGateway;
