// ── Device gateway contract ──
//
// The transport and session protocol live outside this workspace. A
// gateway implementation wraps one authenticated session against one
// charger's local API; `smaev-core` owns it exclusively from a single
// driver task, which is why the methods take `&mut self` and no interior
// locking is required of implementations.

use std::collections::HashSet;
use std::future::Future;

use crate::channel::{DeviceInfo, MeasurementRecord, ParameterRecord};
use crate::error::Error;

/// Authenticated I/O against one SMA EV charging station.
///
/// Futures are `Send` so a coordinator generic over the implementation can
/// be driven from a spawned task.
pub trait DeviceGateway: Send {
    /// `true` when no session is established: never opened, explicitly
    /// closed, or lost to a connection failure. The coordinator reopens
    /// before the next request when this reports `true`.
    fn is_closed(&self) -> bool;

    /// Establish and authenticate the session.
    fn open(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Release the session. Idempotent on an already-closed gateway.
    fn close(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Static device identity (serial, model, firmware).
    fn device_info(&mut self) -> impl Future<Output = Result<DeviceInfo, Error>> + Send;

    /// Fetch the full measurement channel set. May be empty.
    fn request_measurements(
        &mut self,
    ) -> impl Future<Output = Result<Vec<MeasurementRecord>, Error>> + Send;

    /// Fetch the full parameter channel set. May be empty.
    fn request_parameters(
        &mut self,
    ) -> impl Future<Output = Result<Vec<ParameterRecord>, Error>> + Send;

    /// Write one parameter in device-native encoding.
    fn set_parameter(
        &mut self,
        value: &str,
        channel_id: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Identifiers of the measurement channels this account may read.
    fn get_measurement_channels(
        &mut self,
    ) -> impl Future<Output = Result<HashSet<String>, Error>> + Send;

    /// Identifiers of the parameter channels this account may read.
    fn get_parameter_channels(
        &mut self,
    ) -> impl Future<Output = Result<HashSet<String>, Error>> + Send;
}
