//! The slice of the message bus a manager proxy needs.
//!
//! Only ownership watching, name listing and method calls are used. A call is
//! cancelled by dropping its future; implementations must tolerate that at
//! any await point.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::BusError;

pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Identifies one ownership watch so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// An ownership report. `new_owner` is the unique name of the owning
/// connection, or `None` when nobody owns the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameOwnerChanged {
    pub bus_name: String,
    pub new_owner: Option<String>,
}

/// The receiving end of a watch. The first message always reports the
/// current owner; later ones arrive in bus order.
#[derive(Debug)]
pub struct NameOwnerWatch {
    pub id: WatchId,
    pub changes: mpsc::UnboundedReceiver<NameOwnerChanged>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub destination: String,
    pub object_path: String,
    pub interface: String,
    pub method: String,
    pub args: Vec<Value>,
    pub timeout: Duration,
}

impl MethodCall {
    /// `org.freedesktop.DBus.Properties.GetAll(interface)`.
    pub fn get_all(
        destination: impl Into<String>,
        object_path: impl Into<String>,
        interface: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            destination: destination.into(),
            object_path: object_path.into(),
            interface: PROPERTIES_INTERFACE.to_owned(),
            method: "GetAll".to_owned(),
            args: vec![json!(interface)],
            timeout,
        }
    }
}

#[async_trait]
pub trait BusClient: Send + Sync + 'static {
    /// Start watching `bus_name`. The current owner is queued immediately.
    fn watch_name_owner(&self, bus_name: &str) -> NameOwnerWatch;

    fn cancel_watch(&self, bus_name: &str, id: WatchId);

    /// Names the bus can start on demand.
    async fn list_activatable_names(&self, timeout: Duration) -> Result<Vec<String>, BusError>;

    /// Names currently owned on the bus.
    async fn list_names(&self, timeout: Duration) -> Result<Vec<String>, BusError>;

    /// Call a method. Calling a name that is activatable but not running
    /// starts its owner first.
    async fn call_method(&self, call: MethodCall) -> Result<Value, BusError>;
}

/// Run `future`, mapping an elapsed `timeout` to a bus timeout error.
pub(crate) async fn with_timeout<T, F>(
    what: &str,
    timeout: Duration,
    future: F,
) -> Result<T, BusError>
where
    F: std::future::Future<Output = Result<T, BusError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(BusError::timeout(format!(
            "{what} did not complete within {}ms",
            timeout.as_millis()
        ))),
    }
}
