use rollcall_core::CoreError;
use thiserror::Error;

pub const DBUS_ERROR_DOMAIN: &str = "org.freedesktop.DBus.Error";
pub const TELEPATHY_ERROR_DOMAIN: &str = "org.freedesktop.Telepathy.Error";

/// A failure reported by, or on the way to, the message bus.
///
/// Cloneable because one failed introspection is delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{domain}.{code}: {message}")]
pub struct BusError {
    pub domain: String,
    pub code: String,
    pub message: String,
}

impl BusError {
    pub fn new(
        domain: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn service_unknown(bus_name: &str) -> Self {
        Self::new(
            DBUS_ERROR_DOMAIN,
            "ServiceUnknown",
            format!("the name {bus_name} was not provided by any service files"),
        )
    }

    pub fn spawn_failed(bus_name: &str, reason: impl Into<String>) -> Self {
        Self::new(
            DBUS_ERROR_DOMAIN,
            "Spawn.Failed",
            format!("activating {bus_name} failed: {}", reason.into()),
        )
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::new(DBUS_ERROR_DOMAIN, "Timeout", what)
    }

    pub fn unknown_method(interface: &str, method: &str) -> Self {
        Self::new(
            DBUS_ERROR_DOMAIN,
            "UnknownMethod",
            format!("no method {method} on interface {interface}"),
        )
    }

    /// The peer dropped off the bus while a call to it was outstanding.
    pub fn name_owner_lost(message: impl Into<String>) -> Self {
        Self::new(TELEPATHY_ERROR_DOMAIN, "NotAvailable", message)
    }

    pub fn is(&self, domain: &str, code: &str) -> bool {
        self.domain == domain && self.code == code
    }
}

/// Why a manager could not be made ready.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    #[error("introspection failed: {0}")]
    Transport(BusError),

    #[error("manager exited during introspection: {0}")]
    NameOwnerLost(BusError),

    #[error("malformed introspection reply: {0}")]
    MalformedReply(String),

    #[error("no information source available")]
    NoInformation,

    #[error("manager proxy disposed")]
    Disposed,
}

/// Error surface for the registry and discovery.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to enumerate bus names: {0}")]
    Enumeration(#[source] BusError),
}
