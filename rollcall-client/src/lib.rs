//! rollcall client: manager proxies over an abstract message bus.
//!
//! - [`bus`]: the [`BusClient`] trait the proxies talk through
//! - [`memory_bus`]: an in-process bus with scripted services
//! - [`ManagerProxy`]: one manager, with ownership tracking, cache file and introspection
//! - [`Registry`]: one proxy per name, and discovery of every manager
//! - [`gate`], [`countdown`]: the readiness and fan-in primitives underneath

mod actor;
pub mod bus;
pub mod countdown;
mod error;
pub mod gate;
pub mod introspect;
mod manager;
pub mod memory_bus;
mod registry;

pub use bus::{BusClient, MethodCall, NameOwnerChanged, NameOwnerWatch, WatchId};
pub use error::{BusError, ClientError, ManagerError};
pub use manager::{CacheFile, ManagerEvent, ManagerProxy, ManagerSnapshot};
pub use memory_bus::{MemoryBus, MemoryService};
pub use registry::{CallerRef, DiscoveryOutcome, Registry, RegistryBuilder};
