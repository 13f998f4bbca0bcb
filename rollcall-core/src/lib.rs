//! rollcall core library: domain types, name validation, cache files, config.
//!
//! Public API surface:
//! - [`types`]: validated names, parameter and protocol descriptors
//! - [`freshness`]: which information source may replace which
//! - [`manager_file`]: reading cached `.manager` descriptor files
//! - [`paths`]: locating cache files in the XDG data directories
//! - [`config`]: YAML configuration
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod freshness;
pub mod manager_file;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{CoreError, NameKind};
pub use manager_file::{CacheReader, KeyFileReader, ManagerDescription};
pub use types::{
    InfoSource, ParamFlags, ParamSpec, ParamValue, ProtocolDescriptor, ProtocolName, ProtocolSet,
    ServiceName,
};
