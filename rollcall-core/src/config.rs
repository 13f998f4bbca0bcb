//! YAML configuration.
//!
//! Every field has a default, so an absent file or a partial file is fine:
//!
//! ```yaml
//! list_timeout_ms: 5000
//! always_introspect: true
//! extra_data_dirs:
//!   - /opt/im/share
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::ServiceName;

pub const DEFAULT_BUS_NAME_PREFIX: &str = "org.freedesktop.Telepathy.ConnectionManager.";
pub const DEFAULT_OBJECT_PATH_BASE: &str = "/org/freedesktop/Telepathy/ConnectionManager/";
pub const DEFAULT_MANAGER_INTERFACE: &str = "org.freedesktop.Telepathy.ConnectionManager";
pub const DEFAULT_MANAGERS_SUBDIR: &str = "telepathy/managers";
pub const DEFAULT_MANAGER_FILE_EXTENSION: &str = "manager";
pub const DEFAULT_LIST_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 25_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Well-known bus names of managers start with this prefix.
    pub bus_name_prefix: String,
    /// Managers export their main object at `<base><name>`.
    pub object_path_base: String,
    /// Interface whose properties describe a manager.
    pub manager_interface: String,
    /// Cache files live in `<data dir>/<subdir>/<name>.<extension>`.
    pub managers_subdir: PathBuf,
    pub manager_file_extension: String,
    /// Timeout for enumerating bus names.
    pub list_timeout_ms: u64,
    /// Timeout for a single introspection call.
    pub call_timeout_ms: u64,
    /// Introspect running managers even when a cache file was read.
    pub always_introspect: bool,
    /// Searched after the XDG data directories.
    pub extra_data_dirs: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_name_prefix: DEFAULT_BUS_NAME_PREFIX.to_owned(),
            object_path_base: DEFAULT_OBJECT_PATH_BASE.to_owned(),
            manager_interface: DEFAULT_MANAGER_INTERFACE.to_owned(),
            managers_subdir: PathBuf::from(DEFAULT_MANAGERS_SUBDIR),
            manager_file_extension: DEFAULT_MANAGER_FILE_EXTENSION.to_owned(),
            list_timeout_ms: DEFAULT_LIST_TIMEOUT_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            always_introspect: false,
            extra_data_dirs: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path`, returning defaults if the file does not exist.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `load_at` convenience wrapper using [`Config::default_path`].
    pub fn load() -> Result<Self, CoreError> {
        Self::load_at(&Self::default_path()?)
    }

    /// `<config dir>/rollcall/config.yaml`.
    pub fn default_path() -> Result<PathBuf, CoreError> {
        dirs::config_dir()
            .map(|dir| dir.join("rollcall").join("config.yaml"))
            .ok_or(CoreError::ConfigDirNotFound)
    }

    pub fn to_yaml(&self) -> Result<String, CoreError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn bus_name_for(&self, name: &ServiceName) -> String {
        format!("{}{}", self.bus_name_prefix, name)
    }

    pub fn object_path_for(&self, name: &ServiceName) -> String {
        format!("{}{}", self.object_path_base, name)
    }

    /// The manager short name for a bus name carrying the configured prefix.
    /// Names without the prefix or with an invalid suffix yield `None`.
    pub fn service_name_from_bus_name(&self, bus_name: &str) -> Option<ServiceName> {
        bus_name
            .strip_prefix(&self.bus_name_prefix)
            .and_then(|suffix| ServiceName::new(suffix).ok())
    }
}
