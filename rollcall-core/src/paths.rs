//! Locating cached manager descriptor files.
//!
//! # Search order
//!
//! ```text
//! $XDG_DATA_HOME/<subdir>/<name>.manager      (dirs::data_dir())
//! $XDG_DATA_DIRS[i]/<subdir>/<name>.manager   (default /usr/local/share:/usr/share)
//! <config.extra_data_dirs>/<subdir>/<name>.manager
//! ```
//!
//! The first existing file wins. Functions come in two forms, as elsewhere:
//! `fn_in(dirs, …)` takes explicit search directories (used in tests),
//! `fn(…)` derives them from the environment.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{io_err, CoreError};
use crate::types::ServiceName;

const DEFAULT_XDG_DATA_DIRS: &[&str] = &["/usr/local/share", "/usr/share"];

/// `$XDG_DATA_DIRS`, or its specified default when unset or empty.
pub fn xdg_data_dirs() -> Vec<PathBuf> {
    let from_env: Vec<PathBuf> = std::env::var_os("XDG_DATA_DIRS")
        .map(|value| {
            std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default();
    if from_env.is_empty() {
        DEFAULT_XDG_DATA_DIRS.iter().map(PathBuf::from).collect()
    } else {
        from_env
    }
}

/// All data directories to search, in priority order.
pub fn search_dirs(config: &Config) -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if let Some(user) = dirs::data_dir() {
        dirs_out.push(user);
    }
    dirs_out.extend(xdg_data_dirs());
    dirs_out.extend(config.extra_data_dirs.iter().cloned());
    dirs_out
}

/// `<data_dir>/<subdir>`: pure, no I/O.
pub fn managers_dir_at(data_dir: &Path, config: &Config) -> PathBuf {
    data_dir.join(&config.managers_subdir)
}

/// `<data_dir>/<subdir>/<name>.<extension>`: pure, no I/O.
pub fn manager_file_path_at(data_dir: &Path, config: &Config, name: &ServiceName) -> PathBuf {
    managers_dir_at(data_dir, config).join(format!(
        "{}.{}",
        name.as_str(),
        config.manager_file_extension
    ))
}

/// First existing cache file for `name` across `search_dirs`.
pub fn find_manager_file_in(
    search_dirs: &[PathBuf],
    config: &Config,
    name: &ServiceName,
) -> Option<PathBuf> {
    search_dirs.iter().find_map(|dir| {
        let candidate = manager_file_path_at(dir, config, name);
        tracing::debug!(manager = %name, path = %candidate.display(), "trying cache file");
        candidate.is_file().then_some(candidate)
    })
}

/// `find_manager_file_in` convenience wrapper.
pub fn find_manager_file(config: &Config, name: &ServiceName) -> Option<PathBuf> {
    find_manager_file_in(&search_dirs(config), config, name)
}

/// Every installed manager with a cache file, keyed by name. When the same
/// name appears in several directories the higher-priority one wins.
/// Files whose stem is not a valid service name are ignored.
pub fn list_manager_files_in(
    search_dirs: &[PathBuf],
    config: &Config,
) -> Result<BTreeMap<ServiceName, PathBuf>, CoreError> {
    let mut found = BTreeMap::new();
    for dir in search_dirs {
        let managers_dir = managers_dir_at(dir, config);
        let entries = match std::fs::read_dir(&managers_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&managers_dir, err)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|ext| ext.to_str())
                    == Some(config.manager_file_extension.as_str())
            })
            .collect();
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ServiceName::new(stem) {
                Ok(name) => {
                    found.entry(name).or_insert(path);
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "ignoring cache file");
                }
            }
        }
    }
    Ok(found)
}

/// `list_manager_files_in` convenience wrapper.
pub fn list_manager_files(config: &Config) -> Result<BTreeMap<ServiceName, PathBuf>, CoreError> {
    list_manager_files_in(&search_dirs(config), config)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gabble() -> ServiceName {
        ServiceName::new("gabble").expect("name")
    }

    fn install(data_dir: &Path, config: &Config, file_name: &str) -> PathBuf {
        let dir = managers_dir_at(data_dir, config);
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join(file_name);
        std::fs::write(&path, "[ConnectionManager]\n").expect("write");
        path
    }

    #[test]
    fn manager_file_path_is_correct() {
        let config = Config::default();
        let path = manager_file_path_at(Path::new("/usr/share"), &config, &gabble());
        assert_eq!(path, PathBuf::from("/usr/share/telepathy/managers/gabble.manager"));
    }

    #[test]
    fn first_directory_wins() {
        let config = Config::default();
        let user = TempDir::new().expect("user");
        let system = TempDir::new().expect("system");
        install(system.path(), &config, "gabble.manager");
        let preferred = install(user.path(), &config, "gabble.manager");

        let dirs = vec![user.path().to_path_buf(), system.path().to_path_buf()];
        assert_eq!(find_manager_file_in(&dirs, &config, &gabble()), Some(preferred));
    }

    #[test]
    fn missing_everywhere_is_none() {
        let config = Config::default();
        let empty = TempDir::new().expect("empty");
        let dirs = vec![empty.path().to_path_buf()];
        assert_eq!(find_manager_file_in(&dirs, &config, &gabble()), None);
    }

    #[test]
    fn listing_skips_bad_names_and_other_extensions() {
        let config = Config::default();
        let data = TempDir::new().expect("data");
        install(data.path(), &config, "gabble.manager");
        install(data.path(), &config, "haze.manager");
        install(data.path(), &config, "bad-name.manager");
        install(data.path(), &config, "README.txt");

        let found = list_manager_files_in(&[data.path().to_path_buf()], &config).expect("list");
        let names: Vec<&str> = found.keys().map(ServiceName::as_str).collect();
        assert_eq!(names, vec!["gabble", "haze"]);
    }

    #[test]
    fn listing_missing_directory_is_empty() {
        let config = Config::default();
        let data = TempDir::new().expect("data");
        let found = list_manager_files_in(&[data.path().join("nope")], &config).expect("list");
        assert!(found.is_empty());
    }
}
