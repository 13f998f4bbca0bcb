//! Reading cached `.manager` descriptor files.
//!
//! A manager file is a key-grouped text file:
//!
//! ```text
//! [ConnectionManager]
//! Interfaces=com.example.Extra;
//!
//! [Protocol jabber]
//! EnglishName=Jabber
//! Icon=im-jabber
//! VCardField=x-jabber
//! param-account=s required
//! param-password=s required secret
//! param-port=q
//! default-port=5222
//! ```
//!
//! Groups that are not `Protocol <valid name>` are skipped, as are malformed
//! parameter lines. A default that does not parse for its signature is
//! dropped and the parameter kept without one.

use std::io::ErrorKind;
use std::path::Path;

use ini::{Ini, Properties};

use crate::error::CoreError;
use crate::types::{
    split_list, ParamFlags, ParamSpec, ParamValue, ProtocolDescriptor, ProtocolName, ProtocolSet,
    ServiceName,
};

const MANAGER_GROUP: &str = "ConnectionManager";
const PROTOCOL_GROUP_PREFIX: &str = "Protocol ";
const PARAM_KEY_PREFIX: &str = "param-";
const DEFAULT_KEY_PREFIX: &str = "default-";

/// What a manager offers, from whichever source described it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerDescription {
    /// Extra manager-level interfaces.
    pub interfaces: Vec<String>,
    pub protocols: ProtocolSet,
}

/// Turns a cache file into a [`ManagerDescription`].
///
/// Implementations are called from a blocking thread.
pub trait CacheReader: Send + Sync {
    fn read(&self, manager: &ServiceName, path: &Path) -> Result<ManagerDescription, CoreError>;
}

/// The default reader for the key-file format above.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyFileReader;

impl CacheReader for KeyFileReader {
    fn read(&self, manager: &ServiceName, path: &Path) -> Result<ManagerDescription, CoreError> {
        read_manager_file(manager, path)
    }
}

/// Load and parse the manager file at `path`.
///
/// Returns `CoreError::CacheUnavailable` if the file is missing or is not a
/// key file at all; individual bad groups never fail the whole read.
pub fn read_manager_file(
    manager: &ServiceName,
    path: &Path,
) -> Result<ManagerDescription, CoreError> {
    let ini = Ini::load_from_file_noescape(path).map_err(|err| match err {
        ini::Error::Io(io) if io.kind() == ErrorKind::NotFound => {
            CoreError::cache_unavailable(path, "file not found")
        }
        other => CoreError::cache_unavailable(path, other),
    })?;
    Ok(describe(manager, &ini))
}

/// Parse manager file contents already in memory.
pub fn parse_manager_str(
    manager: &ServiceName,
    contents: &str,
) -> Result<ManagerDescription, CoreError> {
    let ini = Ini::load_from_str_noescape(contents)
        .map_err(|err| CoreError::cache_unavailable(format!("<{manager}>"), err))?;
    Ok(describe(manager, &ini))
}

fn describe(manager: &ServiceName, ini: &Ini) -> ManagerDescription {
    let interfaces = ini
        .section(Some(MANAGER_GROUP))
        .and_then(|props| props.get("Interfaces"))
        .map(split_list)
        .unwrap_or_default();

    let mut protocols = ProtocolSet::new();
    for (group, props) in ini.iter() {
        let Some(group) = group else { continue };
        let Some(raw_name) = group.strip_prefix(PROTOCOL_GROUP_PREFIX) else {
            continue;
        };
        match ProtocolName::new(raw_name) {
            Ok(name) => {
                let descriptor = parse_protocol_group(manager, name.clone(), props);
                protocols.insert(name, descriptor);
            }
            Err(err) => {
                tracing::info!(manager = %manager, error = %err, "ignoring protocol group");
            }
        }
    }

    ManagerDescription {
        interfaces,
        protocols,
    }
}

fn parse_protocol_group(
    manager: &ServiceName,
    name: ProtocolName,
    props: &Properties,
) -> ProtocolDescriptor {
    let mut params = Vec::new();
    for (key, value) in props.iter() {
        let Some(param_name) = key.strip_prefix(PARAM_KEY_PREFIX) else {
            continue;
        };
        match parse_param(props, param_name, value) {
            Some(param) => params.push(param),
            None => tracing::debug!(
                manager = %manager,
                protocol = %name,
                param = param_name,
                "skipping malformed parameter",
            ),
        }
    }

    let list = |key: &str| props.get(key).map(split_list).unwrap_or_default();
    let text = |key: &str| props.get(key).map(|v| v.trim().to_owned());

    ProtocolDescriptor::new(name, params)
        .with_interfaces(list("Interfaces"))
        .with_connection_interfaces(list("ConnectionInterfaces"))
        .with_authentication_types(list("AuthenticationTypes"))
        .with_vcard_field(text("VCardField"))
        .with_english_name(text("EnglishName"))
        .with_icon(text("Icon"))
}

/// `param-<name>=<signature> [flag…]`, plus an optional `default-<name>`.
fn parse_param(props: &Properties, name: &str, value: &str) -> Option<ParamSpec> {
    if name.is_empty() {
        return None;
    }
    let mut words = value.split_whitespace();
    let signature = words.next()?;
    let flags = words
        .filter_map(ParamFlags::from_word)
        .fold(ParamFlags::empty(), |acc, flag| acc | flag);

    let default = props
        .get(format!("{DEFAULT_KEY_PREFIX}{name}"))
        .and_then(|raw| ParamValue::parse_keyfile(signature, raw));

    Some(ParamSpec::new(name, signature, flags, default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gabble() -> ServiceName {
        ServiceName::new("gabble").expect("name")
    }

    #[test]
    fn parses_flags_and_defaults() {
        let desc = parse_manager_str(
            &gabble(),
            "[Protocol jabber]\nparam-account=s required register\nparam-port=q\ndefault-port=5222\n",
        )
        .expect("parse");
        let jabber = desc.protocols.get("jabber").expect("jabber");
        let account = jabber.param("account").expect("account");
        assert!(account.is_required());
        assert!(account.is_required_for_registration());
        assert!(!account.is_secret());
        assert_eq!(
            jabber.param("port").and_then(|p| p.default_value()),
            Some(&ParamValue::UInt(5222))
        );
    }

    #[test]
    fn unparseable_default_keeps_param_without_default() {
        let desc = parse_manager_str(
            &gabble(),
            "[Protocol jabber]\nparam-port=q\ndefault-port=not-a-number\n",
        )
        .expect("parse");
        let port = desc.protocols["jabber"].param("port").cloned().expect("port");
        assert_eq!(port.default_value(), None);
        assert!(!port.flags().contains(ParamFlags::HAS_DEFAULT));
    }

    #[test]
    fn empty_param_line_is_skipped() {
        let desc = parse_manager_str(&gabble(), "[Protocol jabber]\nparam-account=\nparam-x=s\n")
            .expect("parse");
        let names: Vec<&str> = desc.protocols["jabber"]
            .params()
            .iter()
            .map(ParamSpec::name)
            .collect();
        assert_eq!(names, vec!["x"]);
    }
}
