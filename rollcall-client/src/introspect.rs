//! Decoding a manager's `GetAll` reply.
//!
//! The reply is a property map. Protocols arrive as a map from protocol name
//! to that protocol's own property map, whose keys are fully qualified:
//!
//! ```json
//! {
//!   "Interfaces": [],
//!   "Protocols": {
//!     "jabber": {
//!       "org.freedesktop.Telepathy.Protocol.Parameters": [["account", 1, "s", ""]],
//!       "org.freedesktop.Telepathy.Protocol.EnglishName": "Jabber"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use rollcall_core::{
    ManagerDescription, ParamFlags, ParamSpec, ParamValue, ProtocolDescriptor, ProtocolName,
    ProtocolSet, ServiceName,
};

use crate::error::ManagerError;

pub const PROTOCOL_INTERFACE: &str = "org.freedesktop.Telepathy.Protocol";

#[derive(Debug, Deserialize)]
struct ManagerProperties {
    #[serde(rename = "Interfaces", default)]
    interfaces: Vec<String>,
    #[serde(rename = "Protocols", default)]
    protocols: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolProperties {
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.Parameters", default)]
    parameters: Vec<WireParam>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.Interfaces", default)]
    interfaces: Vec<String>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.ConnectionInterfaces", default)]
    connection_interfaces: Vec<String>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.AuthenticationTypes", default)]
    authentication_types: Vec<String>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.VCardField", default)]
    vcard_field: Option<String>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.EnglishName", default)]
    english_name: Option<String>,
    #[serde(rename = "org.freedesktop.Telepathy.Protocol.Icon", default)]
    icon: Option<String>,
}

/// `(name, flags, signature, default)`.
#[derive(Debug, Deserialize)]
struct WireParam(String, u32, String, Value);

impl WireParam {
    fn into_spec(self) -> ParamSpec {
        let WireParam(name, bits, signature, default) = self;
        let flags = ParamFlags::from_bits_truncate(bits);
        let default = if flags.contains(ParamFlags::HAS_DEFAULT) {
            ParamValue::from_json(&signature, &default)
        } else {
            None
        };
        ParamSpec::new(name, signature, flags, default)
    }
}

/// Decode a `GetAll` reply. Protocols with invalid names or malformed
/// property maps are skipped; only a reply that is not a property map at all
/// is an error.
pub fn parse_get_all_reply(
    manager: &ServiceName,
    reply: Value,
) -> Result<ManagerDescription, ManagerError> {
    let mut protocols = ProtocolSet::new();
    let interfaces = stage_get_all_reply(manager, reply, &mut protocols)?;
    Ok(ManagerDescription {
        interfaces,
        protocols,
    })
}

/// Decode a `GetAll` reply into `staging`, one protocol at a time, and
/// return the manager-level interfaces.
pub(crate) fn stage_get_all_reply(
    manager: &ServiceName,
    reply: Value,
    staging: &mut ProtocolSet,
) -> Result<Vec<String>, ManagerError> {
    let properties: ManagerProperties = serde_json::from_value(reply)
        .map_err(|err| ManagerError::MalformedReply(err.to_string()))?;

    for (raw_name, value) in properties.protocols {
        let name = match ProtocolName::new(raw_name.as_str()) {
            Ok(name) => name,
            Err(err) => {
                tracing::info!(manager = %manager, error = %err, "ignoring protocol");
                continue;
            }
        };
        let props: ProtocolProperties = match serde_json::from_value(value) {
            Ok(props) => props,
            Err(err) => {
                tracing::warn!(
                    manager = %manager,
                    protocol = %name,
                    error = %err,
                    "ignoring malformed protocol",
                );
                continue;
            }
        };
        let params = props.parameters.into_iter().map(WireParam::into_spec).collect();
        let descriptor = ProtocolDescriptor::new(name.clone(), params)
            .with_interfaces(props.interfaces)
            .with_connection_interfaces(props.connection_interfaces)
            .with_authentication_types(props.authentication_types)
            .with_vcard_field(props.vcard_field)
            .with_english_name(props.english_name)
            .with_icon(props.icon);
        staging.insert(name, descriptor);
    }

    Ok(properties.interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gabble() -> ServiceName {
        ServiceName::new("gabble").expect("name")
    }

    #[test]
    fn decodes_parameters_and_metadata() {
        let reply = json!({
            "Interfaces": ["com.example.Extra"],
            "Protocols": {
                "jabber": {
                    "org.freedesktop.Telepathy.Protocol.Parameters": [
                        ["account", 3, "s", ""],
                        ["port", 4, "q", 5222],
                        ["password", 1, "s", ""]
                    ],
                    "org.freedesktop.Telepathy.Protocol.EnglishName": "Jabber",
                    "org.freedesktop.Telepathy.Protocol.VCardField": "x-jabber"
                }
            }
        });

        let desc = parse_get_all_reply(&gabble(), reply).expect("parse");
        assert_eq!(desc.interfaces, vec!["com.example.Extra"]);

        let jabber = &desc.protocols["jabber"];
        assert_eq!(jabber.english_name(), "Jabber");
        assert_eq!(jabber.vcard_field(), Some("x-jabber"));
        assert!(jabber.param("account").expect("account").is_required_for_registration());
        assert_eq!(
            jabber.param("port").and_then(|p| p.default_value()),
            Some(&ParamValue::UInt(5222))
        );
        assert!(jabber.param("password").expect("password").is_secret());
        assert_eq!(jabber.param("account").and_then(|p| p.default_value()), None);
    }

    #[test]
    fn skips_bad_protocols_but_keeps_the_rest() {
        let reply = json!({
            "Protocols": {
                "bad name": {},
                "broken": {"org.freedesktop.Telepathy.Protocol.Parameters": "nope"},
                "irc": {}
            }
        });
        let desc = parse_get_all_reply(&gabble(), reply).expect("parse");
        let names: Vec<&str> = desc.protocols.keys().map(ProtocolName::as_str).collect();
        assert_eq!(names, vec!["irc"]);
    }

    #[test]
    fn staging_collects_each_decoded_protocol() {
        let reply = json!({
            "Interfaces": ["com.example.Extra"],
            "Protocols": {"irc": {}, "jabber": {}, "not valid": {}}
        });
        let mut staging = ProtocolSet::new();
        let interfaces = stage_get_all_reply(&gabble(), reply, &mut staging).expect("stage");

        assert_eq!(interfaces, vec!["com.example.Extra"]);
        let names: Vec<&str> = staging.keys().map(ProtocolName::as_str).collect();
        assert_eq!(names, vec!["irc", "jabber"]);
    }

    #[test]
    fn non_map_reply_is_malformed() {
        let err = parse_get_all_reply(&gabble(), json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, ManagerError::MalformedReply(_)), "got: {err}");
    }
}
