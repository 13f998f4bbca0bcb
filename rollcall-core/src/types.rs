//! Domain types for manager discovery.
//!
//! Names are validated on construction and immutable afterwards. Parameter
//! and protocol descriptors are plain values: a manager's protocol set is
//! replaced wholesale on each successful introspection, never edited.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, NameKind};

// ---------------------------------------------------------------------------
// Validated names
// ---------------------------------------------------------------------------

/// The short name of a manager, e.g. `gabble`.
///
/// Non-empty, starts with an ASCII letter, then ASCII letters, digits or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        check_name(&name, NameKind::Service, '_')?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The name of a protocol offered by a manager, e.g. `jabber` or `local-xmpp`.
///
/// Non-empty, starts with an ASCII letter, then ASCII letters, digits or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolName(String);

impl ProtocolName {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        check_name(&name, NameKind::Protocol, '-')?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_name(name: &str, kind: NameKind, extra: char) -> Result<(), CoreError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(CoreError::invalid_name(kind, name, "the empty string is not valid"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(CoreError::invalid_name(
            kind,
            name,
            "first character is not an ASCII letter",
        ));
    }
    if let Some(bad) = chars.find(|c| !c.is_ascii_alphanumeric() && *c != extra) {
        return Err(CoreError::invalid_name(
            kind,
            name,
            format!("character '{bad}' is not an ASCII letter, digit or '{extra}'"),
        ));
    }
    Ok(())
}

macro_rules! name_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = CoreError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(name: $ty) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_impls!(ServiceName);
name_impls!(ProtocolName);

// ---------------------------------------------------------------------------
// Information source
// ---------------------------------------------------------------------------

/// Where a manager's current protocol set came from.
///
/// Ordered by freshness: `None < File < Live`. See [`crate::freshness`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InfoSource {
    #[default]
    None,
    File,
    Live,
}

impl fmt::Display for InfoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoSource::None => write!(f, "none"),
            InfoSource::File => write!(f, "file"),
            InfoSource::Live => write!(f, "live"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

bitflags! {
    /// Parameter flags, using the bus wire values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u32 {
        const REQUIRED = 1;
        const REGISTER = 2;
        const HAS_DEFAULT = 4;
        const SECRET = 8;
        const DBUS_PROPERTY = 16;
    }
}

impl ParamFlags {
    /// Parse one flag word as written in a cache file.
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "required" => Some(Self::REQUIRED),
            "register" => Some(Self::REGISTER),
            "secret" => Some(Self::SECRET),
            "dbus-property" => Some(Self::DBUS_PROPERTY),
            _ => None,
        }
    }

    /// Space-separated flag words, in the cache-file spelling.
    pub fn words(&self) -> Vec<&'static str> {
        let mut words = Vec::new();
        if self.contains(Self::REQUIRED) {
            words.push("required");
        }
        if self.contains(Self::REGISTER) {
            words.push("register");
        }
        if self.contains(Self::SECRET) {
            words.push("secret");
        }
        if self.contains(Self::DBUS_PROPERTY) {
            words.push("dbus-property");
        }
        if self.contains(Self::HAS_DEFAULT) {
            words.push("has-default");
        }
        words
    }
}

/// A typed parameter default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    ObjectPath(String),
    StringList(Vec<String>),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// Parse the textual default from a cache file according to `signature`.
    ///
    /// Returns `None` for unsupported signatures and for values that do not
    /// fit the signature's range.
    pub fn parse_keyfile(signature: &str, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match signature {
            "b" => match raw {
                "true" | "1" => Some(ParamValue::Bool(true)),
                "false" | "0" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            "y" => raw.parse::<u8>().ok().map(|v| ParamValue::UInt(v.into())),
            "q" => raw.parse::<u16>().ok().map(|v| ParamValue::UInt(v.into())),
            "u" => raw.parse::<u32>().ok().map(|v| ParamValue::UInt(v.into())),
            "t" => raw.parse::<u64>().ok().map(ParamValue::UInt),
            "n" => raw.parse::<i16>().ok().map(|v| ParamValue::Int(v.into())),
            "i" => raw.parse::<i32>().ok().map(|v| ParamValue::Int(v.into())),
            "x" => raw.parse::<i64>().ok().map(ParamValue::Int),
            "d" => raw.parse::<f64>().ok().map(ParamValue::Double),
            "s" => Some(ParamValue::String(raw.to_owned())),
            "o" => raw
                .starts_with('/')
                .then(|| ParamValue::ObjectPath(raw.to_owned())),
            "as" => Some(ParamValue::StringList(split_list(raw))),
            "ay" => Some(ParamValue::Bytes(raw.as_bytes().to_vec())),
            _ => None,
        }
    }

    /// Convert a default carried in a live reply according to `signature`.
    pub fn from_json(signature: &str, value: &Value) -> Option<Self> {
        let unsigned = |max: u64| value.as_u64().filter(|v| *v <= max).map(ParamValue::UInt);
        let signed = |min: i64, max: i64| {
            value
                .as_i64()
                .filter(|v| (min..=max).contains(v))
                .map(ParamValue::Int)
        };
        match signature {
            "b" => value.as_bool().map(ParamValue::Bool),
            "y" => unsigned(u8::MAX.into()),
            "q" => unsigned(u16::MAX.into()),
            "u" => unsigned(u32::MAX.into()),
            "t" => unsigned(u64::MAX),
            "n" => signed(i16::MIN.into(), i16::MAX.into()),
            "i" => signed(i32::MIN.into(), i32::MAX.into()),
            "x" => signed(i64::MIN, i64::MAX),
            "d" => value.as_f64().map(ParamValue::Double),
            "s" => value.as_str().map(|s| ParamValue::String(s.to_owned())),
            "o" => value
                .as_str()
                .filter(|s| s.starts_with('/'))
                .map(|s| ParamValue::ObjectPath(s.to_owned())),
            "as" => value
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(ParamValue::StringList),
            "ay" => match value {
                Value::String(s) => Some(ParamValue::Bytes(s.as_bytes().to_vec())),
                Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<_>>>()
                    .map(ParamValue::Bytes),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::UInt(v) => write!(f, "{v}"),
            ParamValue::Double(v) => write!(f, "{v}"),
            ParamValue::String(v) | ParamValue::ObjectPath(v) => write!(f, "{v}"),
            ParamValue::StringList(v) => write!(f, "{}", v.join(";")),
            ParamValue::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

/// Split a `;`-separated key-file list, dropping empty entries.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// One connection parameter accepted by a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    signature: String,
    flags: ParamFlags,
    default: Option<ParamValue>,
}

impl ParamSpec {
    /// Build a parameter. `HAS_DEFAULT` is derived from `default`, and
    /// parameters named `password` or `*-password` are always secret.
    pub fn new(
        name: impl Into<String>,
        signature: impl Into<String>,
        flags: ParamFlags,
        default: Option<ParamValue>,
    ) -> Self {
        let name = name.into();
        let mut flags = flags;
        flags.set(ParamFlags::HAS_DEFAULT, default.is_some());
        if name == "password" || name.ends_with("-password") {
            flags.insert(ParamFlags::SECRET);
        }
        Self {
            name,
            signature: signature.into(),
            flags,
            default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus type signature, e.g. `s` or `as`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn flags(&self) -> ParamFlags {
        self.flags
    }

    pub fn is_required(&self) -> bool {
        self.flags.contains(ParamFlags::REQUIRED)
    }

    pub fn is_required_for_registration(&self) -> bool {
        self.flags.contains(ParamFlags::REGISTER)
    }

    pub fn is_secret(&self) -> bool {
        self.flags.contains(ParamFlags::SECRET)
    }

    pub fn is_bus_property(&self) -> bool {
        self.flags.contains(ParamFlags::DBUS_PROPERTY)
    }

    pub fn default_value(&self) -> Option<&ParamValue> {
        self.default.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Protocols
// ---------------------------------------------------------------------------

/// Everything known about one protocol of one manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDescriptor {
    name: ProtocolName,
    params: Vec<ParamSpec>,
    interfaces: BTreeSet<String>,
    connection_interfaces: Vec<String>,
    authentication_types: Vec<String>,
    vcard_field: Option<String>,
    english_name: Option<String>,
    icon: Option<String>,
}

impl ProtocolDescriptor {
    pub fn new(name: ProtocolName, params: Vec<ParamSpec>) -> Self {
        Self {
            name,
            params,
            interfaces: BTreeSet::new(),
            connection_interfaces: Vec::new(),
            authentication_types: Vec::new(),
            vcard_field: None,
            english_name: None,
            icon: None,
        }
    }

    pub fn with_interfaces<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces = interfaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_connection_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.connection_interfaces = interfaces;
        self
    }

    pub fn with_authentication_types(mut self, types: Vec<String>) -> Self {
        self.authentication_types = types;
        self
    }

    pub fn with_vcard_field(mut self, field: Option<String>) -> Self {
        self.vcard_field = field.filter(|s| !s.is_empty());
        self
    }

    pub fn with_english_name(mut self, name: Option<String>) -> Self {
        self.english_name = name.filter(|s| !s.is_empty());
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon.filter(|s| !s.is_empty());
        self
    }

    pub fn name(&self) -> &ProtocolName {
        &self.name
    }

    /// Parameters in the order the manager declared them.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Whether new accounts can be registered: a boolean `register` parameter.
    pub fn can_register(&self) -> bool {
        self.param("register")
            .map(|p| p.signature == "b")
            .unwrap_or(false)
    }

    pub fn interfaces(&self) -> &BTreeSet<String> {
        &self.interfaces
    }

    pub fn connection_interfaces(&self) -> &[String] {
        &self.connection_interfaces
    }

    pub fn authentication_types(&self) -> &[String] {
        &self.authentication_types
    }

    pub fn vcard_field(&self) -> Option<&str> {
        self.vcard_field.as_deref()
    }

    /// Human-readable name; falls back to the protocol name with its first
    /// letter capitalised.
    pub fn english_name(&self) -> String {
        if let Some(name) = &self.english_name {
            return name.clone();
        }
        let mut chars = self.name.as_str().chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    /// Icon name; falls back to `im-<protocol>`.
    pub fn icon_name(&self) -> String {
        self.icon
            .clone()
            .unwrap_or_else(|| format!("im-{}", self.name))
    }
}

/// A manager's protocols keyed by name, in name order.
pub type ProtocolSet = BTreeMap<ProtocolName, ProtocolDescriptor>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_name_rules() {
        assert!(ServiceName::new("gabble").is_ok());
        assert!(ServiceName::new("haze_2").is_ok());
        assert!(ServiceName::new("").is_err());
        assert!(ServiceName::new("2gabble").is_err());
        assert!(ServiceName::new("gab-ble").is_err());
    }

    #[test]
    fn protocol_name_rules() {
        assert!(ProtocolName::new("local-xmpp").is_ok());
        assert!(ProtocolName::new("jabber2").is_ok());
        assert!(ProtocolName::new("local_xmpp").is_err());
        assert!(ProtocolName::new("-xmpp").is_err());
    }

    #[test]
    fn invalid_name_error_mentions_offending_character() {
        let err = ServiceName::new("bad.name").unwrap_err();
        assert!(err.to_string().contains("'.'"), "got: {err}");
        assert!(err.to_string().contains("service"), "got: {err}");
    }

    #[test]
    fn names_borrow_as_str_for_map_lookup() {
        let mut set = ProtocolSet::new();
        let name = ProtocolName::new("jabber").expect("name");
        set.insert(name.clone(), ProtocolDescriptor::new(name, vec![]));
        assert!(set.contains_key("jabber"));
    }

    #[test]
    fn info_source_is_ordered_by_freshness() {
        assert!(InfoSource::None < InfoSource::File);
        assert!(InfoSource::File < InfoSource::Live);
        assert_eq!(InfoSource::default(), InfoSource::None);
    }

    #[test]
    fn param_default_sets_has_default_flag() {
        let with = ParamSpec::new("port", "q", ParamFlags::empty(), Some(ParamValue::UInt(5222)));
        let without = ParamSpec::new("port", "q", ParamFlags::HAS_DEFAULT, None);
        assert!(with.flags().contains(ParamFlags::HAS_DEFAULT));
        assert!(!without.flags().contains(ParamFlags::HAS_DEFAULT));
    }

    #[test]
    fn password_params_are_always_secret() {
        assert!(ParamSpec::new("password", "s", ParamFlags::empty(), None).is_secret());
        assert!(ParamSpec::new("proxy-password", "s", ParamFlags::empty(), None).is_secret());
        assert!(!ParamSpec::new("passwords-file", "s", ParamFlags::empty(), None).is_secret());
    }

    #[test]
    fn keyfile_defaults_respect_signature_ranges() {
        assert_eq!(ParamValue::parse_keyfile("q", "5222"), Some(ParamValue::UInt(5222)));
        assert_eq!(ParamValue::parse_keyfile("q", "70000"), None);
        assert_eq!(ParamValue::parse_keyfile("n", "-3"), Some(ParamValue::Int(-3)));
        assert_eq!(ParamValue::parse_keyfile("b", "true"), Some(ParamValue::Bool(true)));
        assert_eq!(ParamValue::parse_keyfile("b", "yes"), None);
        assert_eq!(
            ParamValue::parse_keyfile("as", "a;b;;c;"),
            Some(ParamValue::StringList(vec!["a".into(), "b".into(), "c".into()]))
        );
        assert_eq!(ParamValue::parse_keyfile("o", "relative"), None);
    }

    #[test]
    fn json_defaults_respect_signature() {
        assert_eq!(ParamValue::from_json("u", &json!(42)), Some(ParamValue::UInt(42)));
        assert_eq!(ParamValue::from_json("y", &json!(300)), None);
        assert_eq!(ParamValue::from_json("s", &json!(1)), None);
        assert_eq!(
            ParamValue::from_json("ay", &json!([104, 105])),
            Some(ParamValue::Bytes(b"hi".to_vec()))
        );
    }

    #[test]
    fn protocol_presentation_fallbacks() {
        let proto = ProtocolDescriptor::new(ProtocolName::new("jabber").expect("name"), vec![]);
        assert_eq!(proto.english_name(), "Jabber");
        assert_eq!(proto.icon_name(), "im-jabber");
        assert!(!proto.can_register());
    }

    #[test]
    fn can_register_requires_boolean_register_param() {
        let name = ProtocolName::new("jabber").expect("name");
        let proto = ProtocolDescriptor::new(
            name,
            vec![ParamSpec::new("register", "b", ParamFlags::REGISTER, None)],
        );
        assert!(proto.can_register());
    }

    #[test]
    fn names_serde_roundtrip_validates() {
        let name: ServiceName = serde_yaml::from_str("gabble").expect("deserialize");
        assert_eq!(name.as_str(), "gabble");
        assert!(serde_yaml::from_str::<ServiceName>("not valid").is_err());
    }
}
