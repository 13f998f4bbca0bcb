pub mod check_name;
pub mod inspect;
pub mod list;
pub mod show;

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rollcall_core::{Config, ParamSpec, ParamValue, ProtocolDescriptor};

/// `--config` if given, else the default location; a missing file means
/// defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match Config::default_path() {
            Ok(path) => path,
            Err(_) => return Ok(Config::default()),
        },
    };
    Config::load_at(&path).with_context(|| format!("failed to load config {}", path.display()))
}

// ---------------------------------------------------------------------------
// Shared protocol rendering
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ProtocolJson {
    name: String,
    english_name: String,
    icon: String,
    vcard_field: Option<String>,
    can_register: bool,
    interfaces: Vec<String>,
    connection_interfaces: Vec<String>,
    authentication_types: Vec<String>,
    params: Vec<ParamJson>,
}

#[derive(Serialize)]
struct ParamJson {
    name: String,
    signature: String,
    flags: Vec<&'static str>,
    default: Option<ParamValue>,
}

#[derive(Tabled)]
struct ParamRow {
    #[tabled(rename = "param")]
    name: String,
    #[tabled(rename = "type")]
    signature: String,
    #[tabled(rename = "flags")]
    flags: String,
    #[tabled(rename = "default")]
    default: String,
}

impl From<&ProtocolDescriptor> for ProtocolJson {
    fn from(protocol: &ProtocolDescriptor) -> Self {
        Self {
            name: protocol.name().to_string(),
            english_name: protocol.english_name(),
            icon: protocol.icon_name(),
            vcard_field: protocol.vcard_field().map(str::to_owned),
            can_register: protocol.can_register(),
            interfaces: protocol.interfaces().iter().cloned().collect(),
            connection_interfaces: protocol.connection_interfaces().to_vec(),
            authentication_types: protocol.authentication_types().to_vec(),
            params: protocol
                .params()
                .iter()
                .map(|param| ParamJson {
                    name: param.name().to_owned(),
                    signature: param.signature().to_owned(),
                    flags: param.flags().words(),
                    default: param.default_value().cloned(),
                })
                .collect(),
        }
    }
}

fn default_label(param: &ParamSpec) -> String {
    match param.default_value() {
        None => String::new(),
        Some(_) if param.is_secret() => "(hidden)".to_string(),
        Some(value) => value.to_string(),
    }
}

pub fn print_protocol(protocol: &ProtocolDescriptor) {
    let mut heading = format!("{} ({})", protocol.name(), protocol.english_name())
        .bold()
        .to_string();
    if protocol.can_register() {
        heading.push_str(&format!(" {}", "[can register]".green()));
    }
    println!("{heading}");
    if let Some(field) = protocol.vcard_field() {
        println!("  vCard field: {field}");
    }
    println!("  icon: {}", protocol.icon_name());

    if protocol.params().is_empty() {
        println!("  {}", "no parameters".bright_black());
        return;
    }
    let rows: Vec<ParamRow> = protocol
        .params()
        .iter()
        .map(|param| ParamRow {
            name: param.name().to_owned(),
            signature: param.signature().to_owned(),
            flags: param.flags().words().join(" "),
            default: default_label(param),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
