//! `rollcall inspect <file>`: parse one cache file.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;

use rollcall_core::{manager_file, ServiceName};

use super::{print_protocol, ProtocolJson};

/// Arguments for `rollcall inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to a `<name>.manager` file.
    pub file: PathBuf,

    /// Manager name, if it differs from the file name.
    #[arg(long)]
    pub name: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct InspectJson {
    manager: String,
    path: String,
    interfaces: Vec<String>,
    protocols: Vec<ProtocolJson>,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let raw_name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_owned)
                .ok_or_else(|| {
                    anyhow!("cannot derive a manager name from {}", self.file.display())
                })?,
        };
        let manager = ServiceName::new(raw_name).context("use --name to give the manager name")?;

        let description = manager_file::read_manager_file(&manager, &self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;

        if self.json {
            let payload = InspectJson {
                manager: manager.to_string(),
                path: self.file.display().to_string(),
                interfaces: description.interfaces,
                protocols: description.protocols.values().map(ProtocolJson::from).collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize JSON")?
            );
            return Ok(());
        }

        println!(
            "{} | {} protocols | {}",
            manager,
            description.protocols.len(),
            self.file.display()
        );
        for interface in &description.interfaces {
            println!("interface: {interface}");
        }
        for protocol in description.protocols.values() {
            println!();
            print_protocol(protocol);
        }
        Ok(())
    }
}
