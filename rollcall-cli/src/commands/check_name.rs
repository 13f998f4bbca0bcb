//! `rollcall check-name <name>`

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use rollcall_core::{ProtocolName, ServiceName};

/// Arguments for `rollcall check-name`.
#[derive(Args, Debug)]
pub struct CheckNameArgs {
    pub name: String,

    /// Check as a protocol name instead of a manager name.
    #[arg(long)]
    pub protocol: bool,
}

impl CheckNameArgs {
    pub fn run(self) -> Result<()> {
        let kind = if self.protocol {
            ProtocolName::new(self.name.as_str())?;
            "protocol"
        } else {
            ServiceName::new(self.name.as_str())?;
            "manager"
        };
        println!("{} '{}' is a valid {kind} name", "✓".green(), self.name);
        Ok(())
    }
}
