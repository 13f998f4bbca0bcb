//! `rollcall list`: managers installed in the data directories.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rollcall_core::{manager_file, paths, Config};

/// Arguments for `rollcall list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ManagerJson {
    manager: String,
    path: String,
    protocols: Vec<String>,
    error: Option<String>,
}

#[derive(Tabled)]
struct ManagerRow {
    #[tabled(rename = "manager")]
    manager: String,
    #[tabled(rename = "protocols")]
    protocols: String,
    #[tabled(rename = "file")]
    path: String,
}

impl ListArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let dirs = paths::search_dirs(config);
        let installed = paths::list_manager_files_in(&dirs, config)
            .context("failed to scan data directories")?;

        let entries: Vec<ManagerJson> = installed
            .into_iter()
            .map(|(name, path)| {
                let (protocols, error) = match manager_file::read_manager_file(&name, &path) {
                    Ok(description) => (
                        description
                            .protocols
                            .keys()
                            .map(|p| p.to_string())
                            .collect(),
                        None,
                    ),
                    Err(err) => (Vec::new(), Some(err.to_string())),
                };
                ManagerJson {
                    manager: name.to_string(),
                    path: path.display().to_string(),
                    protocols,
                    error,
                }
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to serialize JSON")?
            );
            return Ok(());
        }

        if entries.is_empty() {
            println!("No managers installed.");
            return Ok(());
        }

        let rows: Vec<ManagerRow> = entries
            .into_iter()
            .map(|entry| ManagerRow {
                manager: entry.manager,
                protocols: match entry.error {
                    Some(err) => format!("unreadable: {err}").yellow().to_string(),
                    None => entry.protocols.join(", "),
                },
                path: entry.path,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
