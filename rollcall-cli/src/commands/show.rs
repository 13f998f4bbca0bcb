//! `rollcall show <name>`: prepare one manager through a proxy.
//!
//! There is no live bus here, so the proxy runs over an empty in-memory
//! bus: the cache file is the only thing that can make it ready.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use rollcall_client::{MemoryBus, Registry};
use rollcall_core::Config;

use super::{print_protocol, ProtocolJson};

/// Arguments for `rollcall show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Manager name, e.g. `gabble`.
    pub name: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ShowJson {
    manager: String,
    bus_name: String,
    info_source: String,
    cache_file: Option<String>,
    protocols: Vec<ProtocolJson>,
}

impl ShowArgs {
    pub fn run(self, config: Config) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime.block_on(self.show(config))
    }

    async fn show(self, config: Config) -> Result<()> {
        let registry = Registry::new(Arc::new(MemoryBus::new()), config);
        let proxy = registry.get_manager(&self.name)?;
        proxy
            .request_ready()
            .await
            .with_context(|| format!("manager '{}' has no usable description", self.name))?;

        let snapshot = proxy.snapshot();
        if self.json {
            let payload = ShowJson {
                manager: proxy.name().to_string(),
                bus_name: proxy.bus_name().to_owned(),
                info_source: snapshot.info_source.to_string(),
                cache_file: snapshot.cache_file.map(|p| p.display().to_string()),
                protocols: snapshot.protocols.values().map(ProtocolJson::from).collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize JSON")?
            );
            return Ok(());
        }

        println!(
            "{} | {} | source: {} | {} protocols",
            proxy.name(),
            proxy.bus_name(),
            snapshot.info_source,
            snapshot.protocols.len()
        );
        for protocol in snapshot.protocols.values() {
            println!();
            print_protocol(protocol);
        }
        Ok(())
    }
}
