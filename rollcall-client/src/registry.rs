//! One proxy per manager name, plus discovery of every manager on the bus.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use rollcall_core::{paths, CacheReader, Config, KeyFileReader, ServiceName};

use crate::bus::{self, BusClient};
use crate::countdown::Countdown;
use crate::error::ClientError;
use crate::manager::{CacheFile, ManagerProxy, ProxyContext};

/// A weak reference to whoever asked for discovery. Once it can no longer
/// be upgraded the result is discarded instead of delivered.
pub type CallerRef = Weak<dyn Any + Send + Sync>;

#[derive(Debug)]
pub enum DiscoveryOutcome {
    /// Every discovered manager, each having finished preparing.
    Complete(Vec<ManagerProxy>),
    /// The caller went away before the result was ready.
    CallerGone,
}

pub struct RegistryBuilder {
    bus: Arc<dyn BusClient>,
    config: Config,
    reader: Option<Arc<dyn CacheReader>>,
    search_dirs: Option<Vec<PathBuf>>,
}

impl RegistryBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn reader(mut self, reader: Arc<dyn CacheReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Data directories searched for cache files, replacing the XDG ones.
    pub fn search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = Some(dirs);
        self
    }

    pub fn build(self) -> Registry {
        let search_dirs = self
            .search_dirs
            .unwrap_or_else(|| paths::search_dirs(&self.config));
        Registry {
            ctx: Arc::new(ProxyContext {
                bus: self.bus,
                reader: self.reader.unwrap_or_else(|| Arc::new(KeyFileReader)),
                config: self.config,
                search_dirs,
            }),
            managers: Mutex::new(BTreeMap::new()),
        }
    }
}

/// Hands out manager proxies and keeps them warm until evicted.
pub struct Registry {
    ctx: Arc<ProxyContext>,
    managers: Mutex<BTreeMap<ServiceName, ManagerProxy>>,
}

impl Registry {
    pub fn new(bus: Arc<dyn BusClient>, config: Config) -> Self {
        Self::builder(bus).config(config).build()
    }

    pub fn builder(bus: Arc<dyn BusClient>) -> RegistryBuilder {
        RegistryBuilder {
            bus,
            config: Config::default(),
            reader: None,
            search_dirs: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.ctx.search_dirs
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ServiceName, ManagerProxy>> {
        self.managers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The proxy for `name`, created on first use with a searched cache file.
    pub fn get_manager(&self, name: &str) -> Result<ManagerProxy, ClientError> {
        let name = ServiceName::new(name)?;
        Ok(self.get_manager_with(name, CacheFile::Search))
    }

    /// Like [`Registry::get_manager`], but a newly created proxy uses
    /// `cache_file`. An existing proxy is returned unchanged.
    pub fn get_manager_with(&self, name: ServiceName, cache_file: CacheFile) -> ManagerProxy {
        let mut managers = self.lock();
        if let Some(existing) = managers.get(&name) {
            if !existing.is_disposed() {
                return existing.clone();
            }
        }
        tracing::debug!(manager = %name, "creating manager proxy");
        let proxy = ManagerProxy::spawn(name.clone(), cache_file, self.ctx.clone());
        managers.insert(name, proxy.clone());
        proxy
    }

    /// Proxies currently held, in name order.
    pub fn managers(&self) -> Vec<ManagerProxy> {
        self.lock().values().cloned().collect()
    }

    /// Stop holding `name`. The proxy is disposed once its last handle goes.
    pub fn evict(&self, name: &str) -> Option<ManagerProxy> {
        self.lock().remove(name)
    }

    /// Find every manager that is activatable or running, get each ready,
    /// and return them. Managers that fail to prepare are still included.
    pub async fn discover_all(
        &self,
        caller: Option<CallerRef>,
    ) -> Result<DiscoveryOutcome, ClientError> {
        let mut found = BTreeMap::new();
        let timeout = self.ctx.config.list_timeout();

        let activatable = bus::with_timeout(
            "ListActivatableNames",
            timeout,
            self.ctx.bus.list_activatable_names(timeout),
        )
        .await;
        if !caller_alive(&caller) {
            tracing::debug!("discovery caller gone before enumeration finished");
            return Ok(DiscoveryOutcome::CallerGone);
        }
        self.collect(&mut found, activatable.map_err(ClientError::Enumeration)?);

        let running =
            bus::with_timeout("ListNames", timeout, self.ctx.bus.list_names(timeout)).await;
        if !caller_alive(&caller) {
            tracing::debug!("discovery caller gone before enumeration finished");
            return Ok(DiscoveryOutcome::CallerGone);
        }
        self.collect(&mut found, running.map_err(ClientError::Enumeration)?);

        let targets: Vec<ManagerProxy> = found.into_values().collect();
        tracing::info!(managers = targets.len(), "waiting for discovered managers");

        let countdown = Countdown::new(targets.len());
        for manager in &targets {
            let manager = manager.clone();
            let countdown = countdown.clone();
            tokio::spawn(async move {
                if let Err(err) = manager.request_ready().await {
                    tracing::debug!(
                        manager = %manager.name(),
                        error = %err,
                        "manager not ready, listing it anyway",
                    );
                }
                countdown.arrive();
            });
        }
        countdown.wait().await;

        if caller_alive(&caller) {
            Ok(DiscoveryOutcome::Complete(targets))
        } else {
            tracing::debug!("discovery caller gone, dropping result");
            Ok(DiscoveryOutcome::CallerGone)
        }
    }

    /// Run [`Registry::discover_all`] in the background and hand the result
    /// to `callback`, unless the caller has gone by then.
    pub fn spawn_discover_all<F>(
        self: &Arc<Self>,
        caller: Option<CallerRef>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Vec<ManagerProxy>, ClientError>) + Send + 'static,
    {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            match registry.discover_all(caller).await {
                Ok(DiscoveryOutcome::Complete(managers)) => callback(Ok(managers)),
                Ok(DiscoveryOutcome::CallerGone) => {}
                Err(err) => callback(Err(err)),
            }
        })
    }

    fn collect(&self, found: &mut BTreeMap<ServiceName, ManagerProxy>, bus_names: Vec<String>) {
        for bus_name in bus_names {
            let Some(name) = self.ctx.config.service_name_from_bus_name(&bus_name) else {
                continue;
            };
            if found.contains_key(&name) {
                continue;
            }
            let proxy = self.get_manager_with(name.clone(), CacheFile::Search);
            found.insert(name, proxy);
        }
    }
}

fn caller_alive(caller: &Option<CallerRef>) -> bool {
    caller.as_ref().map_or(true, |weak| weak.strong_count() > 0)
}
