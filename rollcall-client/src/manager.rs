//! Client-side handle to one connection manager.
//!
//! A [`ManagerProxy`] is a cheap, cloneable handle onto an actor task that
//! owns all the manager's state. The task exits, and the proxy is disposed,
//! when the last handle is dropped or [`ManagerProxy::dispose`] is called.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use rollcall_core::{CacheReader, Config, InfoSource, ProtocolDescriptor, ProtocolSet, ServiceName};

use crate::actor::ManagerActor;
use crate::bus::BusClient;
use crate::error::ManagerError;

const EVENT_CAPACITY: usize = 64;

/// Where a proxy gets its cache file from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFile {
    /// Look for `<name>.manager` in the data directories.
    Search,
    /// Use exactly this file.
    Path(PathBuf),
    /// Never read a cache file.
    Disabled,
}

impl CacheFile {
    /// The textual setting: an empty string disables the cache file.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting {
            None => CacheFile::Search,
            Some("") => CacheFile::Disabled,
            Some(path) => CacheFile::Path(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The manager's name gained an owner.
    Activated,
    /// The manager's name lost its owner, or activating it failed.
    Exited,
    /// An introspection or cache read finished; carries the source now held.
    GotInfo(InfoSource),
}

impl fmt::Display for ManagerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerEvent::Activated => write!(f, "activated"),
            ManagerEvent::Exited => write!(f, "exited"),
            ManagerEvent::GotInfo(source) => write!(f, "got-info({source})"),
        }
    }
}

/// Everything observable about a manager at one moment.
#[derive(Debug, Clone, Default)]
pub struct ManagerSnapshot {
    pub running: bool,
    pub info_source: InfoSource,
    pub protocols: Arc<ProtocolSet>,
    pub interfaces: Arc<Vec<String>>,
    pub cache_file: Option<PathBuf>,
    pub always_introspect: bool,
}

pub(crate) enum Command {
    RequestReady(oneshot::Sender<Result<(), ManagerError>>),
    Activate(oneshot::Sender<bool>),
    SetAlwaysIntrospect(bool),
    SetCacheFile(CacheFile),
    Dispose,
}

/// What every proxy created by one registry shares.
pub(crate) struct ProxyContext {
    pub(crate) bus: Arc<dyn BusClient>,
    pub(crate) reader: Arc<dyn CacheReader>,
    pub(crate) config: Config,
    pub(crate) search_dirs: Vec<PathBuf>,
}

struct Inner {
    name: ServiceName,
    bus_name: String,
    object_path: String,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ManagerEvent>,
    state: watch::Receiver<ManagerSnapshot>,
}

#[derive(Clone)]
pub struct ManagerProxy {
    inner: Arc<Inner>,
}

impl fmt::Debug for ManagerProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerProxy")
            .field("name", &self.inner.name)
            .field("bus_name", &self.inner.bus_name)
            .finish_non_exhaustive()
    }
}

impl ManagerProxy {
    /// Start the actor for `name`. Must be called inside a tokio runtime.
    pub(crate) fn spawn(name: ServiceName, cache_file: CacheFile, ctx: Arc<ProxyContext>) -> Self {
        let bus_name = ctx.config.bus_name_for(&name);
        let object_path = ctx.config.object_path_for(&name);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let actor = ManagerActor::new(
            name.clone(),
            bus_name.clone(),
            object_path.clone(),
            cache_file,
            ctx,
            command_rx,
            events.clone(),
        );
        let state = actor.subscribe_state();
        tokio::spawn(actor.run());

        Self {
            inner: Arc::new(Inner {
                name,
                bus_name,
                object_path,
                commands,
                events,
                state,
            }),
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.inner.name
    }

    pub fn bus_name(&self) -> &str {
        &self.inner.bus_name
    }

    pub fn object_path(&self) -> &str {
        &self.inner.object_path
    }

    /// Resolve once the manager has some information, or has failed to get
    /// any. Concurrent calls share one preparation round.
    pub async fn request_ready(&self) -> Result<(), ManagerError> {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::RequestReady(tx)).is_err() {
            return Err(ManagerError::Disposed);
        }
        rx.await.unwrap_or(Err(ManagerError::Disposed))
    }

    /// Ask for the manager to be started. Returns false if it is already
    /// running or the proxy is gone.
    pub async fn activate(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.inner.commands.send(Command::Activate(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Introspect a running manager even when a cache file was read.
    pub fn set_always_introspect(&self, always: bool) {
        let _ = self.inner.commands.send(Command::SetAlwaysIntrospect(always));
    }

    pub fn set_cache_file(&self, cache_file: CacheFile) {
        let _ = self.inner.commands.send(Command::SetCacheFile(cache_file));
    }

    /// Cancel outstanding work and fail every waiter. Idempotent.
    pub fn dispose(&self) {
        let _ = self.inner.commands.send(Command::Dispose);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.commands.is_closed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    /// A receiver that is marked changed whenever the snapshot changes.
    pub fn watch(&self) -> watch::Receiver<ManagerSnapshot> {
        self.inner.state.clone()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().running
    }

    pub fn info_source(&self) -> InfoSource {
        self.inner.state.borrow().info_source
    }

    pub fn protocols(&self) -> Arc<ProtocolSet> {
        self.inner.state.borrow().protocols.clone()
    }

    pub fn protocol(&self, name: &str) -> Option<ProtocolDescriptor> {
        self.inner.state.borrow().protocols.get(name).cloned()
    }

    pub fn has_protocol(&self, name: &str) -> bool {
        self.inner.state.borrow().protocols.contains_key(name)
    }

    pub fn protocol_names(&self) -> Vec<String> {
        self.inner
            .state
            .borrow()
            .protocols
            .keys()
            .map(|name| name.as_str().to_owned())
            .collect()
    }

    pub fn interfaces(&self) -> Arc<Vec<String>> {
        self.inner.state.borrow().interfaces.clone()
    }

    /// The cache file in effect, if any.
    pub fn cache_file(&self) -> Option<PathBuf> {
        self.inner.state.borrow().cache_file.clone()
    }

    pub fn always_introspect(&self) -> bool {
        self.inner.state.borrow().always_introspect
    }

    /// True when both handles refer to the same proxy.
    pub fn ptr_eq(&self, other: &ManagerProxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
