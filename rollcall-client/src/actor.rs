//! The task behind a [`ManagerProxy`](crate::ManagerProxy).
//!
//! One task per manager owns every piece of state and reacts to four
//! sources, in priority order: handle commands, ownership reports, the
//! outstanding `GetAll` reply, and the outstanding cache-file read. Work that
//! would be an idle callback elsewhere goes on a small deferred queue that is
//! drained before waiting for the next event.

use std::collections::VecDeque;
use std::future::{pending, Future};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use rollcall_core::{
    freshness, paths, CoreError, InfoSource, ManagerDescription, ProtocolSet, ServiceName,
};

use crate::bus::{self, MethodCall, NameOwnerChanged, NameOwnerWatch, WatchId};
use crate::error::{BusError, ManagerError};
use crate::gate::{Admission, ReadinessGate};
use crate::introspect::stage_get_all_reply;
use crate::manager::{CacheFile, Command, ManagerEvent, ManagerSnapshot, ProxyContext};

type PendingCall = Pin<Box<dyn Future<Output = Result<Value, BusError>> + Send>>;
type PendingRead = JoinHandle<Result<ManagerDescription, CoreError>>;

enum Introspection {
    Idle,
    /// `staging` collects protocols as the reply is decoded; they are
    /// published together once the whole reply has been read.
    Calling {
        call: PendingCall,
        staging: ProtocolSet,
    },
}

impl Introspection {
    fn is_calling(&self) -> bool {
        matches!(self, Introspection::Calling { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    ReadCacheFile,
    Introspect,
}

pub(crate) struct ManagerActor {
    name: ServiceName,
    bus_name: String,
    object_path: String,
    ctx: Arc<ProxyContext>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ManagerEvent>,
    state: watch::Sender<ManagerSnapshot>,
    owner_watch: Option<NameOwnerWatch>,
    watch_id: WatchId,

    running: bool,
    name_known: bool,
    want_activation: bool,
    always_introspect: bool,
    info_source: InfoSource,
    protocols: Arc<ProtocolSet>,
    interfaces: Arc<Vec<String>>,
    cache_setting: CacheFile,
    cache_path: Option<PathBuf>,

    introspection: Introspection,
    cache_read: Option<PendingRead>,
    deferred: VecDeque<Deferred>,
    gate: ReadinessGate<ManagerError>,
    /// A failed round whose answer waits on a cache read still in flight.
    held_failure: Option<ManagerError>,
}

impl ManagerActor {
    pub(crate) fn new(
        name: ServiceName,
        bus_name: String,
        object_path: String,
        cache_setting: CacheFile,
        ctx: Arc<ProxyContext>,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<ManagerEvent>,
    ) -> Self {
        let owner_watch = ctx.bus.watch_name_owner(&bus_name);
        let watch_id = owner_watch.id;
        let cache_path = resolve_cache_file(&ctx, &name, &cache_setting);
        let always_introspect = ctx.config.always_introspect;
        let (state, _) = watch::channel(ManagerSnapshot {
            cache_file: cache_path.clone(),
            always_introspect,
            ..ManagerSnapshot::default()
        });

        Self {
            name,
            bus_name,
            object_path,
            ctx,
            commands,
            events,
            state,
            owner_watch: Some(owner_watch),
            watch_id,
            running: false,
            name_known: false,
            want_activation: false,
            always_introspect,
            info_source: InfoSource::None,
            protocols: Arc::new(ProtocolSet::new()),
            interfaces: Arc::new(Vec::new()),
            cache_setting,
            cache_path,
            introspection: Introspection::Idle,
            cache_read: None,
            deferred: VecDeque::new(),
            gate: ReadinessGate::new(),
            held_failure: None,
        }
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ManagerSnapshot> {
        self.state.subscribe()
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(manager = %self.name, bus_name = %self.bus_name, "manager proxy started");
        loop {
            self.run_deferred();
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Dispose) | None => break,
                    Some(command) => self.handle_command(command),
                },
                change = next_owner_change(&mut self.owner_watch) => match change {
                    Some(change) => self.on_name_owner_changed(change),
                    None => self.on_owner_watch_closed(),
                },
                reply = poll_call(&mut self.introspection) => self.on_introspection_reply(reply),
                read = poll_cache_read(&mut self.cache_read) => self.on_cache_read(read),
            }
        }
        self.dispose();
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequestReady(waiter) => {
                if let Admission::Queued { first: true } = self.gate.admit(waiter) {
                    self.kick_preparation();
                }
            }
            Command::Activate(respond_to) => {
                let _ = respond_to.send(self.activate());
            }
            Command::SetAlwaysIntrospect(always) => self.set_always_introspect(always),
            Command::SetCacheFile(setting) => self.set_cache_file(setting),
            Command::Dispose => {}
        }
    }

    /// Make sure a parked waiter will eventually be answered. Before the
    /// first ownership report nothing is needed: that report starts the
    /// cache read, which falls back to introspection.
    fn kick_preparation(&mut self) {
        if !self.name_known
            || self.introspection.is_calling()
            || self.cache_read.is_some()
            || self.info_source != InfoSource::None
            || self.deferred.contains(&Deferred::ReadCacheFile)
        {
            return;
        }
        self.schedule(Deferred::Introspect);
    }

    fn activate(&mut self) -> bool {
        if !self.name_known {
            tracing::debug!(manager = %self.name, "activation queued until the owner is known");
            self.want_activation = true;
            return true;
        }
        if self.running {
            tracing::debug!(manager = %self.name, "already running");
            return false;
        }
        self.schedule(Deferred::Introspect);
        true
    }

    fn set_always_introspect(&mut self, always: bool) {
        let was = self.always_introspect;
        self.always_introspect = always;
        if always && !was && self.running {
            self.schedule(Deferred::Introspect);
        }
        self.publish();
    }

    fn set_cache_file(&mut self, setting: CacheFile) {
        self.cache_path = resolve_cache_file(&self.ctx, &self.name, &setting);
        self.cache_setting = setting;
        tracing::debug!(
            manager = %self.name,
            setting = ?self.cache_setting,
            path = ?self.cache_path,
            "cache file changed",
        );
        if self.name_known {
            if let Some(read) = self.cache_read.take() {
                read.abort();
            }
            self.schedule(Deferred::ReadCacheFile);
        }
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    fn on_name_owner_changed(&mut self, change: NameOwnerChanged) {
        match change.new_owner.filter(|owner| !owner.is_empty()) {
            None => self.on_name_lost(),
            Some(owner) => {
                // A hand-off to a new owner is an exit followed by a start.
                if self.running {
                    self.on_name_lost();
                }
                tracing::debug!(manager = %self.name, owner = %owner, "manager running");
                self.running = true;
                self.emit(ManagerEvent::Activated);
                self.schedule(Deferred::Introspect);
            }
        }

        if !self.name_known {
            self.schedule(Deferred::ReadCacheFile);
            if self.want_activation {
                self.schedule(Deferred::Introspect);
            }
            self.name_known = true;
        }
        self.publish();
    }

    /// Without a first report the owner is unknowable, so carry on as if the
    /// name were unowned: the cache file, then activation, can still answer.
    fn on_owner_watch_closed(&mut self) {
        tracing::warn!(manager = %self.name, "name owner watch closed");
        self.owner_watch = None;
        if !self.name_known {
            self.on_name_owner_changed(NameOwnerChanged {
                bus_name: self.bus_name.clone(),
                new_owner: None,
            });
        }
    }

    fn on_name_lost(&mut self) {
        self.running = false;
        if self.introspection.is_calling() {
            let err = BusError::name_owner_lost(format!(
                "{} exited during introspection",
                self.bus_name
            ));
            self.end_introspection(Some(ManagerError::NameOwnerLost(err)));
        }
        if self.name_known {
            tracing::debug!(manager = %self.name, "manager exited");
            self.emit(ManagerEvent::Exited);
        }
    }

    // -----------------------------------------------------------------------
    // Deferred work
    // -----------------------------------------------------------------------

    fn schedule(&mut self, step: Deferred) {
        if !self.deferred.contains(&step) {
            self.deferred.push_back(step);
        }
    }

    fn run_deferred(&mut self) {
        while let Some(step) = self.deferred.pop_front() {
            match step {
                Deferred::ReadCacheFile => self.read_cache_file(),
                Deferred::Introspect => self.idle_introspect(),
            }
        }
    }

    fn read_cache_file(&mut self) {
        if self.info_source != InfoSource::None || self.cache_read.is_some() {
            return;
        }
        let Some(path) = self.cache_path.clone() else {
            tracing::debug!(manager = %self.name, "no cache file, activating instead");
            self.schedule(Deferred::Introspect);
            return;
        };

        tracing::debug!(manager = %self.name, path = %path.display(), "reading cache file");
        let reader = self.ctx.reader.clone();
        let name = self.name.clone();
        self.cache_read = Some(tokio::task::spawn_blocking(move || reader.read(&name, &path)));
    }

    fn on_cache_read(&mut self, joined: Result<Result<ManagerDescription, CoreError>, JoinError>) {
        self.cache_read = None;
        let failure = match joined {
            Ok(Ok(description)) => {
                if !InfoSource::File.supersedes(self.info_source) {
                    tracing::debug!(
                        manager = %self.name,
                        current = %self.info_source,
                        "cache file superseded by fresher information",
                    );
                    return;
                }
                tracing::debug!(
                    manager = %self.name,
                    protocols = description.protocols.len(),
                    "got info from cache file",
                );
                self.install(InfoSource::File, description);
                self.emit(ManagerEvent::GotInfo(self.info_source));
                self.resolve_ready(None);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(err) if err.is_cancelled() => return,
            Err(err) => format!("cache read task failed: {err}"),
        };

        if let Some(err) = self.held_failure.take() {
            tracing::debug!(manager = %self.name, reason = %failure, "cache file unavailable");
            self.resolve_ready(Some(err));
            return;
        }
        tracing::debug!(
            manager = %self.name,
            reason = %failure,
            "cache file unavailable, activating instead",
        );
        if self.info_source == InfoSource::None {
            self.schedule(Deferred::Introspect);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    fn idle_introspect(&mut self) {
        if self.introspection.is_calling() {
            return;
        }
        if !self.always_introspect && self.info_source != InfoSource::None {
            return;
        }
        self.start_introspection();
    }

    fn start_introspection(&mut self) {
        tracing::debug!(manager = %self.name, "calling GetAll");
        self.gate.reopen();

        let timeout = self.ctx.config.call_timeout();
        let call = MethodCall::get_all(
            self.bus_name.clone(),
            self.object_path.clone(),
            &self.ctx.config.manager_interface,
            timeout,
        );
        let bus = self.ctx.bus.clone();
        let pending: PendingCall = Box::pin(async move {
            bus::with_timeout("GetAll", timeout, bus.call_method(call)).await
        });

        self.introspection = Introspection::Calling {
            call: pending,
            staging: ProtocolSet::new(),
        };
    }

    fn on_introspection_reply(&mut self, reply: Result<Value, BusError>) {
        let previous = std::mem::replace(&mut self.introspection, Introspection::Idle);
        let Introspection::Calling { mut staging, .. } = previous else {
            return;
        };

        let decoded = reply
            .map_err(ManagerError::Transport)
            .and_then(|value| stage_get_all_reply(&self.name, value, &mut staging));
        match decoded {
            Ok(interfaces) => {
                tracing::info!(
                    manager = %self.name,
                    protocols = staging.len(),
                    "got live information",
                );
                self.install(
                    InfoSource::Live,
                    ManagerDescription {
                        interfaces,
                        protocols: staging,
                    },
                );
                self.end_introspection(None);
            }
            Err(err) => {
                tracing::debug!(manager = %self.name, error = %err, "introspection failed");
                if self.info_source == InfoSource::None && !self.running {
                    self.emit(ManagerEvent::Exited);
                }
                self.end_introspection(Some(err));
            }
        }
    }

    /// Drop any outstanding call, report what we now know and answer the
    /// waiters.
    fn end_introspection(&mut self, error: Option<ManagerError>) {
        self.introspection = Introspection::Idle;
        tracing::debug!(manager = %self.name, source = %self.info_source, "end of introspection");
        self.emit(ManagerEvent::GotInfo(self.info_source));
        self.resolve_ready(error);
    }

    /// Answer the waiters. A failure with a cache read still pending is held
    /// back until that read has had its say.
    fn resolve_ready(&mut self, error: Option<ManagerError>) {
        let outcome = if self.info_source > InfoSource::None {
            self.held_failure = None;
            Ok(())
        } else {
            let err = error.unwrap_or(ManagerError::NoInformation);
            if self.cache_read.is_some() || self.deferred.contains(&Deferred::ReadCacheFile) {
                tracing::debug!(
                    manager = %self.name,
                    error = %err,
                    waiters = self.gate.waiting(),
                    "holding failure until the cache file is read",
                );
                self.held_failure = Some(err);
                return;
            }
            Err(err)
        };
        let answered = self.gate.resolve(outcome);
        if answered > 0 {
            tracing::debug!(manager = %self.name, waiters = answered, "readiness resolved");
        }
    }

    /// Publish a description. Callers have checked that `source` may
    /// replace what is held.
    fn install(&mut self, source: InfoSource, description: ManagerDescription) {
        let mut interfaces = (*self.interfaces).clone();
        for interface in description.interfaces {
            if !interfaces.contains(&interface) {
                interfaces.push(interface);
            }
        }
        self.interfaces = Arc::new(interfaces);
        self.protocols = Arc::new(description.protocols);
        self.info_source = freshness::merge(self.info_source, source);
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    fn emit(&self, event: ManagerEvent) {
        tracing::trace!(manager = %self.name, event = %event, "event");
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.state.send_replace(ManagerSnapshot {
            running: self.running,
            info_source: self.info_source,
            protocols: self.protocols.clone(),
            interfaces: self.interfaces.clone(),
            cache_file: self.cache_path.clone(),
            always_introspect: self.always_introspect,
        });
    }

    fn dispose(mut self) {
        tracing::debug!(manager = %self.name, "disposing manager proxy");
        self.introspection = Introspection::Idle;
        if let Some(read) = self.cache_read.take() {
            read.abort();
        }
        self.deferred.clear();
        self.held_failure = None;
        if self.owner_watch.take().is_some() {
            self.ctx.bus.cancel_watch(&self.bus_name, self.watch_id);
        }

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::RequestReady(waiter) = command {
                let _ = waiter.send(Err(ManagerError::Disposed));
            }
        }
        self.gate.close(ManagerError::Disposed);
    }
}

fn resolve_cache_file(
    ctx: &ProxyContext,
    name: &ServiceName,
    setting: &CacheFile,
) -> Option<PathBuf> {
    match setting {
        CacheFile::Search => paths::find_manager_file_in(&ctx.search_dirs, &ctx.config, name),
        CacheFile::Path(path) => Some(path.clone()),
        CacheFile::Disabled => None,
    }
}

async fn next_owner_change(watch: &mut Option<NameOwnerWatch>) -> Option<NameOwnerChanged> {
    match watch {
        Some(watch) => watch.changes.recv().await,
        None => pending().await,
    }
}

async fn poll_call(introspection: &mut Introspection) -> Result<Value, BusError> {
    match introspection {
        Introspection::Calling { call, .. } => call.await,
        Introspection::Idle => pending().await,
    }
}

async fn poll_cache_read(
    read: &mut Option<PendingRead>,
) -> Result<Result<ManagerDescription, CoreError>, JoinError> {
    match read {
        Some(handle) => handle.await,
        None => pending().await,
    }
}
