//! An in-process bus with scripted services.
//!
//! Used by the test suites and by `rollcall` when it has no system bus to
//! talk to. Calling a registered, activatable name that nobody owns gives it
//! an owner first, the way bus activation does.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::{
    BusClient, MethodCall, NameOwnerChanged, NameOwnerWatch, WatchId, PROPERTIES_INTERFACE,
};
use crate::error::BusError;

pub const BUS_DAEMON_NAME: &str = "org.freedesktop.DBus";

/// How a registered service answers `GetAll`.
#[derive(Debug, Clone)]
pub struct MemoryService {
    reply: Result<Value, BusError>,
    activatable: bool,
    delay: Option<Duration>,
}

impl MemoryService {
    /// An activatable service answering with `reply`.
    pub fn replying(reply: Value) -> Self {
        Self {
            reply: Ok(reply),
            activatable: true,
            delay: None,
        }
    }

    /// An activatable service whose activation fails with `error`. If it is
    /// given an owner by hand, calls fail with the same error.
    pub fn failing(error: BusError) -> Self {
        Self {
            reply: Err(error),
            activatable: true,
            delay: None,
        }
    }

    /// Only reachable while something owns the name.
    pub fn not_activatable(mut self) -> Self {
        self.activatable = false;
        self
    }

    /// Hold every reply for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct BusState {
    services: BTreeMap<String, MemoryService>,
    owners: BTreeMap<String, String>,
    watchers: BTreeMap<String, Vec<(WatchId, mpsc::UnboundedSender<NameOwnerChanged>)>>,
    calls: BTreeMap<String, usize>,
    enumeration_error: Option<BusError>,
    next_watch: u64,
    next_unique: u64,
}

impl BusState {
    fn assign_owner(&mut self, bus_name: &str) -> String {
        self.next_unique += 1;
        let unique = format!(":1.{}", self.next_unique);
        self.owners.insert(bus_name.to_owned(), unique.clone());
        self.notify(bus_name, Some(unique.clone()));
        unique
    }

    fn notify(&mut self, bus_name: &str, new_owner: Option<String>) {
        let Some(watchers) = self.watchers.get_mut(bus_name) else {
            return;
        };
        watchers.retain(|(_, tx)| {
            tx.send(NameOwnerChanged {
                bus_name: bus_name.to_owned(),
                new_owner: new_owner.clone(),
            })
            .is_ok()
        });
    }
}

#[derive(Default)]
pub struct MemoryBus {
    state: Mutex<BusState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_service(&self, bus_name: impl Into<String>, service: MemoryService) {
        self.lock().services.insert(bus_name.into(), service);
    }

    pub fn set_reply(&self, bus_name: &str, reply: Value) {
        if let Some(service) = self.lock().services.get_mut(bus_name) {
            service.reply = Ok(reply);
        }
    }

    /// Give `bus_name` a fresh owner. An already-owned name is handed over
    /// in a single ownership report.
    pub fn set_owner(&self, bus_name: &str) -> String {
        self.lock().assign_owner(bus_name)
    }

    /// Drop the owner of `bus_name`, if any.
    pub fn release(&self, bus_name: &str) {
        let mut state = self.lock();
        if state.owners.remove(bus_name).is_some() {
            state.notify(bus_name, None);
        }
    }

    pub fn owner_of(&self, bus_name: &str) -> Option<String> {
        self.lock().owners.get(bus_name).cloned()
    }

    /// Method calls addressed to `bus_name` so far.
    pub fn call_count(&self, bus_name: &str) -> usize {
        self.lock().calls.get(bus_name).copied().unwrap_or(0)
    }

    pub fn watcher_count(&self, bus_name: &str) -> usize {
        self.lock().watchers.get(bus_name).map_or(0, Vec::len)
    }

    /// Make both listing calls fail with `error` until cleared with `None`.
    pub fn fail_enumeration(&self, error: Option<BusError>) {
        self.lock().enumeration_error = error;
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    fn watch_name_owner(&self, bus_name: &str) -> NameOwnerWatch {
        let mut state = self.lock();
        state.next_watch += 1;
        let id = WatchId(state.next_watch);
        let (tx, changes) = mpsc::unbounded_channel();
        let _ = tx.send(NameOwnerChanged {
            bus_name: bus_name.to_owned(),
            new_owner: state.owners.get(bus_name).cloned(),
        });
        state
            .watchers
            .entry(bus_name.to_owned())
            .or_default()
            .push((id, tx));
        NameOwnerWatch { id, changes }
    }

    fn cancel_watch(&self, bus_name: &str, id: WatchId) {
        let mut state = self.lock();
        if let Some(watchers) = state.watchers.get_mut(bus_name) {
            watchers.retain(|(watch, _)| *watch != id);
            if watchers.is_empty() {
                state.watchers.remove(bus_name);
            }
        }
    }

    async fn list_activatable_names(&self, _timeout: Duration) -> Result<Vec<String>, BusError> {
        let state = self.lock();
        if let Some(err) = &state.enumeration_error {
            return Err(err.clone());
        }
        let mut names = vec![BUS_DAEMON_NAME.to_owned()];
        names.extend(
            state
                .services
                .iter()
                .filter(|(_, service)| service.activatable)
                .map(|(name, _)| name.clone()),
        );
        Ok(names)
    }

    async fn list_names(&self, _timeout: Duration) -> Result<Vec<String>, BusError> {
        let state = self.lock();
        if let Some(err) = &state.enumeration_error {
            return Err(err.clone());
        }
        let mut names = vec![BUS_DAEMON_NAME.to_owned()];
        names.extend(state.owners.values().cloned());
        names.extend(state.owners.keys().cloned());
        Ok(names)
    }

    async fn call_method(&self, call: MethodCall) -> Result<Value, BusError> {
        let (reply, delay) = {
            let mut state = self.lock();
            *state.calls.entry(call.destination.clone()).or_default() += 1;

            let Some(service) = state.services.get(&call.destination).cloned() else {
                return Err(BusError::service_unknown(&call.destination));
            };
            if call.interface != PROPERTIES_INTERFACE || call.method != "GetAll" {
                return Err(BusError::unknown_method(&call.interface, &call.method));
            }
            if !state.owners.contains_key(&call.destination) {
                if !service.activatable {
                    return Err(BusError::service_unknown(&call.destination));
                }
                if let Err(err) = &service.reply {
                    return Err(BusError::spawn_failed(&call.destination, err.message.clone()));
                }
                state.assign_owner(&call.destination);
            }
            (service.reply, service.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}
