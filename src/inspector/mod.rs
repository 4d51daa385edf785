//! Remote inspector: registry of inspection targets and router of client requests.
//!
//! Inspector owns three maps keyed by target identifier: known targets, their listings
//! and active debug sessions (bridges). All of them are guarded by a single lock.
//! Listing changes are announced to the client with a coalesced broadcast: any number of
//! updates within the push delay produce a single `WIRListingMessage`.

pub mod connection;
pub mod listing;
pub mod target;
mod task;

pub use connection::ConnectionBridge;
pub use listing::Listing;
pub use target::{FrontendChannel, InspectionTarget, TargetIdentifier, TargetType};

use crate::config::Config;
use crate::error::Error;
use crate::inspector::listing::listing_payload;
use crate::inspector::task::DelayedTask;
use crate::protocol::{key, Dictionary, MessageName, Request, Value};
use crate::transport::{TcpTransport, Transport, TransportClient, TransportFactory};
use crate::weak_error;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use strum_macros::Display;

/// Default delay of a coalesced listing broadcast.
pub const DEFAULT_PUSH_DELAY: Duration = Duration::from_millis(200);

/// Reason of inspector stop.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum StopSource {
    #[strum(serialize = "api")]
    Api,
    #[strum(serialize = "signal")]
    Signal,
}

type SessionObserver = Box<dyn Fn(bool) + Send + Sync>;

/// Scheduled listing broadcast.
struct PendingPush {
    id: u64,
    _task: DelayedTask,
}

#[derive(Default)]
struct State {
    enabled: bool,
    transport: Option<Box<dyn Transport>>,
    targets: HashMap<TargetIdentifier, Weak<dyn InspectionTarget>>,
    listings: IndexMap<TargetIdentifier, Listing>,
    connections: HashMap<TargetIdentifier, Arc<ConnectionBridge>>,
    pending_push: Option<PendingPush>,
    next_push_id: u64,
    has_active_debug_session: bool,
}

struct Inner {
    this: Weak<Inner>,
    state: Mutex<State>,
    transport_factory: TransportFactory,
    push_delay: Duration,
    session_observer: Option<SessionObserver>,
}

/// Channel handed to a connected target, routes target messages to the remote client.
struct RemoteFrontendChannel {
    inspector: Weak<Inner>,
    target: TargetIdentifier,
}

impl FrontendChannel for RemoteFrontendChannel {
    fn send_message_to_frontend(&self, message: &str) {
        if let Some(inspector) = self.inspector.upgrade() {
            weak_error!(
                inspector.send_message_to_remote(self.target, message),
                "send message to remote:"
            );
        }
    }
}

/// Target call made after the state lock is released.
enum Deferred {
    Forward(Arc<ConnectionBridge>, String),
    Close(Arc<ConnectionBridge>),
}

fn close_bridges(bridges: Vec<Arc<ConnectionBridge>>) {
    for bridge in bridges {
        bridge.close();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.enabled {
            return Ok(());
        }
        self.setup_transport_if_needed(&mut state)?;
        state.enabled = true;
        info!(target: "inspector", "remote inspector started");
        Ok(())
    }

    fn setup_transport_if_needed(&self, state: &mut State) -> Result<(), Error> {
        if state.transport.is_some() {
            return Ok(());
        }
        let client = self.this.clone() as Weak<dyn TransportClient>;
        state.transport = Some((self.transport_factory)(client)?);
        self.push_listings_soon(state);
        Ok(())
    }

    fn stop(&self, source: StopSource) {
        let mut state = self.lock();
        if !state.enabled {
            return;
        }
        state.enabled = false;
        state.pending_push = None;

        let closed = self.remove_all_connections(&mut state);
        let transport = state.transport.take();
        drop(state);

        close_bridges(closed);
        if let Some(transport) = transport {
            transport.close();
        }
        info!(target: "inspector", "remote inspector stopped ({source})");
    }

    /// Remove every bridge and refresh listings of their targets.
    /// Removed bridges must be closed after the state lock is released.
    fn remove_all_connections(&self, state: &mut State) -> Vec<Arc<ConnectionBridge>> {
        let removed: Vec<_> = state.connections.drain().map(|(_, bridge)| bridge).collect();
        for bridge in &removed {
            self.update_listing(state, bridge.target_identifier());
        }
        self.update_has_active_debug_session(state);
        removed
    }

    fn target_updated(&self, target: Arc<dyn InspectionTarget>) {
        let target_identifier = target.target_identifier();
        if target_identifier == 0 {
            return;
        }

        let mut state = self.lock();
        state
            .targets
            .insert(target_identifier, Arc::downgrade(&target));
        self.update_listing(&mut state, target_identifier);
        self.push_listings_soon(&mut state);
    }

    fn unregister_target(&self, target_identifier: TargetIdentifier) {
        if target_identifier == 0 {
            return;
        }

        let mut state = self.lock();
        state.targets.remove(&target_identifier);
        state.listings.shift_remove(&target_identifier);
        if let Some(bridge) = state.connections.remove(&target_identifier) {
            bridge.target_closed();
            self.update_has_active_debug_session(&mut state);
        }
        self.push_listings_soon(&mut state);
    }

    /// Recompute listing of a target. Listing exists only while target allows remote debugging.
    fn update_listing(&self, state: &mut State, target_identifier: TargetIdentifier) {
        let Some(target) = state
            .targets
            .get(&target_identifier)
            .and_then(Weak::upgrade)
        else {
            state.listings.shift_remove(&target_identifier);
            return;
        };

        let connection = state
            .connections
            .get(&target_identifier)
            .map(|bridge| bridge.connection_identifier());
        match Listing::for_target(target.as_ref(), connection) {
            Ok(Some(listing)) => {
                state.listings.insert(target_identifier, listing);
            }
            Ok(None) => {
                state.listings.shift_remove(&target_identifier);
            }
            Err(e) => {
                warn!(target: "inspector", "target {target_identifier}: {e}");
                state.listings.shift_remove(&target_identifier);
            }
        }
    }

    fn update_has_active_debug_session(&self, state: &mut State) {
        let has_active_debug_session = !state.connections.is_empty();
        if has_active_debug_session == state.has_active_debug_session {
            return;
        }
        state.has_active_debug_session = has_active_debug_session;
        debug!(target: "inspector", "active debug session: {has_active_debug_session}");
        if let Some(observer) = &self.session_observer {
            observer(has_active_debug_session);
        }
    }

    fn dispatch(&self, message: &Dictionary) {
        let Some(request) = Request::parse(message) else {
            return;
        };

        let mut state = self.lock();
        if !state.enabled || state.transport.is_none() {
            debug!(target: "inspector", "drop request: inspector is stopped");
            return;
        }
        let deferred = match request {
            Request::Setup {
                target,
                connection,
                sender,
            } => {
                self.received_setup(&mut state, target, connection, sender);
                None
            }
            Request::Data { target, data } => {
                let bridge = state.connections.get(&target).cloned();
                if bridge.is_none() {
                    debug!(target: "inspector", "drop data for target {target}: no connection");
                }
                bridge.map(|bridge| Deferred::Forward(bridge, data))
            }
            Request::Close { target, connection } => self
                .received_close(&mut state, target, &connection)
                .map(Deferred::Close),
            Request::GetListing => {
                weak_error!(self.push_listings_now(&mut state), "push listings:");
                None
            }
        };
        drop(state);

        // target may answer synchronously through its frontend channel, so call it
        // without holding the lock
        match deferred {
            Some(Deferred::Forward(bridge, data)) => bridge.send_message_to_target(&data),
            Some(Deferred::Close(bridge)) => bridge.close(),
            None => {}
        }
    }

    fn received_setup(
        &self,
        state: &mut State,
        target_identifier: TargetIdentifier,
        connection_identifier: String,
        sender: String,
    ) {
        if state.connections.contains_key(&target_identifier) {
            debug!(
                target: "inspector",
                "reject setup of {connection_identifier}: target {target_identifier} already connected"
            );
            return;
        }
        let Some(target) = state.targets.get(&target_identifier).cloned() else {
            debug!(target: "inspector", "reject setup: unknown target {target_identifier}");
            return;
        };

        let channel = Arc::new(RemoteFrontendChannel {
            inspector: self.this.clone(),
            target: target_identifier,
        });
        let bridge = ConnectionBridge::new(
            target,
            target_identifier,
            connection_identifier,
            sender,
            channel,
        );
        if !bridge.setup(false, false) {
            bridge.close();
            return;
        }
        info!(
            target: "inspector",
            "connection {} to target {} established",
            bridge.connection_identifier(),
            bridge.target_identifier()
        );

        state
            .connections
            .insert(target_identifier, Arc::new(bridge));
        self.update_has_active_debug_session(state);
        self.update_listing(state, target_identifier);
        self.push_listings_soon(state);
    }

    fn received_close(
        &self,
        state: &mut State,
        target_identifier: TargetIdentifier,
        connection_identifier: &str,
    ) -> Option<Arc<ConnectionBridge>> {
        let bridge = state.connections.get(&target_identifier)?;
        if bridge.connection_identifier() != connection_identifier {
            debug!(
                target: "inspector",
                "ignore close of stale connection {connection_identifier} to target {target_identifier}"
            );
            return None;
        }

        let bridge = state.connections.remove(&target_identifier);
        info!(
            target: "inspector",
            "connection {connection_identifier} to target {target_identifier} closed"
        );
        self.update_has_active_debug_session(state);
        self.update_listing(state, target_identifier);
        self.push_listings_soon(state);
        bridge
    }

    fn close_client_connections(&self) {
        let mut state = self.lock();
        let closed = self.remove_all_connections(&mut state);
        if closed.is_empty() {
            return;
        }
        info!(target: "inspector", "client gone, {} connection(s) closed", closed.len());
        self.push_listings_soon(&mut state);
        drop(state);

        close_bridges(closed);
    }

    fn send_message_to_remote(
        &self,
        target_identifier: TargetIdentifier,
        message: &str,
    ) -> Result<(), Error> {
        let state = self.lock();
        let Some(transport) = state.transport.as_ref() else {
            return Ok(());
        };
        let Some(bridge) = state.connections.get(&target_identifier) else {
            return Ok(());
        };

        let mut payload = Dictionary::new();
        payload.insert(key::RAW_DATA.to_string(), Value::from(message));
        payload.insert(
            key::CONNECTION_IDENTIFIER.to_string(),
            Value::from(bridge.connection_identifier()),
        );
        payload.insert(
            key::DESTINATION.to_string(),
            Value::from(bridge.destination()),
        );
        transport.send_message(MessageName::RawData, payload)
    }

    /// Schedule a listing broadcast unless one is already pending.
    fn push_listings_soon(&self, state: &mut State) {
        if state.transport.is_none() || state.pending_push.is_some() {
            return;
        }

        let id = state.next_push_id;
        state.next_push_id += 1;
        let inspector = self.this.clone();
        let task = DelayedTask::schedule(self.push_delay, move || {
            if let Some(inspector) = inspector.upgrade() {
                inspector.scheduled_push(id);
            }
        });
        if let Some(task) = weak_error!(task, "schedule listing push:") {
            state.pending_push = Some(PendingPush { id, _task: task });
        }
    }

    fn scheduled_push(&self, id: u64) {
        let mut state = self.lock();
        // push may be already done (forced broadcast) or cancelled by stop
        if state.pending_push.as_ref().map(|push| push.id) != Some(id) {
            return;
        }
        weak_error!(self.push_listings_now(&mut state), "push listings:");
    }

    fn push_listings_now(&self, state: &mut State) -> Result<(), Error> {
        state.pending_push = None;
        let Some(transport) = state.transport.as_ref() else {
            return Ok(());
        };
        let payload = listing_payload(state.listings.values());
        debug!(target: "inspector", "push {} listing(s)", state.listings.len());
        transport.send_message(MessageName::Listing, payload)
    }
}

impl TransportClient for Inner {
    fn message_received(&self, message: Dictionary) {
        self.dispatch(&message);
    }

    fn client_connection_died(&self) {
        self.close_client_connections();
    }
}

/// Builder of [`RemoteInspector`].
pub struct RemoteInspectorBuilder {
    listen: SocketAddr,
    push_delay: Duration,
    transport_factory: Option<TransportFactory>,
    session_observer: Option<SessionObserver>,
}

impl Default for RemoteInspectorBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RemoteInspectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            listen: config.listen,
            push_delay: config.push_delay(),
            transport_factory: None,
            session_observer: None,
        }
    }

    /// Address of the TCP transport (ignored if custom transport is set).
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    pub fn push_delay(mut self, delay: Duration) -> Self {
        self.push_delay = delay;
        self
    }

    /// Use custom transport instead of a TCP one.
    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Set a callback called when inspector gets its first or loses its last debug session.
    /// Callback is called with the inspector state locked and must not call the inspector.
    pub fn on_active_session_change(
        mut self,
        observer: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        self.session_observer = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> RemoteInspector {
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| TcpTransport::factory(self.listen));
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            state: Mutex::new(State::default()),
            transport_factory,
            push_delay: self.push_delay,
            session_observer: self.session_observer,
        });
        RemoteInspector { inner }
    }
}

/// Remote inspector session. Stopped on drop.
pub struct RemoteInspector {
    inner: Arc<Inner>,
}

impl RemoteInspector {
    pub fn builder() -> RemoteInspectorBuilder {
        RemoteInspectorBuilder::new()
    }

    /// Create inspector with TCP transport configured by `config`.
    pub fn new(config: &Config) -> Self {
        RemoteInspectorBuilder::from_config(config).build()
    }

    /// Enable inspector and create transport. No-op if already started.
    /// On transport failure inspector stays disabled.
    pub fn start(&self) -> Result<(), Error> {
        self.inner.start()
    }

    /// Close all debug sessions and transport. No-op if not started.
    pub fn stop(&self, source: StopSource) {
        self.inner.stop(source)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    /// Address of the transport, if started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .transport
            .as_ref()
            .and_then(|transport| transport.local_addr())
    }

    /// Register a target or refresh its state. Targets with zero identifier are ignored.
    pub fn target_updated(&self, target: Arc<dyn InspectionTarget>) {
        self.inner.target_updated(target)
    }

    /// Forget a target, its debug session (if any) is dropped without target disconnect.
    pub fn unregister_target(&self, target_identifier: TargetIdentifier) {
        self.inner.unregister_target(target_identifier)
    }

    /// Route a decoded top level message. Malformed and unknown messages are dropped.
    pub fn dispatch(&self, message: &Dictionary) {
        self.inner.dispatch(message)
    }

    /// Close all debug sessions of a disconnected client. Targets stay registered.
    pub fn client_connection_died(&self) {
        self.inner.close_client_connections()
    }

    /// Send a target message to the remote client. No-op without transport or session.
    pub fn send_message_to_remote(
        &self,
        target_identifier: TargetIdentifier,
        message: &str,
    ) -> Result<(), Error> {
        self.inner.send_message_to_remote(target_identifier, message)
    }

    /// Schedule a coalesced listing broadcast.
    pub fn push_listings_soon(&self) {
        let mut state = self.inner.lock();
        self.inner.push_listings_soon(&mut state)
    }

    /// Broadcast all listings right now.
    pub fn push_listings_now(&self) -> Result<(), Error> {
        let mut state = self.inner.lock();
        self.inner.push_listings_now(&mut state)
    }

    pub fn listing(&self, target_identifier: TargetIdentifier) -> Option<Listing> {
        self.inner.lock().listings.get(&target_identifier).cloned()
    }

    pub fn has_connection(&self, target_identifier: TargetIdentifier) -> bool {
        self.inner
            .lock()
            .connections
            .contains_key(&target_identifier)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn has_active_debug_session(&self) -> bool {
        self.inner.lock().has_active_debug_session
    }
}

impl Drop for RemoteInspector {
    fn drop(&mut self) {
        self.stop(StopSource::Api);
    }
}
