//! Connection manager: one logical WebSocket with reconnection and keepalive

use super::backoff::reconnect_delay;
use super::endpoint;
use super::listeners::{dispatch, Listener, ListenerRegistry};
use super::transport::{Connector, Outbound, TransportEvent, TungsteniteConnector};
use super::types::{
    CloseFrame, ConnectOptions, Event, EventKind, ManagerConfig, MessagePayload, Outgoing,
    PingFrame, ReadyState, WsError, DEFAULT_PING_INTERVAL,
};
use crate::telemetry::{increment, record_reconnect_delay, CounterMetric};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

/// Owns at most one transport at a time and fans its events out to listeners.
///
/// Cheap to clone; clones share the same connection. Dropping the last clone
/// closes the transport and cancels every timer. `connect` and the timers
/// spawn tokio tasks, so the manager must be driven from within a runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    listeners: Mutex<ListenerRegistry>,
}

#[derive(Default)]
struct State {
    /// Bumped on every dial and every disconnect
    generation: u64,
    transport: Option<ActiveTransport>,
    is_connected: bool,
    reconnect_attempts: u32,
    open_timeout: Option<JoinHandle<()>>,
    ping: Option<JoinHandle<()>>,
    pending_reconnect: Option<JoinHandle<()>>,
}

struct ActiveTransport {
    generation: u64,
    url: String,
    options: ConnectOptions,
    ready_state: ReadyState,
    outbound: mpsc::UnboundedSender<Outbound>,
    pump: JoinHandle<()>,
}

impl State {
    fn current(&mut self, generation: u64) -> Option<&mut ActiveTransport> {
        self.transport
            .as_mut()
            .filter(|transport| transport.generation == generation)
    }

    fn clear_ping(&mut self) {
        if let Some(ping) = self.ping.take() {
            ping.abort();
        }
    }

    fn clear_open_timeout(&mut self) {
        if let Some(timeout) = self.open_timeout.take() {
            timeout.abort();
        }
    }

    /// Close and discard the transport, cancelling every timer
    fn teardown(&mut self) {
        self.generation += 1;
        self.clear_ping();
        self.clear_open_timeout();
        if let Some(pending) = self.pending_reconnect.take() {
            pending.abort();
        }

        if let Some(transport) = self.transport.take() {
            if matches!(
                transport.ready_state,
                ReadyState::Open | ReadyState::Connecting
            ) {
                let _ = transport
                    .outbound
                    .send(Outbound::Close(CloseFrame::client_disconnect()));
            }
            transport.pump.abort();
        }
        self.is_connected = false;
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state.get_mut().teardown();
    }
}

impl ConnectionManager {
    /// Create a manager backed by tokio-tungstenite
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }

    /// Create a manager with a custom transport connector
    pub fn with_connector(config: ManagerConfig, connector: impl Connector) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                connector: Arc::new(connector),
                state: Mutex::new(State::default()),
                listeners: Mutex::new(ListenerRegistry::new()),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// True between a successful open and the next close
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.state.lock().reconnect_attempts
    }

    /// Ready state of the current transport, if any
    pub fn ready_state(&self) -> Option<ReadyState> {
        self.shared
            .state
            .lock()
            .transport
            .as_ref()
            .map(|transport| transport.ready_state)
    }

    /// Connect to `url`, replacing any existing connection.
    ///
    /// Fails without creating a transport when the URL is not an acceptable
    /// `wss://` endpoint; the failure is also reported as an `Error` event.
    pub fn connect(&self, url: &str, options: ConnectOptions) -> Result<(), WsError> {
        {
            let mut state = self.shared.state.lock();
            state.teardown();
            state.reconnect_attempts = 0;
        }
        self.establish(url, options)
    }

    /// Close the connection without reconnecting. Safe to call at any time.
    pub fn disconnect(&self) {
        let had_transport = {
            let mut state = self.shared.state.lock();
            let had_transport = state.transport.is_some();
            state.teardown();
            had_transport
        };

        if had_transport {
            tracing::info!("WebSocket disconnected by client");
        }
    }

    /// Send text verbatim or a JSON value serialized.
    ///
    /// Nothing is transmitted unless the connection is open; frames are
    /// never queued for a later open.
    pub fn send(&self, data: impl Into<Outgoing>) -> Result<(), WsError> {
        let outbound = {
            let state = self.shared.state.lock();
            state
                .transport
                .as_ref()
                .filter(|transport| {
                    state.is_connected && transport.ready_state == ReadyState::Open
                })
                .map(|transport| transport.outbound.clone())
        };

        let Some(outbound) = outbound else {
            increment(CounterMetric::SendFailures);
            tracing::error!("WebSocket not connected, cannot send message");
            return Err(WsError::NotConnected);
        };

        let text = match data.into() {
            Outgoing::Text(text) => text,
            Outgoing::Json(value) => {
                serde_json::to_string(&value).map_err(|e| WsError::Serialize(e.to_string()))?
            }
        };

        if outbound.send(Outbound::Text(text)).is_err() {
            increment(CounterMetric::SendFailures);
            tracing::error!("Error sending WebSocket message: transport task has stopped");
            return Err(WsError::SendFailed("transport task has stopped".to_string()));
        }

        increment(CounterMetric::MessagesSent);
        Ok(())
    }

    /// Serialize any value to JSON and send it
    pub fn send_json<T: Serialize>(&self, data: &T) -> Result<(), WsError> {
        let value = serde_json::to_value(data).map_err(|e| WsError::Serialize(e.to_string()))?;
        self.send(Outgoing::Json(value))
    }

    /// Register a listener for one event kind
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.shared.listeners.lock().add(kind, listener);
    }

    /// Remove the first registration of `listener`; unknown listeners are ignored
    pub fn off(&self, kind: EventKind, listener: &Listener) {
        self.shared.listeners.lock().remove(kind, listener);
    }

    fn emit(&self, event: Event) {
        let listeners = self.shared.listeners.lock().snapshot(event.kind());
        dispatch(&listeners, &event);
    }

    fn weak(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// Validate the URL, dial it and arm the open timeout. Leaves the retry
    /// counter alone so scheduled reconnections keep their place in the backoff.
    fn establish(&self, url: &str, options: ConnectOptions) -> Result<(), WsError> {
        let url = match endpoint::normalize(url, &self.shared.config) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Invalid WebSocket URL. Must start with wss://");
                self.emit(Event::Error(e.clone()));
                return Err(e);
            }
        };

        tracing::info!(url = %url, "Attempting to connect to WebSocket");
        let link = self.shared.connector.dial(&url);

        let mut state = self.shared.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let pump = tokio::spawn(Self::pump_events(self.weak(), generation, link.events));

        let weak = self.weak();
        let deadline = Instant::now() + self.shared.config.open_timeout;
        state.open_timeout = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(manager) = Self::upgrade(&weak) {
                manager.handle_open_timeout(generation);
            }
        }));

        state.transport = Some(ActiveTransport {
            generation,
            url,
            options,
            ready_state: ReadyState::Connecting,
            outbound: link.outbound,
            pump,
        });

        Ok(())
    }

    /// Forward one transport's events to the handlers, in order
    async fn pump_events(
        weak: Weak<Shared>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(manager) = Self::upgrade(&weak) else {
                break;
            };
            let closed = matches!(event, TransportEvent::Close(_));

            match event {
                TransportEvent::Open => manager.handle_open(generation),
                TransportEvent::Text(text) => {
                    manager.handle_message(generation, MessagePayload::decode(text))
                }
                TransportEvent::Binary(data) => {
                    manager.handle_message(generation, MessagePayload::Binary(data))
                }
                TransportEvent::Error(detail) => manager.handle_error(generation, detail),
                TransportEvent::Close(frame) => manager.handle_close(generation, frame),
            }

            if closed {
                break;
            }
        }
    }

    fn handle_open(&self, generation: u64) {
        let options = {
            let mut state = self.shared.state.lock();
            let Some(transport) = state.current(generation) else {
                tracing::debug!(generation, "Ignoring open from superseded transport");
                return;
            };
            if transport.ready_state != ReadyState::Connecting {
                // Open timeout already fired; the close that follows drives retry
                tracing::debug!(generation, "Ignoring open from closing transport");
                return;
            }
            transport.ready_state = ReadyState::Open;
            let options = transport.options;
            state.clear_open_timeout();
            state.is_connected = true;
            state.reconnect_attempts = 0;
            options
        };

        tracing::info!("WebSocket connection established");
        increment(CounterMetric::ConnectionsOpened);
        self.emit(Event::Open);

        if options.enable_ping {
            self.start_ping_interval(generation, options.ping_interval);
        }
    }

    fn handle_message(&self, generation: u64, payload: MessagePayload) {
        if self.shared.state.lock().current(generation).is_none() {
            tracing::debug!(generation, "Ignoring frame from superseded transport");
            return;
        }

        increment(CounterMetric::MessagesReceived);
        self.emit(Event::Message(payload));
    }

    fn handle_error(&self, generation: u64, detail: String) {
        if self.shared.state.lock().current(generation).is_none() {
            return;
        }

        tracing::error!(error = %detail, "WebSocket error");
        self.emit(Event::Error(WsError::Transport(detail)));
    }

    fn handle_open_timeout(&self, generation: u64) {
        {
            let mut state = self.shared.state.lock();
            let Some(transport) = state.current(generation) else {
                return;
            };
            if transport.ready_state == ReadyState::Open {
                return;
            }
            transport.ready_state = ReadyState::Closing;
            let _ = transport
                .outbound
                .send(Outbound::Close(CloseFrame::open_timeout()));
            state.open_timeout = None;
        }

        tracing::warn!("WebSocket connection timeout - closing socket");
        self.emit(Event::Error(WsError::ConnectTimeout(
            self.shared.config.open_timeout,
        )));
    }

    fn handle_close(&self, generation: u64, frame: CloseFrame) {
        let (url, options) = {
            let mut state = self.shared.state.lock();
            if state.current(generation).is_none() {
                tracing::debug!(generation, code = frame.code, "Ignoring close from superseded transport");
                return;
            }
            state.clear_open_timeout();
            state.clear_ping();
            state.is_connected = false;
            match state.transport.take() {
                Some(transport) => (transport.url, transport.options),
                None => return,
            }
        };

        tracing::info!(code = frame.code, reason = %frame.reason, "WebSocket connection closed");
        increment(CounterMetric::ConnectionsClosed);
        let retry = frame.triggers_reconnect();
        self.emit(Event::Close(frame));

        if retry {
            self.schedule_reconnect(generation, url, options);
        }
    }

    fn schedule_reconnect(&self, generation: u64, url: String, options: ConnectOptions) {
        let max_attempts = self.shared.config.max_reconnect_attempts;

        let mut state = self.shared.state.lock();
        // A listener reacting to the close may already have reconnected or disconnected
        if state.generation != generation || state.transport.is_some() {
            return;
        }

        if state.reconnect_attempts >= max_attempts {
            let attempts = state.reconnect_attempts;
            drop(state);
            tracing::warn!(attempts, "Maximum reconnect attempts reached");
            self.emit(Event::MaxReconnectAttemptsReached { attempts });
            return;
        }

        let delay = reconnect_delay(
            self.shared.config.reconnect_delay_base,
            state.reconnect_attempts,
            self.shared.config.max_reconnect_delay,
        );
        state.reconnect_attempts += 1;

        tracing::info!(
            attempt = state.reconnect_attempts,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Attempting to reconnect"
        );
        increment(CounterMetric::ReconnectsScheduled);
        record_reconnect_delay(delay);

        let weak = self.weak();
        let deadline = Instant::now() + delay;
        if let Some(previous) = state.pending_reconnect.replace(tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(manager) = Self::upgrade(&weak) {
                manager.reconnect(generation, &url, options);
            }
        })) {
            previous.abort();
        }
    }

    fn reconnect(&self, generation: u64, url: &str, options: ConnectOptions) {
        {
            let mut state = self.shared.state.lock();
            if state.generation != generation || state.transport.is_some() {
                return;
            }
            // Detach rather than abort: this is the task running right now
            state.pending_reconnect.take();
            state.clear_ping();
        }

        // The URL validated once already; a failure here is reported by establish
        let _ = self.establish(url, options);
    }

    fn start_ping_interval(&self, generation: u64, period: Duration) {
        // `ConnectOptions` fields are public, so a zero interval can bypass the builder
        let period = if period.is_zero() {
            DEFAULT_PING_INTERVAL
        } else {
            period
        };
        let weak = self.weak();
        let start = Instant::now() + period;
        let ping = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(manager) = Self::upgrade(&weak) else {
                    break;
                };
                if !manager.send_ping(generation) {
                    break;
                }
            }
        });

        let mut state = self.shared.state.lock();
        if state.current(generation).is_some() && state.is_connected {
            if let Some(previous) = state.ping.replace(ping) {
                previous.abort();
            }
        } else {
            // Closed while listeners ran
            ping.abort();
        }
    }

    /// Send one keepalive frame; false once the connection is gone
    fn send_ping(&self, generation: u64) -> bool {
        let mut state = self.shared.state.lock();
        let is_connected = state.is_connected;

        let Some(transport) = state.current(generation) else {
            return false;
        };
        if !is_connected || transport.ready_state != ReadyState::Open {
            state.ping = None;
            return false;
        }

        match serde_json::to_string(&PingFrame::now()) {
            Ok(text) => {
                if transport.outbound.send(Outbound::Text(text)).is_err() {
                    tracing::error!("Error sending ping: transport task has stopped");
                } else {
                    increment(CounterMetric::PingsSent);
                }
            }
            Err(e) => tracing::error!(error = %e, "Error sending ping"),
        }
        true
    }
}
