//! Feed connection state machine.
//!
//! `FeedConnection` owns at most one transport at a time. It validates the
//! topic selection and credentials, opens the transport through a
//! [`Connector`], subscribes once the transport reports open, and routes
//! inbound table messages into the shared [`BookStore`] and [`TickerStore`].
//!
//! Nothing here retries on its own: after a close, calling `connect()` again
//! is the caller's decision.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use crate::engine::store::BookStore;
use crate::engine::types::now_ms;
use crate::error::FeedError;
use crate::market_data::adapters::bitmex::{self, Credentials, Environment};
use crate::market_data::adapters::bitmex_types::{FeedMessage, SubscribeRequest};
use crate::market_data::adapters::{Connector, EventReceiver, EventSender, Transport, TransportEvent, CLOSE_NORMAL};
use crate::market_data::ticker::TickerStore;

const ACTIVITY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub connecting: bool,
    pub message_count: u64,
    pub last_update: Option<u64>,
    pub error: Option<String>,
}

impl ConnectionState {
    pub fn status(&self) -> LinkStatus {
        if self.connected {
            LinkStatus::Connected
        } else if self.connecting {
            LinkStatus::Connecting
        } else {
            LinkStatus::Disconnected
        }
    }
}

/// Ordered topic -> enabled map. Order is kept so the subscribe request
/// lists topics the way they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSelection {
    topics: Vec<(String, bool)>,
}

impl TopicSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order book and instruments on, everything else available but off.
    pub fn bitmex_defaults() -> Self {
        let mut sel = Self::new();
        sel.set("orderBookL2:XBTUSD", true);
        sel.set("trade:XBTUSD", false);
        sel.set("instrument", true);
        for table in bitmex::PRIVATE_TABLES {
            sel.set(table, false);
        }
        sel
    }

    pub fn set(&mut self, topic: &str, enabled: bool) {
        match self.topics.iter_mut().find(|(t, _)| t == topic) {
            Some((_, on)) => *on = enabled,
            None => self.topics.push((topic.to_string(), enabled)),
        }
    }

    /// Flip a topic (adding it enabled if unknown). Returns the new value.
    pub fn toggle(&mut self, topic: &str) -> bool {
        let enabled = !self.is_selected(topic);
        self.set(topic, enabled);
        enabled
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|(t, _)| t == topic)
    }

    pub fn is_selected(&self, topic: &str) -> bool {
        self.topics.iter().any(|(t, on)| t == topic && *on)
    }

    pub fn selected(&self) -> Vec<String> {
        self.topics.iter().filter(|(_, on)| *on).map(|(t, _)| t.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.topics.iter().map(|(t, on)| (t.as_str(), *on))
    }

    pub fn clear(&mut self) {
        for (_, on) in self.topics.iter_mut() {
            *on = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLine {
    pub at: u64,
    pub text: String,
}

/// Bounded history of connection activity for status displays.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    lines: VecDeque<ActivityLine>,
}

impl ActivityLog {
    pub fn push(&mut self, text: impl Into<String>) {
        if self.lines.len() == ACTIVITY_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(ActivityLine { at: now_ms(), text: text.into() });
    }

    pub fn lines(&self) -> impl Iterator<Item = &ActivityLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub struct FeedConnection {
    environment: Environment,
    url_override: Option<String>,
    topics: TopicSelection,
    credentials: Credentials,
    state: ConnectionState,
    activity: ActivityLog,
    // topics captured at connect(), subscribed once the transport opens
    pending_topics: Vec<String>,
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    connector: Arc<dyn Connector>,
    events: EventSender,
    books: Arc<BookStore>,
    tickers: Arc<TickerStore>,
}

impl FeedConnection {
    /// Build a disconnected feed. Transport events arrive on the returned
    /// receiver and must be handed back through [`FeedConnection::handle_event`].
    pub fn new(connector: Arc<dyn Connector>, books: Arc<BookStore>, tickers: Arc<TickerStore>) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let feed = Self {
            environment: Environment::default(),
            url_override: None,
            topics: TopicSelection::bitmex_defaults(),
            credentials: Credentials::default(),
            state: ConnectionState::default(),
            activity: ActivityLog::default(),
            pending_topics: Vec::new(),
            transport: None,
            generation: 0,
            connector,
            events,
            books,
            tickers,
        };
        (feed, rx)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn topics(&self) -> &TopicSelection {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut TopicSelection {
        &mut self.topics
    }

    pub fn set_topics(&mut self, topics: TopicSelection) {
        self.topics = topics;
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    pub fn set_url_override(&mut self, url: Option<String>) {
        self.url_override = url;
    }

    pub fn books(&self) -> &Arc<BookStore> {
        &self.books
    }

    pub fn tickers(&self) -> &Arc<TickerStore> {
        &self.tickers
    }

    fn base_url(&self) -> &str {
        self.url_override.as_deref().unwrap_or(self.environment.url())
    }

    fn note(&mut self, text: String) {
        info!("{}", text);
        self.activity.push(text);
    }

    fn fail(&mut self, err: FeedError) -> FeedError {
        warn!(error = %err, "Feed connect rejected");
        self.state.error = Some(err.to_string());
        self.activity.push(format!("Error: {}", err));
        err
    }

    /// Validate the selection, tear down any live transport and open a new
    /// one. Validation failures are recorded in the state and nothing is
    /// opened.
    #[instrument(level = "debug", skip(self), fields(env = ?self.environment))]
    pub fn connect(&mut self) -> Result<(), FeedError> {
        let topics = self.topics.selected();
        if topics.is_empty() {
            return Err(self.fail(FeedError::NoTopicsSelected));
        }
        let needs_auth = topics.iter().any(|t| bitmex::is_private_topic(t));
        if needs_auth && !self.credentials.is_complete() {
            return Err(self.fail(FeedError::MissingCredentials));
        }
        let url = if needs_auth {
            bitmex::authenticated_url(self.base_url(), &self.credentials, now_ms() / 1000)
        } else {
            bitmex::plain_url(self.base_url())
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(mut old) = self.transport.take() {
            debug!(generation = self.generation, "Closing previous transport");
            old.close(CLOSE_NORMAL, "Reconnect");
        }
        self.generation += 1;
        self.state = ConnectionState { connecting: true, ..ConnectionState::default() };
        self.pending_topics = topics;
        self.note(format!("Connecting to {}", self.environment.name()));
        metrics::gauge!("bookfeed_connected").set(0.0);

        self.transport = Some(self.connector.open(url.as_str(), self.generation, self.events.clone()));
        Ok(())
    }

    /// Close the transport (if any) with a normal-closure code. Safe to call
    /// in any state.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close(CLOSE_NORMAL, "User disconnect");
        }
        self.state.connected = false;
        self.state.connecting = false;
        metrics::gauge!("bookfeed_connected").set(0.0);
        self.note("Disconnected".to_string());
    }

    /// Feed one transport event through the state machine. Events from a
    /// transport other than the current one are dropped.
    pub fn handle_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.transport.is_none() {
            trace!(generation, current = self.generation, "Ignoring event from stale transport");
            return;
        }
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(err) => self.on_error(err),
            TransportEvent::Closed(code) => self.on_close(code),
        }
    }

    fn on_open(&mut self) {
        self.note("Connected".to_string());
        let request = SubscribeRequest::new(&self.pending_topics);
        let sent = match serde_json::to_string(&request) {
            Ok(json) => match self.transport.as_mut() {
                Some(t) => t.send(json),
                None => Err(FeedError::TransportClosed),
            },
            Err(e) => Err(FeedError::Transport(e.to_string())),
        };
        match sent {
            Ok(()) => self.note(format!("Subscribed to {}", self.pending_topics.join(", "))),
            Err(e) => {
                warn!(error = %e, "Subscribe request not sent");
                self.state.error = Some(e.to_string());
            }
        }
        self.state.connected = true;
        self.state.connecting = false;
        metrics::gauge!("bookfeed_connected").set(1.0);
    }

    fn on_error(&mut self, err: String) {
        warn!(error = %err, "Transport error");
        self.activity.push(format!("WebSocket error: {}", err));
        self.state.error = Some(err);
        self.state.connecting = false;
    }

    fn on_close(&mut self, code: Option<u16>) {
        match code {
            Some(code) => self.note(format!("Closed ({})", code)),
            None => self.note("Closed".to_string()),
        }
        self.transport = None;
        self.state.connected = false;
        self.state.connecting = false;
        metrics::gauge!("bookfeed_connected").set(0.0);
    }

    fn on_message(&mut self, text: &str) {
        let msg = match FeedMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable message");
                self.activity.push(format!("Parse error {}", e));
                metrics::counter!("bookfeed_parse_errors_total").increment(1);
                return;
            }
        };
        match msg {
            FeedMessage::SubscribeAck(topic) => self.note(format!("✓ Subscribed: {}", topic)),
            FeedMessage::Info(info) => self.note(format!("Info: {}", info)),
            FeedMessage::Error(err) => {
                warn!(error = %err, "Feed reported an error");
                self.activity.push(format!("Error: {}", err));
            }
            FeedMessage::OrderBook(patch) => {
                self.books.apply(&patch);
            }
            FeedMessage::Instrument(rows) => {
                self.tickers.merge(&rows);
            }
            FeedMessage::Other => trace!("Unrouted message"),
        }
        self.state.message_count += 1;
        self.state.last_update = Some(now_ms());
        metrics::counter!("bookfeed_messages_total").increment(1);
    }
}
