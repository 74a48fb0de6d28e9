// Router wires transport events into the feed and exposes the shared stores
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;
use crate::engine::store::BookStore;
use crate::market_data::adapters::ws::WsConnector;
use crate::market_data::adapters::{Connector, EventReceiver};
use crate::market_data::feed::FeedConnection;
use crate::market_data::ticker::TickerStore;

/// A running feed: the connection behind a mutex, the stores it writes to,
/// and the task pumping transport events into it.
pub struct FeedRuntime {
    pub connection: Arc<Mutex<FeedConnection>>,
    pub books: Arc<BookStore>,
    pub tickers: Arc<TickerStore>,
    pump: JoinHandle<()>,
}

impl FeedRuntime {
    /// Websocket-backed runtime configured from `settings`. Must be called
    /// inside a tokio runtime. Does not connect.
    pub fn start(settings: &Settings) -> Self {
        Self::with_connector(settings, Arc::new(WsConnector::new()))
    }

    pub fn with_connector(settings: &Settings, connector: Arc<dyn Connector>) -> Self {
        let books = Arc::new(BookStore::new());
        let tickers = Arc::new(TickerStore::new());
        let (mut feed, events) = FeedConnection::new(connector, Arc::clone(&books), Arc::clone(&tickers));
        settings.apply_to(&mut feed);

        let connection = Arc::new(Mutex::new(feed));
        let pump = tokio::spawn(pump_events(Arc::clone(&connection), events));
        info!(env = ?settings.environment, "Feed runtime started");
        Self { connection, books, tickers, pump }
    }

    pub fn shutdown(self) {
        self.connection.lock().disconnect();
        self.pump.abort();
    }
}

/// Hand every transport event to the connection, one at a time.
pub async fn pump_events(connection: Arc<Mutex<FeedConnection>>, mut events: EventReceiver) {
    while let Some((generation, event)) = events.recv().await {
        connection.lock().handle_event(generation, event);
    }
    debug!("Event channel closed, pump exiting");
}
