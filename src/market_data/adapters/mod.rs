// Shared transport seam for feed adapters

use tokio::sync::mpsc;

use crate::error::FeedError;

/// Normal closure (RFC 6455).
pub const CLOSE_NORMAL: u16 = 1000;

/// What a transport reports back, in order: `Opened`, any number of
/// `Message`/`Error`, then exactly one `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed(Option<u16>),
}

/// Events are tagged with the generation of the transport that produced
/// them, so a connection can ignore stragglers from a replaced transport.
pub type EventSender = mpsc::UnboundedSender<(u64, TransportEvent)>;
pub type EventReceiver = mpsc::UnboundedReceiver<(u64, TransportEvent)>;

/// Handle to one live transport. Sends are fire-and-forget.
pub trait Transport: Send {
    fn send(&mut self, text: String) -> Result<(), FeedError>;
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports. `open` must not block: the connection attempt runs in
/// the background and reports through `events`.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str, generation: u64, events: EventSender) -> Box<dyn Transport>;
}

// Make the BitMEX adapter visible
pub mod bitmex;
pub mod bitmex_types;
pub mod ws;
