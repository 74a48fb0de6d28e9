// tokio-tungstenite transport: one spawned task per connection attempt

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{Connector, EventSender, Transport, TransportEvent};
use crate::error::FeedError;

enum Outbound {
    Text(String),
    Close(u16, String),
}

pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), FeedError> {
        self.outbound.send(Outbound::Text(text)).map_err(|_| FeedError::TransportClosed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        // the socket task may already be gone; nothing left to close then
        let _ = self.outbound.send(Outbound::Close(code, reason.to_string()));
    }
}

/// Spawns socket tasks on the runtime it was created in.
pub struct WsConnector {
    runtime: Handle,
}

impl WsConnector {
    /// Must be called from inside a tokio runtime.
    pub fn new() -> Self {
        Self { runtime: Handle::current() }
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, generation: u64, events: EventSender) -> Box<dyn Transport> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.spawn(run_socket(url.to_string(), generation, rx, events));
        Box::new(WsTransport { outbound: tx })
    }
}

async fn run_socket(url: String, generation: u64, mut outbound: mpsc::UnboundedReceiver<Outbound>, events: EventSender) {
    let emit = |ev: TransportEvent| {
        // receiver gone means nobody cares about this socket anymore
        let _ = events.send((generation, ev));
    };

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!(generation, status = %response.status(), "Websocket connected");
            ws_stream
        }
        Err(e) => {
            warn!(generation, error = %e, "Websocket connect failed");
            emit(TransportEvent::Error(e.to_string()));
            emit(TransportEvent::Closed(None));
            return;
        }
    };
    emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();
    let mut close_code = None;
    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close(code, reason)) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(e) = write.send(WsMessage::Close(Some(frame))).await {
                        debug!(generation, error = %e, "Close frame not delivered");
                    }
                    close_code = Some(code);
                    break;
                }
                None => {
                    // handle dropped without an explicit close
                    let _ = write.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => emit(TransportEvent::Message(text)),
                Some(Ok(WsMessage::Binary(bin))) => match String::from_utf8(bin) {
                    Ok(text) => emit(TransportEvent::Message(text)),
                    Err(_) => debug!(generation, "Ignoring non-utf8 binary frame"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(generation, error = %e, "Websocket read failed");
                    emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }
    emit(TransportEvent::Closed(close_code));
}
