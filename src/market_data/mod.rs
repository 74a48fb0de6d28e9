// Market data module entrypoint
pub mod adapters;    // transport seam + BitMEX wire/auth
pub mod normaliser;  // instrument stats -> approximate USD notional
pub mod ticker;      // per-symbol instrument tickers
pub mod feed;        // connection state machine + inbound routing
pub mod router;      // pumps transport events into the feed
