pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod telemetry;

pub use engine::store::BookStore;
pub use engine::view::LadderSnapshot;
pub use error::FeedError;
pub use market_data::feed::{ConnectionState, FeedConnection, LinkStatus};
pub use market_data::normaliser::approximate_usd_notional;
pub use market_data::ticker::{InstrumentTicker, TickerStore};
