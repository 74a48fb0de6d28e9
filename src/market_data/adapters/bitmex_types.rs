// Source: https://www.bitmex.com/app/wsAPI (orderBookL2, instrument, subscribe)
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::types::{BookPatch, BookRow, PatchAction};

/// Row of the `instrument` table. Every field but the symbol is optional
/// and most updates carry only what changed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentRow {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub mark_price: Option<f64>,
    #[serde(default)]
    pub indicative_settle_price: Option<f64>,
    #[serde(default)]
    pub funding_rate: Option<f64>,
    #[serde(default, rename = "volume24h")]
    pub volume_24h: Option<f64>,
    #[serde(default, rename = "homeNotional24h")]
    pub home_notional_24h: Option<f64>,
    #[serde(default, rename = "foreignNotional24h")]
    pub foreign_notional_24h: Option<f64>,
    #[serde(default, rename = "turnover24h")]
    pub turnover_24h: Option<f64>,
    #[serde(default)]
    pub is_inverse: Option<bool>,
    #[serde(default)]
    pub is_quanto: Option<bool>,
    #[serde(default)]
    pub is_linear: Option<bool>,
    #[serde(default)]
    pub quote_currency: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

// Outbound: {"op":"subscribe","args":[...]}
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub op: &'static str,
    pub args: &'a [String],
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(args: &'a [String]) -> Self {
        Self { op: "subscribe", args }
    }
}

/// Inbound message, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    SubscribeAck(String),
    Info(String),
    Error(String),
    OrderBook(BookPatch),
    Instrument(Vec<InstrumentRow>),
    /// Valid JSON that none of the routes above claim (trade table, pongs...)
    Other,
}

impl FeedMessage {
    /// Parse a text frame. Only invalid JSON is an error; rows inside a
    /// table message that don't deserialize are dropped one by one.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(value))
    }

    fn classify(mut value: Value) -> Self {
        if let Some(topic) = truthy(&value, "subscribe") {
            return Self::SubscribeAck(topic);
        }
        if let Some(info) = truthy(&value, "info") {
            return Self::Info(info);
        }
        if let Some(err) = truthy(&value, "error") {
            return Self::Error(err);
        }

        let table = value.get("table").and_then(Value::as_str).map(str::to_owned);
        let data = match value.get_mut("data").map(Value::take) {
            Some(Value::Array(rows)) => rows,
            _ => return Self::Other,
        };
        match table.as_deref() {
            Some("orderBookL2") => {
                let Some(action) = value.get("action").and_then(Value::as_str).and_then(PatchAction::parse) else {
                    debug!("orderBookL2 message without a known action");
                    return Self::Other;
                };
                Self::OrderBook(BookPatch::new(action, rows_of::<BookRow>(data)))
            }
            Some("instrument") => Self::Instrument(rows_of::<InstrumentRow>(data)),
            _ => Self::Other,
        }
    }
}

fn rows_of<T: serde::de::DeserializeOwned>(data: Vec<Value>) -> Vec<T> {
    data.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(r) => Some(r),
            Err(e) => {
                debug!(error = %e, "Dropping malformed row");
                None
            }
        })
        .collect()
}

// JS-style truthiness for envelope keys: present, non-null, non-false, non-empty
fn truthy(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Side;

    #[test]
    fn test_parse_order_book_patch() {
        let text = r#"{"table":"orderBookL2","action":"partial","data":[
            {"symbol":"XBTUSD","id":8799,"side":"Sell","size":3,"price":101},
            {"symbol":"XBTUSD","id":8800,"side":"Buy","size":5,"price":100.5}
        ]}"#;
        let msg = FeedMessage::parse(text).unwrap();
        let FeedMessage::OrderBook(patch) = msg else { panic!("expected order book") };
        assert_eq!(patch.action, PatchAction::Partial);
        assert_eq!(patch.rows.len(), 2);
        assert_eq!(patch.rows[0].side, Side::Sell);
        assert_eq!(patch.rows[0].id, Some(8799));
        assert_eq!(patch.rows[1].price, Some(100.5));
    }

    #[test]
    fn test_delete_rows_without_price_or_size() {
        let text = r#"{"table":"orderBookL2","action":"delete","data":[{"symbol":"XBTUSD","id":1,"side":"Buy"}]}"#;
        let FeedMessage::OrderBook(patch) = FeedMessage::parse(text).unwrap() else { panic!() };
        assert_eq!(patch.rows[0].price, None);
        assert_eq!(patch.rows[0].size, None);
    }

    #[test]
    fn test_malformed_rows_dropped_individually() {
        let text = r#"{"table":"orderBookL2","action":"insert","data":[
            {"symbol":"XBTUSD","side":"Sideways","size":1,"price":1},
            {"symbol":"XBTUSD","side":"Buy","size":"lots","price":1},
            {"symbol":"XBTUSD","side":"Buy","size":2,"price":1}
        ]}"#;
        let FeedMessage::OrderBook(patch) = FeedMessage::parse(text).unwrap() else { panic!() };
        assert_eq!(patch.rows.len(), 1);
        assert_eq!(patch.rows[0].size, Some(2.0));
    }

    #[test]
    fn test_unknown_action_is_other() {
        let text = r#"{"table":"orderBookL2","action":"explode","data":[]}"#;
        assert_eq!(FeedMessage::parse(text).unwrap(), FeedMessage::Other);
    }

    #[test]
    fn test_parse_instrument_rows() {
        let text = r#"{"table":"instrument","action":"update","data":[
            {"symbol":"XBTUSD","lastPrice":65000.5,"indicativeSettlePrice":64990,"turnover24h":123,"volume24h":7,
             "homeNotional24h":1.5,"foreignNotional24h":2.5,"isInverse":true,"quoteCurrency":"USD","multiplier":-100000000}
        ]}"#;
        let FeedMessage::Instrument(rows) = FeedMessage::parse(text).unwrap() else { panic!() };
        let r = &rows[0];
        assert_eq!(r.symbol.as_deref(), Some("XBTUSD"));
        assert_eq!(r.last_price, Some(65000.5));
        assert_eq!(r.indicative_settle_price, Some(64990.0));
        assert_eq!(r.turnover_24h, Some(123.0));
        assert_eq!(r.volume_24h, Some(7.0));
        assert_eq!(r.home_notional_24h, Some(1.5));
        assert_eq!(r.foreign_notional_24h, Some(2.5));
        assert_eq!(r.is_inverse, Some(true));
        assert_eq!(r.multiplier, Some(-100000000.0));
    }

    #[test]
    fn test_envelopes() {
        assert_eq!(
            FeedMessage::parse(r#"{"success":true,"subscribe":"orderBookL2:XBTUSD"}"#).unwrap(),
            FeedMessage::SubscribeAck("orderBookL2:XBTUSD".into())
        );
        assert_eq!(
            FeedMessage::parse(r#"{"info":"Welcome to the BitMEX Realtime API.","version":"2.0"}"#).unwrap(),
            FeedMessage::Info("Welcome to the BitMEX Realtime API.".into())
        );
        assert_eq!(
            FeedMessage::parse(r#"{"status":400,"error":"Unknown table: foo"}"#).unwrap(),
            FeedMessage::Error("Unknown table: foo".into())
        );
        assert_eq!(FeedMessage::parse(r#"{"table":"trade","data":[]}"#).unwrap(), FeedMessage::Other);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(FeedMessage::parse("not json {").is_err());
    }

    #[test]
    fn test_subscribe_request_shape() {
        let topics = vec!["orderBookL2:XBTUSD".to_string(), "instrument".to_string()];
        let json = serde_json::to_string(&SubscribeRequest::new(&topics)).unwrap();
        assert_eq!(json, r#"{"op":"subscribe","args":["orderBookL2:XBTUSD","instrument"]}"#);
    }
}
