use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

// Action tag carried by every orderBookL2 table message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Partial,
    Insert,
    Update,
    Delete,
}

impl PatchAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "partial" => Some(Self::Partial),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One row of an L2 patch. Price and size are optional on the wire;
/// rows missing what their action needs are skipped on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRow {
    pub symbol: String,
    #[serde(default)]
    pub id: Option<u64>,
    pub side: Side,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl BookRow {
    pub fn new(symbol: &str, side: Side, price: Option<f64>, size: Option<f64>) -> Self {
        Self { symbol: symbol.to_string(), id: None, side, size, price }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookPatch {
    pub action: PatchAction,
    pub rows: Vec<BookRow>,
}

impl BookPatch {
    pub fn new(action: PatchAction, rows: Vec<BookRow>) -> Self {
        Self { action, rows }
    }
}

// A price level as handed to readers (raw or grouped)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Level {
    pub price: f64,
    pub size: f64,
    pub updated_at: u64,
}

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
