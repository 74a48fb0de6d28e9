use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::{debug, trace};

use crate::engine::types::{BookRow, Level, PatchAction, Side};

pub type PriceKey = OrderedFloat<f64>;

// Size and last-update stamp share one entry so they can never drift apart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEntry {
    pub size: f64,
    pub updated_at: u64,
}

/// One symbol's L2 book: price -> (size, last update) on each side.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PriceLadder {
    pub bids: BTreeMap<PriceKey, LevelEntry>, // highest price = best bid
    pub asks: BTreeMap<PriceKey, LevelEntry>, // lowest price  = best ask
}

impl PriceLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side(&self, side: Side) -> &BTreeMap<PriceKey, LevelEntry> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<PriceKey, LevelEntry> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Apply a single row. Returns whether the ladder changed.
    ///
    /// `partial`, `insert` and `update` all overwrite the size at a price.
    /// A `partial` does not clear levels the snapshot leaves out.
    pub fn apply_row(&mut self, action: PatchAction, row: &BookRow, now: u64) -> bool {
        match action {
            PatchAction::Partial | PatchAction::Insert | PatchAction::Update => {
                let (Some(price), Some(size)) = (row.price, row.size) else {
                    trace!(symbol = %row.symbol, ?action, "Skipping row without price/size");
                    return false;
                };
                if !price.is_finite() || !size.is_finite() || size < 0.0 {
                    debug!(symbol = %row.symbol, price, size, "Dropping malformed row");
                    return false;
                }
                self.set(row.side, price, size, now);
                true
            }
            PatchAction::Delete => match row.price {
                Some(price) => self.remove(row.side, price),
                None => {
                    trace!(symbol = %row.symbol, "Skipping delete without price");
                    false
                }
            },
        }
    }

    // Zero size means "not present", so it removes the key
    fn set(&mut self, side: Side, price: f64, size: f64, now: u64) {
        if size == 0.0 {
            self.remove(side, price);
            return;
        }
        self.side_mut(side)
            .insert(OrderedFloat(price), LevelEntry { size, updated_at: now });
    }

    fn remove(&mut self, side: Side, price: f64) -> bool {
        self.side_mut(side).remove(&OrderedFloat(price)).is_some()
    }

    pub fn get(&self, side: Side, price: f64) -> Option<LevelEntry> {
        self.side(side).get(&OrderedFloat(price)).copied()
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.iter().next_back().map(|(p, e)| to_level(*p, e))
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.iter().next().map(|(p, e)| to_level(*p, e))
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

pub(crate) fn to_level(price: PriceKey, entry: &LevelEntry) -> Level {
    Level { price: price.into_inner(), size: entry.size, updated_at: entry.updated_at }
}
