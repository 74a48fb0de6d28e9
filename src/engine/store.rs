use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::engine::ladder::PriceLadder;
use crate::engine::types::{now_ms, BookPatch};
use crate::engine::view::{self, LadderSnapshot};

/// Every symbol's ladder behind one lock. A patch is applied under a
/// single write guard, so readers see all of its rows or none of them.
#[derive(Debug, Default)]
pub struct BookStore {
    ladders: RwLock<AHashMap<String, PriceLadder>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, patch: &BookPatch) -> usize {
        self.apply_at(patch, now_ms())
    }

    /// Apply a patch with an explicit timestamp. Returns the number of
    /// rows that changed a ladder.
    #[instrument(level = "debug", skip(self, patch), fields(action = ?patch.action, rows = patch.rows.len()))]
    pub fn apply_at(&self, patch: &BookPatch, now: u64) -> usize {
        let mut ladders = self.ladders.write();
        let mut applied = 0;
        for row in &patch.rows {
            let ladder = ladders.entry(row.symbol.clone()).or_default();
            if ladder.apply_row(patch.action, row, now) {
                applied += 1;
            }
        }
        debug!(applied, "Patch applied");
        applied
    }

    /// Sorted (and optionally grouped) view of one symbol.
    pub fn view(&self, symbol: &str, granularity: Option<f64>) -> LadderSnapshot {
        let ladders = self.ladders.read();
        match ladders.get(symbol) {
            Some(ladder) => view::view(ladder, granularity),
            None => LadderSnapshot::default(),
        }
    }

    /// Copy of one symbol's raw ladder.
    pub fn ladder(&self, symbol: &str) -> Option<PriceLadder> {
        self.ladders.read().get(symbol).cloned()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.ladders.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
