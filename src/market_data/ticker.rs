use std::cmp::Ordering;

use ahash::AHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{instrument, trace};

use crate::engine::types::now_ms;
use crate::market_data::adapters::bitmex_types::InstrumentRow;
use crate::market_data::normaliser::approximate_usd_notional;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChangeDir {
    Up,
    Down,
    #[default]
    None,
}

/// Latest known stats for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstrumentTicker {
    pub last_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub funding_rate: Option<f64>,
    pub volume_24h: Option<f64>,
    pub home_notional_24h: Option<f64>,
    pub foreign_notional_24h: Option<f64>,
    pub turnover_24h: Option<f64>,
    pub updated_at: u64,
    pub change_dir: ChangeDir,
    pub change_at: Option<u64>,
    pub is_inverse: Option<bool>,
    pub is_linear: Option<bool>,
    pub is_quanto: Option<bool>,
    pub quote_currency: Option<String>,
    pub multiplier: Option<f64>,
}

impl InstrumentTicker {
    /// Fold one update row in: present fields overwrite, missing ones keep
    /// their previous value. Direction only moves on a real last-price change.
    pub fn merge(&mut self, r: &InstrumentRow, now: u64) {
        if let (Some(new), Some(prev)) = (r.last_price, self.last_price) {
            if new != prev {
                self.change_dir = if new > prev { ChangeDir::Up } else { ChangeDir::Down };
                self.change_at = Some(now);
            }
        }
        merge_field(&mut self.last_price, r.last_price);
        merge_field(&mut self.mark_price, r.mark_price);
        merge_field(&mut self.index_price, r.indicative_settle_price);
        merge_field(&mut self.funding_rate, r.funding_rate);
        merge_field(&mut self.volume_24h, r.volume_24h);
        merge_field(&mut self.home_notional_24h, r.home_notional_24h);
        merge_field(&mut self.foreign_notional_24h, r.foreign_notional_24h);
        merge_field(&mut self.turnover_24h, r.turnover_24h);
        merge_field(&mut self.is_inverse, r.is_inverse);
        merge_field(&mut self.is_linear, r.is_linear);
        merge_field(&mut self.is_quanto, r.is_quanto);
        merge_field(&mut self.quote_currency, r.quote_currency.clone());
        merge_field(&mut self.multiplier, r.multiplier);
        self.updated_at = now;
    }
}

fn merge_field<T>(slot: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *slot = update;
    }
}

#[derive(Debug, Default)]
pub struct TickerStore {
    tickers: RwLock<AHashMap<String, InstrumentTicker>>,
}

impl TickerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, rows: &[InstrumentRow]) -> usize {
        self.merge_at(rows, now_ms())
    }

    /// Merge a batch of instrument rows under one write guard. Rows without
    /// a symbol are skipped. Returns the number of rows merged.
    #[instrument(level = "debug", skip(self, rows), fields(rows = rows.len()))]
    pub fn merge_at(&self, rows: &[InstrumentRow], now: u64) -> usize {
        let mut tickers = self.tickers.write();
        let mut merged = 0;
        for r in rows {
            let Some(symbol) = r.symbol.as_deref().filter(|s| !s.is_empty()) else {
                trace!("Skipping instrument row without symbol");
                continue;
            };
            tickers.entry(symbol.to_string()).or_default().merge(r, now);
            merged += 1;
        }
        merged
    }

    pub fn get(&self, symbol: &str) -> Option<InstrumentTicker> {
        self.tickers.read().get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tradable instruments by approximate USD notional, largest first, ties
    /// broken by symbol. Index symbols (leading '.') and instruments without
    /// a last price are left out.
    pub fn ranked(&self) -> Vec<(String, InstrumentTicker)> {
        let tickers = self.tickers.read();
        tickers
            .iter()
            .filter(|(sym, t)| !sym.starts_with('.') && t.last_price.is_some())
            .map(|(sym, t)| (sym.clone(), t.clone()))
            .sorted_by(|a, b| {
                let av = approximate_usd_notional(&a.1).unwrap_or(0.0);
                let bv = approximate_usd_notional(&b.1).unwrap_or(0.0);
                bv.partial_cmp(&av).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, last: Option<f64>) -> InstrumentRow {
        InstrumentRow { symbol: Some(symbol.to_string()), last_price: last, ..Default::default() }
    }

    #[test]
    fn test_change_direction_detection() {
        let store = TickerStore::new();
        store.merge_at(&[row("XBTUSD", Some(100.0))], 1);
        let t = store.get("XBTUSD").unwrap();
        assert_eq!(t.change_dir, ChangeDir::None);
        assert_eq!(t.change_at, None);

        store.merge_at(&[row("XBTUSD", Some(105.0))], 2);
        let t = store.get("XBTUSD").unwrap();
        assert_eq!(t.change_dir, ChangeDir::Up);
        assert_eq!(t.change_at, Some(2));

        // unchanged price leaves direction and stamp alone
        store.merge_at(&[row("XBTUSD", Some(105.0))], 3);
        let t = store.get("XBTUSD").unwrap();
        assert_eq!(t.change_dir, ChangeDir::Up);
        assert_eq!(t.change_at, Some(2));
        assert_eq!(t.updated_at, 3);

        store.merge_at(&[row("XBTUSD", Some(101.0))], 4);
        assert_eq!(store.get("XBTUSD").unwrap().change_dir, ChangeDir::Down);
    }

    #[test]
    fn test_missing_fields_do_not_erase() {
        let store = TickerStore::new();
        let full = InstrumentRow {
            mark_price: Some(99.5),
            indicative_settle_price: Some(99.0),
            turnover_24h: Some(1e6),
            is_inverse: Some(true),
            quote_currency: Some("USD".into()),
            ..row("XBTUSD", Some(100.0))
        };
        store.merge_at(&[full], 1);
        store.merge_at(&[row("XBTUSD", None)], 2);

        let t = store.get("XBTUSD").unwrap();
        assert_eq!(t.last_price, Some(100.0));
        assert_eq!(t.mark_price, Some(99.5));
        assert_eq!(t.index_price, Some(99.0));
        assert_eq!(t.turnover_24h, Some(1e6));
        assert_eq!(t.is_inverse, Some(true));
        assert_eq!(t.quote_currency.as_deref(), Some("USD"));
        assert_eq!(t.change_dir, ChangeDir::None);
    }

    #[test]
    fn test_null_last_price_is_not_a_change() {
        let store = TickerStore::new();
        store.merge_at(&[row("ETHUSD", None)], 1);
        store.merge_at(&[row("ETHUSD", Some(2000.0))], 2);
        let t = store.get("ETHUSD").unwrap();
        assert_eq!(t.change_dir, ChangeDir::None);
        assert_eq!(t.last_price, Some(2000.0));
    }

    #[test]
    fn test_rows_without_symbol_are_skipped() {
        let store = TickerStore::new();
        let rows = [InstrumentRow::default(), row("", Some(1.0)), row("SOLUSD", Some(1.0))];
        assert_eq!(store.merge_at(&rows, 1), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ranked_by_notional() {
        let store = TickerStore::new();
        store.merge_at(
            &[
                InstrumentRow { turnover_24h: Some(10.0), ..row("AAA", Some(1.0)) },
                InstrumentRow { turnover_24h: Some(500.0), ..row("BBB", Some(1.0)) },
                InstrumentRow { turnover_24h: Some(10.0), ..row("AAB", Some(1.0)) },
                InstrumentRow { turnover_24h: Some(1e9), ..row(".BXBT", Some(1.0)) },
                InstrumentRow { turnover_24h: Some(1e9), ..row("NOPRICE", None) },
            ],
            1,
        );
        let order: Vec<String> = store.ranked().into_iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec!["BBB", "AAA", "AAB"]);
    }
}
