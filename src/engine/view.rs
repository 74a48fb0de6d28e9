//! Read-side derivations over a [`PriceLadder`].
//!
//! Everything here is recomputed from the ladder on each call; nothing is
//! cached, so a view is always consistent with the ladder it was built from.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::engine::ladder::{to_level, LevelEntry, PriceKey, PriceLadder};
use crate::engine::types::{Level, Side};

/// Display-ready book: bids best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LadderSnapshot {
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Running total of size walking away from the touch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthPoint {
    pub price: f64,
    pub cumulative: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthCurve {
    pub bids: Vec<DepthPoint>,
    pub asks: Vec<DepthPoint>,
}

pub fn view(ladder: &PriceLadder, granularity: Option<f64>) -> LadderSnapshot {
    match granularity {
        Some(g) if g > 0.0 && g.is_finite() => LadderSnapshot {
            bids: grouped(&ladder.bids, g, Side::Buy),
            asks: grouped(&ladder.asks, g, Side::Sell),
        },
        _ => LadderSnapshot {
            bids: ladder.bids.iter().rev().map(|(p, e)| to_level(*p, e)).collect(),
            asks: ladder.asks.iter().map(|(p, e)| to_level(*p, e)).collect(),
        },
    }
}

// Relative tolerance for treating a float quotient as a whole number
const SNAP_EPSILON: f64 = 1e-9;
const MAX_DECIMALS: i32 = 12;

fn is_whole(x: f64) -> bool {
    (x - x.round()).abs() <= SNAP_EPSILON * x.abs().max(1.0)
}

/// `granularity` as `units / scale` with `scale` a power of ten and `units`
/// whole, so 0.1 becomes (1, 10). Falls back to (granularity, 1).
fn decimal_units(granularity: f64) -> (f64, f64) {
    for d in 0..=MAX_DECIMALS {
        let scale = 10f64.powi(d);
        let units = granularity * scale;
        if is_whole(units) {
            return (units.round(), scale);
        }
    }
    (granularity, 1.0)
}

/// Bucket a raw price: bids go to the largest multiple of the granularity
/// at or below the price, asks to the smallest at or above it, so a
/// grouped row never shows a better price than the levels inside it.
///
/// Multiples are built as `k * units / scale` so that e.g. 17 * 0.1 comes
/// out as the double nearest 1.7 rather than 1.7000000000000002.
pub fn bucket_price(price: f64, granularity: f64, side: Side) -> f64 {
    let (units, scale) = decimal_units(granularity);
    let at = |k: f64| k * units / scale;
    let q = price * scale / units;
    let mut k = if is_whole(q) {
        q.round()
    } else {
        match side {
            Side::Buy => q.floor(),
            Side::Sell => q.ceil(),
        }
    };
    // a snap can land one step past the price when it sits just off a multiple
    match side {
        Side::Buy if at(k) > price => k -= 1.0,
        Side::Sell if at(k) < price => k += 1.0,
        _ => {}
    }
    at(k)
}

fn grouped(levels: &BTreeMap<PriceKey, LevelEntry>, granularity: f64, side: Side) -> Vec<Level> {
    let mut buckets: BTreeMap<PriceKey, LevelEntry> = BTreeMap::new();
    for (price, entry) in levels {
        let bucket = OrderedFloat(bucket_price(price.into_inner(), granularity, side));
        let slot = buckets.entry(bucket).or_insert(LevelEntry { size: 0.0, updated_at: 0 });
        slot.size += entry.size;
        slot.updated_at = slot.updated_at.max(entry.updated_at);
    }
    let rows = buckets.iter().map(|(p, e)| to_level(*p, e));
    match side {
        Side::Buy => rows.rev().collect(),
        Side::Sell => rows.collect(),
    }
}

impl LadderSnapshot {
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.best_ask()?.price + self.best_bid()?.price) / 2.0)
    }

    /// Keep only the `n` best rows per side.
    pub fn truncate(mut self, n: usize) -> Self {
        self.bids.truncate(n);
        self.asks.truncate(n);
        self
    }

    pub fn cumulative(&self) -> DepthCurve {
        DepthCurve { bids: running_total(&self.bids), asks: running_total(&self.asks) }
    }
}

fn running_total(levels: &[Level]) -> Vec<DepthPoint> {
    levels
        .iter()
        .scan(0.0, |acc, l| {
            *acc += l.size;
            Some(DepthPoint { price: l.price, cumulative: *acc })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{BookRow, PatchAction};
    use proptest::prelude::*;

    fn ladder_from(bids: &[(f64, f64, u64)], asks: &[(f64, f64, u64)]) -> PriceLadder {
        let mut ladder = PriceLadder::new();
        for &(p, s, t) in bids {
            ladder.apply_row(PatchAction::Insert, &BookRow::new("X", Side::Buy, Some(p), Some(s)), t);
        }
        for &(p, s, t) in asks {
            ladder.apply_row(PatchAction::Insert, &BookRow::new("X", Side::Sell, Some(p), Some(s)), t);
        }
        ladder
    }

    #[test]
    fn test_raw_view_sort_order() {
        let ladder = ladder_from(&[(99.0, 1.0, 1), (100.5, 2.0, 2), (98.0, 3.0, 3)], &[(103.0, 1.0, 1), (101.0, 2.0, 2)]);
        let snap = view(&ladder, None);
        let bid_prices: Vec<f64> = snap.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<f64> = snap.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![100.5, 99.0, 98.0]);
        assert_eq!(ask_prices, vec![101.0, 103.0]);
    }

    #[test]
    fn test_non_positive_granularity_is_raw() {
        let ladder = ladder_from(&[(99.0, 1.0, 1), (99.5, 2.0, 2)], &[]);
        assert_eq!(view(&ladder, Some(0.0)), view(&ladder, None));
        assert_eq!(view(&ladder, Some(-1.0)), view(&ladder, None));
        assert_eq!(view(&ladder, Some(0.0)).bids.len(), 2);
    }

    #[test]
    fn test_grouping_floors_bids_and_ceils_asks() {
        let ladder = ladder_from(
            &[(100.5, 1.0, 5), (100.0, 2.0, 9), (99.5, 4.0, 1)],
            &[(100.5, 1.0, 3), (101.0, 2.0, 7), (101.5, 5.0, 2)],
        );
        let snap = view(&ladder, Some(1.0));

        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.bids[0], Level { price: 100.0, size: 3.0, updated_at: 9 });
        assert_eq!(snap.bids[1], Level { price: 99.0, size: 4.0, updated_at: 1 });

        assert_eq!(snap.asks.len(), 2);
        assert_eq!(snap.asks[0], Level { price: 101.0, size: 3.0, updated_at: 7 });
        assert_eq!(snap.asks[1], Level { price: 102.0, size: 5.0, updated_at: 2 });
    }

    #[test]
    fn test_decimal_granularity_keeps_exact_multiples_in_their_bucket() {
        let ladder = ladder_from(&[(1.7, 1.0, 1), (0.3, 2.0, 2), (1.75, 4.0, 3)], &[(1.7, 1.0, 1), (0.3, 2.0, 2), (1.75, 4.0, 3)]);
        let snap = view(&ladder, Some(0.1));

        let bids: Vec<(f64, f64)> = snap.bids.iter().map(|l| (l.price, l.size)).collect();
        assert_eq!(bids, vec![(1.7, 5.0), (0.3, 2.0)]);
        let asks: Vec<(f64, f64)> = snap.asks.iter().map(|l| (l.price, l.size)).collect();
        assert_eq!(asks, vec![(0.3, 2.0), (1.7, 1.0), (1.8, 4.0)]);
    }

    #[test]
    fn test_bucket_price_decimal_granularities() {
        assert_eq!(bucket_price(100.35, 0.05, Side::Buy), 100.35);
        assert_eq!(bucket_price(100.37, 0.05, Side::Buy), 100.35);
        assert_eq!(bucket_price(100.37, 0.05, Side::Sell), 100.4);
        assert_eq!(bucket_price(0.07, 0.01, Side::Sell), 0.07);
        assert_eq!(bucket_price(1.7, 0.1, Side::Sell), 1.7);
        // just below a multiple must not snap up past the price
        assert_eq!(bucket_price(1.6999999999999, 0.1, Side::Buy), 1.6);
        assert_eq!(bucket_price(1.7000000000001, 0.1, Side::Sell), 1.8);
    }

    #[test]
    fn test_view_is_repeatable() {
        let ladder = ladder_from(&[(10.0, 1.0, 1), (12.5, 2.0, 2)], &[(13.0, 1.0, 1)]);
        assert_eq!(view(&ladder, Some(5.0)), view(&ladder, Some(5.0)));
    }

    #[test]
    fn test_depth_helpers() {
        let ladder = ladder_from(&[(100.0, 5.0, 1), (99.0, 3.0, 1)], &[(101.0, 2.0, 1), (102.0, 4.0, 1)]);
        let snap = view(&ladder, None);
        assert_eq!(snap.spread(), Some(1.0));
        assert_eq!(snap.mid(), Some(100.5));

        let depth = snap.cumulative();
        assert_eq!(depth.bids, vec![
            DepthPoint { price: 100.0, cumulative: 5.0 },
            DepthPoint { price: 99.0, cumulative: 8.0 },
        ]);
        assert_eq!(depth.asks.last().map(|p| p.cumulative), Some(6.0));

        let top = snap.truncate(1);
        assert_eq!(top.bids.len(), 1);
        assert_eq!(top.asks.len(), 1);
        assert_eq!(LadderSnapshot::default().spread(), None);
    }

    proptest! {
        #[test]
        fn prop_raw_view_strictly_sorted(
            bids in prop::collection::vec((1u32..100_000, 1u32..1_000), 0..60),
            asks in prop::collection::vec((1u32..100_000, 1u32..1_000), 0..60),
        ) {
            let to_rows = |v: &Vec<(u32, u32)>| v.iter().map(|&(p, s)| (p as f64 / 2.0, s as f64, 0u64)).collect::<Vec<_>>();
            let ladder = ladder_from(&to_rows(&bids), &to_rows(&asks));
            let snap = view(&ladder, None);
            prop_assert!(snap.bids.windows(2).all(|w| w[0].price > w[1].price));
            prop_assert!(snap.asks.windows(2).all(|w| w[0].price < w[1].price));
        }

        #[test]
        fn prop_grouping_is_conservative_and_preserves_size(
            levels in prop::collection::vec((1u32..10_000_000, 1u32..1_000), 1..60),
            granularity in prop::sample::select(vec![0.01f64, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0]),
        ) {
            // prices on a 0.01 grid, as quoted
            let rows: Vec<(f64, f64, u64)> = levels.iter().map(|&(p, s)| (p as f64 / 100.0, s as f64, 0)).collect();
            let ladder = ladder_from(&rows, &rows);

            for (side, raw) in [(Side::Buy, &ladder.bids), (Side::Sell, &ladder.asks)] {
                let grouped = match side {
                    Side::Buy => view(&ladder, Some(granularity)).bids,
                    Side::Sell => view(&ladder, Some(granularity)).asks,
                };
                for level in &grouped {
                    let expected: f64 = raw
                        .iter()
                        .filter(|(p, _)| bucket_price(p.into_inner(), granularity, side) == level.price)
                        .map(|(_, e)| e.size)
                        .sum();
                    prop_assert_eq!(level.size, expected);
                }
                for p in raw.keys() {
                    let b = bucket_price(p.into_inner(), granularity, side);
                    match side {
                        Side::Buy => { prop_assert!(b <= p.into_inner()); }
                        Side::Sell => { prop_assert!(b >= p.into_inner()); }
                    }
                    // nearest multiple on the right side, and a multiple is its own bucket
                    prop_assert!((p.into_inner() - b).abs() < granularity * (1.0 + 1e-9));
                    prop_assert_eq!(bucket_price(b, granularity, side), b);
                }
                let total_raw: f64 = raw.values().map(|e| e.size).sum();
                let total_grouped: f64 = grouped.iter().map(|l| l.size).sum();
                prop_assert_eq!(total_raw, total_grouped);
            }
        }
    }
}
