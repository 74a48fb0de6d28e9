// Convert instrument stats into a comparable USD notional.

use crate::market_data::ticker::InstrumentTicker;

/// Approximate 24h traded value in USD, used to rank instruments when the
/// feed does not report USD turnover directly. First matching rule wins:
///
/// 1. `turnover_24h` present: return it as is (already USD-denominated).
/// 2. inverse contract with `home_notional_24h` and `last_price`:
///    `home_notional_24h * last_price` (base volume converted at last price).
/// 3. linear contract with `volume_24h` and `last_price`:
///    `volume_24h * multiplier * last_price`, multiplier defaulting to 1.
/// 4. quanto contract with `volume_24h` and `last_price`: same formula as 3.
///    The quanto multiplier is not currency-converted (simplification).
/// 5. `foreign_notional_24h` present: return it as a best-effort fallback.
/// 6. otherwise `None`.
///
/// This is an approximation policy, not an accounting rule. A non-positive
/// multiplier counts as missing.
pub fn approximate_usd_notional(t: &InstrumentTicker) -> Option<f64> {
    if let Some(turnover) = t.turnover_24h {
        return Some(turnover);
    }
    if t.is_inverse == Some(true) {
        if let (Some(home), Some(last)) = (t.home_notional_24h, t.last_price) {
            return Some(home * last);
        }
    }
    if t.is_linear == Some(true) || t.is_quanto == Some(true) {
        if let (Some(volume), Some(last)) = (t.volume_24h, t.last_price) {
            return Some(volume * contract_multiplier(t) * last);
        }
    }
    t.foreign_notional_24h
}

fn contract_multiplier(t: &InstrumentTicker) -> f64 {
    match t.multiplier {
        Some(m) if m > 0.0 => m,
        _ => 1.0,
    }
}

/// Short human form used by the CLI ticker line (1.25B, 3.40M, 12.5K).
pub fn abbreviate(n: f64) -> String {
    if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else {
        format!("{}", n)
    }
}
