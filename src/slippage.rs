use crate::config::SlippageConfig;
use crate::order::Side;

/// Fixed-rate slippage model (spec §4.3 "Post-price checks"): `price · rate`, added for BUY,
/// subtracted for SELL, ported from `qtrader/trading/slippage.py`.
pub fn apply_slippage(config: &SlippageConfig, side: Side, price: f64) -> f64 {
    let delta = price * config.rate;
    match side {
        Side::Buy => price + delta,
        Side::Sell => price - delta,
    }
}
