use crate::config::CommissionConfig;
use crate::order::Side;

/// `commission(side, price, quantity)`, ported 1:1 from `qtrader/trading/commission.py`:
/// a per-side rate plus a per-side tax (stamp duty, sell-only by default). Only the commission
/// component is floored at `min_commission`; the tax is added afterward, unfloored.
pub fn commission(config: &CommissionConfig, side: Side, price: f64, quantity: i64) -> f64 {
    let gross = price * quantity as f64;
    let (rate, tax) = match side {
        Side::Buy => (config.buy_commission, config.buy_tax),
        Side::Sell => (config.sell_commission, config.sell_tax),
    };
    let commission = (gross * rate).max(config.min_commission);
    let tax = gross * tax;
    commission + tax
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_commission_applies_rate_only_by_default() {
        let config = CommissionConfig::default();
        let fee = commission(&config, Side::Buy, 10.0, 1000);
        assert_eq!(fee, 10.0 * 1000.0 * 0.0002);
    }

    #[test]
    fn sell_commission_adds_stamp_tax() {
        let config = CommissionConfig::default();
        let fee = commission(&config, Side::Sell, 10.0, 1000);
        assert_eq!(fee, 10.0 * 1000.0 * (0.0002 + 0.001));
    }

    #[test]
    fn commission_never_drops_below_floor() {
        let config = CommissionConfig::default();
        let fee = commission(&config, Side::Buy, 1.0, 1);
        assert_eq!(fee, config.min_commission);
    }

    #[test]
    fn floor_applies_to_commission_only_not_the_combined_total() {
        // gross = 10_000, defaults: sell_commission=0.0002, sell_tax=0.001, min_commission=5.0.
        // commission = 2.0, floored to 5.0; tax = 10.0 added unfloored => 15.0, not
        // max(2.0 + 10.0, 5.0) = 12.0.
        let config = CommissionConfig::default();
        let fee = commission(&config, Side::Sell, 100.0, 100);
        assert_eq!(fee, 15.0);
    }
}
