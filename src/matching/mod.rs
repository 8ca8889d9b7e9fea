use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{CommissionConfig, MatchingConfig, SlippageConfig, TradingMode, TradingRule};
use crate::data_provider::{DataProvider, PriceSnapshot, SymbolInfo};
use crate::order::{Order, OrderId, OrderManager, OrderType, Side};
use crate::portfolio::Portfolio;
use crate::position::{Direction, PositionManager};

const PRICE_EPSILON: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("position bookkeeping invariant violated while filling order {0}: {1}")]
    Invariant(OrderId, String),
}

/// Pre-trade and post-price checks, price formation, fill application and daily settlement
/// (spec §4.3). Grounded on `src/execution/simulated.rs`'s `ExecutionClient`/`Fees` split for
/// the Rust shape, with the exact check ordering and formulas ported from
/// `qtrader/trading/matching_engine.py`.
#[derive(Debug)]
pub struct MatchingEngine {
    config: MatchingConfig,
    symbol_info_cache: HashMap<(String, NaiveDate), Option<SymbolInfo>>,
}

impl MatchingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            symbol_info_cache: HashMap::new(),
        }
    }

    fn symbol_info(
        &mut self,
        data: &dyn DataProvider,
        symbol: &str,
        date: NaiveDate,
    ) -> Option<SymbolInfo> {
        self.symbol_info_cache
            .entry((symbol.to_string(), date))
            .or_insert_with(|| data.get_symbol_info(symbol, date))
            .clone()
    }

    /// Drops the per-day symbol-info cache; called by the scheduler at day boundaries.
    pub fn clear_daily_cache(&mut self) {
        self.symbol_info_cache.clear();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn match_orders(
        &mut self,
        now: DateTime<Utc>,
        orders: &mut OrderManager,
        positions: &mut PositionManager,
        portfolio: &mut Portfolio,
        trading_mode: TradingMode,
        trading_rule: TradingRule,
        short_margin_rate: f64,
        data: &dyn DataProvider,
    ) -> Result<(), MatchingError> {
        let open_ids: Vec<OrderId> = orders.get_open().map(|o| o.id).collect();
        let (mut immediate, mut historical): (Vec<OrderId>, Vec<OrderId>) = (Vec::new(), Vec::new());
        for id in open_ids {
            if orders.get(id).expect("just collected").is_immediate {
                immediate.push(id);
            } else {
                historical.push(id);
            }
        }

        for id in immediate.into_iter().chain(historical) {
            self.try_match_one(now, id, orders, positions, portfolio, trading_mode, trading_rule, short_margin_rate, data)?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn try_match_one(
        &mut self,
        now: DateTime<Utc>,
        id: OrderId,
        orders: &mut OrderManager,
        positions: &mut PositionManager,
        portfolio: &mut Portfolio,
        trading_mode: TradingMode,
        trading_rule: TradingRule,
        short_margin_rate: f64,
        data: &dyn DataProvider,
    ) -> Result<(), MatchingError> {
        let order = orders.get(id).expect("id came from open-order scan").clone();
        let query_time = if order.is_immediate { order.created_time } else { now };
        let today = query_time.date_naive();

        let info = self.symbol_info(data, &order.symbol, today);
        if info.as_ref().map(|i| i.is_suspended).unwrap_or(true) {
            orders.reject(id, "symbol suspended").unwrap();
            return Ok(());
        }

        let Some(price) = data.get_current_price(&order.symbol, query_time) else {
            if order.is_immediate {
                orders.get_mut(id).unwrap().defer_to_historical();
            }
            return Ok(());
        };

        if let Some(reason) = pre_trade_limit_check(&order, &price) {
            orders.reject(id, reason).unwrap();
            return Ok(());
        }

        let Some(trade_price) = form_price(&order, &price) else {
            if order.is_immediate {
                orders.get_mut(id).unwrap().defer_to_historical();
            }
            return Ok(());
        };

        let slipped = crate::slippage::apply_slippage(&self.config.slippage, order.side, trade_price);
        if let Some(reason) = post_price_limit_check(&slipped, &price) {
            orders.reject(id, reason).unwrap();
            return Ok(());
        }

        let fee = crate::commission::commission(&self.config.commission, order.side, slipped, order.quantity);

        let sufficiency = match order.side {
            Side::Buy => check_buy_sufficiency(positions, portfolio, &order.symbol, slipped, order.quantity, fee, trading_rule),
            Side::Sell => check_sell_sufficiency(positions, portfolio, &order.symbol, slipped, order.quantity, short_margin_rate, trading_mode),
        };

        if let Err(reason) = sufficiency {
            orders.reject(id, reason).unwrap();
            return Ok(());
        }

        orders.fill(id, slipped, fee, now).unwrap();

        let outcome = positions
            .process_trade(&order.symbol, order.side, order.quantity, slipped, now, short_margin_rate, trading_rule)
            .map_err(|e| MatchingError::Invariant(id, e.to_string()))?;
        let _ = outcome;

        let gross = slipped * order.quantity as f64;
        match order.side {
            Side::Buy => portfolio.apply_buy_cash_flow(gross, fee),
            Side::Sell => portfolio.apply_sell_cash_flow(gross, fee),
        }
        portfolio.update_financials(positions);

        Ok(())
    }

    /// End-of-day settlement (spec §4.3 "Daily settlement"): expires stale orders, rolls
    /// T+1 availability forward, and records snapshots/history rows.
    pub fn settle(
        &mut self,
        today: NaiveDate,
        at: DateTime<Utc>,
        orders: &mut OrderManager,
        positions: &mut PositionManager,
        portfolio: &mut Portfolio,
        data: &dyn DataProvider,
    ) {
        orders.clear_today(today);
        positions.settle_day(today, at, |symbol| {
            data.get_current_price(symbol, at).map(|p| p.current_price)
        });
        portfolio.record_history(today, positions);
        self.clear_daily_cache();
    }
}

fn pre_trade_limit_check(order: &Order, price: &PriceSnapshot) -> Option<&'static str> {
    match order.side {
        Side::Buy => {
            if let Some(high) = price.high_limit {
                if (price.current_price - high).abs() < PRICE_EPSILON {
                    return Some("price at upper limit, buy rejected");
                }
            }
        }
        Side::Sell => {
            if let Some(low) = price.low_limit {
                if (price.current_price - low).abs() < PRICE_EPSILON {
                    return Some("price at lower limit, sell rejected");
                }
            }
        }
    }
    None
}

/// Determines the trade price for this tick, or `None` if no fill is possible (limit order not
/// crossed), per spec §4.3 "Price formation".
fn form_price(order: &Order, price: &PriceSnapshot) -> Option<f64> {
    match (order.order_type, order.side, order.is_immediate) {
        (OrderType::Market, Side::Buy, _) => Some(price.ask1.unwrap_or(price.current_price)),
        (OrderType::Market, Side::Sell, _) => Some(price.bid1.unwrap_or(price.current_price)),
        (OrderType::Limit, Side::Buy, true) => {
            let market = price.ask1.unwrap_or(price.current_price);
            let limit = order.limit_price.expect("limit order carries a limit price");
            (limit >= market).then(|| limit.min(market))
        }
        (OrderType::Limit, Side::Sell, true) => {
            let market = price.bid1.unwrap_or(price.current_price);
            let limit = order.limit_price.expect("limit order carries a limit price");
            (limit <= market).then(|| limit.max(market))
        }
        (OrderType::Limit, Side::Buy, false) => {
            let limit = order.limit_price.expect("limit order carries a limit price");
            (price.current_price <= limit).then_some(limit)
        }
        (OrderType::Limit, Side::Sell, false) => {
            let limit = order.limit_price.expect("limit order carries a limit price");
            (price.current_price >= limit).then_some(limit)
        }
    }
}

fn post_price_limit_check(slipped: &f64, price: &PriceSnapshot) -> Option<&'static str> {
    if let Some(low) = price.low_limit {
        if *slipped < low - PRICE_EPSILON {
            return Some("slipped price below lower limit");
        }
    }
    if let Some(high) = price.high_limit {
        if *slipped > high + PRICE_EPSILON {
            return Some("slipped price above upper limit");
        }
    }
    None
}

fn check_buy_sufficiency(
    positions: &PositionManager,
    portfolio: &Portfolio,
    symbol: &str,
    price: f64,
    quantity: i64,
    commission: f64,
    trading_rule: TradingRule,
) -> Result<(), &'static str> {
    let cash_needed = price * quantity as f64 + commission;

    let margin_released = if let Some(short) = positions.get(symbol, Direction::Short) {
        if short.total_quantity > 0 {
            let available_to_cover = match trading_rule {
                TradingRule::T1 => short.available_quantity,
                TradingRule::T0 => short.total_quantity,
            };
            if quantity > available_to_cover {
                return Err("T+1 limit, insufficient short available");
            }
            short.margin() * quantity.min(short.total_quantity) as f64 / short.total_quantity as f64
        } else {
            0.0
        }
    } else {
        0.0
    };

    if portfolio.available_cash() + margin_released + PRICE_EPSILON >= cash_needed {
        Ok(())
    } else {
        Err("insufficient available cash")
    }
}

fn check_sell_sufficiency(
    positions: &PositionManager,
    portfolio: &Portfolio,
    symbol: &str,
    price: f64,
    quantity: i64,
    short_margin_rate: f64,
    trading_mode: TradingMode,
) -> Result<(), &'static str> {
    let available_long = positions
        .get(symbol, Direction::Long)
        .map(|p| p.available_quantity)
        .unwrap_or(0);

    if quantity <= available_long {
        return Ok(());
    }

    let residual = quantity - available_long;
    if !matches!(trading_mode, TradingMode::LongShort) {
        return Err("insufficient holding (long-only, no short permitted)");
    }

    let margin_needed = short_margin_rate * price * residual as f64;
    if portfolio.available_cash() + PRICE_EPSILON >= margin_needed {
        Ok(())
    } else {
        Err("insufficient available cash to open short residual")
    }
}
