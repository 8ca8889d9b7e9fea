pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use manager::PositionManager;

use crate::config::TradingRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Accepts either variant name or its case-insensitive textual spelling, per spec §4.5.
    pub fn parse(raw: &str) -> Result<Self, PositionError> {
        match raw.to_ascii_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(PositionError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PositionError {
    #[error("invalid direction: {0:?}")]
    InvalidDirection(String),

    #[error("position {symbol}/{direction:?} not found")]
    NotFound { symbol: String, direction: Direction },

    #[error("cannot close {requested} units of {symbol}/{direction:?}, only {available} available")]
    InsufficientQuantity {
        symbol: String,
        direction: Direction,
        requested: i64,
        available: i64,
    },

    #[error("position quantity invariant violated for {symbol}/{direction:?}: {detail}")]
    InvariantViolation {
        symbol: String,
        direction: Direction,
        detail: String,
    },
}

/// Per-(symbol, direction) holding (spec §3 "Position"). Formulas for market value, unrealised
/// P&L, and margin are ported 1:1 from `qtrader/trading/position.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub total_quantity: i64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub initial_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub last_settle_price: f64,
    pub margin_rate: f64,
    pub trading_rule: TradingRule,
    pub today_open_quantity: i64,
    pub available_quantity: i64,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        direction: Direction,
        quantity: i64,
        price: f64,
        at: DateTime<Utc>,
        margin_rate: f64,
        trading_rule: TradingRule,
    ) -> Self {
        let (today_open, available) = match trading_rule {
            TradingRule::T1 => (quantity, 0),
            TradingRule::T0 => (0, quantity),
        };
        Self {
            symbol: symbol.into(),
            direction,
            total_quantity: quantity,
            avg_cost: price,
            current_price: price,
            initial_time: at,
            last_update_time: at,
            last_settle_price: price,
            margin_rate,
            trading_rule,
            today_open_quantity: today_open,
            available_quantity: available,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.total_quantity as f64 * self.current_price
    }

    /// Signed market value: negative for SHORT, per spec §4.3 settlement snapshot rule.
    pub fn signed_market_value(&self) -> f64 {
        self.direction.sign() * self.market_value()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.direction.sign() * self.total_quantity as f64 * (self.current_price - self.avg_cost)
    }

    pub fn unrealized_pnl_ratio(&self) -> f64 {
        let cost_basis = self.avg_cost * self.total_quantity as f64;
        if cost_basis.abs() < f64::EPSILON {
            0.0
        } else {
            self.unrealized_pnl() / cost_basis
        }
    }

    pub fn market_value_at_cost(&self) -> f64 {
        self.total_quantity as f64 * self.avg_cost
    }

    pub fn margin(&self) -> f64 {
        match self.direction {
            Direction::Short => self.total_quantity as f64 * self.current_price * self.margin_rate,
            Direction::Long => 0.0,
        }
    }

    /// Adds `quantity` units at `price`, updating the weighted-average cost. Newly opened
    /// quantity is only immediately available under T+0.
    pub fn increase(&mut self, quantity: i64, price: f64, at: DateTime<Utc>) {
        let new_total = self.total_quantity + quantity;
        if new_total > 0 {
            self.avg_cost = (self.avg_cost * self.total_quantity as f64 + price * quantity as f64)
                / new_total as f64;
        }
        self.total_quantity = new_total;
        self.current_price = price;
        self.last_update_time = at;
        match self.trading_rule {
            TradingRule::T1 => self.today_open_quantity += quantity,
            TradingRule::T0 => self.available_quantity += quantity,
        }
    }

    /// Closes `quantity` units, bounded by `available_quantity`. Returns the realised P&L for
    /// the closed quantity (`(avg_cost - fill_price)` for covering a SHORT, `(fill_price -
    /// avg_cost)` for closing a LONG, scaled by direction below).
    pub fn decrease(
        &mut self,
        quantity: i64,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<f64, PositionError> {
        if quantity > self.available_quantity {
            return Err(PositionError::InsufficientQuantity {
                symbol: self.symbol.clone(),
                direction: self.direction,
                requested: quantity,
                available: self.available_quantity,
            });
        }
        let realized = self.direction.sign() * (price - self.avg_cost) * quantity as f64;
        self.total_quantity -= quantity;
        self.available_quantity -= quantity;
        self.current_price = price;
        self.last_update_time = at;
        Ok(realized)
    }

    /// T+1 roll-forward: today's opens become available for the next trading day.
    pub fn settle_day(&mut self, close_price: f64, at: DateTime<Utc>) -> f64 {
        let pnl = self.direction.sign() * self.total_quantity as f64 * (close_price - self.last_settle_price);
        self.current_price = close_price;
        self.last_settle_price = close_price;
        self.last_update_time = at;
        if matches!(self.trading_rule, TradingRule::T1) {
            self.available_quantity += self.today_open_quantity;
            self.today_open_quantity = 0;
        }
        pnl
    }

    pub fn is_empty(&self) -> bool {
        self.total_quantity == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn direction_parse_is_case_insensitive() {
        assert_eq!(Direction::parse("LONG").unwrap(), Direction::Long);
        assert_eq!(Direction::parse("short").unwrap(), Direction::Short);
        assert!(Direction::parse("sideways").is_err());
    }

    #[test]
    fn t1_open_is_unavailable_until_settled() {
        let mut pos = Position::open("600000.SH", Direction::Long, 1000, 10.0, t(9), 0.0, TradingRule::T1);
        assert_eq!(pos.available_quantity, 0);
        assert_eq!(pos.today_open_quantity, 1000);
        assert!(pos.decrease(1, 11.0, t(10)).is_err());

        pos.settle_day(10.0, t(15));
        assert_eq!(pos.available_quantity, 1000);
        assert_eq!(pos.today_open_quantity, 0);
    }

    #[test]
    fn t0_open_is_immediately_available() {
        let pos = Position::open("600000.SH", Direction::Long, 1000, 10.0, t(9), 0.0, TradingRule::T0);
        assert_eq!(pos.available_quantity, 1000);
    }

    #[test]
    fn short_margin_uses_current_price() {
        let pos = Position::open("600000.SH", Direction::Short, 100, 150.0, t(9), 0.5, TradingRule::T0);
        assert_eq!(pos.margin(), 100.0 * 150.0 * 0.5);
    }

    #[test]
    fn decrease_computes_realized_pnl_for_short_cover() {
        let mut pos = Position::open("600000.SH", Direction::Short, 100, 150.0, t(9), 0.5, TradingRule::T0);
        let pnl = pos.decrease(100, 140.0, t(10)).unwrap();
        assert_eq!(pnl, 1000.0);
        assert!(pos.is_empty());
    }

    #[test]
    fn decrease_computes_realized_pnl_for_long_close() {
        let mut pos = Position::open("600000.SH", Direction::Long, 1000, 10.0, t(9), 0.0, TradingRule::T0);
        let pnl = pos.decrease(1000, 12.0, t(10)).unwrap();
        assert_eq!(pnl, 2000.0);
    }
}
