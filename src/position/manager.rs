use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Direction, Position, PositionError};
use crate::config::TradingRule;
use crate::order::Side;

/// A point-in-time copy of a [`Position`], recorded once per trading day at settlement
/// (spec §4.3 step 2/4). Carries its own date so a day's snapshot can be idempotently replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub date: NaiveDate,
    pub position: Position,
}

/// The net effect of applying one filled trade to the position book: realised P&L and the cash
/// delta the caller (the matching engine) must apply to the portfolio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub realized_pnl: f64,
    pub covered_quantity: i64,
    pub opened_quantity: i64,
}

/// `(symbol, direction) -> Position` map with FIFO cover-then-open trade application
/// (spec §4.5), grounded on `qtrader/trading/position_manager.py`.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: IndexMap<(String, Direction), Position>,
    snapshots: Vec<PositionSnapshot>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            positions: IndexMap::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn get(&self, symbol: &str, direction: Direction) -> Option<&Position> {
        self.positions.get(&(symbol.to_string(), direction))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        self.positions.values_mut()
    }

    pub fn snapshots(&self) -> &[PositionSnapshot] {
        &self.snapshots
    }

    /// Applies a filled trade: BUY first covers an existing SHORT in the symbol (bounded by
    /// availability), any residual opens/increases a LONG; SELL mirrors this against LONG/SHORT.
    pub fn process_trade(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: f64,
        at: DateTime<Utc>,
        margin_rate: f64,
        trading_rule: TradingRule,
    ) -> Result<TradeOutcome, PositionError> {
        let (closing_direction, opening_direction) = match side {
            Side::Buy => (Direction::Short, Direction::Long),
            Side::Sell => (Direction::Long, Direction::Short),
        };

        let available_to_close = self
            .get(symbol, closing_direction)
            .map(|p| p.available_quantity)
            .unwrap_or(0);
        let covered = quantity.min(available_to_close.max(0));
        let opened = quantity - covered;

        let mut realized_pnl = 0.0;
        if covered > 0 {
            let key = (symbol.to_string(), closing_direction);
            let position = self
                .positions
                .get_mut(&key)
                .ok_or_else(|| PositionError::NotFound {
                    symbol: symbol.to_string(),
                    direction: closing_direction,
                })?;
            realized_pnl += position.decrease(covered, price, at)?;
            if position.is_empty() {
                self.positions.shift_remove(&key);
            }
        }

        if opened > 0 {
            let key = (symbol.to_string(), opening_direction);
            self.positions
                .entry(key)
                .and_modify(|p| p.increase(opened, price, at))
                .or_insert_with(|| {
                    Position::open(symbol, opening_direction, opened, price, at, margin_rate, trading_rule)
                });
        }

        Ok(TradeOutcome {
            realized_pnl,
            covered_quantity: covered,
            opened_quantity: opened,
        })
    }

    /// Manual override entry point used by the session context API (`set_initial_state`,
    /// `align_account_state`); inserts or replaces the position wholesale.
    pub fn adjust_position(&mut self, position: Position) {
        self.positions
            .insert((position.symbol.clone(), position.direction), position);
    }

    /// Daily settlement pass: refreshes every position's current/settle price and rolls T+1
    /// availability forward. Positions whose close price is unavailable are skipped (data gap,
    /// spec §7 category 3) but still kept in the book for the next day.
    pub fn settle_day<F>(&mut self, today: NaiveDate, at: DateTime<Utc>, mut close_price_for: F)
    where
        F: FnMut(&str) -> Option<f64>,
    {
        self.snapshots.retain(|s| s.date != today);

        let symbols: Vec<(String, Direction)> = self.positions.keys().cloned().collect();
        for key in symbols {
            let Some(close) = close_price_for(&key.0) else {
                tracing::warn!(symbol = %key.0, "no close price available for settlement, skipping snapshot");
                continue;
            };
            let position = self.positions.get_mut(&key).expect("key just enumerated");
            position.settle_day(close, at);
            self.snapshots.push(PositionSnapshot {
                date: today,
                position: position.clone(),
            });
        }

        self.positions.retain(|_, p| !p.is_empty());
    }

    pub fn restore_positions(&mut self, positions: Vec<Position>) {
        self.positions = positions
            .into_iter()
            .map(|p| ((p.symbol.clone(), p.direction), p))
            .collect();
    }

    pub fn restore_daily_snapshots(&mut self, snapshots: Vec<PositionSnapshot>) {
        self.snapshots = snapshots;
    }
}
