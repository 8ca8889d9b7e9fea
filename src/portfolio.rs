use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::position::{Direction, PositionManager};

#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("insufficient available cash: need {needed}, have {available}")]
    InsufficientCash { needed: f64, available: f64 },
}

/// One daily row of `Portfolio.history` (spec §3 "Portfolio").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub margin: f64,
    pub long_market_value: f64,
    pub short_liability: f64,
    pub net_positions_value: f64,
    pub total_assets: f64,
    pub net_worth: f64,
    pub available_cash: f64,
    pub returns: f64,
}

/// Cash, margin and derived valuation aggregates (spec §3/§4.6). A pure aggregator: every
/// derived field is recomputed from the current position set by [`Portfolio::update_financials`],
/// never mutated directly, grounded on `src/portfolio/portfolio.rs`'s recompute-on-read shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_cash: f64,
    pub cash: f64,
    pub margin: f64,
    pub long_market_value: f64,
    pub short_liability: f64,
    pub net_positions_value: f64,
    pub total_assets: f64,
    pub net_worth: f64,
    pub history: Vec<PortfolioSnapshot>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            margin: 0.0,
            long_market_value: 0.0,
            short_liability: 0.0,
            net_positions_value: 0.0,
            total_assets: initial_cash,
            net_worth: initial_cash,
            history: Vec::new(),
        }
    }

    pub fn available_cash(&self) -> f64 {
        self.cash - self.margin
    }

    pub fn returns(&self) -> f64 {
        if self.initial_cash.abs() < f64::EPSILON {
            0.0
        } else {
            (self.net_worth - self.initial_cash) / self.initial_cash
        }
    }

    /// Recomputes margin, long/short MV, net positions, total assets and net worth from `pm` in
    /// one pass (spec §4.6).
    pub fn update_financials(&mut self, pm: &PositionManager) {
        let mut margin = 0.0;
        let mut long_mv = 0.0;
        let mut short_liability = 0.0;

        for position in pm.iter() {
            match position.direction {
                Direction::Long => long_mv += position.market_value(),
                Direction::Short => {
                    short_liability += position.market_value();
                    margin += position.margin();
                }
            }
        }

        self.margin = margin;
        self.long_market_value = long_mv;
        self.short_liability = short_liability;
        self.net_positions_value = long_mv - short_liability;
        self.total_assets = self.cash + long_mv;
        self.net_worth = self.cash + self.net_positions_value;
    }

    /// Calls [`Self::update_financials`] then appends (replacing any existing row for `date`,
    /// for idempotent re-settlement) a history row.
    pub fn record_history(&mut self, date: NaiveDate, pm: &PositionManager) {
        self.update_financials(pm);
        self.history.retain(|row| row.date != date);
        self.history.push(PortfolioSnapshot {
            date,
            cash: self.cash,
            margin: self.margin,
            long_market_value: self.long_market_value,
            short_liability: self.short_liability,
            net_positions_value: self.net_positions_value,
            total_assets: self.total_assets,
            net_worth: self.net_worth,
            available_cash: self.available_cash(),
            returns: self.returns(),
        });
    }

    pub fn apply_buy_cash_flow(&mut self, gross: f64, commission: f64) {
        self.cash -= gross + commission;
    }

    pub fn apply_sell_cash_flow(&mut self, gross: f64, commission: f64) {
        self.cash += gross - commission;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingRule;
    use crate::order::Side;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn short_then_cover_profit_scenario() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        let mut pm = PositionManager::new();

        let outcome = pm
            .process_trade("600000.SH", Side::Sell, 100, 150.0, t(9), 0.5, TradingRule::T0)
            .unwrap();
        portfolio.apply_sell_cash_flow(100.0 * 150.0, 0.0);
        let _ = outcome;
        portfolio.update_financials(&pm);

        assert_eq!(portfolio.cash, 1_015_000.0);
        assert_eq!(portfolio.margin, 7_500.0);
        assert_eq!(portfolio.net_worth, 1_000_000.0);
        assert_eq!(portfolio.short_liability, 15_000.0);

        pm.process_trade("600000.SH", Side::Buy, 100, 140.0, t(10), 0.5, TradingRule::T0)
            .unwrap();
        portfolio.apply_buy_cash_flow(100.0 * 140.0, 0.0);
        portfolio.update_financials(&pm);

        assert_eq!(portfolio.cash, 1_001_000.0);
        assert_eq!(portfolio.margin, 0.0);
        assert_eq!(portfolio.net_worth, 1_001_000.0);
    }

    #[test]
    fn record_history_replaces_same_day_row() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        let pm = PositionManager::new();
        let date = t(9).date_naive();
        portfolio.record_history(date, &pm);
        portfolio.cash = 999_000.0;
        portfolio.record_history(date, &pm);
        assert_eq!(portfolio.history.iter().filter(|r| r.date == date).count(), 1);
        assert_eq!(portfolio.history.last().unwrap().cash, 999_000.0);
    }
}
