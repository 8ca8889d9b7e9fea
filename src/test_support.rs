//! Fixture builders shared between unit and integration tests, analogous to the teacher's
//! `test_util` module.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{
    AccountConfig, BenchmarkConfig, EngineConfig, EngineMode, LifecycleConfig, MatchingConfig,
    SessionConfig, TradingMode, TradingRule, WorkspaceConfig,
};
use crate::data_provider::{DataProvider, PriceSnapshot, SymbolInfo};

pub fn default_session_config() -> SessionConfig {
    SessionConfig {
        engine: EngineConfig {
            mode: EngineMode::Backtest,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..EngineConfig::default()
        },
        account: AccountConfig {
            trading_mode: TradingMode::LongShort,
            trading_rule: TradingRule::T0,
            ..AccountConfig::default()
        },
        matching: MatchingConfig::default(),
        lifecycle: LifecycleConfig::default(),
        benchmark: BenchmarkConfig {
            symbol: "000300.SH".to_string(),
            name: None,
        },
        workspace: WorkspaceConfig::default(),
    }
}

/// A fully scripted [`DataProvider`] test double: a fixed trading calendar plus a table of
/// `(symbol, date) -> PriceSnapshot` entries registered ahead of time. Unregistered lookups
/// return `None`, exercising the data-gap path (spec §7 category 3).
#[derive(Debug, Default)]
pub struct ScriptedDataProvider {
    calendar: Vec<NaiveDate>,
    prices: Mutex<HashMap<(String, NaiveDate), PriceSnapshot>>,
    symbols: Mutex<HashMap<(String, NaiveDate), SymbolInfo>>,
}

impl ScriptedDataProvider {
    pub fn new(calendar: Vec<NaiveDate>) -> Self {
        Self {
            calendar,
            prices: Mutex::new(HashMap::new()),
            symbols: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_price(&self, symbol: &str, at: DateTime<Utc>, price: PriceSnapshot) {
        self.prices
            .lock()
            .unwrap()
            .insert((symbol.to_string(), at.date_naive()), price);
    }

    pub fn set_symbol_info(&self, symbol: &str, date: NaiveDate, info: SymbolInfo) {
        self.symbols.lock().unwrap().insert((symbol.to_string(), date), info);
    }
}

impl DataProvider for ScriptedDataProvider {
    fn get_trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.calendar
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }

    fn get_current_price(&self, symbol: &str, at: DateTime<Utc>) -> Option<PriceSnapshot> {
        self.prices
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), at.date_naive()))
            .copied()
    }

    fn get_symbol_info(&self, symbol: &str, date: NaiveDate) -> Option<SymbolInfo> {
        self.symbols
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), date))
            .cloned()
            .or_else(|| {
                Some(SymbolInfo {
                    symbol_name: symbol.to_string(),
                    is_suspended: false,
                })
            })
    }
}

pub fn scripted_data_provider() -> ScriptedDataProvider {
    let calendar = (1..=31)
        .filter_map(|day| NaiveDate::from_ymd_opt(2026, 1, day))
        .collect();
    ScriptedDataProvider::new(calendar)
}

pub fn default_order(
    symbol: &str,
    signed_qty: i64,
    at: DateTime<Utc>,
) -> crate::order::Order {
    crate::order::Order::new(
        symbol,
        crate::order::Side::from_signed_qty(signed_qty),
        crate::order::OrderType::Market,
        signed_qty.abs(),
        None,
        at,
        at,
        None,
    )
    .expect("valid fixture order")
}
