use chrono::{DateTime, NaiveDate, Utc};

/// A single price read from the market data oracle (spec §4.7). All fields besides
/// `current_price` are optional and tolerated as missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSnapshot {
    pub current_price: f64,
    pub ask1: Option<f64>,
    pub bid1: Option<f64>,
    pub high_limit: Option<f64>,
    pub low_limit: Option<f64>,
}

/// Static per-symbol-per-day info (spec §4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol_name: String,
    pub is_suspended: bool,
}

/// External, read-only market data contract (spec §4.7). The core never mutates the provider;
/// implementors are free to back it with a CSV reader, exchange API, or (in tests) a scripted
/// fixture — see [`crate::test_support::ScriptedDataProvider`].
pub trait DataProvider: std::fmt::Debug + Send + Sync {
    fn get_trading_calendar(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    fn get_current_price(&self, symbol: &str, at: DateTime<Utc>) -> Option<PriceSnapshot>;

    fn get_symbol_info(&self, symbol: &str, date: NaiveDate) -> Option<SymbolInfo>;
}
