use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while loading or validating a [`SessionConfig`] (spec §10.3).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Backtest,
    Simulation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyKind {
    Daily,
    Minute,
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingRule {
    #[serde(rename = "T+0")]
    T0,
    #[serde(rename = "T+1")]
    T1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    LongShort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: EngineMode,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_frequency")]
    pub frequency: FrequencyKind,
    #[serde(default)]
    pub frequency_options: HashMap<String, Value>,
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u32,
    #[serde(default)]
    pub enable_intraday_statistics: bool,
    #[serde(default = "default_intraday_update_frequency")]
    pub intraday_update_frequency_minutes: u32,
    #[serde(default = "default_block_threshold_seconds")]
    pub block_threshold_seconds: u64,
}

fn default_strategy_name() -> String {
    "UnnamedStrategy".into()
}
fn default_frequency() -> FrequencyKind {
    FrequencyKind::Daily
}
fn default_tick_interval_seconds() -> u32 {
    3
}
fn default_intraday_update_frequency() -> u32 {
    5
}
fn default_block_threshold_seconds() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Backtest,
            strategy_name: default_strategy_name(),
            start_date: None,
            end_date: None,
            frequency: default_frequency(),
            frequency_options: HashMap::new(),
            tick_interval_seconds: default_tick_interval_seconds(),
            enable_intraday_statistics: false,
            intraday_update_frequency_minutes: default_intraday_update_frequency(),
            block_threshold_seconds: default_block_threshold_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_trading_rule")]
    pub trading_rule: TradingRule,
    #[serde(default = "default_trading_mode")]
    pub trading_mode: TradingMode,
    #[serde(default = "default_short_margin_rate")]
    pub short_margin_rate: f64,
    #[serde(default = "default_order_lot_size")]
    pub order_lot_size: i64,
}

fn default_initial_cash() -> f64 {
    1_000_000.0
}
fn default_trading_rule() -> TradingRule {
    TradingRule::T1
}
fn default_trading_mode() -> TradingMode {
    TradingMode::LongOnly
}
fn default_short_margin_rate() -> f64 {
    0.2
}
fn default_order_lot_size() -> i64 {
    1
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            trading_rule: default_trading_rule(),
            trading_mode: default_trading_mode(),
            short_margin_rate: default_short_margin_rate(),
            order_lot_size: default_order_lot_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionConfig {
    #[serde(default = "default_buy_commission")]
    pub buy_commission: f64,
    #[serde(default = "default_sell_commission")]
    pub sell_commission: f64,
    #[serde(default)]
    pub buy_tax: f64,
    #[serde(default = "default_sell_tax")]
    pub sell_tax: f64,
    #[serde(default = "default_min_commission")]
    pub min_commission: f64,
}

fn default_buy_commission() -> f64 {
    0.0002
}
fn default_sell_commission() -> f64 {
    0.0002
}
fn default_sell_tax() -> f64 {
    0.001
}
fn default_min_commission() -> f64 {
    5.0
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            buy_commission: default_buy_commission(),
            sell_commission: default_sell_commission(),
            buy_tax: 0.0,
            sell_tax: default_sell_tax(),
            min_commission: default_min_commission(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlippageKind {
    Fixed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlippageConfig {
    #[serde(default = "default_slippage_kind")]
    pub kind: SlippageKind,
    #[serde(default = "default_slippage_rate")]
    pub rate: f64,
}

fn default_slippage_kind() -> SlippageKind {
    SlippageKind::Fixed
}
fn default_slippage_rate() -> f64 {
    0.001
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            kind: default_slippage_kind(),
            rate: default_slippage_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub slippage: SlippageConfig,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            commission: CommissionConfig::default(),
            slippage: SlippageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_before_trading")]
    pub before_trading: NaiveTime,
    #[serde(default = "default_after_trading")]
    pub after_trading: NaiveTime,
    #[serde(default = "default_broker_settle")]
    pub broker_settle: NaiveTime,
    #[serde(default = "default_handle_bar")]
    pub handle_bar: NaiveTime,
}

fn default_before_trading() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap()
}
fn default_after_trading() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 5, 0).unwrap()
}
fn default_broker_settle() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap()
}
fn default_handle_bar() -> NaiveTime {
    NaiveTime::from_hms_opt(14, 55, 0).unwrap()
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            before_trading: default_before_trading(),
            after_trading: default_after_trading(),
            broker_settle: default_broker_settle(),
            handle_bar: default_handle_bar(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub trading_sessions: Vec<(NaiveTime, NaiveTime)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoSaveMode {
    Overwrite,
    Increment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub auto_save_state: bool,
    #[serde(default = "default_auto_save_interval_days")]
    pub auto_save_interval_days: u32,
    #[serde(default = "default_auto_save_mode")]
    pub auto_save_mode: AutoSaveMode,
}

fn default_auto_save_interval_days() -> u32 {
    1
}
fn default_auto_save_mode() -> AutoSaveMode {
    AutoSaveMode::Overwrite
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            auto_save_state: false,
            auto_save_interval_days: default_auto_save_interval_days(),
            auto_save_mode: default_auto_save_mode(),
        }
    }
}

/// Strongly-typed view over the recognised configuration keys of spec §6, loaded via
/// `serde_json` (grounded on the teacher's `Config` deserialize structs in
/// `strategy/strategy.rs` and `execution/simulated.rs`, generalised into one document).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl SessionConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.engine.mode, EngineMode::Backtest) {
            let (Some(start), Some(end)) = (self.engine.start_date, self.engine.end_date) else {
                return Err(ConfigError::Invalid(
                    "engine.start_date and engine.end_date are required in backtest mode".into(),
                ));
            };
            if start > end {
                return Err(ConfigError::Invalid(
                    "engine.start_date must not be after engine.end_date".into(),
                ));
            }
        }

        if self.account.short_margin_rate <= 0.0 || self.account.short_margin_rate > 1.0 {
            return Err(ConfigError::Invalid(
                "account.short_margin_rate must be within (0, 1]".into(),
            ));
        }

        if self.account.order_lot_size <= 0 {
            return Err(ConfigError::Invalid(
                "account.order_lot_size must be positive".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_backtest_json() -> &'static str {
        r#"{
            "engine": {"mode": "backtest", "start_date": "2026-01-01", "end_date": "2026-01-31"},
            "benchmark": {"symbol": "000300.SH"}
        }"#
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let config = SessionConfig::from_json(minimal_backtest_json()).unwrap();
        assert_eq!(config.account.initial_cash, 1_000_000.0);
        assert!(matches!(config.account.trading_rule, TradingRule::T1));
        assert_eq!(config.matching.commission.min_commission, 5.0);
        assert_eq!(config.lifecycle.hooks.handle_bar, default_handle_bar());
    }

    #[test]
    fn rejects_backtest_without_dates() {
        let raw = r#"{"engine": {"mode": "backtest"}, "benchmark": {"symbol": "x"}}"#;
        assert!(matches!(
            SessionConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_margin_rate() {
        let raw = r#"{
            "engine": {"mode": "backtest", "start_date": "2026-01-01", "end_date": "2026-01-02"},
            "account": {"short_margin_rate": 1.5},
            "benchmark": {"symbol": "x"}
        }"#;
        assert!(matches!(
            SessionConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }
}
