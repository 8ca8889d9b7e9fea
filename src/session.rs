use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::benchmark::Benchmark;
use crate::clock::Clock;
use crate::config::{SessionConfig, TradingMode, TradingRule};
use crate::data_provider::DataProvider;
use crate::matching::MatchingEngine;
use crate::order::OrderManager;
use crate::portfolio::Portfolio;
use crate::position::{Direction, Position, PositionManager};

#[derive(Debug, thiserror::Error)]
pub enum SessionContextError {
    #[error("set_initial_state may only be called once, during initialize()")]
    InitialStateAlreadySet,

    #[error("set_initial_state/add_schedule may only be called during initialize()")]
    NotInitializing,

    #[error("align_account_state may only be called while the market is not TRADING")]
    MarketIsTrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    Backtest,
    Simulation,
}

impl From<crate::config::EngineMode> for EngineMode {
    fn from(mode: crate::config::EngineMode) -> Self {
        match mode {
            crate::config::EngineMode::Backtest => EngineMode::Backtest,
            crate::config::EngineMode::Simulation => EngineMode::Simulation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketPhase {
    Closed,
    BeforeTrading,
    Trading,
    AfterTrading,
    Settlement,
}

/// Interruption/coordination flags read by the scheduler at each checkpoint (spec §5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionFlags {
    pub running: bool,
    pub paused: bool,
    pub pause_requested: bool,
    pub stop_requested: bool,
    pub resync_requested: bool,
    pub strategy_error_today: bool,
    /// Set when the loop terminated due to a framework fault (spec §7 category 4) rather than a
    /// normal stop request, mirroring `context.py`'s `was_interrupted` flag.
    pub was_interrupted: bool,
}

/// Everything a [`crate::strategy::Strategy`] hook can read or mutate, plus the state owned
/// exclusively by the session (spec §3 "Trading session context", "Ownership"). Threaded by
/// reference everywhere rather than held in a global, per DESIGN NOTE §9 "Shared mutable
/// session state".
#[derive(Debug)]
pub struct SessionContext {
    pub mode: EngineMode,
    pub current_dt: DateTime<Utc>,
    pub phase: MarketPhase,
    pub flags: SessionFlags,
    pub trading_rule: TradingRule,
    pub trading_mode: TradingMode,
    pub short_margin_rate: f64,

    pub portfolio: Portfolio,
    pub position_manager: PositionManager,
    pub order_manager: OrderManager,
    pub matching_engine: MatchingEngine,
    pub benchmark: Benchmark,

    pub data_provider: Arc<dyn DataProvider>,
    pub clock: Arc<dyn Clock>,

    user_data: std::collections::HashMap<String, Value>,
    custom_schedule_points: Vec<NaiveTime>,
    is_initializing: bool,
    initial_state_set: bool,
}

impl SessionContext {
    pub fn new(
        config: &SessionConfig,
        data_provider: Arc<dyn DataProvider>,
        clock: Arc<dyn Clock>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mode: config.engine.mode.into(),
            current_dt: now,
            phase: MarketPhase::Closed,
            flags: SessionFlags::default(),
            trading_rule: config.account.trading_rule,
            trading_mode: config.account.trading_mode,
            short_margin_rate: config.account.short_margin_rate,
            portfolio: Portfolio::new(config.account.initial_cash),
            position_manager: PositionManager::new(),
            order_manager: OrderManager::new(config.account.order_lot_size),
            matching_engine: MatchingEngine::new(config.matching.clone()),
            benchmark: Benchmark::new(
                config.benchmark.symbol.clone(),
                config.benchmark.name.clone(),
                config.account.initial_cash,
            ),
            data_provider,
            clock,
            user_data: std::collections::HashMap::new(),
            custom_schedule_points: Vec::new(),
            is_initializing: false,
            initial_state_set: false,
        }
    }

    pub fn begin_initializing(&mut self) {
        self.is_initializing = true;
    }

    pub fn end_initializing(&mut self) {
        self.is_initializing = false;
    }

    pub fn is_initializing(&self) -> bool {
        self.is_initializing
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.user_data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str, default: Value) -> Value {
        self.user_data.get(key).cloned().unwrap_or(default)
    }

    pub fn user_data(&self) -> &std::collections::HashMap<String, Value> {
        &self.user_data
    }

    pub fn restore_user_data(&mut self, data: std::collections::HashMap<String, Value>) {
        self.user_data = data;
    }

    /// Registers an additional schedule point; only callable during `initialize` (spec §4.1).
    pub fn add_schedule(&mut self, at: NaiveTime) -> Result<(), SessionContextError> {
        if !self.is_initializing {
            return Err(SessionContextError::NotInitializing);
        }
        self.custom_schedule_points.push(at);
        Ok(())
    }

    pub fn custom_schedule_points(&self) -> &[NaiveTime] {
        &self.custom_schedule_points
    }

    pub fn restore_custom_schedule_points(&mut self, points: Vec<NaiveTime>) {
        self.custom_schedule_points = points;
    }

    /// At-most-once initial account override, callable only during `initialize` (spec §6).
    pub fn set_initial_state(
        &mut self,
        cash: f64,
        positions: Vec<(String, Direction, i64, f64)>,
    ) -> Result<(), SessionContextError> {
        if !self.is_initializing {
            return Err(SessionContextError::NotInitializing);
        }
        if self.initial_state_set {
            return Err(SessionContextError::InitialStateAlreadySet);
        }
        self.apply_account_override(cash, positions);
        self.initial_state_set = true;
        Ok(())
    }

    /// Manual account override usable outside `initialize`, but only while the market is not
    /// actively TRADING (spec §6).
    pub fn align_account_state(
        &mut self,
        cash: f64,
        positions: Vec<(String, Direction, i64, f64)>,
    ) -> Result<(), SessionContextError> {
        if self.phase == MarketPhase::Trading {
            return Err(SessionContextError::MarketIsTrading);
        }
        self.apply_account_override(cash, positions);
        Ok(())
    }

    fn apply_account_override(&mut self, cash: f64, positions: Vec<(String, Direction, i64, f64)>) {
        self.portfolio.cash = cash;
        for (symbol, direction, quantity, price) in positions {
            self.position_manager.adjust_position(Position::open(
                symbol,
                direction,
                quantity,
                price,
                self.current_dt,
                self.short_margin_rate,
                self.trading_rule,
            ));
        }
        self.portfolio.update_financials(&self.position_manager);
    }
}
