#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

//! # qsim-core
//! A deterministic event scheduler and matching/accounting engine for building backtesting and
//! real-clock trading simulation systems.
//!
//! * **Deterministic**: a fixed trading-day × schedule-point cursor drives backtests
//!   bit-for-bit the same way every run.
//! * **Dual-mode**: the same [`strategy::Strategy`] runs unmodified against a
//!   [`scheduler::BacktestScheduler`] or a real-clock [`scheduler::SimulationScheduler`].
//! * **Isolated**: strategy hooks are dispatched through [`dispatcher::Dispatcher`], which
//!   catches both `Err` and panics so one faulty hook never takes down a session.
//! * **Resumable**: [`state::StateBlob`] captures a point-in-time copy of the whole session for
//!   save/restore/fork.
//!
//! At a high level it provides:
//! * A [`session::SessionContext`] holding the portfolio, position book, order book, matching
//!   engine and benchmark, threaded by reference through every hook rather than held globally.
//! * A [`config::SessionConfig`] deserialised from JSON with validation and layered defaults.
//! * A [`data_provider::DataProvider`] trait as the only external input the core depends on.

/// Reference instrument value curve scaled against the session's initial cash.
pub mod benchmark;

/// Injectable wall-clock, trading-calendar and schedule-point construction.
pub mod clock;

/// Pure commission/tax calculation.
pub mod commission;

/// JSON-backed session configuration, with validation and layered defaults.
pub mod config;

/// The external, read-only market data contract.
pub mod data_provider;

/// Catches `Err`s and panics from arbitrary strategy hook code.
pub mod dispatcher;

/// The crate-level aggregate error type.
pub mod error;

/// Default tracing subscriber initialisers.
pub mod logging;

/// Pre-trade checks, price formation, fill application and daily settlement.
pub mod matching;

/// Publishes read-only session snapshots to external observers (e.g. a UI).
pub mod monitor;

/// Order lifecycle, submission and the order book.
pub mod order;

/// Portfolio cash/margin/valuation aggregates.
pub mod portfolio;

/// Position lifecycle, FIFO trade application and daily settlement.
pub mod position;

/// Backtest and simulation schedulers: the two event-loop implementations.
pub mod scheduler;

/// Shared mutable session coordination state.
pub mod session;

/// Point-in-time session serialization: save, restore, fork.
pub mod state;

/// Pure slippage calculation.
pub mod slippage;

/// The `Strategy` trait user code implements.
pub mod strategy;

/// Fixture builders shared between unit and integration tests.
pub mod test_support;

pub use config::SessionConfig;
pub use data_provider::DataProvider;
pub use dispatcher::Dispatcher;
pub use error::SessionError;
pub use scheduler::{BacktestScheduler, SimulationScheduler};
pub use session::SessionContext;
pub use state::StateBlob;
pub use strategy::Strategy;
