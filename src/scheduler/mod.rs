pub mod backtest;
pub mod simulation;

use chrono::NaiveTime;

pub use backtest::BacktestScheduler;
pub use simulation::{SchedulerStateSnapshot, SimulationScheduler};

use crate::clock::Frequency;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("engine.start_date/engine.end_date are required to build a backtest schedule")]
    MissingBacktestRange,

    #[error("no trading days in the configured [start_date, end_date] range")]
    EmptyTradingCalendar,
}

/// Builds the deduplicated, sorted schedule-point set for a frequency, merged with any custom
/// points a strategy registered during `initialize` (spec §4.2 "Schedule-point construction").
pub fn build_schedule_points(frequency: &Frequency, custom: &[NaiveTime]) -> Vec<NaiveTime> {
    crate::clock::merge_schedule_points(&frequency.schedule_points(), custom)
}
