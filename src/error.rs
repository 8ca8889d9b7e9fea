use crate::{
    config::ConfigError, matching::MatchingError, order::OrderError, position::PositionError,
    scheduler::SchedulerError, state::SerializerError,
};

/// Top level error for any framework fault (spec §7, category 4) that terminalises a running
/// session. Aggregates the per-module error types via `#[from]`, mirroring how the individual
/// `*::error` modules each own a small `thiserror` enum rather than sharing one.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("position error: {0}")]
    Position(#[from] PositionError),

    #[error("matching error: {0}")]
    Matching(#[from] MatchingError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("state serialization error: {0}")]
    Serializer(#[from] SerializerError),

    #[error("invariant violated: {0}")]
    Invariant(String),
}
