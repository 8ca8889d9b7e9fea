use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::benchmark::BenchmarkRow;
use crate::portfolio::Portfolio;
use crate::position::Position;
use crate::session::{MarketPhase, SessionContext};

/// A read-only, fully copied-out view of the live session, published at quiescent points
/// (spec §5: "the publisher must copy-out its response rather than hand out references").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    pub current_dt: DateTime<Utc>,
    pub phase: MarketPhase,
    pub portfolio: Portfolio,
    pub positions: Vec<Position>,
    pub last_benchmark_row: Option<BenchmarkRow>,
}

impl PublishedSnapshot {
    pub fn capture(ctx: &SessionContext) -> Self {
        Self {
            current_dt: ctx.current_dt,
            phase: ctx.phase,
            portfolio: ctx.portfolio.clone(),
            positions: ctx.position_manager.iter().cloned().collect(),
            last_benchmark_row: ctx.benchmark.last().copied(),
        }
    }
}

/// External consumer contract: the scheduler calls [`Monitor::trigger_update`] at every
/// observable state change; the call must be non-blocking (spec §5). Grounded on
/// `engine/commander.rs` + `event.rs::MessageTransmitter` (the teacher's external-consumer
/// pattern), restyled around a shared `RwLock<PublishedSnapshot>` rather than a channel, since
/// this core has exactly one published value rather than an event stream.
pub trait Monitor: std::fmt::Debug + Send + Sync {
    fn trigger_update(&self, snapshot: PublishedSnapshot);
}

/// Default [`Monitor`]: holds the latest snapshot behind a `parking_lot::RwLock`. Readers
/// (e.g. a web UI polling thread) call [`SharedMonitor::current`], which clones out and never
/// holds the lock guard past the call.
#[derive(Debug, Clone, Default)]
pub struct SharedMonitor {
    inner: Arc<RwLock<Option<PublishedSnapshot>>>,
}

impl SharedMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<PublishedSnapshot> {
        self.inner.read().clone()
    }
}

impl Monitor for SharedMonitor {
    fn trigger_update(&self, snapshot: PublishedSnapshot) {
        *self.inner.write() = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{default_session_config, scripted_data_provider};
    use std::sync::Arc as StdArc;

    #[test]
    fn trigger_update_publishes_a_cloned_snapshot() {
        let config = default_session_config();
        let ctx = SessionContext::new(
            &config,
            StdArc::new(scripted_data_provider()),
            StdArc::new(crate::clock::SystemClock),
            Utc::now(),
        );

        let monitor = SharedMonitor::new();
        assert!(monitor.current().is_none());

        monitor.trigger_update(PublishedSnapshot::capture(&ctx));
        let published = monitor.current().unwrap();
        assert_eq!(published.portfolio.cash, config.account.initial_cash);
    }
}
