use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily row of `Benchmark.history` (spec §3 "Benchmark").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub date: NaiveDate,
    pub close: f64,
    pub cumulative_return: f64,
    pub scaled_value: f64,
}

/// Tracks a reference instrument's value curve, scaled to the session's initial cash so it can
/// be plotted alongside `Portfolio.net_worth`. Grounded on `qtrader/benchmark/benchmark_manager.py`
/// (original_source; the teacher framework has no benchmark analogue) and styled with the
/// `Vec<Row>` history idiom shared by [`crate::portfolio::Portfolio`] and
/// [`crate::position::manager::PositionManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub symbol: String,
    pub name: Option<String>,
    pub initial_price: Option<f64>,
    pub initial_value: f64,
    pub history: Vec<BenchmarkRow>,
}

impl Benchmark {
    pub fn new(symbol: impl Into<String>, name: Option<String>, initial_value: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name,
            initial_price: None,
            initial_value,
            history: Vec::new(),
        }
    }

    /// Records today's close, anchoring the scaled value against `initial_price` (set from the
    /// first recorded close). Idempotent per `date`.
    pub fn record(&mut self, date: NaiveDate, close: f64) {
        let initial_price = *self.initial_price.get_or_insert(close);
        let cumulative_return = if initial_price.abs() < f64::EPSILON {
            0.0
        } else {
            (close - initial_price) / initial_price
        };
        let scaled_value = self.initial_value * (1.0 + cumulative_return);

        self.history.retain(|r| r.date != date);
        self.history.push(BenchmarkRow {
            date,
            close,
            cumulative_return,
            scaled_value,
        });
    }

    pub fn last(&self) -> Option<&BenchmarkRow> {
        self.history.last()
    }
}
