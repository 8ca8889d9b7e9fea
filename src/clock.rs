use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Injectable wall-clock source.
///
/// Never call `Utc::now()` directly from the scheduler - go through a [`Clock`] so tests can
/// drive accelerated or deterministic time. Mirrors the teacher framework's injected-clock idiom
/// (`barter::engine::clock`), simplified to the single operation the scheduler actually needs.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Default [`Clock`] used outside of tests: delegates to the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic [`Clock`] for tests: holds a fixed instant that can be advanced explicitly.
#[derive(Debug)]
pub struct FakeClock {
    millis: AtomicI64,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("FakeClock holds a valid timestamp")
    }
}

/// Sorted, deduplicated set of trading days, as returned by
/// `DataProvider::get_trading_calendar` (spec §4.7).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(mut days: Vec<NaiveDate>) -> Self {
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }

    pub fn contains_range(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = &NaiveDate> {
        self.days.iter().filter(move |d| **d >= start && **d <= end)
    }
}

/// Expands the configured schedule frequency into a sorted, deduplicated set of time-of-day
/// "schedule points" (spec §4.2, "Schedule-point construction").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Frequency {
    Daily { handle_bar: NaiveTime },
    Minute { sessions: Vec<(NaiveTime, NaiveTime)> },
    Tick {
        sessions: Vec<(NaiveTime, NaiveTime)>,
        interval_seconds: u32,
    },
}

impl Frequency {
    /// Builds the base schedule-point set for this frequency. `custom` points registered via
    /// `add_schedule` during `initialize` are merged in separately by the scheduler at `run` start.
    pub fn schedule_points(&self) -> Vec<NaiveTime> {
        let mut points = match self {
            Frequency::Daily { handle_bar } => vec![*handle_bar],
            Frequency::Minute { sessions } => expand_sessions(sessions, 60),
            Frequency::Tick {
                sessions,
                interval_seconds,
            } => expand_sessions(sessions, (*interval_seconds).max(1)),
        };
        points.sort_unstable();
        points.dedup();
        points
    }
}

fn expand_sessions(sessions: &[(NaiveTime, NaiveTime)], step_secs: u32) -> Vec<NaiveTime> {
    let mut out = Vec::new();
    for (start, end) in sessions {
        let mut t = *start;
        while t <= *end {
            out.push(t);
            t += chrono::Duration::seconds(step_secs as i64);
        }
    }
    out
}

/// Merges and deduplicates the base schedule points with strategy-registered custom points,
/// sorted ascending. Performed once at `run` start per spec §4.2.
pub fn merge_schedule_points(base: &[NaiveTime], custom: &[NaiveTime]) -> Vec<NaiveTime> {
    let mut all: Vec<NaiveTime> = base.iter().chain(custom.iter()).copied().collect();
    all.sort_unstable();
    all.dedup();
    all
}
