use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HooksConfig;
use crate::dispatcher::{Dispatcher, Hook};
use crate::monitor::{Monitor, PublishedSnapshot};
use crate::session::{MarketPhase, SessionContext};
use crate::strategy::Strategy;

/// Serialisable snapshot of [`SimulationScheduler`]'s daily one-shot flags and trading-day cache,
/// grounded on `qtrader/core/scheduler.py`'s `context.scheduler_state_machine` dict. Without this,
/// a restored simulation session re-fires the day's `before_trading`/`after_trading`/settlement
/// hooks, since those flags would otherwise reset to their initial values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStateSnapshot {
    pub trading_day_cache: HashMap<NaiveDate, bool>,
    pub today: Option<NaiveDate>,
    pub before_trading_done: bool,
    pub after_trading_done: bool,
    pub settled_today: bool,
    pub last_executed_bar: Option<NaiveTime>,
}

/// Outcome of one [`SimulationScheduler::tick`], telling the host loop whether to keep calling
/// at ~1Hz, back off while paused, or stop entirely (spec §4.2 "Simulation loop").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Paused,
    Stopped,
}

/// Persistent real-clock-driven state machine (spec §4.2 "Simulation loop"), safe to restart
/// from a [`crate::state::StateBlob`] since all of its fields are plain data. Grounded on
/// `qtrader/core/scheduler.py`'s simulation branch for the exact phase/one-shot/bar-tolerance
/// semantics; the daily-flag-and-last-bar-cache shape is called out explicitly as "make this
/// explicit and serialisable" in DESIGN NOTE §9.
#[derive(Debug)]
pub struct SimulationScheduler {
    schedule_points: Vec<NaiveTime>,
    hooks: HooksConfig,
    sessions: Vec<(NaiveTime, NaiveTime)>,
    tolerance: Duration,

    trading_day_cache: HashMap<NaiveDate, bool>,
    today: Option<NaiveDate>,
    before_trading_done: bool,
    after_trading_done: bool,
    settled_today: bool,
    last_executed_bar: Option<NaiveTime>,
}

impl SimulationScheduler {
    pub fn new(
        schedule_points: Vec<NaiveTime>,
        hooks: HooksConfig,
        sessions: Vec<(NaiveTime, NaiveTime)>,
        tolerance: Duration,
    ) -> Self {
        Self {
            schedule_points,
            hooks,
            sessions,
            tolerance,
            trading_day_cache: HashMap::new(),
            today: None,
            before_trading_done: false,
            after_trading_done: false,
            settled_today: false,
            last_executed_bar: None,
        }
    }

    /// Captures the daily one-shot flags and trading-day cache for persistence.
    pub fn state_snapshot(&self) -> SchedulerStateSnapshot {
        SchedulerStateSnapshot {
            trading_day_cache: self.trading_day_cache.clone(),
            today: self.today,
            before_trading_done: self.before_trading_done,
            after_trading_done: self.after_trading_done,
            settled_today: self.settled_today,
            last_executed_bar: self.last_executed_bar,
        }
    }

    /// Inverse of [`Self::state_snapshot`], used when resuming from a [`crate::state::StateBlob`].
    pub fn restore_state(&mut self, snapshot: SchedulerStateSnapshot) {
        self.trading_day_cache = snapshot.trading_day_cache;
        self.today = snapshot.today;
        self.before_trading_done = snapshot.before_trading_done;
        self.after_trading_done = snapshot.after_trading_done;
        self.settled_today = snapshot.settled_today;
        self.last_executed_bar = snapshot.last_executed_bar;
    }

    fn is_trading_day(&mut self, ctx: &SessionContext, date: NaiveDate) -> bool {
        let data = ctx.data_provider.clone();
        *self
            .trading_day_cache
            .entry(date)
            .or_insert_with(|| !data.get_trading_calendar(date, date).is_empty())
    }

    fn classify(&self, time: NaiveTime) -> MarketPhase {
        if time < self.hooks.before_trading {
            return MarketPhase::Closed;
        }
        let first_session_start = self.sessions.first().map(|(s, _)| *s).unwrap_or(self.hooks.before_trading);
        if time < first_session_start {
            return MarketPhase::BeforeTrading;
        }
        if self.sessions.iter().any(|(start, end)| time >= *start && time <= *end) {
            return MarketPhase::Trading;
        }
        if time < self.hooks.after_trading {
            return MarketPhase::BeforeTrading;
        }
        if time < self.hooks.broker_settle {
            return MarketPhase::AfterTrading;
        }
        MarketPhase::Settlement
    }

    /// Runs one ~1Hz iteration. The host application is responsible for the actual sleep
    /// between calls (spec §4.2 step 7) and for translating [`TickOutcome::Stopped`] into
    /// loop termination.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) -> TickOutcome {
        if ctx.flags.stop_requested {
            return self.finalize_stop(strategy, ctx, dispatcher, monitor);
        }

        if ctx.flags.pause_requested {
            ctx.flags.paused = true;
            publish(monitor, ctx);
            return TickOutcome::Paused;
        }
        ctx.flags.paused = false;

        let today = now.date_naive();
        if self.today != Some(today) {
            self.today = Some(today);
            self.before_trading_done = false;
            self.after_trading_done = false;
            self.settled_today = false;
            self.last_executed_bar = None;
        }

        ctx.current_dt = now;

        if !self.is_trading_day(ctx, today) {
            ctx.phase = MarketPhase::Closed;
            return TickOutcome::Continue;
        }

        ctx.phase = self.classify(now.time());

        if ctx.phase == MarketPhase::BeforeTrading && !self.before_trading_done {
            self.before_trading_done = true;
            dispatcher.dispatch(Hook::BeforeTrading, strategy, ctx);
            publish(monitor, ctx);
            if self.handle_resync(now, ctx) {
                return TickOutcome::Continue;
            }
        }

        if ctx.phase == MarketPhase::Trading {
            self.try_run_bar(now, strategy, ctx, dispatcher, monitor);
            if ctx.flags.stop_requested {
                return self.finalize_stop(strategy, ctx, dispatcher, monitor);
            }
            if self.handle_resync(now, ctx) {
                return TickOutcome::Continue;
            }
        }

        if ctx.phase == MarketPhase::AfterTrading && !self.after_trading_done && now.time() >= self.hooks.after_trading {
            self.after_trading_done = true;
            dispatcher.dispatch(Hook::AfterTrading, strategy, ctx);
            publish(monitor, ctx);
            if self.handle_resync(now, ctx) {
                return TickOutcome::Continue;
            }
        }

        if ctx.phase == MarketPhase::Settlement && !self.settled_today {
            self.settled_today = true;
            let data = ctx.data_provider.clone();
            ctx.matching_engine.settle(
                today,
                now,
                &mut ctx.order_manager,
                &mut ctx.position_manager,
                &mut ctx.portfolio,
                data.as_ref(),
            );
            dispatcher.dispatch(Hook::BrokerSettle, strategy, ctx);
            let symbol = ctx.benchmark.symbol.clone();
            match data.get_current_price(&symbol, now) {
                Some(price) => ctx.benchmark.record(today, price.current_price),
                None => tracing::warn!(date = %today, "no benchmark close price, skipping benchmark row"),
            }
            publish(monitor, ctx);
            if self.handle_resync(now, ctx) {
                return TickOutcome::Continue;
            }
        }

        TickOutcome::Continue
    }

    fn try_run_bar(
        &mut self,
        now: DateTime<Utc>,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) {
        let Some(point) = self
            .schedule_points
            .iter()
            .copied()
            .filter(|p| *p <= now.time())
            .max()
        else {
            return;
        };

        let fresh = match self.last_executed_bar {
            Some(last) => point > last,
            None => true,
        };
        if !fresh {
            return;
        }
        self.last_executed_bar = Some(point);

        let today = now.date_naive();
        let scheduled_at = Utc.from_utc_datetime(&today.and_time(point));
        let age = now.signed_duration_since(scheduled_at);
        if age > chrono::Duration::from_std(self.tolerance).unwrap_or(chrono::Duration::zero()) {
            tracing::warn!(scheduled = %point, "missed bar tolerance exceeded, skipping");
            return;
        }

        dispatcher.dispatch(Hook::HandleBar, strategy, ctx);

        let data_provider = ctx.data_provider.clone();
        let trading_mode = ctx.trading_mode;
        let trading_rule = ctx.trading_rule;
        let margin_rate = ctx.short_margin_rate;
        if let Err(err) = ctx.matching_engine.match_orders(
            now,
            &mut ctx.order_manager,
            &mut ctx.position_manager,
            &mut ctx.portfolio,
            trading_mode,
            trading_rule,
            margin_rate,
            data_provider.as_ref(),
        ) {
            tracing::error!(error = %err, "matching engine invariant violated, terminating session");
            ctx.flags.was_interrupted = true;
            ctx.flags.stop_requested = true;
        }
        publish(monitor, ctx);
    }

    /// Runs `on_end` exactly once per stop and marks the session no longer running, whether the
    /// stop came from a normal stop request or a framework fault (spec §4.1/§4.2, §7 category 4).
    /// Idempotent: a second call after `running` is already `false` is a no-op.
    fn finalize_stop(
        &mut self,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) -> TickOutcome {
        if ctx.flags.running {
            dispatcher.dispatch(Hook::OnEnd, strategy, ctx);
            ctx.flags.running = false;
            publish(monitor, ctx);
        }
        TickOutcome::Stopped
    }

    /// If `resync_requested` was set by the dispatcher's block watchdog, runs the resync
    /// procedure (spec §5) and reports that the caller should treat this tick as consumed.
    fn handle_resync(&mut self, now: DateTime<Utc>, ctx: &mut SessionContext) -> bool {
        if !ctx.flags.resync_requested {
            return false;
        }
        self.resync(now, ctx);
        true
    }

    fn resync(&mut self, now: DateTime<Utc>, ctx: &mut SessionContext) {
        for order in ctx.order_manager.get_open_mut() {
            let _ = order.expire();
        }

        let from_date = ctx.current_dt.date_naive();
        let to_date = now.date_naive();
        if to_date > from_date {
            let data = ctx.data_provider.clone();
            let mut day = from_date.succ_opt();
            while let Some(current) = day {
                if current > to_date {
                    break;
                }
                if !data.get_trading_calendar(current, current).is_empty() {
                    let at = Utc.from_utc_datetime(&current.and_time(self.hooks.broker_settle));
                    ctx.position_manager.settle_day(current, at, |symbol| {
                        data.get_current_price(symbol, at).map(|p| p.current_price)
                    });
                    ctx.portfolio.record_history(current, &ctx.position_manager);
                    let symbol = ctx.benchmark.symbol.clone();
                    if let Some(price) = data.get_current_price(&symbol, at) {
                        ctx.benchmark.record(current, price.current_price);
                    }
                }
                day = current.succ_opt();
            }
        }

        ctx.current_dt = now;
        self.today = Some(to_date);
        self.before_trading_done = false;
        self.after_trading_done = false;
        self.settled_today = false;
        self.last_executed_bar = None;
        ctx.flags.resync_requested = false;
    }
}

fn publish(monitor: Option<&dyn Monitor>, ctx: &SessionContext) {
    if let Some(monitor) = monitor {
        monitor.trigger_update(PublishedSnapshot::capture(ctx));
    }
}
