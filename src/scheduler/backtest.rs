use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::config::HooksConfig;
use crate::dispatcher::{Dispatcher, Hook};
use crate::monitor::{Monitor, PublishedSnapshot};
use crate::session::{MarketPhase, SessionContext};
use crate::strategy::Strategy;

/// Deterministic day × schedule-point cursor over a fixed trading-day set (spec §4.2
/// "Backtest loop"). Grounded on `engine/trader.rs`'s run-loop shape for the overall driving
/// style, with the exact per-day phase ordering ported from `qtrader/core/scheduler.py`.
#[derive(Debug)]
pub struct BacktestScheduler {
    trading_days: Vec<NaiveDate>,
    schedule_points: Vec<NaiveTime>,
    hooks: HooksConfig,
    auto_save_interval_days: u32,
    resume_after: Option<(NaiveDate, NaiveTime)>,
}

impl BacktestScheduler {
    pub fn new(
        trading_days: Vec<NaiveDate>,
        schedule_points: Vec<NaiveTime>,
        hooks: HooksConfig,
        auto_save_interval_days: u32,
    ) -> Self {
        Self {
            trading_days,
            schedule_points,
            hooks,
            auto_save_interval_days,
            resume_after: None,
        }
    }

    /// Marks a mid-day resume point: `before_trading` is skipped for `date` and only schedule
    /// points strictly later than `time` run, per spec §4.2 step 1.
    pub fn resume_from(&mut self, date: NaiveDate, time: NaiveTime) {
        self.resume_after = Some((date, time));
    }

    pub fn run(
        &mut self,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) {
        let trading_days = self.trading_days.clone();
        for (day_idx, day) in trading_days.iter().copied().enumerate() {
            if self.check_interrupt(strategy, ctx, dispatcher, monitor) {
                return;
            }

            let resume_here = self.resume_after.filter(|(d, _)| *d == day);
            let points: Vec<NaiveTime> = match resume_here {
                Some((_, resume_time)) => self
                    .schedule_points
                    .iter()
                    .copied()
                    .filter(|p| *p > resume_time)
                    .collect(),
                None => self.schedule_points.clone(),
            };

            if resume_here.is_none() {
                ctx.current_dt = at(day, self.hooks.before_trading);
                ctx.phase = MarketPhase::BeforeTrading;
                dispatcher.dispatch(Hook::BeforeTrading, strategy, ctx);
                publish(monitor, ctx);
            }

            for point in points {
                if self.check_interrupt(strategy, ctx, dispatcher, monitor) {
                    return;
                }
                ctx.current_dt = at(day, point);
                ctx.phase = MarketPhase::Trading;
                dispatcher.dispatch(Hook::HandleBar, strategy, ctx);

                let data_provider = ctx.data_provider.clone();
                let trading_mode = ctx.trading_mode;
                let trading_rule = ctx.trading_rule;
                let margin_rate = ctx.short_margin_rate;
                let now = ctx.current_dt;
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

            if self.check_interrupt(strategy, ctx, dispatcher, monitor) {
                return;
            }

            ctx.current_dt = at(day, self.hooks.after_trading);
            ctx.phase = MarketPhase::AfterTrading;
            dispatcher.dispatch(Hook::AfterTrading, strategy, ctx);
            publish(monitor, ctx);

            ctx.current_dt = at(day, self.hooks.broker_settle);
            ctx.phase = MarketPhase::Settlement;
            let settle_data_provider = ctx.data_provider.clone();
            let settle_at = ctx.current_dt;
            ctx.matching_engine.settle(
                day,
                settle_at,
                &mut ctx.order_manager,
                &mut ctx.position_manager,
                &mut ctx.portfolio,
                settle_data_provider.as_ref(),
            );
            dispatcher.dispatch(Hook::BrokerSettle, strategy, ctx);

            let benchmark_symbol = ctx.benchmark.symbol.clone();
            match settle_data_provider.get_current_price(&benchmark_symbol, settle_at) {
                Some(price) => ctx.benchmark.record(day, price.current_price),
                None => tracing::warn!(date = %day, "no benchmark close price, skipping benchmark row"),
            }
            publish(monitor, ctx);

            if self.auto_save_interval_days > 0 && (day_idx as u32 + 1) % self.auto_save_interval_days == 0 {
                tracing::debug!(date = %day, "autosave checkpoint reached");
            }
        }

        self.finish(strategy, ctx, dispatcher, monitor);
    }

    /// Checks stop/pause between events (spec §4.2). A stop request or framework fault finishes
    /// the run (runs `on_end`, marks not-running); a pause request leaves `running` untouched so
    /// a later call to [`Self::resume_from`] plus a fresh `run()` picks back up mid-day. Returns
    /// `true` if `run()` should return immediately.
    fn check_interrupt(
        &mut self,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) -> bool {
        if ctx.flags.stop_requested {
            self.finish(strategy, ctx, dispatcher, monitor);
            return true;
        }
        if ctx.flags.pause_requested {
            ctx.flags.paused = true;
            publish(monitor, ctx);
            return true;
        }
        false
    }

    /// Runs `on_end` and marks the session no longer running. Called exactly once per `run()`,
    /// whether the loop ended normally, via a stop request, or via a framework fault. Idempotent:
    /// a call after `running` is already `false` is a no-op.
    fn finish(
        &mut self,
        strategy: &mut dyn Strategy,
        ctx: &mut SessionContext,
        dispatcher: &Dispatcher,
        monitor: Option<&dyn Monitor>,
    ) {
        if !ctx.flags.running {
            return;
        }
        dispatcher.dispatch(Hook::OnEnd, strategy, ctx);
        ctx.flags.running = false;
        publish(monitor, ctx);
    }
}

fn at(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(time))
}

fn publish(monitor: Option<&dyn Monitor>, ctx: &SessionContext) {
    if let Some(monitor) = monitor {
        monitor.trigger_update(PublishedSnapshot::capture(ctx));
    }
}
