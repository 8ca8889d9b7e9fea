use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use qsim_core::clock::SystemClock;
use qsim_core::config::{
    AccountConfig, BenchmarkConfig, EngineConfig, EngineMode, LifecycleConfig, MatchingConfig,
    SessionConfig, TradingMode, TradingRule, WorkspaceConfig,
};
use qsim_core::data_provider::PriceSnapshot;
use qsim_core::order::OrderType;
use qsim_core::position::Direction;
use qsim_core::scheduler::SimulationScheduler;
use qsim_core::session::SessionContext;
use qsim_core::state::StateBlob;
use qsim_core::strategy::{Strategy, StrategyError};
use qsim_core::test_support::scripted_data_provider;
use qsim_core::{BacktestScheduler, Dispatcher};

fn config(trading_mode: TradingMode, trading_rule: TradingRule) -> SessionConfig {
    SessionConfig {
        engine: EngineConfig {
            mode: EngineMode::Backtest,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..EngineConfig::default()
        },
        account: AccountConfig {
            trading_mode,
            trading_rule,
            short_margin_rate: 0.5,
            ..AccountConfig::default()
        },
        matching: MatchingConfig::default(),
        lifecycle: LifecycleConfig::default(),
        benchmark: BenchmarkConfig {
            symbol: "000300.SH".to_string(),
            name: None,
        },
        workspace: WorkspaceConfig::default(),
    }
}

fn zero_friction(mut config: SessionConfig) -> SessionConfig {
    config.matching.commission.buy_commission = 0.0;
    config.matching.commission.sell_commission = 0.0;
    config.matching.commission.buy_tax = 0.0;
    config.matching.commission.sell_tax = 0.0;
    config.matching.commission.min_commission = 0.0;
    config.matching.slippage.rate = 0.0;
    config
}

fn at(day: NaiveDate, time: NaiveTime) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(time))
}

struct ScriptedOrderStrategy {
    orders: Vec<(NaiveDate, NaiveTime, String, i64, OrderType, Option<f64>)>,
}

impl Strategy for ScriptedOrderStrategy {
    fn initialize(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn handle_bar(&mut self, ctx: &mut SessionContext) -> Result<(), StrategyError> {
        let now = ctx.current_dt;
        let today = now.date_naive();
        let bar_time = now.time();
        for (day, time, symbol, qty, order_type, limit) in &self.orders {
            if *day == today && *time == bar_time {
                ctx.order_manager
                    .submit(symbol.clone(), *qty, *order_type, *limit, now, now, None)
                    .map_err(|e| Box::new(e) as StrategyError)?;
            }
        }
        Ok(())
    }
}

/// Scenario 1: short-then-cover profit, driven end-to-end across two trading days.
#[test]
fn scenario_short_then_cover_profit_over_two_days() {
    let cfg = zero_friction(config(TradingMode::LongShort, TradingRule::T0));
    let data = scripted_data_provider();
    let day1 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
    let bar_time = cfg.lifecycle.hooks.handle_bar;
    let settle_time = cfg.lifecycle.hooks.broker_settle;

    data.set_price("600000.SH", at(day1, bar_time), price(150.0));
    data.set_price("600000.SH", at(day1, settle_time), price(150.0));
    data.set_price("600000.SH", at(day2, bar_time), price(140.0));
    data.set_price("600000.SH", at(day2, settle_time), price(140.0));
    data.set_price("000300.SH", at(day1, settle_time), price(4000.0));
    data.set_price("000300.SH", at(day2, settle_time), price(4000.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), at(day1, cfg.lifecycle.hooks.before_trading));
    ctx.flags.running = true;

    let schedule_points = vec![bar_time];
    let mut scheduler = BacktestScheduler::new(
        vec![day1, day2],
        schedule_points,
        cfg.lifecycle.hooks.clone(),
        1,
    );
    let dispatcher = Dispatcher::new(Duration::from_secs(5));
    let mut strategy = ScriptedOrderStrategy {
        orders: vec![
            (day1, bar_time, "600000.SH".to_string(), -100, OrderType::Market, None),
            (day2, bar_time, "600000.SH".to_string(), 100, OrderType::Market, None),
        ],
    };

    scheduler.run(&mut strategy, &mut ctx, &dispatcher, None);

    assert_eq!(ctx.portfolio.cash, 1_001_000.0);
    assert_eq!(ctx.portfolio.margin, 0.0);
    assert_eq!(ctx.portfolio.net_worth, 1_001_000.0);
    assert!(ctx.position_manager.get("600000.SH", Direction::Short).is_none());
    assert!(ctx.position_manager.get("600000.SH", Direction::Long).is_none());
    assert_eq!(ctx.portfolio.history.len(), 2);
}

/// Scenario 3: T+1 blocks a same-day sell of a just-bought lot, but the next day it clears.
#[test]
fn scenario_t1_blocks_same_day_sell_then_clears_next_day() {
    let cfg = zero_friction(config(TradingMode::LongOnly, TradingRule::T1));
    let data = scripted_data_provider();
    let day1 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
    let bar_time = cfg.lifecycle.hooks.handle_bar;
    let settle_time = cfg.lifecycle.hooks.broker_settle;

    data.set_price("600000.SH", at(day1, bar_time), price(10.0));
    data.set_price("600000.SH", at(day1, settle_time), price(10.0));
    data.set_price("600000.SH", at(day2, bar_time), price(11.0));
    data.set_price("600000.SH", at(day2, settle_time), price(11.0));
    data.set_price("000300.SH", at(day1, settle_time), price(4000.0));
    data.set_price("000300.SH", at(day2, settle_time), price(4000.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), at(day1, cfg.lifecycle.hooks.before_trading));
    ctx.flags.running = true;

    let schedule_points = vec![bar_time];
    let mut scheduler = BacktestScheduler::new(
        vec![day1, day2],
        schedule_points,
        cfg.lifecycle.hooks.clone(),
        1,
    );
    let dispatcher = Dispatcher::new(Duration::from_secs(5));
    let mut strategy = ScriptedOrderStrategy {
        orders: vec![
            (day1, bar_time, "600000.SH".to_string(), 1000, OrderType::Market, None),
            (day1, bar_time, "600000.SH".to_string(), -500, OrderType::Market, None),
            (day2, bar_time, "600000.SH".to_string(), -500, OrderType::Market, None),
        ],
    };

    scheduler.run(&mut strategy, &mut ctx, &dispatcher, None);

    // the first day's SELL was submitted in the same handle_bar call as the BUY, after it, so
    // it observes the freshly-opened (still T+1-unavailable) quantity and is rejected; only the
    // second day's SELL (after settlement rolls availability forward) actually fills.
    assert_eq!(
        ctx.position_manager.get("600000.SH", Direction::Long).unwrap().total_quantity,
        500
    );
    assert_eq!(ctx.portfolio.cash, 1_000_000.0 - 10_000.0 + 500.0 * 11.0);
}

/// Scenario 6: in simulation mode the matching engine must query the data provider at the
/// order's `created_time`, not at the tick time the scheduler happens to observe it.
#[test]
fn scenario_simulation_prices_immediate_orders_at_created_time() {
    let cfg = zero_friction(config(TradingMode::LongOnly, TradingRule::T0));
    let data = scripted_data_provider();
    let day1 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
    let submit_at = at(day1, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    // the scheduler doesn't observe the order until its next tick, on the following day; a price
    // is registered only for day1 so a matching engine that (incorrectly) queried "now" instead
    // of the order's own `created_time` would find no price and defer the order instead of
    // filling it.
    let tick_at = at(day2, NaiveTime::from_hms_opt(10, 0, 5).unwrap());
    data.set_price("600000.SH", submit_at, price(10.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), submit_at);
    let order_id = ctx
        .order_manager
        .submit("600000.SH", 100, OrderType::Market, None, submit_at, submit_at, None)
        .unwrap();
    assert!(ctx.order_manager.get(order_id).unwrap().is_immediate);

    let mut scheduler = SimulationScheduler::new(
        vec![NaiveTime::from_hms_opt(10, 0, 0).unwrap()],
        cfg.lifecycle.hooks.clone(),
        vec![(NaiveTime::from_hms_opt(9, 30, 0).unwrap(), NaiveTime::from_hms_opt(15, 0, 0).unwrap())],
        Duration::from_secs(60),
    );
    let dispatcher = Dispatcher::new(Duration::from_secs(5));
    struct Noop;
    impl Strategy for Noop {
        fn initialize(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
            Ok(())
        }
    }
    let mut strategy = Noop;

    scheduler.tick(tick_at, &mut strategy, &mut ctx, &dispatcher, None);

    let order = ctx.order_manager.get(order_id).unwrap();
    assert_eq!(order.status, qsim_core::order::OrderStatus::Filled);
    assert_eq!(order.fill_price, Some(10.0));
}

/// Scenario 2: long-only mode rejects a naked short with no existing long position, and the
/// portfolio is left untouched.
#[test]
fn scenario_long_only_rejects_naked_short() {
    let cfg = zero_friction(config(TradingMode::LongOnly, TradingRule::T0));
    let data = scripted_data_provider();
    let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let now = at(day, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    data.set_price("600000.SH", now, price(150.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), now);
    let cash_before = ctx.portfolio.cash;
    let order_id = ctx
        .order_manager
        .submit("600000.SH", -100, OrderType::Market, None, now, now, None)
        .unwrap();

    ctx.matching_engine
        .match_orders(
            now,
            &mut ctx.order_manager,
            &mut ctx.position_manager,
            &mut ctx.portfolio,
            cfg.account.trading_mode,
            cfg.account.trading_rule,
            cfg.account.short_margin_rate,
            ctx.data_provider.as_ref(),
        )
        .unwrap();

    let order = ctx.order_manager.get(order_id).unwrap();
    assert_eq!(order.status, qsim_core::order::OrderStatus::Rejected);
    assert!(order
        .reject_reason
        .as_deref()
        .unwrap()
        .contains("insufficient holding"));
    assert_eq!(ctx.portfolio.cash, cash_before);
    assert!(ctx.position_manager.get("600000.SH", Direction::Short).is_none());
}

/// Scenario 4: a sell larger than the existing long position flips the net position from long to
/// short in a single fill, realising P&L on the closed portion and opening the short residual.
#[test]
fn scenario_position_flip_long_to_short() {
    let cfg = zero_friction(config(TradingMode::LongShort, TradingRule::T0));
    let data = scripted_data_provider();
    let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let now = at(day, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    data.set_price("600000.SH", now, price(12.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), now);
    ctx.position_manager.adjust_position(qsim_core::position::Position::open(
        "600000.SH",
        Direction::Long,
        1000,
        10.0,
        now,
        0.5,
        TradingRule::T0,
    ));
    ctx.portfolio.update_financials(&ctx.position_manager);
    let cash_before = ctx.portfolio.cash;

    let order_id = ctx
        .order_manager
        .submit("600000.SH", -3000, OrderType::Market, None, now, now, None)
        .unwrap();

    ctx.matching_engine
        .match_orders(
            now,
            &mut ctx.order_manager,
            &mut ctx.position_manager,
            &mut ctx.portfolio,
            cfg.account.trading_mode,
            cfg.account.trading_rule,
            cfg.account.short_margin_rate,
            ctx.data_provider.as_ref(),
        )
        .unwrap();

    let order = ctx.order_manager.get(order_id).unwrap();
    assert_eq!(order.status, qsim_core::order::OrderStatus::Filled);
    assert!(ctx.position_manager.get("600000.SH", Direction::Long).is_none());
    let short = ctx.position_manager.get("600000.SH", Direction::Short).unwrap();
    assert_eq!(short.total_quantity, 2000);
    assert_eq!(ctx.portfolio.margin, 12_000.0);
    // the full sell proceeds land in cash regardless of which portion closed the long versus
    // opened the short; margin held back against the new short is a separate derived figure,
    // not a cash deduction.
    assert_eq!(ctx.portfolio.cash, cash_before + 3000.0 * 12.0);
}

/// Scenario 5: orders are rounded down to the configured lot size, and a quantity that rounds to
/// zero is rejected outright.
#[test]
fn scenario_lot_size_rounding() {
    let mut cfg = zero_friction(config(TradingMode::LongShort, TradingRule::T0));
    cfg.account.order_lot_size = 100;
    let data = scripted_data_provider();
    let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let now = at(day, NaiveTime::from_hms_opt(10, 0, 0).unwrap());

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), now);

    let buy_id = ctx
        .order_manager
        .submit("600000.SH", 150, OrderType::Market, None, now, now, None)
        .unwrap();
    assert_eq!(ctx.order_manager.get(buy_id).unwrap().quantity, 100);

    let sell_id = ctx
        .order_manager
        .submit("600000.SH", -290, OrderType::Market, None, now, now, None)
        .unwrap();
    assert_eq!(ctx.order_manager.get(sell_id).unwrap().quantity, 200);

    let err = ctx
        .order_manager
        .submit("600000.SH", 50, OrderType::Market, None, now, now, None)
        .unwrap_err();
    assert!(matches!(err, qsim_core::order::OrderError::BelowLotSize(50, 100)));
}

/// Save -> restore -> save' round-trips a session's economically meaningful state.
#[test]
fn save_restore_round_trip_preserves_portfolio_and_positions() {
    let cfg = zero_friction(config(TradingMode::LongShort, TradingRule::T0));
    let data = scripted_data_provider();
    let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let now = at(day, NaiveTime::from_hms_opt(10, 0, 0).unwrap());

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), now);
    ctx.flags.running = true;
    ctx.position_manager.adjust_position(qsim_core::position::Position::open(
        "600000.SH",
        Direction::Long,
        500,
        12.0,
        now,
        0.5,
        TradingRule::T0,
    ));
    ctx.portfolio.update_financials(&ctx.position_manager);

    let blob = StateBlob::save(&ctx, &cfg, None, false, now);
    let json = blob.to_json().unwrap();
    let restored_blob = StateBlob::from_json(&json).unwrap();
    let restored = restored_blob
        .restore(&cfg, Arc::new(scripted_data_provider()), Arc::new(SystemClock))
        .unwrap();

    let blob2 = StateBlob::save(&restored, &cfg, None, false, now);
    assert_eq!(blob2.portfolio.cash, blob.portfolio.cash);
    assert_eq!(blob2.positions.len(), blob.positions.len());
    assert_eq!(
        restored.position_manager.get("600000.SH", Direction::Long).unwrap().total_quantity,
        500
    );
}

/// `clear_today` after `settle` is idempotent: running settlement twice on the same day leaves
/// the order book and portfolio history unchanged the second time.
#[test]
fn settle_is_idempotent_when_run_twice() {
    let cfg = zero_friction(config(TradingMode::LongOnly, TradingRule::T0));
    let data = scripted_data_provider();
    let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
    let bar_time = cfg.lifecycle.hooks.handle_bar;
    let settle_time = cfg.lifecycle.hooks.broker_settle;
    data.set_price("600000.SH", at(day, bar_time), price(10.0));
    data.set_price("600000.SH", at(day, settle_time), price(10.0));
    data.set_price("000300.SH", at(day, settle_time), price(4000.0));

    let mut ctx = SessionContext::new(&cfg, Arc::new(data), Arc::new(SystemClock), at(day, cfg.lifecycle.hooks.before_trading));
    ctx.order_manager
        .submit("600000.SH", 100, OrderType::Market, None, at(day, bar_time), at(day, bar_time), None)
        .unwrap();
    ctx.flags.running = true;

    let dispatcher = Dispatcher::new(Duration::from_secs(5));
    let mut scheduler = BacktestScheduler::new(vec![day], vec![bar_time], cfg.lifecycle.hooks.clone(), 1);
    struct Noop;
    impl Strategy for Noop {
        fn initialize(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
            Ok(())
        }
    }
    let mut strategy = Noop;
    scheduler.run(&mut strategy, &mut ctx, &dispatcher, None);

    let history_len_after_first = ctx.portfolio.history.len();
    let settle_data_provider = ctx.data_provider.clone();
    ctx.matching_engine.settle(
        day,
        at(day, settle_time),
        &mut ctx.order_manager,
        &mut ctx.position_manager,
        &mut ctx.portfolio,
        settle_data_provider.as_ref(),
    );

    assert_eq!(ctx.portfolio.history.len(), history_len_after_first);
}

fn price(current_price: f64) -> PriceSnapshot {
    PriceSnapshot {
        current_price,
        ask1: None,
        bid1: None,
        high_limit: None,
        low_limit: None,
    }
}
