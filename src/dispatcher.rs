use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::session::{EngineMode, SessionContext};
use crate::strategy::Strategy;

/// Which hook is being invoked; used only for logging and the watchdog's threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Initialize,
    BeforeTrading,
    HandleBar,
    AfterTrading,
    BrokerSettle,
    OnEnd,
}

impl Hook {
    fn name(&self) -> &'static str {
        match self {
            Hook::Initialize => "initialize",
            Hook::BeforeTrading => "before_trading",
            Hook::HandleBar => "handle_bar",
            Hook::AfterTrading => "after_trading",
            Hook::BrokerSettle => "broker_settle",
            Hook::OnEnd => "on_end",
        }
    }
}

/// Invokes strategy hooks with exception isolation and a simulation-mode block watchdog
/// (spec §4.1). No direct teacher analogue — the legacy teacher's signal generation only ever
/// returns `Result`, never panics across an isolation boundary — but the isolation shape follows
/// the block-threshold and `resync_requested` contract of spec §4.1/§5.
#[derive(Debug)]
pub struct Dispatcher {
    block_threshold: Duration,
}

impl Dispatcher {
    pub fn new(block_threshold: Duration) -> Self {
        Self { block_threshold }
    }

    /// Runs one hook against `strategy`, catching both ordinary `Err`s and panics. Returns
    /// `Ok(())` even on strategy failure — failures are recorded on `ctx.flags.strategy_error_today`
    /// and logged, never propagated, per spec §4.1/§7 category 1.
    pub fn dispatch(&self, hook: Hook, strategy: &mut dyn Strategy, ctx: &mut SessionContext) {
        if hook == Hook::Initialize {
            ctx.begin_initializing();
        }

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| call_hook(hook, strategy, ctx)));
        let elapsed = started.elapsed();

        if hook == Hook::Initialize {
            ctx.end_initializing();
        }

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(hook = hook.name(), error = %err, "strategy hook returned an error");
                ctx.flags.strategy_error_today = true;
            }
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(hook = hook.name(), panic = %message, "strategy hook panicked");
                ctx.flags.strategy_error_today = true;
            }
        }

        if ctx.mode == EngineMode::Simulation && elapsed > self.block_threshold {
            tracing::warn!(
                hook = hook.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.block_threshold.as_millis() as u64,
                "strategy hook exceeded block threshold, requesting resync"
            );
            ctx.flags.resync_requested = true;
        }
    }
}

fn call_hook(
    hook: Hook,
    strategy: &mut dyn Strategy,
    ctx: &mut SessionContext,
) -> Result<(), crate::strategy::StrategyError> {
    match hook {
        Hook::Initialize => strategy.initialize(ctx),
        Hook::BeforeTrading => strategy.before_trading(ctx),
        Hook::HandleBar => strategy.handle_bar(ctx),
        Hook::AfterTrading => strategy.after_trading(ctx),
        Hook::BrokerSettle => strategy.broker_settle(ctx),
        Hook::OnEnd => strategy.on_end(ctx),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
