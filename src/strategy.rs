use crate::session::SessionContext;

/// Boxed error type for a strategy hook's ordinary (non-panicking) failure path. Strategy code
/// is arbitrary and external to the core, so it is not worth a dedicated `thiserror` enum here;
/// the dispatcher logs this the same way it logs a caught panic (spec §4.1, §7 category 1).
pub type StrategyError = Box<dyn std::error::Error + Send + Sync>;

/// The six-hook capability set a user strategy exposes (spec §4.1, §6). Every hook but
/// `initialize` has a default no-op body, mirroring how `SignalGenerator` is a trait in the
/// teacher's `src/strategy/strategy.rs` — here generalised to the full session lifecycle rather
/// than a single signal-generation call.
///
/// Hooks may return `Err` for an ordinary fallible condition; the [`crate::dispatcher::Dispatcher`]
/// additionally isolates panics, since strategy code is arbitrary and may not be well-behaved.
pub trait Strategy: Send {
    fn initialize(&mut self, ctx: &mut SessionContext) -> Result<(), StrategyError>;

    fn before_trading(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn handle_bar(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn after_trading(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn broker_settle(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_end(&mut self, _ctx: &mut SessionContext) -> Result<(), StrategyError> {
        Ok(())
    }
}
