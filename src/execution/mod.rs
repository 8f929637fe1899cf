// Position state machine and order execution
pub mod executor;
pub mod position_manager;

pub use executor::{ExecutionOutcome, Executor, Fill};
pub use position_manager::{ExitReason, LongPosition, Position, PositionManager, TradeIntent};
