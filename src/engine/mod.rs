// 8.0: trading engine. coordinates quote ingestion, order execution, keeper
// triggers, position changes and borrowing accrual against one state region.
// deterministic and event-driven, collateral moves only through the provider.

mod admin;
mod config;
mod core;
mod invariants;
mod orders;
mod positions;
mod pricing;
mod results;
mod triggers;

pub use config::EngineConfig;
pub use core::Engine;
pub use invariants::InvariantViolation;
pub use orders::OpenTradeRequest;
pub use results::{CloseResult, DecreaseResult, EngineError, ErrorKind, TriggerOutcome};
