// leverage-engine: pooled-collateral leveraged trading engine.
// traders open leveraged positions against one pool; prices come only from signed quotes.
// all computation is deterministic with no external I/O, collateral moves through a provider.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: TraderId, PairIndex, Side, Price, Quote, Leverage, Tick
//   2.x  oracle.rs: signed quote codec, publisher verification, latest-price board
//   3.x  registry.rs: pairs, risk groups, liquidation curves, fees, keepers
//   4.x  ledger.rs: trades per trader, pnl, liquidation price, open interest
//   5.x  borrowing.rs: per-tick borrowing accrual per pair and group
//   6.x  impact.rs: depth-based price impact, blended open price
//   7.x  config.rs: oracle window, trading limits, env presets
//   8.x  engine/: core engine: orders, triggers, positions, pricing, admin, invariants
//   9.x  provider.rs: collateral provider interface (vault MOCKED)
//   10.x trigger.rs: keeper trigger keys and crossing conditions
//   11.x events.rs: state transition events for audit
//   12.x fees.rs: fee tier, referral and keeper reward adjusters

// core trading modules
pub mod borrowing;
pub mod engine;
pub mod events;
pub mod impact;
pub mod ledger;
pub mod registry;
pub mod trigger;
pub mod types;

// trust and integration modules
pub mod config;
pub mod fees;
pub mod oracle;
pub mod provider;

// re exports for convenience
pub use borrowing::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use impact::*;
pub use ledger::*;
pub use oracle::*;
pub use provider::*;
pub use registry::*;
pub use trigger::*;
pub use types::*;
