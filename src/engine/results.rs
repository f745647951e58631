// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::events::CloseReason;
use crate::impact::ImpactError;
use crate::ledger::{LedgerError, Trade, TradeKey};
use crate::oracle::OracleError;
use crate::provider::ProviderError;
use crate::registry::RegistryError;
use crate::trigger::PendingTrigger;
use crate::types::{GroupIndex, Leverage, Price, Quote, TraderId};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct CloseResult {
    pub key: TradeKey,
    pub reason: CloseReason,
    pub close_price: Price,
    pub pnl: Quote,
    pub borrowing_fee: Quote,
    pub keeper_reward: Quote,
    pub payout: Quote,
}

#[derive(Debug, Clone)]
pub struct DecreaseResult {
    pub trade: Trade,
    pub partial_pnl: Quote,
    pub borrowing_fee: Quote,
    pub payout: Quote,
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Opened(Trade),
    Closed(CloseResult),
}

/// Coarse failure classes. every variant of `EngineError` falls in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Trust,
    Authorization,
    Liquidity,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Impact error: {0}")]
    Impact(#[from] ImpactError),

    #[error("{0} is not an allowed keeper")]
    NotKeeper(TraderId),

    #[error("Trading terms were not accepted")]
    TermsNotAccepted,

    #[error("Leverage {leverage} outside group {group:?} bounds [{min}, {max}]")]
    InvalidLeverage {
        group: GroupIndex,
        leverage: Leverage,
        min: Leverage,
        max: Leverage,
    },

    #[error("Collateral must be positive")]
    NonPositiveCollateral,

    #[error("Position of {notional} is below the {min} minimum")]
    PositionTooSmall { notional: Quote, min: Quote },

    #[error("Take profit {take_profit} is on the wrong side of {reference}")]
    InvalidTakeProfit { take_profit: Price, reference: Price },

    #[error("Stop loss {stop_loss} is on the wrong side of {reference}")]
    InvalidStopLoss { stop_loss: Price, reference: Price },

    #[error("Execution at {exec_price} is more than {max_slippage_p}% worse than {expected}")]
    Slippage {
        expected: Price,
        exec_price: Price,
        max_slippage_p: Decimal,
    },

    #[error("Price impact {impact_p}% exceeds {max_p}%")]
    PriceImpactTooHigh { impact_p: Decimal, max_p: Decimal },

    #[error("Fees of {fees} consume the {collateral} collateral")]
    FeesExceedCollateral { fees: Quote, collateral: Quote },

    #[error("Trigger {0} does not match the trade's order type")]
    TriggerTypeMismatch(PendingTrigger),

    #[error("Trigger {0} has no target price set")]
    TriggerNotSet(PendingTrigger),

    #[error("Trigger {trigger} not met: price {price}, target {target}")]
    TriggerNotMet {
        trigger: PendingTrigger,
        price: Price,
        target: Price,
    },

    #[error("Trade {0:?} would be liquidatable after this change")]
    WouldBeLiquidated(TradeKey),

    #[error("Invalid position change: {reason}")]
    InvalidPositionDelta { reason: &'static str },

    #[error("Liquidation curve bottoms at {threshold_p}%, inside the {buffer_p}% SL buffer")]
    CurveInsideSlBuffer { threshold_p: Decimal, buffer_p: Decimal },

    #[error("Insufficient liquidity: {available} available, {required} required")]
    InsufficientLiquidity { available: Quote, required: Quote },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Oracle(_) => ErrorKind::Trust,
            EngineError::Registry(RegistryError::NotAdmin(_)) | EngineError::NotKeeper(_) => {
                ErrorKind::Authorization
            }
            EngineError::Provider(_) | EngineError::InsufficientLiquidity { .. } => ErrorKind::Liquidity,
            // owner-only operations key by the caller. a non-owner only finds its own empty
            // slot, so ownership never fails separately from the lookup
            _ => ErrorKind::Validation,
        }
    }
}
