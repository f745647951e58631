//! Trigger keys and crossing conditions.
//!
//! A keeper names one trade and what should happen to it. The trigger is only
//! valid while the trade is in the matching state: pending for the two open
//! triggers, active for the three close triggers.

use crate::ledger::TradeKey;
use crate::types::{Price, Side, TradeIndex, TradeType, TraderId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the keeper wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    LimitOpen,
    StopOpen,
    TpClose,
    SlClose,
    LiquidationClose,
}

impl TriggerType {
    pub fn is_open(&self) -> bool {
        matches!(self, TriggerType::LimitOpen | TriggerType::StopOpen)
    }

    /// Pending order type an open trigger applies to.
    pub fn order_type(&self) -> Option<TradeType> {
        match self {
            TriggerType::LimitOpen => Some(TradeType::Limit),
            TriggerType::StopOpen => Some(TradeType::Stop),
            _ => None,
        }
    }
}

/// How the live price must compare with the stored trigger price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// Fires when price is at or above the target.
    Above,
    /// Fires when price is at or below the target.
    Below,
}

impl TriggerCondition {
    /// Direction for `trigger_type` on a trade of `side`.
    ///
    /// A long limit buys the dip and a long stop buys the breakout. TP fires in the
    /// direction of profit. SL and liquidation fire against it.
    pub fn for_trigger(trigger_type: TriggerType, side: Side) -> Self {
        let long = match trigger_type {
            TriggerType::LimitOpen => TriggerCondition::Below,
            TriggerType::StopOpen => TriggerCondition::Above,
            TriggerType::TpClose => TriggerCondition::Above,
            TriggerType::SlClose | TriggerType::LiquidationClose => TriggerCondition::Below,
        };
        match side {
            Side::Long => long,
            Side::Short => long.flipped(),
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            TriggerCondition::Above => TriggerCondition::Below,
            TriggerCondition::Below => TriggerCondition::Above,
        }
    }

    pub fn is_met(&self, price: Price, target: Price) -> bool {
        match self {
            TriggerCondition::Above => price >= target,
            TriggerCondition::Below => price <= target,
        }
    }
}

/// A keeper's request, the tagged form of the packed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingTrigger {
    pub trigger_type: TriggerType,
    pub trader: TraderId,
    pub index: TradeIndex,
}

impl PendingTrigger {
    pub fn new(trigger_type: TriggerType, trader: TraderId, index: TradeIndex) -> Self {
        Self {
            trigger_type,
            trader,
            index,
        }
    }

    pub fn key(&self) -> TradeKey {
        TradeKey {
            trader: self.trader,
            index: self.index,
        }
    }
}

impl fmt::Display for PendingTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}, {})", self.trigger_type, self.trader, self.index.0)
    }
}

pub fn should_trigger(trigger_type: TriggerType, side: Side, price: Price, target: Price) -> bool {
    TriggerCondition::for_trigger(trigger_type, side).is_met(price, target)
}
