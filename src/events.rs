// 11.0: every successful transition produces events. each carries the full post-transition
// trade so an off-ledger indexer can rebuild state from the log alone.
// the EventPayload enum lists all event types.

use crate::ledger::{Trade, TradeKey};
use crate::oracle::InstrumentId;
use crate::registry::ConfigUpdate;
use crate::trigger::PendingTrigger;
use crate::types::{Leverage, Price, Quote, Tick, Timestamp, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub tick: Tick,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, tick: Tick, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            tick,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Open events
    MarketExecuted(MarketExecutedEvent),
    OpenOrderPlaced(OpenOrderPlacedEvent),
    OpenOrderCanceled(OpenOrderCanceledEvent),
    OpenOrderUpdated(OpenOrderUpdatedEvent),
    LimitExecuted(LimitExecutedEvent),

    // Position events
    TradeTpUpdated(TradeTpUpdatedEvent),
    TradeSlUpdated(TradeSlUpdatedEvent),
    LeverageUpdateExecuted(LeverageUpdateExecutedEvent),
    PositionSizeIncreaseExecuted(PositionSizeIncreaseExecutedEvent),
    PositionSizeDecreaseExecuted(PositionSizeDecreaseExecutedEvent),
    TradeClosed(TradeClosedEvent),

    // Fee events
    BorrowingFeeCharged(BorrowingFeeChargedEvent),

    // Oracle and config events
    PriceQuoteAccepted(PriceQuoteAcceptedEvent),
    ConfigChanged(ConfigUpdate),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::MarketExecuted(_) => "MarketExecuted",
            EventPayload::OpenOrderPlaced(_) => "OpenOrderPlaced",
            EventPayload::OpenOrderCanceled(_) => "OpenOrderCanceled",
            EventPayload::OpenOrderUpdated(_) => "OpenOrderUpdated",
            EventPayload::LimitExecuted(_) => "LimitExecuted",
            EventPayload::TradeTpUpdated(_) => "TradeTpUpdated",
            EventPayload::TradeSlUpdated(_) => "TradeSlUpdated",
            EventPayload::LeverageUpdateExecuted(_) => "LeverageUpdateExecuted",
            EventPayload::PositionSizeIncreaseExecuted(_) => "PositionSizeIncreaseExecuted",
            EventPayload::PositionSizeDecreaseExecuted(_) => "PositionSizeDecreaseExecuted",
            EventPayload::TradeClosed(_) => "TradeClosed",
            EventPayload::BorrowingFeeCharged(_) => "BorrowingFeeCharged",
            EventPayload::PriceQuoteAccepted(_) => "PriceQuoteAccepted",
            EventPayload::ConfigChanged(_) => "ConfigChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketExecutedEvent {
    pub trade: Trade,
    pub oracle_price: Price,
    pub price_impact_p: Decimal,
    pub open_fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderPlacedEvent {
    pub trade: Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderCanceledEvent {
    pub key: TradeKey,
    pub refunded: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderUpdatedEvent {
    pub trade: Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitExecutedEvent {
    pub trigger: PendingTrigger,
    pub keeper: TraderId,
    pub trade: Trade,
    pub oracle_price: Price,
    pub price_impact_p: Decimal,
    pub open_fee: Quote,
    pub keeper_reward: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTpUpdatedEvent {
    pub trade: Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSlUpdatedEvent {
    pub trade: Trade,
    /// Set when the requested SL was pulled inside the liquidation buffer.
    pub requested: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageUpdateExecutedEvent {
    pub trade: Trade,
    pub old_leverage: Leverage,
    /// Positive = refunded to the trader, negative = pulled from the trader.
    pub collateral_delta: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizeIncreaseExecutedEvent {
    pub trade: Trade,
    pub delta_collateral: Quote,
    pub delta_notional: Quote,
    pub exec_price: Price,
    pub price_impact_p: Decimal,
    pub fees: Quote,
    pub borrowing_fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizeDecreaseExecutedEvent {
    pub trade: Trade,
    pub delta_collateral: Quote,
    pub delta_notional: Quote,
    pub partial_pnl: Quote,
    pub borrowing_fee: Quote,
    pub payout: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeClosedEvent {
    /// Snapshot with `is_open` cleared.
    pub trade: Trade,
    pub reason: CloseReason,
    pub close_price: Price,
    pub pnl: Quote,
    pub borrowing_fee: Quote,
    pub keeper: Option<TraderId>,
    pub keeper_reward: Quote,
    pub payout: Quote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Market,
    TakeProfit,
    StopLoss,
    Liquidation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowingFeeChargedEvent {
    pub key: TradeKey,
    pub amount: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuoteAcceptedEvent {
    pub instrument: InstrumentId,
    pub price: Price,
    pub publish_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payload_names() {
        let event = Event::new(
            EventId(1),
            Tick(3),
            Timestamp::from_secs(1000),
            EventPayload::PriceQuoteAccepted(PriceQuoteAcceptedEvent {
                instrument: InstrumentId::from_label("ETH/USD"),
                price: Price::new_unchecked(dec!(2000)),
                publish_time: 999,
            }),
        );
        assert_eq!(event.payload.name(), "PriceQuoteAccepted");
        assert_eq!(event.tick, Tick(3));
    }

    #[test]
    fn events_serialize() {
        let payload = EventPayload::BorrowingFeeCharged(BorrowingFeeChargedEvent {
            key: TradeKey { trader: TraderId(1), index: crate::types::TradeIndex(0) },
            amount: Quote::new(dec!(0.25)),
        });
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("BorrowingFeeCharged"));
    }
}
