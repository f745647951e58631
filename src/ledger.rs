// 4.0: position ledger. canonical storage of trades (active and pending) per trader,
// plus the running open interest per pair/side and per group/side.
// 4.1 trade economics (pnl, liquidation price). 4.2 storage and OI bookkeeping.
// mutators are crate-private: only the engine's transitions reach them.

use crate::borrowing::BorrowingCheckpoint;
use crate::types::{
    CollateralIndex, GroupIndex, Leverage, PairIndex, Price, Quote, Side, Tick, Timestamp,
    TradeIndex, TradeType, TraderId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Owner plus slot. owner-only operations build this from the caller, so another
/// trader's slot cannot be addressed through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeKey {
    pub trader: TraderId,
    pub index: TradeIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trader: TraderId,
    pub index: TradeIndex,
    pub pair_index: PairIndex,
    pub leverage: Leverage,
    pub side: Side,
    pub is_open: bool,
    pub collateral_index: CollateralIndex,
    pub trade_type: TradeType,
    pub collateral_amount: Quote,
    pub open_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
}

impl Trade {
    pub fn key(&self) -> TradeKey {
        TradeKey {
            trader: self.trader,
            index: self.index,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side.is_long()
    }

    // collateral × leverage
    pub fn notional(&self) -> Quote {
        self.collateral_amount.mul(self.leverage.value())
    }

    // 4.1: pnl in collateral at `price`, with profit capped at `max_profit_p` of collateral
    pub fn pnl_at(&self, price: Price, max_profit_p: Decimal) -> Quote {
        let move_fraction = (price.value() - self.open_price.value()) / self.open_price.value();
        let raw = self.notional().value() * move_fraction * self.side.sign();
        let cap = self.collateral_amount.value() * max_profit_p / dec!(100);
        Quote::new(crate::types::truncate(raw.min(cap)))
    }

    /// Price at which remaining equity equals `(100 - threshold_p)%` of collateral.
    pub fn liquidation_price(&self, threshold_p: Decimal, borrowing_fee: Quote) -> Price {
        let col = self.collateral_amount.value();
        let distance = self.open_price.value()
            * (col * threshold_p / dec!(100) - borrowing_fee.value())
            / col
            / self.leverage.value();
        let raw = match self.side {
            Side::Long => self.open_price.value() - distance,
            Side::Short => self.open_price.value() + distance,
        };
        // a long whose distance exceeds the open price can't be liquidated by price
        Price::new(crate::types::truncate(raw)).unwrap_or(Price::new_unchecked(dec!(0.0000000001)))
    }

    pub fn is_liquidatable(&self, price: Price, threshold_p: Decimal, borrowing_fee: Quote) -> bool {
        let liq = self.liquidation_price(threshold_p, borrowing_fee);
        match self.side {
            Side::Long => price <= liq,
            Side::Short => price >= liq,
        }
    }

    /// TP above / SL below the open price for longs, mirrored for shorts.
    pub fn check_tp(&self, reference: Price, tp: Option<Price>) -> bool {
        match (tp, self.side) {
            (None, _) => true,
            (Some(tp), Side::Long) => tp > reference,
            (Some(tp), Side::Short) => tp < reference,
        }
    }

    pub fn check_sl(&self, reference: Price, sl: Option<Price>) -> bool {
        match (sl, self.side) {
            (None, _) => true,
            (Some(sl), Side::Long) => sl < reference,
            (Some(sl), Side::Short) => sl > reference,
        }
    }

    /// Price implying `max_profit_p` on collateral. TPs beyond it are pulled back.
    pub fn max_take_profit(&self, max_profit_p: Decimal) -> Option<Price> {
        let distance = self.open_price.value() * max_profit_p / dec!(100) / self.leverage.value();
        let raw = match self.side {
            Side::Long => self.open_price.value() + distance,
            Side::Short => self.open_price.value() - distance,
        };
        Price::new(crate::types::truncate(raw))
    }

    pub fn clamp_take_profit(&self, tp: Option<Price>, max_profit_p: Decimal) -> Option<Price> {
        let tp = tp?;
        match (self.max_take_profit(max_profit_p), self.side) {
            (Some(cap), Side::Long) if tp > cap => Some(cap),
            (Some(cap), Side::Short) if tp < cap => Some(cap),
            _ => Some(tp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInfo {
    pub created_tick: Tick,
    pub created_at: Timestamp,
    pub last_position_increase_tick: Tick,
    pub max_slippage_p: Decimal,
    pub borrowing: BorrowingCheckpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrade {
    pub trade: Trade,
    pub info: TradeInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub long: Decimal,
    pub short: Decimal,
}

impl OpenInterest {
    pub fn get(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    fn apply(&mut self, side: Side, delta: Decimal) {
        let slot = match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        };
        *slot = (*slot + delta).max(Decimal::ZERO);
    }

    pub fn total(&self) -> Decimal {
        self.long + self.short
    }
}

// 4.2: storage
#[derive(Debug, Clone)]
pub struct Ledger {
    trades: HashMap<TraderId, BTreeMap<TradeIndex, StoredTrade>>,
    pair_oi: HashMap<PairIndex, OpenInterest>,
    group_oi: HashMap<GroupIndex, OpenInterest>,
    max_trades_per_trader: u32,
}

impl Ledger {
    pub fn new(max_trades_per_trader: u32) -> Self {
        Self {
            trades: HashMap::new(),
            pair_oi: HashMap::new(),
            group_oi: HashMap::new(),
            max_trades_per_trader,
        }
    }

    /// Lowest unused slot. closed slots are reused.
    pub fn next_free_index(&self, trader: TraderId) -> Result<TradeIndex, LedgerError> {
        let Some(slots) = self.trades.get(&trader) else {
            return Ok(TradeIndex(0));
        };
        if slots.len() as u32 >= self.max_trades_per_trader {
            return Err(LedgerError::TooManyTrades {
                trader,
                limit: self.max_trades_per_trader,
            });
        }
        let mut candidate = 0u32;
        for index in slots.keys() {
            if index.0 != candidate {
                break;
            }
            candidate += 1;
        }
        Ok(TradeIndex(candidate))
    }

    pub fn get(&self, key: TradeKey) -> Result<&StoredTrade, LedgerError> {
        self.trades
            .get(&key.trader)
            .and_then(|slots| slots.get(&key.index))
            .ok_or(LedgerError::TradeNotFound(key))
    }

    pub fn active(&self, key: TradeKey) -> Result<&StoredTrade, LedgerError> {
        let stored = self.get(key)?;
        if !stored.trade.is_open {
            return Err(LedgerError::TradeNotOpen(key));
        }
        Ok(stored)
    }

    pub fn pending(&self, key: TradeKey) -> Result<&StoredTrade, LedgerError> {
        let stored = self.get(key)?;
        if stored.trade.is_open {
            return Err(LedgerError::TradeNotPending(key));
        }
        Ok(stored)
    }

    pub fn trade(&self, key: TradeKey) -> Result<&Trade, LedgerError> {
        Ok(&self.get(key)?.trade)
    }

    pub fn trade_info(&self, key: TradeKey) -> Result<&TradeInfo, LedgerError> {
        Ok(&self.get(key)?.info)
    }

    pub fn trades_of(&self, trader: TraderId) -> impl Iterator<Item = &StoredTrade> {
        self.trades.get(&trader).into_iter().flat_map(|slots| slots.values())
    }

    pub fn iter_trades(&self) -> impl Iterator<Item = &StoredTrade> {
        self.trades.values().flat_map(|slots| slots.values())
    }

    pub fn open_interest(&self, pair: PairIndex) -> OpenInterest {
        self.pair_oi.get(&pair).copied().unwrap_or_default()
    }

    pub fn group_open_interest(&self, group: GroupIndex) -> OpenInterest {
        self.group_oi.get(&group).copied().unwrap_or_default()
    }

    pub(crate) fn insert(&mut self, stored: StoredTrade) -> Result<(), LedgerError> {
        let key = stored.trade.key();
        let expected = self.next_free_index(key.trader)?;
        if key.index != expected {
            return Err(LedgerError::SlotTaken(key));
        }
        self.trades
            .entry(key.trader)
            .or_default()
            .insert(key.index, stored);
        Ok(())
    }

    pub(crate) fn replace(&mut self, stored: StoredTrade) -> Result<(), LedgerError> {
        let key = stored.trade.key();
        let slot = self
            .trades
            .get_mut(&key.trader)
            .and_then(|slots| slots.get_mut(&key.index))
            .ok_or(LedgerError::TradeNotFound(key))?;
        *slot = stored;
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: TradeKey) -> Result<StoredTrade, LedgerError> {
        let slots = self
            .trades
            .get_mut(&key.trader)
            .ok_or(LedgerError::TradeNotFound(key))?;
        let stored = slots.remove(&key.index).ok_or(LedgerError::TradeNotFound(key))?;
        if slots.is_empty() {
            self.trades.remove(&key.trader);
        }
        Ok(stored)
    }

    /// Signed notional change on one side of a pair and its group.
    pub(crate) fn adjust_open_interest(&mut self, pair: PairIndex, group: GroupIndex, side: Side, delta: Quote) {
        self.pair_oi.entry(pair).or_default().apply(side, delta.value());
        self.group_oi.entry(group).or_default().apply(side, delta.value());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Trade {0:?} not found")]
    TradeNotFound(TradeKey),

    #[error("Trade {0:?} is not an active position")]
    TradeNotOpen(TradeKey),

    #[error("Trade {0:?} is not a pending order")]
    TradeNotPending(TradeKey),

    #[error("Slot {0:?} is not the next free index")]
    SlotTaken(TradeKey),

    #[error("{trader} already holds {limit} trades")]
    TooManyTrades { trader: TraderId, limit: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeType;

    fn trade(trader: u64, index: u32, side: Side) -> StoredTrade {
        StoredTrade {
            trade: Trade {
                trader: TraderId(trader),
                index: TradeIndex(index),
                pair_index: PairIndex(0),
                leverage: Leverage::new(dec!(10)).unwrap(),
                side,
                is_open: true,
                collateral_index: CollateralIndex(0),
                trade_type: TradeType::Market,
                collateral_amount: Quote::new(dec!(100)),
                open_price: Price::new_unchecked(dec!(2000)),
                take_profit: None,
                stop_loss: None,
            },
            info: TradeInfo {
                created_tick: Tick(0),
                created_at: Timestamp(0),
                last_position_increase_tick: Tick(0),
                max_slippage_p: dec!(1),
                borrowing: BorrowingCheckpoint {
                    pair_acc: Decimal::ZERO,
                    group_acc: Decimal::ZERO,
                    tick: Tick(0),
                },
            },
        }
    }

    #[test]
    fn pnl_long_and_short() {
        let long = trade(1, 0, Side::Long).trade;
        let up = Price::new_unchecked(dec!(2100));
        assert_eq!(long.pnl_at(up, dec!(900)).value(), dec!(50));

        let short = trade(1, 0, Side::Short).trade;
        assert_eq!(short.pnl_at(up, dec!(900)).value(), dec!(-50));
    }

    #[test]
    fn pnl_capped_at_max_profit() {
        let long = trade(1, 0, Side::Long).trade;
        let moon = Price::new_unchecked(dec!(10000));
        // 10x on a 5x move is 4000%; cap is 900% of 100
        assert_eq!(long.pnl_at(moon, dec!(900)).value(), dec!(900));
    }

    #[test]
    fn liquidation_price_matches_threshold() {
        let long = trade(1, 0, Side::Long).trade;
        // 90% of collateral lost at 10x → 9% move
        assert_eq!(long.liquidation_price(dec!(90), Quote::zero()).value(), dec!(1820));
        // borrowing fee of 10 pulls the liquidation price 1% closer
        assert_eq!(long.liquidation_price(dec!(90), Quote::new(dec!(10))).value(), dec!(1840));

        let short = trade(1, 0, Side::Short).trade;
        assert_eq!(short.liquidation_price(dec!(90), Quote::zero()).value(), dec!(2180));
        assert!(short.is_liquidatable(Price::new_unchecked(dec!(2180)), dec!(90), Quote::zero()));
        assert!(!short.is_liquidatable(Price::new_unchecked(dec!(2179)), dec!(90), Quote::zero()));
    }

    #[test]
    fn take_profit_clamped_to_max_profit() {
        let long = trade(1, 0, Side::Long).trade;
        let cap = long.max_take_profit(dec!(900)).unwrap();
        assert_eq!(cap.value(), dec!(3800));
        let far = Some(Price::new_unchecked(dec!(9000)));
        assert_eq!(long.clamp_take_profit(far, dec!(900)), Some(cap));
        assert_eq!(long.clamp_take_profit(None, dec!(900)), None);
    }

    #[test]
    fn slots_are_reused_lowest_first() {
        let mut ledger = Ledger::new(3);
        for i in 0..3 {
            ledger.insert(trade(1, i, Side::Long)).unwrap();
        }
        assert!(matches!(
            ledger.next_free_index(TraderId(1)),
            Err(LedgerError::TooManyTrades { limit: 3, .. })
        ));

        let key = TradeKey { trader: TraderId(1), index: TradeIndex(1) };
        ledger.remove(key).unwrap();
        assert_eq!(ledger.next_free_index(TraderId(1)).unwrap(), TradeIndex(1));
        assert_eq!(ledger.get(key).unwrap_err(), LedgerError::TradeNotFound(key));
        assert_eq!(
            ledger.insert(trade(1, 2, Side::Long)).unwrap_err(),
            LedgerError::SlotTaken(TradeKey { trader: TraderId(1), index: TradeIndex(2) })
        );
    }

    #[test]
    fn open_interest_per_pair_and_group() {
        let mut ledger = Ledger::new(10);
        ledger.adjust_open_interest(PairIndex(0), GroupIndex(0), Side::Long, Quote::new(dec!(100)));
        ledger.adjust_open_interest(PairIndex(1), GroupIndex(0), Side::Long, Quote::new(dec!(50)));
        ledger.adjust_open_interest(PairIndex(0), GroupIndex(0), Side::Long, Quote::new(dec!(-40)));

        assert_eq!(ledger.open_interest(PairIndex(0)).long, dec!(60));
        assert_eq!(ledger.group_open_interest(GroupIndex(0)).long, dec!(110));
        assert_eq!(ledger.open_interest(PairIndex(0)).short, Decimal::ZERO);
    }

    #[test]
    fn pending_and_active_lookups() {
        let mut ledger = Ledger::new(10);
        let mut pending = trade(2, 0, Side::Short);
        pending.trade.is_open = false;
        ledger.insert(pending).unwrap();
        let key = TradeKey { trader: TraderId(2), index: TradeIndex(0) };
        assert!(ledger.pending(key).is_ok());
        assert_eq!(ledger.active(key).unwrap_err(), LedgerError::TradeNotOpen(key));
    }
}
