// 8.6 engine/invariants.rs: full-state consistency sweep. read only, safe to call between transitions.

use super::core::Engine;
use crate::ledger::{OpenInterest, TradeKey};
use crate::provider::CollateralProvider;
use crate::types::{GroupIndex, Leverage, PairIndex, Price, Quote, Side};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Pair {pair:?} {side:?} OI {recorded} != sum of trades {expected}")]
    PairOpenInterest {
        pair: PairIndex,
        side: Side,
        recorded: Decimal,
        expected: Decimal,
    },

    #[error("Group {group:?} {side:?} OI {recorded} != sum of pairs {expected}")]
    GroupOpenInterest {
        group: GroupIndex,
        side: Side,
        recorded: Decimal,
        expected: Decimal,
    },

    #[error("Trade {0:?} references an unknown pair or group")]
    UnknownPair(TradeKey),

    #[error("Trade {key:?} is open with collateral {collateral}")]
    NonPositiveCollateral { key: TradeKey, collateral: Quote },

    #[error("Trade {key:?} leverage {leverage} outside [{min}, {max}]")]
    LeverageOutOfBounds {
        key: TradeKey,
        leverage: Leverage,
        min: Leverage,
        max: Leverage,
    },

    #[error("Trade {key:?} take profit {take_profit} on the wrong side of {open_price}")]
    TakeProfitMisordered {
        key: TradeKey,
        take_profit: Price,
        open_price: Price,
    },

    #[error("Trade {key:?} stop loss {stop_loss} on the wrong side of {open_price}")]
    StopLossMisordered {
        key: TradeKey,
        stop_loss: Price,
        open_price: Price,
    },
}

impl<P: CollateralProvider> Engine<P> {
    /// Recomputes open interest from the stored trades and checks every active trade.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let registry = &self.state.registry;
        let ledger = &self.state.ledger;
        let mut pair_sums: BTreeMap<PairIndex, OpenInterest> = BTreeMap::new();

        for stored in ledger.iter_trades().filter(|stored| stored.trade.is_open) {
            let trade = &stored.trade;
            let key = trade.key();
            let pair = registry
                .pair(trade.pair_index)
                .map_err(|_| InvariantViolation::UnknownPair(key))?;
            let group = registry
                .group(pair.group_index)
                .map_err(|_| InvariantViolation::UnknownPair(key))?;

            if !trade.collateral_amount.is_positive() {
                return Err(InvariantViolation::NonPositiveCollateral {
                    key,
                    collateral: trade.collateral_amount,
                });
            }
            if !group.allows(trade.leverage) {
                return Err(InvariantViolation::LeverageOutOfBounds {
                    key,
                    leverage: trade.leverage,
                    min: group.min_leverage,
                    max: group.max_leverage,
                });
            }
            if let Some(take_profit) = trade.take_profit {
                if !trade.check_tp(trade.open_price, Some(take_profit)) {
                    return Err(InvariantViolation::TakeProfitMisordered {
                        key,
                        take_profit,
                        open_price: trade.open_price,
                    });
                }
            }
            if let Some(stop_loss) = trade.stop_loss {
                if !trade.check_sl(trade.open_price, Some(stop_loss)) {
                    return Err(InvariantViolation::StopLossMisordered {
                        key,
                        stop_loss,
                        open_price: trade.open_price,
                    });
                }
            }

            let sum = pair_sums.entry(trade.pair_index).or_default();
            match trade.side {
                Side::Long => sum.long += trade.notional().value(),
                Side::Short => sum.short += trade.notional().value(),
            }
        }

        let mut group_sums: BTreeMap<GroupIndex, OpenInterest> = BTreeMap::new();
        let mut groups = BTreeSet::new();
        for pair in registry.pairs() {
            groups.insert(pair.group_index);
            let expected = pair_sums.get(&pair.index).copied().unwrap_or_default();
            let recorded = ledger.open_interest(pair.index);
            for side in [Side::Long, Side::Short] {
                if recorded.get(side) != expected.get(side) {
                    return Err(InvariantViolation::PairOpenInterest {
                        pair: pair.index,
                        side,
                        recorded: recorded.get(side),
                        expected: expected.get(side),
                    });
                }
            }
            let group_sum = group_sums.entry(pair.group_index).or_default();
            group_sum.long += recorded.long;
            group_sum.short += recorded.short;
        }

        for group in groups {
            let expected = group_sums.get(&group).copied().unwrap_or_default();
            let recorded = ledger.group_open_interest(group);
            for side in [Side::Long, Side::Short] {
                if recorded.get(side) != expected.get(side) {
                    return Err(InvariantViolation::GroupOpenInterest {
                        group,
                        side,
                        recorded: recorded.get(side),
                        expected: expected.get(side),
                    });
                }
            }
        }

        Ok(())
    }
}
