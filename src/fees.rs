// 12.0: fee adjusters. the engine asks these for a multiplier on its base fees and
// for the keeper's reward. they are lookup tables, the engine holds no fee logic of its own here.
// 12.1 flat fees. 12.2 tiered schedule keyed by notional and staked amount.

use crate::types::{truncate, Quote, TraderId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Buy table applies to opening fees, sell table to closing fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeLeg {
    Open,
    Close,
}

pub trait FeeAdjuster: Debug {
    /// Multiplier on the base fee, 10_000 = unchanged.
    fn fee_multiplier_bps(&self, trader: TraderId, notional: Quote, leg: FeeLeg) -> u32;

    /// Share of the fee handed back to the trader, percent.
    fn referral_rebate_p(&self, trader: TraderId) -> Decimal;

    /// Keeper reward for executing a trigger on `notional`.
    fn trigger_reward(&self, notional: Quote, trigger_fee_p: Decimal) -> Quote {
        notional.percent(trigger_fee_p)
    }
}

/// `fee × bps / 10_000`, truncated.
pub fn apply_bps(fee: Quote, multiplier_bps: u32) -> Quote {
    Quote::new(truncate(
        fee.value() * Decimal::from(multiplier_bps) / Decimal::from(BPS_DENOMINATOR),
    ))
}

/// Fee actually charged: multiplier first, then the rebate, each truncated.
pub fn adjusted_fee(adjuster: &dyn FeeAdjuster, trader: TraderId, notional: Quote, leg: FeeLeg, base: Quote) -> Quote {
    let multiplied = apply_bps(base, adjuster.fee_multiplier_bps(trader, notional, leg));
    let rebate = multiplied.percent(adjuster.referral_rebate_p(trader));
    multiplied.sub(rebate)
}

// 12.1
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFees;

impl FeeAdjuster for FlatFees {
    fn fee_multiplier_bps(&self, _trader: TraderId, _notional: Quote, _leg: FeeLeg) -> u32 {
        BPS_DENOMINATOR
    }

    fn referral_rebate_p(&self, _trader: TraderId) -> Decimal {
        Decimal::ZERO
    }
}

// 12.2: one table is a grid of multipliers. rows = notional buckets, columns = staked buckets.
// bucket bounds are inclusive lower bounds starting at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeTable {
    pub notional_buckets: Vec<Decimal>,
    pub stake_buckets: Vec<Decimal>,
    pub multipliers_bps: Vec<Vec<u32>>,
}

impl FeeTable {
    pub fn validate(&self, leg: FeeLeg) -> Result<(), FeeTierError> {
        validate_buckets(&self.notional_buckets, leg)?;
        validate_buckets(&self.stake_buckets, leg)?;
        if self.multipliers_bps.len() != self.notional_buckets.len()
            || self
                .multipliers_bps
                .iter()
                .any(|row| row.len() != self.stake_buckets.len())
        {
            return Err(FeeTierError::Shape { leg });
        }
        for (row, cells) in self.multipliers_bps.iter().enumerate() {
            for (col, &bps) in cells.iter().enumerate() {
                if bps > BPS_DENOMINATOR {
                    return Err(FeeTierError::AboveUnity { leg, row, col, bps });
                }
                // larger notional and larger stake never pay more
                let left_ok = col == 0 || bps <= cells[col - 1];
                let up_ok = row == 0 || bps <= self.multipliers_bps[row - 1][col];
                if !left_ok || !up_ok {
                    return Err(FeeTierError::NotMonotone { leg, row, col });
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, notional: Decimal, staked: Decimal) -> u32 {
        let row = bucket_of(&self.notional_buckets, notional);
        let col = bucket_of(&self.stake_buckets, staked);
        self.multipliers_bps
            .get(row)
            .and_then(|cells| cells.get(col))
            .copied()
            .unwrap_or(BPS_DENOMINATOR)
    }
}

fn validate_buckets(buckets: &[Decimal], leg: FeeLeg) -> Result<(), FeeTierError> {
    if buckets.first() != Some(&Decimal::ZERO) {
        return Err(FeeTierError::Shape { leg });
    }
    if buckets.windows(2).any(|w| w[1] <= w[0]) {
        return Err(FeeTierError::NotAscending { leg });
    }
    Ok(())
}

fn bucket_of(buckets: &[Decimal], value: Decimal) -> usize {
    buckets
        .iter()
        .rposition(|lower| value >= *lower)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct FeeTierSchedule {
    buy: FeeTable,
    sell: FeeTable,
    stakes: HashMap<TraderId, Decimal>,
    referral_rebates: HashMap<TraderId, Decimal>,
}

impl FeeTierSchedule {
    pub fn new(buy: FeeTable, sell: FeeTable) -> Result<Self, FeeTierError> {
        buy.validate(FeeLeg::Open)?;
        sell.validate(FeeLeg::Close)?;
        Ok(Self {
            buy,
            sell,
            stakes: HashMap::new(),
            referral_rebates: HashMap::new(),
        })
    }

    pub fn set_stake(&mut self, trader: TraderId, staked: Decimal) {
        self.stakes.insert(trader, staked);
    }

    pub fn set_referral_rebate(&mut self, trader: TraderId, rebate_p: Decimal) -> Result<(), FeeTierError> {
        if rebate_p < Decimal::ZERO || rebate_p > dec!(100) {
            return Err(FeeTierError::InvalidRebate(rebate_p));
        }
        self.referral_rebates.insert(trader, rebate_p);
        Ok(())
    }

    pub fn table(&self, leg: FeeLeg) -> &FeeTable {
        match leg {
            FeeLeg::Open => &self.buy,
            FeeLeg::Close => &self.sell,
        }
    }
}

impl FeeAdjuster for FeeTierSchedule {
    fn fee_multiplier_bps(&self, trader: TraderId, notional: Quote, leg: FeeLeg) -> u32 {
        let staked = self.stakes.get(&trader).copied().unwrap_or_default();
        self.table(leg).lookup(notional.value(), staked)
    }

    fn referral_rebate_p(&self, trader: TraderId) -> Decimal {
        self.referral_rebates.get(&trader).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeTierError {
    #[error("{leg:?} table: bucket bounds and multiplier grid do not line up")]
    Shape { leg: FeeLeg },

    #[error("{leg:?} table: bucket bounds must be strictly ascending")]
    NotAscending { leg: FeeLeg },

    #[error("{leg:?} table: multiplier at ({row}, {col}) exceeds its neighbour")]
    NotMonotone { leg: FeeLeg, row: usize, col: usize },

    #[error("{leg:?} table: multiplier {bps} at ({row}, {col}) above 10000")]
    AboveUnity { leg: FeeLeg, row: usize, col: usize, bps: u32 },

    #[error("Referral rebate {0}% outside [0, 100]")]
    InvalidRebate(Decimal),
}
