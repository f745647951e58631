// 5.0: borrowing fees. every tick, open positions pay fee_per_tick scaled by how much of the
// pair's (and group's) max open interest is in use on their side.
// 5.0 has the params/state structs. 5.1 has the accrual math. 5.2 the per-trade fee.

use crate::ledger::OpenInterest;
use crate::registry::RegistryError;
use crate::types::{GroupIndex, PairIndex, Quote, Side, Tick};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowingParams {
    /// Fraction of notional charged per tick at full utilization. signed.
    pub fee_per_tick: Decimal,
    pub max_open_interest: Decimal,
    pub fee_exponent: Decimal,
}

impl BorrowingParams {
    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.max_open_interest <= Decimal::ZERO {
            return Err(RegistryError::InvalidBorrowingParams {
                reason: "max open interest must be positive",
            });
        }
        if self.fee_exponent <= Decimal::ZERO {
            return Err(RegistryError::InvalidBorrowingParams {
                reason: "fee exponent must be positive",
            });
        }
        Ok(())
    }

    // 5.1: rate per tick for one side. utilization clamps to [0, 1]
    pub fn rate_per_tick(&self, side_open_interest: Decimal) -> Decimal {
        let utilization = (side_open_interest / self.max_open_interest)
            .max(Decimal::ZERO)
            .min(Decimal::ONE);
        let scaled = if self.fee_exponent == Decimal::ONE {
            utilization
        } else if utilization.is_zero() {
            Decimal::ZERO
        } else {
            utilization.powd(self.fee_exponent)
        };
        self.fee_per_tick * scaled
    }
}

/// Accumulated fee per unit of notional, one index per side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatedFees {
    pub long: Decimal,
    pub short: Decimal,
    pub last_update: Tick,
}

impl AccumulatedFees {
    pub fn new(tick: Tick) -> Self {
        Self {
            long: Decimal::ZERO,
            short: Decimal::ZERO,
            last_update: tick,
        }
    }

    pub fn get(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    fn pending(&self, params: Option<&BorrowingParams>, oi: &OpenInterest, now: Tick) -> Self {
        let elapsed = Decimal::from(now.elapsed_since(self.last_update));
        let (long, short) = match params {
            Some(p) if !elapsed.is_zero() => (
                self.long + elapsed * p.rate_per_tick(oi.long),
                self.short + elapsed * p.rate_per_tick(oi.short),
            ),
            _ => (self.long, self.short),
        };
        Self {
            long,
            short,
            last_update: now.max(self.last_update),
        }
    }
}

/// Where a trade's fee clock last restarted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorrowingCheckpoint {
    pub pair_acc: Decimal,
    pub group_acc: Decimal,
    pub tick: Tick,
}

/// Current accumulated values for one side of a pair and its group.
/// an accumulator without params never accrues and is ignored when pricing a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatorView {
    pub pair_acc: Decimal,
    pub group_acc: Decimal,
    pub pair_configured: bool,
    pub group_configured: bool,
}

/// Per-pair and per-group accumulators. brought current before any OI change.
#[derive(Debug, Clone, Default)]
pub struct BorrowingBook {
    pairs: HashMap<PairIndex, AccumulatedFees>,
    groups: HashMap<GroupIndex, AccumulatedFees>,
}

pub struct BorrowingInputs<'a> {
    pub pair: PairIndex,
    pub group: GroupIndex,
    pub pair_params: Option<&'a BorrowingParams>,
    pub group_params: Option<&'a BorrowingParams>,
    pub pair_oi: OpenInterest,
    pub group_oi: OpenInterest,
}

impl BorrowingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulators as of `now` without writing anything.
    pub fn view(&self, inputs: &BorrowingInputs<'_>, side: Side, now: Tick) -> AccumulatorView {
        let pair = self
            .pairs
            .get(&inputs.pair)
            .cloned()
            .unwrap_or_else(|| AccumulatedFees::new(now))
            .pending(inputs.pair_params, &inputs.pair_oi, now);
        let group = self
            .groups
            .get(&inputs.group)
            .cloned()
            .unwrap_or_else(|| AccumulatedFees::new(now))
            .pending(inputs.group_params, &inputs.group_oi, now);
        AccumulatorView {
            pair_acc: pair.get(side),
            group_acc: group.get(side),
            pair_configured: inputs.pair_params.is_some(),
            group_configured: inputs.group_params.is_some(),
        }
    }

    /// Writes accrual up to `now` using the OI that was live over the interval.
    pub fn sync(&mut self, inputs: &BorrowingInputs<'_>, now: Tick) {
        let pair = self
            .pairs
            .entry(inputs.pair)
            .or_insert_with(|| AccumulatedFees::new(now));
        *pair = pair.pending(inputs.pair_params, &inputs.pair_oi, now);

        let group = self
            .groups
            .entry(inputs.group)
            .or_insert_with(|| AccumulatedFees::new(now));
        *group = group.pending(inputs.group_params, &inputs.group_oi, now);
    }

    pub fn pair_accumulators(&self, pair: PairIndex) -> Option<&AccumulatedFees> {
        self.pairs.get(&pair)
    }

    pub fn group_accumulators(&self, group: GroupIndex) -> Option<&AccumulatedFees> {
        self.groups.get(&group)
    }
}

pub fn checkpoint(view: AccumulatorView, tick: Tick) -> BorrowingCheckpoint {
    BorrowingCheckpoint {
        pair_acc: view.pair_acc,
        group_acc: view.group_acc,
        tick,
    }
}

// 5.2: the trade pays the larger of its pair and group accrual since checkpoint.
// positive = position pays, negative = position is paid.
pub fn trade_borrowing_fee(notional: Quote, since: &BorrowingCheckpoint, now: AccumulatorView) -> Quote {
    let pair_delta = now.pair_acc - since.pair_acc;
    let group_delta = now.group_acc - since.group_acc;
    let delta = match (now.pair_configured, now.group_configured) {
        (true, true) => pair_delta.max(group_delta),
        (true, false) => pair_delta,
        (false, true) => group_delta,
        (false, false) => Decimal::ZERO,
    };
    Quote::new(crate::types::truncate(notional.value() * delta))
}
