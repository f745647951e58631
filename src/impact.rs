// 6.0: price impact. a new trade moves the execution price away from the oracle mid
// by half the spread plus its share of the pair's depth on that side.
// every step truncates like integer division so the open price matches the ledger bit for bit.

use crate::registry::Pair;
use crate::types::{truncate, Price, Quote, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactQuote {
    /// Total impact in percent (spread half plus depth share).
    pub price_impact_p: Decimal,
    pub price_impact: Decimal,
    pub exec_price: Price,
}

/// `spread_p/2 + (oi_before + ΔN/2) / depth`, percent. depth is the notional that
/// moves price by 1%. a zero depth disables the depth term.
pub fn price_impact_p(spread_p: Decimal, oi_before: Decimal, delta_notional: Decimal, depth: Decimal) -> Decimal {
    let depth_p = if depth.is_zero() {
        Decimal::ZERO
    } else {
        truncate((oi_before + delta_notional / dec!(2)) / depth)
    };
    truncate(spread_p / dec!(2) + depth_p)
}

// 6.1: longs push the price up against depth_above, shorts down against depth_below
pub fn trade_price_impact(
    pair: &Pair,
    side: Side,
    oracle_price: Price,
    oi_before: Decimal,
    delta_notional: Quote,
) -> Result<ImpactQuote, ImpactError> {
    let impact_p = price_impact_p(pair.spread_p, oi_before, delta_notional.value(), pair.depth(side));
    let impact = truncate(impact_p * oracle_price.value() / dec!(100));
    let raw = match side {
        Side::Long => oracle_price.value() + impact,
        Side::Short => oracle_price.value() - impact,
    };
    let exec_price = Price::new(raw).ok_or(ImpactError::ExecutionPriceNotPositive {
        oracle_price,
        impact_p,
    })?;
    Ok(ImpactQuote {
        price_impact_p: impact_p,
        price_impact: impact,
        exec_price,
    })
}

// 6.2: notional-weighted open price after an increase. the old leg is weighted by its notional plus pnl
pub fn blended_open_price(
    old_notional_plus_pnl: Quote,
    old_open: Price,
    delta_notional: Quote,
    exec_price: Price,
) -> Option<Price> {
    let weight = old_notional_plus_pnl.value() + delta_notional.value();
    if weight <= Decimal::ZERO {
        return None;
    }
    let numerator =
        old_notional_plus_pnl.value() * old_open.value() + delta_notional.value() * exec_price.value();
    Price::new(truncate(numerator / weight))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImpactError {
    #[error("Impact of {impact_p}% pushes {oracle_price} to a non-positive price")]
    ExecutionPriceNotPositive { oracle_price: Price, impact_p: Decimal },
}
