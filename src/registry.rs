//! Pair and risk registry.
//!
//! Admin-configured instrument metadata: pairs, risk groups with their
//! liquidation-threshold curves, fee records, collaterals, borrowing
//! parameters and the keeper policy. Every successful mutation bumps the
//! registry version and returns a [`ConfigUpdate`] carrying the new value.

use crate::borrowing::BorrowingParams;
use crate::oracle::InstrumentId;
use crate::types::{
    CollateralIndex, FeeIndex, GroupIndex, Leverage, PairIndex, Price, Quote, Side, TraderId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub index: PairIndex,
    pub from: String,
    pub to: String,
    pub instrument_id: InstrumentId,
    /// Full bid/ask spread in percent. half is charged on entry.
    pub spread_p: Decimal,
    pub group_index: GroupIndex,
    pub fee_index: FeeIndex,
    /// Long notional that moves price up by 1%.
    pub depth_above: Decimal,
    /// Short notional that moves price down by 1%.
    pub depth_below: Decimal,
}

impl Pair {
    pub fn depth(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.depth_above,
            Side::Short => self.depth_below,
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.from, self.to)
    }
}

/// Liquidation threshold falls linearly from `start_threshold_p` at
/// `start_leverage` to `end_threshold_p` at `end_leverage`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidationCurve {
    pub start_leverage: Decimal,
    pub start_threshold_p: Decimal,
    pub end_leverage: Decimal,
    pub end_threshold_p: Decimal,
    pub max_liq_spread_p: Decimal,
}

impl LiquidationCurve {
    /// Flat 90% loss threshold, used until a group's curve is initialized.
    pub fn flat(threshold_p: Decimal) -> Self {
        Self {
            start_leverage: Decimal::ONE,
            start_threshold_p: threshold_p,
            end_leverage: Decimal::ONE,
            end_threshold_p: threshold_p,
            max_liq_spread_p: Decimal::ZERO,
        }
    }

    pub fn threshold_p(&self, leverage: Leverage) -> Decimal {
        let span = self.end_leverage - self.start_leverage;
        if span <= Decimal::ZERO {
            return self.start_threshold_p;
        }
        let lev = leverage
            .value()
            .max(self.start_leverage)
            .min(self.end_leverage);
        self.start_threshold_p
            - (lev - self.start_leverage) * (self.start_threshold_p - self.end_threshold_p) / span
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &'static str| Err(RegistryError::InvalidCurve { reason });
        if self.start_leverage < Decimal::ONE || self.end_leverage < self.start_leverage {
            return invalid("leverage range must be ascending and >= 1");
        }
        if self.end_threshold_p <= Decimal::ZERO || self.start_threshold_p > dec!(100) {
            return invalid("thresholds must be within (0, 100]");
        }
        if self.end_threshold_p > self.start_threshold_p {
            return invalid("threshold must not increase with leverage");
        }
        if self.max_liq_spread_p < Decimal::ZERO {
            return invalid("liquidation spread must be non-negative");
        }
        Ok(())
    }
}

impl Default for LiquidationCurve {
    fn default() -> Self {
        Self::flat(dec!(90))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGroup {
    pub index: GroupIndex,
    pub name: String,
    pub min_leverage: Leverage,
    pub max_leverage: Leverage,
    pub liquidation: Option<LiquidationCurve>,
}

impl RiskGroup {
    pub fn allows(&self, leverage: Leverage) -> bool {
        leverage >= self.min_leverage && leverage <= self.max_leverage
    }

    pub fn curve(&self) -> LiquidationCurve {
        self.liquidation.unwrap_or_default()
    }
}

/// Percent fees charged on position notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFee {
    pub index: FeeIndex,
    pub open_fee_p: Decimal,
    pub close_fee_p: Decimal,
    pub trigger_fee_p: Decimal,
    pub min_position_size: Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralInfo {
    pub index: CollateralIndex,
    pub symbol: String,
    pub decimals: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeeperMode {
    Permissionless,
    Allowlisted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigChange {
    PairAdded(Pair),
    PairDepthsUpdated {
        pair: PairIndex,
        depth_above: Decimal,
        depth_below: Decimal,
    },
    PairSpreadUpdated { pair: PairIndex, spread_p: Decimal },
    GroupAdded(RiskGroup),
    GroupLiquidationInitialized {
        group: GroupIndex,
        curve: LiquidationCurve,
    },
    FeeAdded(PairFee),
    CollateralAdded(CollateralInfo),
    BorrowingGroupParamsSet {
        group: GroupIndex,
        params: BorrowingParams,
    },
    BorrowingPairParamsSet {
        pair: PairIndex,
        params: BorrowingParams,
    },
    KeeperSet { keeper: TraderId, allowed: bool },
    KeeperModeSet(KeeperMode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub version: u64,
    pub change: ConfigChange,
}

#[derive(Debug, Clone)]
pub struct Registry {
    admin: TraderId,
    version: u64,
    pairs: BTreeMap<PairIndex, Pair>,
    groups: BTreeMap<GroupIndex, RiskGroup>,
    fees: BTreeMap<FeeIndex, PairFee>,
    collaterals: BTreeMap<CollateralIndex, CollateralInfo>,
    group_borrowing: BTreeMap<GroupIndex, BorrowingParams>,
    pair_borrowing: BTreeMap<PairIndex, BorrowingParams>,
    keepers: BTreeSet<TraderId>,
    keeper_mode: KeeperMode,
}

impl Registry {
    pub fn new(admin: TraderId) -> Self {
        Self {
            admin,
            version: 0,
            pairs: BTreeMap::new(),
            groups: BTreeMap::new(),
            fees: BTreeMap::new(),
            collaterals: BTreeMap::new(),
            group_borrowing: BTreeMap::new(),
            pair_borrowing: BTreeMap::new(),
            keepers: BTreeSet::new(),
            keeper_mode: KeeperMode::Permissionless,
        }
    }

    pub fn admin(&self) -> TraderId {
        self.admin
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn ensure_admin(&self, caller: TraderId) -> Result<(), RegistryError> {
        if caller != self.admin {
            return Err(RegistryError::NotAdmin(caller));
        }
        Ok(())
    }

    fn commit(&mut self, change: ConfigChange) -> ConfigUpdate {
        self.version += 1;
        ConfigUpdate {
            version: self.version,
            change,
        }
    }

    pub fn add_group(&mut self, caller: TraderId, group: RiskGroup) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if self.groups.contains_key(&group.index) {
            return Err(RegistryError::GroupExists(group.index));
        }
        if group.min_leverage > group.max_leverage {
            return Err(RegistryError::InvalidLeverageBounds {
                min: group.min_leverage,
                max: group.max_leverage,
            });
        }
        if let Some(curve) = &group.liquidation {
            curve.validate()?;
        }
        self.groups.insert(group.index, group.clone());
        Ok(self.commit(ConfigChange::GroupAdded(group)))
    }

    pub fn add_fee(&mut self, caller: TraderId, fee: PairFee) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if self.fees.contains_key(&fee.index) {
            return Err(RegistryError::FeeExists(fee.index));
        }
        let in_range = |p: Decimal| p >= Decimal::ZERO && p < dec!(10);
        if !in_range(fee.open_fee_p) || !in_range(fee.close_fee_p) || !in_range(fee.trigger_fee_p) {
            return Err(RegistryError::InvalidFee {
                reason: "fee percentages must be within [0, 10)",
            });
        }
        if fee.min_position_size.is_negative() {
            return Err(RegistryError::InvalidFee {
                reason: "minimum position size must be non-negative",
            });
        }
        self.fees.insert(fee.index, fee.clone());
        Ok(self.commit(ConfigChange::FeeAdded(fee)))
    }

    pub fn add_collateral(
        &mut self,
        caller: TraderId,
        collateral: CollateralInfo,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if self.collaterals.contains_key(&collateral.index) {
            return Err(RegistryError::CollateralExists(collateral.index));
        }
        self.collaterals.insert(collateral.index, collateral.clone());
        Ok(self.commit(ConfigChange::CollateralAdded(collateral)))
    }

    pub fn add_pair(&mut self, caller: TraderId, pair: Pair) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if self.pairs.contains_key(&pair.index) {
            return Err(RegistryError::PairExists(pair.index));
        }
        if !self.groups.contains_key(&pair.group_index) {
            return Err(RegistryError::GroupNotFound(pair.group_index));
        }
        if !self.fees.contains_key(&pair.fee_index) {
            return Err(RegistryError::FeeNotFound(pair.fee_index));
        }
        validate_depths(pair.depth_above, pair.depth_below)?;
        validate_spread(pair.spread_p)?;
        self.pairs.insert(pair.index, pair.clone());
        Ok(self.commit(ConfigChange::PairAdded(pair)))
    }

    pub fn set_pair_depths(
        &mut self,
        caller: TraderId,
        pair: PairIndex,
        depth_above: Decimal,
        depth_below: Decimal,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        validate_depths(depth_above, depth_below)?;
        let entry = self
            .pairs
            .get_mut(&pair)
            .ok_or(RegistryError::PairNotFound(pair))?;
        entry.depth_above = depth_above;
        entry.depth_below = depth_below;
        Ok(self.commit(ConfigChange::PairDepthsUpdated {
            pair,
            depth_above,
            depth_below,
        }))
    }

    pub fn set_pair_spread(
        &mut self,
        caller: TraderId,
        pair: PairIndex,
        spread_p: Decimal,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        validate_spread(spread_p)?;
        let entry = self
            .pairs
            .get_mut(&pair)
            .ok_or(RegistryError::PairNotFound(pair))?;
        entry.spread_p = spread_p;
        Ok(self.commit(ConfigChange::PairSpreadUpdated { pair, spread_p }))
    }

    pub fn initialize_group_liquidation_params(
        &mut self,
        caller: TraderId,
        group: GroupIndex,
        curve: LiquidationCurve,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        curve.validate()?;
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or(RegistryError::GroupNotFound(group))?;
        entry.liquidation = Some(curve);
        Ok(self.commit(ConfigChange::GroupLiquidationInitialized { group, curve }))
    }

    pub fn set_borrowing_group_params(
        &mut self,
        caller: TraderId,
        group: GroupIndex,
        params: BorrowingParams,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if !self.groups.contains_key(&group) {
            return Err(RegistryError::GroupNotFound(group));
        }
        params.validate()?;
        self.group_borrowing.insert(group, params.clone());
        Ok(self.commit(ConfigChange::BorrowingGroupParamsSet { group, params }))
    }

    pub fn set_borrowing_pair_params(
        &mut self,
        caller: TraderId,
        pair: PairIndex,
        params: BorrowingParams,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if !self.pairs.contains_key(&pair) {
            return Err(RegistryError::PairNotFound(pair));
        }
        params.validate()?;
        self.pair_borrowing.insert(pair, params.clone());
        Ok(self.commit(ConfigChange::BorrowingPairParamsSet { pair, params }))
    }

    pub fn set_keeper(
        &mut self,
        caller: TraderId,
        keeper: TraderId,
        allowed: bool,
    ) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        if allowed {
            self.keepers.insert(keeper);
        } else {
            self.keepers.remove(&keeper);
        }
        Ok(self.commit(ConfigChange::KeeperSet { keeper, allowed }))
    }

    pub fn set_keeper_mode(&mut self, caller: TraderId, mode: KeeperMode) -> Result<ConfigUpdate, RegistryError> {
        self.ensure_admin(caller)?;
        self.keeper_mode = mode;
        Ok(self.commit(ConfigChange::KeeperModeSet(mode)))
    }

    pub fn is_keeper(&self, caller: TraderId) -> bool {
        match self.keeper_mode {
            KeeperMode::Permissionless => true,
            KeeperMode::Allowlisted => self.keepers.contains(&caller),
        }
    }

    pub fn pair(&self, index: PairIndex) -> Result<&Pair, RegistryError> {
        self.pairs.get(&index).ok_or(RegistryError::PairNotFound(index))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    pub fn group(&self, index: GroupIndex) -> Result<&RiskGroup, RegistryError> {
        self.groups.get(&index).ok_or(RegistryError::GroupNotFound(index))
    }

    pub fn fee(&self, index: FeeIndex) -> Result<&PairFee, RegistryError> {
        self.fees.get(&index).ok_or(RegistryError::FeeNotFound(index))
    }

    pub fn collateral(&self, index: CollateralIndex) -> Result<&CollateralInfo, RegistryError> {
        let info = self
            .collaterals
            .get(&index)
            .ok_or(RegistryError::CollateralNotFound(index))?;
        if !info.active {
            return Err(RegistryError::CollateralInactive(index));
        }
        Ok(info)
    }

    pub fn group_borrowing(&self, group: GroupIndex) -> Option<&BorrowingParams> {
        self.group_borrowing.get(&group)
    }

    pub fn pair_borrowing(&self, pair: PairIndex) -> Option<&BorrowingParams> {
        self.pair_borrowing.get(&pair)
    }

    /// Loss percent at which a trade in `group` with `leverage` is liquidated.
    pub fn liquidation_threshold_p(&self, group: GroupIndex, leverage: Leverage) -> Result<Decimal, RegistryError> {
        Ok(self.group(group)?.curve().threshold_p(leverage))
    }
}

fn validate_depths(depth_above: Decimal, depth_below: Decimal) -> Result<(), RegistryError> {
    if depth_above < Decimal::ZERO || depth_below < Decimal::ZERO {
        return Err(RegistryError::InvalidDepth {
            depth_above,
            depth_below,
        });
    }
    Ok(())
}

fn validate_spread(spread_p: Decimal) -> Result<(), RegistryError> {
    if spread_p < Decimal::ZERO || spread_p >= dec!(100) {
        return Err(RegistryError::InvalidSpread(spread_p));
    }
    Ok(())
}

/// Percent loss on collateral if price moves from `open` to `price`.
pub fn loss_p_at(side: Side, open: Price, price: Price, leverage: Leverage) -> Decimal {
    -(price.percent_from(open) * side.sign() * leverage.value())
}

// exact: compares `move × 100 × leverage` against `max_loss_p × open` without dividing
fn loss_within(side: Side, open: Price, price: Price, leverage: Leverage, max_loss_p: Decimal) -> bool {
    let adverse_move = (open.value() - price.value()) * side.sign();
    adverse_move * dec!(100) * leverage.value() <= max_loss_p * open.value()
}

/// Pulls a stop loss toward the open price until its implied loss stays under
/// `threshold_p - buffer_p`. an SL already inside the bound is returned unchanged.
///
/// The distance is truncated, so the clamped level always lands on the open-price side
/// of the exact bound.
pub fn clamp_stop_loss(
    side: Side,
    open: Price,
    leverage: Leverage,
    threshold_p: Decimal,
    buffer_p: Decimal,
    stop_loss: Price,
) -> Price {
    let max_loss_p = (threshold_p - buffer_p).max(Decimal::ZERO);
    if loss_within(side, open, stop_loss, leverage, max_loss_p) {
        return stop_loss;
    }
    let distance = crate::types::truncate(open.value() * max_loss_p / dec!(100) / leverage.value());
    let clamped = match side {
        Side::Long => open.value() - distance,
        Side::Short => open.value() + distance,
    };
    Price::new(clamped).unwrap_or(stop_loss)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Caller {0:?} is not the registry admin")]
    NotAdmin(TraderId),

    #[error("Pair {0:?} not found")]
    PairNotFound(PairIndex),

    #[error("Pair {0:?} already exists")]
    PairExists(PairIndex),

    #[error("Group {0:?} not found")]
    GroupNotFound(GroupIndex),

    #[error("Group {0:?} already exists")]
    GroupExists(GroupIndex),

    #[error("Fee {0:?} not found")]
    FeeNotFound(FeeIndex),

    #[error("Fee {0:?} already exists")]
    FeeExists(FeeIndex),

    #[error("Collateral {0:?} not found")]
    CollateralNotFound(CollateralIndex),

    #[error("Collateral {0:?} already exists")]
    CollateralExists(CollateralIndex),

    #[error("Collateral {0:?} is not active")]
    CollateralInactive(CollateralIndex),

    #[error("Invalid depths: above {depth_above}, below {depth_below}")]
    InvalidDepth {
        depth_above: Decimal,
        depth_below: Decimal,
    },

    #[error("Invalid spread {0}%")]
    InvalidSpread(Decimal),

    #[error("Invalid leverage bounds: min {min}, max {max}")]
    InvalidLeverageBounds { min: Leverage, max: Leverage },

    #[error("Invalid liquidation curve: {reason}")]
    InvalidCurve { reason: &'static str },

    #[error("Invalid fee: {reason}")]
    InvalidFee { reason: &'static str },

    #[error("Invalid borrowing params: {reason}")]
    InvalidBorrowingParams { reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: TraderId = TraderId(1);

    fn lev(x: Decimal) -> Leverage {
        Leverage::new(x).unwrap()
    }

    fn registry() -> Registry {
        let mut reg = Registry::new(ADMIN);
        reg.add_group(
            ADMIN,
            RiskGroup {
                index: GroupIndex(0),
                name: "crypto".into(),
                min_leverage: lev(dec!(1.1)),
                max_leverage: lev(dec!(150)),
                liquidation: None,
            },
        )
        .unwrap();
        reg.add_fee(
            ADMIN,
            PairFee {
                index: FeeIndex(0),
                open_fee_p: dec!(0.03),
                close_fee_p: dec!(0.03),
                trigger_fee_p: dec!(0.02),
                min_position_size: Quote::zero(),
            },
        )
        .unwrap();
        reg
    }

    #[test]
    fn curve_interpolates_linearly() {
        let curve = LiquidationCurve {
            start_leverage: dec!(10),
            start_threshold_p: dec!(90),
            end_leverage: dec!(110),
            end_threshold_p: dec!(80),
            max_liq_spread_p: dec!(0.5),
        };
        assert_eq!(curve.threshold_p(lev(dec!(10))), dec!(90));
        assert_eq!(curve.threshold_p(lev(dec!(60))), dec!(85));
        assert_eq!(curve.threshold_p(lev(dec!(110))), dec!(80));
        // outside the range clamps to the end points
        assert_eq!(curve.threshold_p(lev(dec!(2))), dec!(90));
        assert_eq!(curve.threshold_p(lev(dec!(500))), dec!(80));
    }

    #[test]
    fn mutators_are_admin_gated_and_versioned() {
        let mut reg = registry();
        assert_eq!(reg.version(), 2);

        let err = reg.set_keeper_mode(TraderId(7), KeeperMode::Allowlisted).unwrap_err();
        assert_eq!(err, RegistryError::NotAdmin(TraderId(7)));
        assert_eq!(reg.version(), 2);

        let update = reg.set_keeper_mode(ADMIN, KeeperMode::Allowlisted).unwrap();
        assert_eq!(update.version, 3);
        assert!(!reg.is_keeper(TraderId(7)));
        reg.set_keeper(ADMIN, TraderId(7), true).unwrap();
        assert!(reg.is_keeper(TraderId(7)));
    }

    #[test]
    fn pair_requires_group_and_fee() {
        let mut reg = registry();
        let mut pair = Pair {
            index: PairIndex(0),
            from: "ETH".into(),
            to: "USD".into(),
            instrument_id: InstrumentId::from_label("ETH/USD"),
            spread_p: Decimal::ZERO,
            group_index: GroupIndex(4),
            fee_index: FeeIndex(0),
            depth_above: dec!(1000),
            depth_below: dec!(1000),
        };
        assert_eq!(reg.add_pair(ADMIN, pair.clone()).unwrap_err(), RegistryError::GroupNotFound(GroupIndex(4)));
        pair.group_index = GroupIndex(0);
        reg.add_pair(ADMIN, pair).unwrap();

        let update = reg.set_pair_depths(ADMIN, PairIndex(0), dec!(5), dec!(6)).unwrap();
        assert!(matches!(update.change, ConfigChange::PairDepthsUpdated { .. }));
        assert_eq!(reg.pair(PairIndex(0)).unwrap().depth(Side::Short), dec!(6));
        assert!(reg.set_pair_depths(ADMIN, PairIndex(0), dec!(-1), dec!(6)).is_err());
    }

    #[test]
    fn rejects_rising_curve() {
        let mut reg = registry();
        let curve = LiquidationCurve {
            start_leverage: dec!(10),
            start_threshold_p: dec!(80),
            end_leverage: dec!(100),
            end_threshold_p: dec!(90),
            max_liq_spread_p: Decimal::ZERO,
        };
        assert!(matches!(
            reg.initialize_group_liquidation_params(ADMIN, GroupIndex(0), curve),
            Err(RegistryError::InvalidCurve { .. })
        ));
    }

    #[test]
    fn stop_loss_clamped_inside_liquidation() {
        let open = Price::new_unchecked(dec!(100));
        let leverage = lev(dec!(10));
        // 90% threshold, 5% buffer → max 85% loss → 8.5% price move at 10x
        let sl = Price::new_unchecked(dec!(80));
        let clamped = clamp_stop_loss(Side::Long, open, leverage, dec!(90), dec!(5), sl);
        assert_eq!(clamped.value(), dec!(91.5));

        let short_sl = Price::new_unchecked(dec!(120));
        let clamped = clamp_stop_loss(Side::Short, open, leverage, dec!(90), dec!(5), short_sl);
        assert_eq!(clamped.value(), dec!(108.5));

        let safe = Price::new_unchecked(dec!(95));
        assert_eq!(clamp_stop_loss(Side::Long, open, leverage, dec!(90), dec!(5), safe), safe);
    }

    #[test]
    fn inexact_clamp_rounds_toward_open() {
        let open = Price::new_unchecked(dec!(100));
        // 85% at 3x is a 28.333..% move
        let long = clamp_stop_loss(Side::Long, open, lev(dec!(3)), dec!(90), dec!(5), Price::new_unchecked(dec!(50)));
        assert_eq!(long.value(), dec!(71.6666666667));
        let short = clamp_stop_loss(Side::Short, open, lev(dec!(3)), dec!(90), dec!(5), Price::new_unchecked(dec!(150)));
        assert_eq!(short.value(), dec!(128.3333333333));

        // a level exactly on the bound is kept
        let on_bound = Price::new_unchecked(dec!(91.5));
        assert_eq!(clamp_stop_loss(Side::Long, open, lev(dec!(10)), dec!(90), dec!(5), on_bound), on_bound);
    }

    #[test]
    fn inactive_collateral_rejected() {
        let mut reg = registry();
        reg.add_collateral(
            ADMIN,
            CollateralInfo {
                index: CollateralIndex(1),
                symbol: "DAI".into(),
                decimals: 18,
                active: false,
            },
        )
        .unwrap();
        assert_eq!(
            reg.collateral(CollateralIndex(1)).unwrap_err(),
            RegistryError::CollateralInactive(CollateralIndex(1))
        );
    }
}
