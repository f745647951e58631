//! Admin configuration, routed through the engine so every change is a transition
//! with a `ConfigChanged` event, and borrowing accrues under the old params up to now.

use super::core::Engine;
use super::results::EngineError;
use crate::borrowing::BorrowingParams;
use crate::events::EventPayload;
use crate::provider::CollateralProvider;
use crate::registry::{
    CollateralInfo, ConfigUpdate, KeeperMode, LiquidationCurve, Pair, PairFee, Registry, RegistryError, RiskGroup,
};
use crate::types::{GroupIndex, PairIndex, TraderId};
use rust_decimal::Decimal;

impl<P: CollateralProvider> Engine<P> {
    fn apply_config(
        &mut self,
        label: &'static str,
        change: impl FnOnce(&mut Registry) -> Result<ConfigUpdate, RegistryError>,
    ) -> Result<ConfigUpdate, EngineError> {
        self.transition(label, |engine| {
            let update = change(&mut engine.state.registry)?;
            engine.emit_event(EventPayload::ConfigChanged(update.clone()));
            Ok(update)
        })
    }

    /// The lowest threshold on the curve must clear the SL buffer, or no SL could sit before liquidation.
    fn check_curve(&self, caller: TraderId, curve: &LiquidationCurve) -> Result<(), EngineError> {
        if caller != self.state.registry.admin() {
            return Err(RegistryError::NotAdmin(caller).into());
        }
        let threshold_p = curve.start_threshold_p.min(curve.end_threshold_p);
        let buffer_p = self.config.trading.sl_liquidation_buffer_p;
        if threshold_p <= buffer_p {
            return Err(EngineError::CurveInsideSlBuffer { threshold_p, buffer_p });
        }
        Ok(())
    }

    pub fn add_group(&mut self, caller: TraderId, group: RiskGroup) -> Result<ConfigUpdate, EngineError> {
        self.check_curve(caller, &group.curve())?;
        self.apply_config("add_group", |registry| registry.add_group(caller, group))
    }

    pub fn add_fee(&mut self, caller: TraderId, fee: PairFee) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("add_fee", |registry| registry.add_fee(caller, fee))
    }

    pub fn add_collateral(&mut self, caller: TraderId, info: CollateralInfo) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("add_collateral", |registry| registry.add_collateral(caller, info))
    }

    pub fn add_pair(&mut self, caller: TraderId, pair: Pair) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("add_pair", |registry| registry.add_pair(caller, pair))
    }

    pub fn set_pair_depths(
        &mut self,
        caller: TraderId,
        pair: PairIndex,
        depth_above: Decimal,
        depth_below: Decimal,
    ) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("set_pair_depths", |registry| {
            registry.set_pair_depths(caller, pair, depth_above, depth_below)
        })
    }

    pub fn set_pair_spread(&mut self, caller: TraderId, pair: PairIndex, spread_p: Decimal) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("set_pair_spread", |registry| registry.set_pair_spread(caller, pair, spread_p))
    }

    pub fn initialize_group_liquidation_params(
        &mut self,
        caller: TraderId,
        group: GroupIndex,
        curve: LiquidationCurve,
    ) -> Result<ConfigUpdate, EngineError> {
        self.check_curve(caller, &curve)?;
        self.apply_config("initialize_group_liquidation_params", |registry| {
            registry.initialize_group_liquidation_params(caller, group, curve)
        })
    }

    /// Settles group accrual under the old params first, for every pair in the group.
    pub fn set_borrowing_group_params(
        &mut self,
        caller: TraderId,
        group: GroupIndex,
        params: BorrowingParams,
    ) -> Result<ConfigUpdate, EngineError> {
        self.transition("set_borrowing_group_params", |engine| {
            let pairs: Vec<PairIndex> = engine
                .state
                .registry
                .pairs()
                .filter(|pair| pair.group_index == group)
                .map(|pair| pair.index)
                .collect();
            for pair in pairs {
                engine.sync_borrowing(pair)?;
            }
            let update = engine
                .state
                .registry
                .set_borrowing_group_params(caller, group, params)?;
            engine.emit_event(EventPayload::ConfigChanged(update.clone()));
            Ok(update)
        })
    }

    pub fn set_borrowing_pair_params(
        &mut self,
        caller: TraderId,
        pair: PairIndex,
        params: BorrowingParams,
    ) -> Result<ConfigUpdate, EngineError> {
        self.transition("set_borrowing_pair_params", |engine| {
            if engine.state.registry.pair(pair).is_ok() {
                engine.sync_borrowing(pair)?;
            }
            let update = engine
                .state
                .registry
                .set_borrowing_pair_params(caller, pair, params)?;
            engine.emit_event(EventPayload::ConfigChanged(update.clone()));
            Ok(update)
        })
    }

    pub fn set_keeper(&mut self, caller: TraderId, keeper: TraderId, allowed: bool) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("set_keeper", |registry| registry.set_keeper(caller, keeper, allowed))
    }

    pub fn set_keeper_mode(&mut self, caller: TraderId, mode: KeeperMode) -> Result<ConfigUpdate, EngineError> {
        self.apply_config("set_keeper_mode", |registry| registry.set_keeper_mode(caller, mode))
    }
}
