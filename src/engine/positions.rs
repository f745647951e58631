//! In-place changes to active trades: TP/SL, leverage, position size.

use super::core::Engine;
use super::orders::{check_leverage, check_slippage, validate_tp_sl};
use super::results::{DecreaseResult, EngineError};
use crate::events::{
    BorrowingFeeChargedEvent, EventPayload, LeverageUpdateExecutedEvent, PositionSizeDecreaseExecutedEvent,
    PositionSizeIncreaseExecutedEvent, TradeSlUpdatedEvent, TradeTpUpdatedEvent,
};
use crate::impact::blended_open_price;
use crate::ledger::{StoredTrade, Trade, TradeKey};
use crate::provider::CollateralProvider;
use crate::types::{truncate, Leverage, Price, Quote, TradeIndex, TraderId};
use rust_decimal::Decimal;

impl<P: CollateralProvider> Engine<P> {
    fn active_trade(&self, caller: TraderId, index: TradeIndex) -> Result<StoredTrade, EngineError> {
        Ok(self.state.ledger.active(TradeKey { trader: caller, index })?.clone())
    }

    /// Rejects `trade` if it would already be liquidatable at `price` with no fee outstanding.
    fn ensure_not_liquidatable(&self, trade: &Trade, price: Price) -> Result<(), EngineError> {
        let threshold_p = self.threshold_p(trade)?;
        if trade.is_liquidatable(price, threshold_p, Quote::zero()) {
            return Err(EngineError::WouldBeLiquidated(trade.key()));
        }
        Ok(())
    }

    /// Moves OI from the old trade's notional to the new one's. borrowing is synced first.
    fn replace_notional(&mut self, old: &Trade, new: &Trade) -> Result<(), EngineError> {
        self.sync_borrowing(old.pair_index)?;
        let group = self.state.registry.pair(old.pair_index)?.group_index;
        let ledger = &mut self.state.ledger;
        ledger.adjust_open_interest(old.pair_index, group, old.side, old.notional().negate());
        ledger.adjust_open_interest(new.pair_index, group, new.side, new.notional());
        Ok(())
    }

    fn charge_borrowing_event(&mut self, key: TradeKey, amount: Quote) {
        if !amount.is_zero() {
            self.emit_event(EventPayload::BorrowingFeeCharged(BorrowingFeeChargedEvent { key, amount }));
        }
    }

    /// Sets or clears the take profit. TPs beyond the profit cap are pulled back to it.
    pub fn update_tp(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        take_profit: Option<Price>,
    ) -> Result<Trade, EngineError> {
        self.transition("update_tp", |engine| {
            let mut stored = engine.active_trade(caller, index)?;
            let mut trade = stored.trade.clone();
            trade.take_profit = take_profit;
            validate_tp_sl(&Trade { stop_loss: None, ..trade.clone() }, trade.open_price)?;
            trade.take_profit = trade.clamp_take_profit(take_profit, engine.config.trading.max_profit_p);

            stored.trade = trade.clone();
            engine.state.ledger.replace(stored)?;
            engine.emit_event(EventPayload::TradeTpUpdated(TradeTpUpdatedEvent { trade: trade.clone() }));
            Ok(trade)
        })
    }

    /// Sets or clears the stop loss. an SL past the liquidation buffer is clamped, never rejected.
    pub fn update_sl(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        stop_loss: Option<Price>,
    ) -> Result<Trade, EngineError> {
        self.transition("update_sl", |engine| {
            let mut stored = engine.active_trade(caller, index)?;
            let mut trade = stored.trade.clone();
            trade.stop_loss = stop_loss;
            validate_tp_sl(&Trade { take_profit: None, ..trade.clone() }, trade.open_price)?;
            let requested = engine.normalize_tp_sl(&mut trade)?;

            stored.trade = trade.clone();
            engine.state.ledger.replace(stored)?;
            engine.emit_event(EventPayload::TradeSlUpdated(TradeSlUpdatedEvent {
                trade: trade.clone(),
                requested,
            }));
            Ok(trade)
        })
    }

    /// Rescales collateral so notional stays put: `new_col = col × old_lev / new_lev`.
    ///
    /// Raising leverage frees collateral, which is refunded. Lowering it needs more,
    /// which is pulled from the trader.
    pub fn update_leverage(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        new_leverage: Leverage,
    ) -> Result<Trade, EngineError> {
        self.transition("update_leverage", |engine| {
            let stored = engine.active_trade(caller, index)?;
            let old = stored.trade.clone();
            if new_leverage == old.leverage {
                return Err(EngineError::InvalidPositionDelta {
                    reason: "leverage unchanged",
                });
            }
            let ctx = engine.pair_context(old.pair_index)?;
            check_leverage(&ctx.group, new_leverage)?;

            let new_collateral = Quote::new(truncate(
                old.collateral_amount.value() * old.leverage.value() / new_leverage.value(),
            ));
            if !new_collateral.is_positive() {
                return Err(EngineError::NonPositiveCollateral);
            }
            let mut trade = old.clone();
            trade.leverage = new_leverage;
            trade.collateral_amount = new_collateral;
            engine.normalize_tp_sl(&mut trade)?;

            let price = engine.current_price(old.pair_index)?;
            let threshold_p = engine.threshold_p(&trade)?;
            let fee = engine.accrued_borrowing_fee(&stored)?;
            if trade.is_liquidatable(price, threshold_p, fee) {
                return Err(EngineError::WouldBeLiquidated(trade.key()));
            }

            // positive = refund
            let collateral_delta = old.collateral_amount.sub(new_collateral);
            if collateral_delta.is_positive() {
                engine.ensure_liquidity(collateral_delta)?;
            }

            engine.replace_notional(&old, &trade)?;
            engine.state.ledger.replace(StoredTrade {
                trade: trade.clone(),
                info: stored.info,
            })?;
            engine.emit_event(EventPayload::LeverageUpdateExecuted(LeverageUpdateExecutedEvent {
                trade: trade.clone(),
                old_leverage: old.leverage,
                collateral_delta,
            }));

            if collateral_delta.is_positive() {
                engine.pending_transfers.push(caller, collateral_delta);
            } else if collateral_delta.is_negative() {
                engine.pending_transfers.pull(caller, collateral_delta.abs());
            }
            Ok(trade)
        })
    }

    /// Adds size to an active trade.
    ///
    /// With `delta_collateral = 0` this is a leverage-only increase: `ΔN = col × Δlev`.
    /// Otherwise `ΔN = Δcol × Δlev` and the new leverage is `(N + ΔN) / (col + Δcol)`.
    /// The accrued borrowing fee and the execution fees on `ΔN` come out of collateral,
    /// then the open price is re-blended.
    pub fn increase_position_size(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        delta_collateral: Quote,
        delta_leverage: Decimal,
        expected_price: Price,
        max_slippage_p: Decimal,
    ) -> Result<Trade, EngineError> {
        self.transition("increase_position_size", |engine| {
            if delta_collateral.is_negative() || delta_leverage <= Decimal::ZERO {
                return Err(EngineError::InvalidPositionDelta {
                    reason: "increase needs non-negative collateral and positive leverage",
                });
            }
            let stored = engine.active_trade(caller, index)?;
            let old = stored.trade.clone();
            let ctx = engine.pair_context(old.pair_index)?;

            let old_notional = old.notional();
            let (delta_notional, raw_leverage) = if delta_collateral.is_zero() {
                (old.collateral_amount.mul(delta_leverage), old.leverage.value() + delta_leverage)
            } else {
                let delta_notional = delta_collateral.mul(delta_leverage);
                let total_collateral = old.collateral_amount.add(delta_collateral);
                (
                    delta_notional,
                    truncate(old_notional.add(delta_notional).value() / total_collateral.value()),
                )
            };
            let new_leverage = Leverage::new(raw_leverage).ok_or(EngineError::InvalidPositionDelta {
                reason: "resulting leverage below 1x",
            })?;
            check_leverage(&ctx.group, new_leverage)?;

            let oracle_price = engine.current_price(old.pair_index)?;
            let impact = engine.execution_price(&ctx.pair, old.side, oracle_price, delta_notional)?;
            check_slippage(old.side, expected_price, impact.exec_price, max_slippage_p)?;

            let pnl = old.pnl_at(oracle_price, engine.config.trading.max_profit_p);
            let notional_plus_pnl = old_notional.add(pnl);
            if !notional_plus_pnl.is_positive() {
                return Err(EngineError::InvalidPositionDelta {
                    reason: "existing position is underwater",
                });
            }
            let open_price = blended_open_price(notional_plus_pnl, old.open_price, delta_notional, impact.exec_price)
                .ok_or(EngineError::InvalidPositionDelta {
                    reason: "blended open price not positive",
                })?;

            engine.sync_borrowing(old.pair_index)?;
            let borrowing_fee = engine.accrued_borrowing_fee(&stored)?;
            let fees = engine.execution_fees(caller, &ctx.fee, delta_notional);
            let collateral = old
                .collateral_amount
                .add(delta_collateral)
                .sub(fees)
                .sub(borrowing_fee);
            if !collateral.is_positive() {
                return Err(EngineError::FeesExceedCollateral {
                    fees: fees.add(borrowing_fee),
                    collateral: old.collateral_amount.add(delta_collateral),
                });
            }

            let mut trade = old.clone();
            trade.collateral_amount = collateral;
            trade.leverage = new_leverage;
            trade.open_price = open_price;
            engine.normalize_tp_sl(&mut trade)?;
            engine.ensure_not_liquidatable(&trade, oracle_price)?;

            engine.replace_notional(&old, &trade)?;
            let mut info = stored.info;
            info.last_position_increase_tick = engine.tick;
            info.borrowing = engine.borrowing_checkpoint(trade.pair_index, trade.side)?;
            engine.state.ledger.replace(StoredTrade { trade: trade.clone(), info })?;

            engine.charge_borrowing_event(trade.key(), borrowing_fee);
            engine.emit_event(EventPayload::PositionSizeIncreaseExecuted(PositionSizeIncreaseExecutedEvent {
                trade: trade.clone(),
                delta_collateral,
                delta_notional,
                exec_price: impact.exec_price,
                price_impact_p: impact.price_impact_p,
                fees,
                borrowing_fee,
            }));

            engine.pending_transfers.pull(caller, delta_collateral);
            Ok(trade)
        })
    }

    /// Removes size from an active trade. exactly one of the two deltas must be non-zero.
    ///
    /// The trader receives `Δcol + pnl × ΔN / N − borrowing fee`. the whole accrued fee is
    /// settled here. A negative payout is taken out of the remaining collateral and the
    /// leverage re-derived, so the trade keeps `N − ΔN` of notional. The open price does not move.
    pub fn decrease_position_size(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        delta_collateral: Quote,
        delta_leverage: Decimal,
    ) -> Result<DecreaseResult, EngineError> {
        self.transition("decrease_position_size", |engine| {
            if delta_collateral.is_negative() || delta_leverage < Decimal::ZERO {
                return Err(EngineError::InvalidPositionDelta {
                    reason: "decrease deltas must not be negative",
                });
            }
            if delta_collateral.is_zero() == delta_leverage.is_zero() {
                return Err(EngineError::InvalidPositionDelta {
                    reason: "exactly one of collateral or leverage must decrease",
                });
            }
            let stored = engine.active_trade(caller, index)?;
            let old = stored.trade.clone();
            let ctx = engine.pair_context(old.pair_index)?;

            let mut trade = old.clone();
            let delta_notional = if delta_collateral.is_positive() {
                if delta_collateral >= old.collateral_amount {
                    return Err(EngineError::InvalidPositionDelta {
                        reason: "decrease must leave collateral in the trade",
                    });
                }
                trade.collateral_amount = old.collateral_amount.sub(delta_collateral);
                delta_collateral.mul(old.leverage.value())
            } else {
                trade.leverage = Leverage::new(old.leverage.value() - delta_leverage).ok_or(
                    EngineError::InvalidPositionDelta {
                        reason: "resulting leverage below 1x",
                    },
                )?;
                old.collateral_amount.mul(delta_leverage)
            };
            check_leverage(&ctx.group, trade.leverage)?;

            let price = engine.current_price(old.pair_index)?;
            engine.sync_borrowing(old.pair_index)?;
            let borrowing_fee = engine.accrued_borrowing_fee(&stored)?;
            let pnl = old.pnl_at(price, engine.config.trading.max_profit_p);
            let partial_pnl = Quote::new(truncate(
                pnl.value() * delta_notional.value() / old.notional().value(),
            ));

            let gross = delta_collateral.add(partial_pnl).sub(borrowing_fee);
            let payout = if gross.is_negative() {
                // shortfall comes out of collateral, the remaining size stays `N - ΔN`
                trade.collateral_amount = trade.collateral_amount.add(gross);
                if !trade.collateral_amount.is_positive() {
                    return Err(EngineError::WouldBeLiquidated(old.key()));
                }
                let remaining = old.notional().sub(delta_notional);
                trade.leverage = Leverage::new(truncate(remaining.value() / trade.collateral_amount.value())).ok_or(
                    EngineError::InvalidPositionDelta {
                        reason: "resulting leverage below 1x",
                    },
                )?;
                check_leverage(&ctx.group, trade.leverage)?;
                Quote::zero()
            } else {
                gross
            };
            engine.normalize_tp_sl(&mut trade)?;
            engine.ensure_not_liquidatable(&trade, price)?;
            engine.ensure_liquidity(payout)?;

            engine.replace_notional(&old, &trade)?;
            let mut info = stored.info;
            info.borrowing = engine.borrowing_checkpoint(trade.pair_index, trade.side)?;
            engine.state.ledger.replace(StoredTrade { trade: trade.clone(), info })?;

            engine.charge_borrowing_event(trade.key(), borrowing_fee);
            engine.emit_event(EventPayload::PositionSizeDecreaseExecuted(PositionSizeDecreaseExecutedEvent {
                trade: trade.clone(),
                delta_collateral,
                delta_notional,
                partial_pnl,
                borrowing_fee,
                payout,
            }));

            engine.pending_transfers.push(caller, payout);
            engine
                .pending_transfers
                .report_realized_pnl(payout.sub(old.collateral_amount.sub(trade.collateral_amount)));
            Ok(DecreaseResult {
                trade,
                partial_pnl,
                borrowing_fee,
                payout,
            })
        })
    }
}
