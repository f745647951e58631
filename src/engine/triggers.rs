//! Keeper-driven triggers: pending order execution and TP/SL/liquidation closes.

use super::core::Engine;
use super::orders::{check_leverage, check_slippage};
use super::results::{CloseResult, EngineError, TriggerOutcome};
use crate::events::{CloseReason, EventPayload, LimitExecutedEvent};
use crate::ledger::{StoredTrade, Trade, TradeInfo};
use crate::oracle::SignedQuote;
use crate::provider::CollateralProvider;
use crate::trigger::{should_trigger, PendingTrigger, TriggerType};
use crate::types::{Price, TradeType, TraderId};

impl<P: CollateralProvider> Engine<P> {
    /// Executes `trigger` against the quotes in `batch`.
    ///
    /// The quotes are ingested first, inside the same transition, so a failed
    /// trigger leaves the price board untouched. A second keeper racing on the same
    /// trade finds the slot gone or no longer pending and reverts.
    pub fn trigger_order(
        &mut self,
        caller: TraderId,
        trigger: PendingTrigger,
        batch: &[SignedQuote],
    ) -> Result<TriggerOutcome, EngineError> {
        self.transition("trigger_order", |engine| {
            if !engine.state.registry.is_keeper(caller) {
                return Err(EngineError::NotKeeper(caller));
            }
            engine.ingest_quotes(batch);

            match trigger.trigger_type {
                TriggerType::LimitOpen | TriggerType::StopOpen => engine
                    .execute_pending(caller, trigger)
                    .map(TriggerOutcome::Opened),
                TriggerType::TpClose | TriggerType::SlClose | TriggerType::LiquidationClose => engine
                    .execute_close(caller, trigger)
                    .map(TriggerOutcome::Closed),
            }
        })
    }

    fn execute_pending(&mut self, keeper: TraderId, trigger: PendingTrigger) -> Result<Trade, EngineError> {
        let key = trigger.key();
        let stored = self.state.ledger.pending(key)?.clone();
        if trigger.trigger_type.order_type() != Some(stored.trade.trade_type) {
            return Err(EngineError::TriggerTypeMismatch(trigger));
        }

        let ctx = self.pair_context(stored.trade.pair_index)?;
        check_leverage(&ctx.group, stored.trade.leverage)?;
        let oracle_price = self.current_price(stored.trade.pair_index)?;
        let target = stored.trade.open_price;
        if !should_trigger(trigger.trigger_type, stored.trade.side, oracle_price, target) {
            return Err(EngineError::TriggerNotMet {
                trigger,
                price: oracle_price,
                target,
            });
        }

        let notional = stored.trade.notional();
        let impact = self.execution_price(&ctx.pair, stored.trade.side, oracle_price, notional)?;
        check_slippage(stored.trade.side, target, impact.exec_price, stored.info.max_slippage_p)?;

        let open_fee = self.execution_fees(key.trader, &ctx.fee, notional);
        let keeper_reward = self.fees.trigger_reward(notional, ctx.fee.trigger_fee_p);
        let deducted = open_fee.add(keeper_reward);
        if deducted >= stored.trade.collateral_amount {
            return Err(EngineError::FeesExceedCollateral {
                fees: deducted,
                collateral: stored.trade.collateral_amount,
            });
        }
        self.ensure_liquidity(keeper_reward)?;

        let mut trade = stored.trade.clone();
        trade.is_open = true;
        trade.trade_type = TradeType::Market;
        trade.collateral_amount = trade.collateral_amount.sub(deducted);
        trade.open_price = impact.exec_price;
        self.normalize_tp_sl(&mut trade)?;

        self.sync_borrowing(trade.pair_index)?;
        let info = TradeInfo {
            last_position_increase_tick: self.tick,
            borrowing: self.borrowing_checkpoint(trade.pair_index, trade.side)?,
            ..stored.info
        };
        self.state.ledger.replace(StoredTrade { trade: trade.clone(), info })?;
        self.state
            .ledger
            .adjust_open_interest(ctx.pair.index, ctx.group.index, trade.side, trade.notional());

        self.emit_event(EventPayload::LimitExecuted(LimitExecutedEvent {
            trigger,
            keeper,
            trade: trade.clone(),
            oracle_price,
            price_impact_p: impact.price_impact_p,
            open_fee,
            keeper_reward,
        }));

        self.pending_transfers.push(keeper, keeper_reward);
        Ok(trade)
    }

    fn execute_close(&mut self, keeper: TraderId, trigger: PendingTrigger) -> Result<CloseResult, EngineError> {
        let key = trigger.key();
        let stored = self.state.ledger.active(key)?.clone();
        let trade = &stored.trade;
        let price = self.current_price(trade.pair_index)?;

        let (target, reason): (Price, CloseReason) = match trigger.trigger_type {
            TriggerType::TpClose => (
                trade.take_profit.ok_or(EngineError::TriggerNotSet(trigger))?,
                CloseReason::TakeProfit,
            ),
            TriggerType::SlClose => (
                trade.stop_loss.ok_or(EngineError::TriggerNotSet(trigger))?,
                CloseReason::StopLoss,
            ),
            _ => {
                let threshold_p = self.threshold_p(trade)?;
                let fee = self.accrued_borrowing_fee(&stored)?;
                (trade.liquidation_price(threshold_p, fee), CloseReason::Liquidation)
            }
        };
        if !should_trigger(trigger.trigger_type, trade.side, price, target) {
            return Err(EngineError::TriggerNotMet { trigger, price, target });
        }

        // TP and SL fill at their stored level, liquidation at the live price
        let close_price = match reason {
            CloseReason::Liquidation => price,
            _ => target,
        };
        self.settle_close(key, close_price, reason, Some(keeper))
    }
}
