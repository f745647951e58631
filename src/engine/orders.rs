//! Opening, canceling and market-closing trades, plus the shared execution helpers.

use super::core::Engine;
use super::results::{CloseResult, EngineError};
use crate::borrowing::BorrowingCheckpoint;
use crate::events::{
    BorrowingFeeChargedEvent, CloseReason, EventPayload, MarketExecutedEvent, OpenOrderCanceledEvent,
    OpenOrderPlacedEvent, OpenOrderUpdatedEvent, TradeClosedEvent,
};
use crate::fees::{adjusted_fee, FeeLeg};
use crate::impact::{trade_price_impact, ImpactQuote};
use crate::ledger::{StoredTrade, Trade, TradeInfo, TradeKey};
use crate::provider::CollateralProvider;
use crate::registry::{clamp_stop_loss, Pair, PairFee, RiskGroup};
use crate::types::{
    CollateralIndex, Leverage, PairIndex, Price, Quote, Side, TradeIndex, TradeType, TraderId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything a trader supplies to open a trade.
///
/// `open_price` is the expected price for a market order and the trigger price
/// for a limit or stop order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTradeRequest {
    pub pair_index: PairIndex,
    pub side: Side,
    pub leverage: Leverage,
    pub collateral_index: CollateralIndex,
    pub trade_type: TradeType,
    pub collateral_amount: Quote,
    pub open_price: Price,
    pub take_profit: Option<Price>,
    pub stop_loss: Option<Price>,
    pub max_slippage_p: Decimal,
    pub terms_accepted: bool,
}

/// Registry records a trade on `pair` is priced against.
#[derive(Debug, Clone)]
pub(super) struct PairContext {
    pub(super) pair: Pair,
    pub(super) group: RiskGroup,
    pub(super) fee: PairFee,
}

/// Rejects only adverse fills: above `expected` for longs, below it for shorts.
pub(super) fn check_slippage(
    side: Side,
    expected: Price,
    exec_price: Price,
    max_slippage_p: Decimal,
) -> Result<(), EngineError> {
    let adverse_p = match side {
        Side::Long => exec_price.percent_from(expected),
        Side::Short => -exec_price.percent_from(expected),
    };
    if adverse_p > max_slippage_p {
        return Err(EngineError::Slippage {
            expected,
            exec_price,
            max_slippage_p,
        });
    }
    Ok(())
}

fn check_max_slippage(max_slippage_p: Decimal) -> Result<(), EngineError> {
    if max_slippage_p < Decimal::ZERO {
        return Err(EngineError::InvalidPositionDelta {
            reason: "max slippage must not be negative",
        });
    }
    Ok(())
}

pub(super) fn check_leverage(group: &RiskGroup, leverage: Leverage) -> Result<(), EngineError> {
    if !group.allows(leverage) {
        return Err(EngineError::InvalidLeverage {
            group: group.index,
            leverage,
            min: group.min_leverage,
            max: group.max_leverage,
        });
    }
    Ok(())
}

/// Rejects a TP or SL on the wrong side of `reference`.
pub(super) fn validate_tp_sl(trade: &Trade, reference: Price) -> Result<(), EngineError> {
    if let Some(take_profit) = trade.take_profit {
        if !trade.check_tp(reference, Some(take_profit)) {
            return Err(EngineError::InvalidTakeProfit { take_profit, reference });
        }
    }
    if let Some(stop_loss) = trade.stop_loss {
        if !trade.check_sl(reference, Some(stop_loss)) {
            return Err(EngineError::InvalidStopLoss { stop_loss, reference });
        }
    }
    Ok(())
}

impl<P: CollateralProvider> Engine<P> {
    pub(super) fn pair_context(&self, pair: PairIndex) -> Result<PairContext, EngineError> {
        let registry = &self.state.registry;
        let pair = registry.pair(pair)?.clone();
        let group = registry.group(pair.group_index)?.clone();
        let fee = registry.fee(pair.fee_index)?.clone();
        Ok(PairContext { pair, group, fee })
    }

    /// Opening plus closing fee on `notional`, both charged at execution.
    pub(super) fn execution_fees(&self, trader: TraderId, fee: &PairFee, notional: Quote) -> Quote {
        let open = adjusted_fee(self.fees.as_ref(), trader, notional, FeeLeg::Open, notional.percent(fee.open_fee_p));
        let close = adjusted_fee(self.fees.as_ref(), trader, notional, FeeLeg::Close, notional.percent(fee.close_fee_p));
        open.add(close)
    }

    pub(super) fn execution_price(
        &self,
        pair: &Pair,
        side: Side,
        oracle_price: Price,
        delta_notional: Quote,
    ) -> Result<ImpactQuote, EngineError> {
        let oi_before = self.state.ledger.open_interest(pair.index).get(side);
        let quote = trade_price_impact(pair, side, oracle_price, oi_before, delta_notional)?;
        let max_p = self.config.trading.max_price_impact_p;
        if quote.price_impact_p > max_p {
            return Err(EngineError::PriceImpactTooHigh {
                impact_p: quote.price_impact_p,
                max_p,
            });
        }
        Ok(quote)
    }

    /// Drops TP/SL that no longer sit on the right side of the open price, then clamps
    /// TP to the profit cap and SL to the liquidation buffer. returns the SL before clamping
    /// if it moved.
    pub(super) fn normalize_tp_sl(&self, trade: &mut Trade) -> Result<Option<Price>, EngineError> {
        if !trade.check_tp(trade.open_price, trade.take_profit) {
            trade.take_profit = None;
        }
        if !trade.check_sl(trade.open_price, trade.stop_loss) {
            trade.stop_loss = None;
        }
        trade.take_profit = trade.clamp_take_profit(trade.take_profit, self.config.trading.max_profit_p);

        let Some(requested) = trade.stop_loss else {
            return Ok(None);
        };
        let threshold_p = self.threshold_p(trade)?;
        let clamped = clamp_stop_loss(
            trade.side,
            trade.open_price,
            trade.leverage,
            threshold_p,
            self.config.trading.sl_liquidation_buffer_p,
            requested,
        );
        trade.stop_loss = Some(clamped);
        Ok((clamped != requested).then_some(requested))
    }

    pub(super) fn ensure_liquidity(&self, required: Quote) -> Result<(), EngineError> {
        let available = self.provider.available_liquidity();
        if required > available {
            return Err(EngineError::InsufficientLiquidity { available, required });
        }
        Ok(())
    }

    /// Opens a market trade or places a limit/stop order. collateral is pulled last.
    pub fn open_trade(&mut self, caller: TraderId, request: OpenTradeRequest) -> Result<Trade, EngineError> {
        self.transition("open_trade", |engine| engine.open_trade_inner(caller, request))
    }

    fn open_trade_inner(&mut self, caller: TraderId, request: OpenTradeRequest) -> Result<Trade, EngineError> {
        if !request.terms_accepted {
            return Err(EngineError::TermsNotAccepted);
        }
        let ctx = self.pair_context(request.pair_index)?;
        self.state.registry.collateral(request.collateral_index)?;
        check_leverage(&ctx.group, request.leverage)?;

        if !request.collateral_amount.is_positive() {
            return Err(EngineError::NonPositiveCollateral);
        }
        let notional = request.collateral_amount.mul(request.leverage.value());
        if notional < ctx.fee.min_position_size {
            return Err(EngineError::PositionTooSmall {
                notional,
                min: ctx.fee.min_position_size,
            });
        }
        check_max_slippage(request.max_slippage_p)?;

        let index = self.state.ledger.next_free_index(caller)?;
        let mut trade = Trade {
            trader: caller,
            index,
            pair_index: request.pair_index,
            leverage: request.leverage,
            side: request.side,
            is_open: false,
            collateral_index: request.collateral_index,
            trade_type: request.trade_type,
            collateral_amount: request.collateral_amount,
            open_price: request.open_price,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
        };
        validate_tp_sl(&trade, request.open_price)?;

        let info = TradeInfo {
            created_tick: self.tick,
            created_at: self.now,
            last_position_increase_tick: self.tick,
            max_slippage_p: request.max_slippage_p,
            borrowing: BorrowingCheckpoint {
                pair_acc: Decimal::ZERO,
                group_acc: Decimal::ZERO,
                tick: self.tick,
            },
        };

        match request.trade_type {
            TradeType::Market => {
                let oracle_price = self.current_price(request.pair_index)?;
                let impact = self.execution_price(&ctx.pair, request.side, oracle_price, notional)?;
                check_slippage(request.side, request.open_price, impact.exec_price, request.max_slippage_p)?;
                validate_tp_sl(&trade, impact.exec_price)?;

                let open_fee = self.execution_fees(caller, &ctx.fee, notional);
                if open_fee >= request.collateral_amount {
                    return Err(EngineError::FeesExceedCollateral {
                        fees: open_fee,
                        collateral: request.collateral_amount,
                    });
                }

                trade.is_open = true;
                trade.collateral_amount = request.collateral_amount.sub(open_fee);
                trade.open_price = impact.exec_price;
                self.normalize_tp_sl(&mut trade)?;

                self.sync_borrowing(request.pair_index)?;
                let info = TradeInfo {
                    borrowing: self.borrowing_checkpoint(request.pair_index, request.side)?,
                    ..info
                };
                self.state.ledger.insert(StoredTrade { trade: trade.clone(), info })?;
                self.state.ledger.adjust_open_interest(
                    ctx.pair.index,
                    ctx.group.index,
                    trade.side,
                    trade.notional(),
                );

                self.emit_event(EventPayload::MarketExecuted(MarketExecutedEvent {
                    trade: trade.clone(),
                    oracle_price,
                    price_impact_p: impact.price_impact_p,
                    open_fee,
                }));
            }
            TradeType::Limit | TradeType::Stop => {
                self.normalize_tp_sl(&mut trade)?;
                self.state.ledger.insert(StoredTrade { trade: trade.clone(), info })?;
                self.emit_event(EventPayload::OpenOrderPlaced(OpenOrderPlacedEvent { trade: trade.clone() }));
            }
        }

        self.pending_transfers.pull(caller, request.collateral_amount);
        Ok(trade)
    }

    /// Refunds a pending order's collateral and frees its slot.
    pub fn cancel_open_order(&mut self, caller: TraderId, index: TradeIndex) -> Result<Quote, EngineError> {
        self.transition("cancel_open_order", |engine| {
            let key = TradeKey { trader: caller, index };
            let refunded = engine.state.ledger.pending(key)?.trade.collateral_amount;
            engine.ensure_liquidity(refunded)?;

            engine.state.ledger.remove(key)?;
            engine.emit_event(EventPayload::OpenOrderCanceled(OpenOrderCanceledEvent { key, refunded }));

            engine.pending_transfers.push(caller, refunded);
            Ok(refunded)
        })
    }

    /// Re-prices a pending order. TP/SL are checked against the new trigger price.
    pub fn update_open_order(
        &mut self,
        caller: TraderId,
        index: TradeIndex,
        open_price: Price,
        take_profit: Option<Price>,
        stop_loss: Option<Price>,
        max_slippage_p: Decimal,
    ) -> Result<Trade, EngineError> {
        self.transition("update_open_order", |engine| {
            check_max_slippage(max_slippage_p)?;
            let key = TradeKey { trader: caller, index };
            let mut stored = engine.state.ledger.pending(key)?.clone();
            stored.trade.open_price = open_price;
            stored.trade.take_profit = take_profit;
            stored.trade.stop_loss = stop_loss;
            validate_tp_sl(&stored.trade, open_price)?;
            engine.normalize_tp_sl(&mut stored.trade)?;
            stored.info.max_slippage_p = max_slippage_p;

            let trade = stored.trade.clone();
            engine.state.ledger.replace(stored)?;
            engine.emit_event(EventPayload::OpenOrderUpdated(OpenOrderUpdatedEvent { trade: trade.clone() }));
            Ok(trade)
        })
    }

    /// Closes an active trade at the oracle price.
    pub fn close_trade_market(&mut self, caller: TraderId, index: TradeIndex) -> Result<CloseResult, EngineError> {
        self.transition("close_trade_market", |engine| {
            let key = TradeKey { trader: caller, index };
            let pair = engine.state.ledger.active(key)?.trade.pair_index;
            let price = engine.current_price(pair)?;
            engine.settle_close(key, price, CloseReason::Market, None)
        })
    }

    /// Realizes pnl and borrowing fee, frees the slot, then pays trader and keeper.
    ///
    /// Liquidations forfeit everything: the keeper reward is taken out of the
    /// collateral and the trader receives nothing.
    pub(super) fn settle_close(
        &mut self,
        key: TradeKey,
        close_price: Price,
        reason: CloseReason,
        keeper: Option<TraderId>,
    ) -> Result<CloseResult, EngineError> {
        let stored = self.state.ledger.active(key)?.clone();
        let trade = stored.trade.clone();
        let ctx = self.pair_context(trade.pair_index)?;

        self.sync_borrowing(trade.pair_index)?;
        let borrowing_fee = self.accrued_borrowing_fee(&stored)?;
        let pnl = trade.pnl_at(close_price, self.config.trading.max_profit_p);
        let collateral = trade.collateral_amount;
        let base_reward = match keeper {
            Some(_) => self.fees.trigger_reward(trade.notional(), ctx.fee.trigger_fee_p),
            None => Quote::zero(),
        };

        let (keeper_reward, payout) = match reason {
            CloseReason::Liquidation => (base_reward.min(collateral), Quote::zero()),
            _ => {
                let gross = collateral.add(pnl).sub(borrowing_fee).floor_zero();
                let reward = base_reward.min(gross);
                (reward, gross.sub(reward))
            }
        };
        self.ensure_liquidity(payout.add(keeper_reward))?;

        self.state.ledger.remove(key)?;
        self.state
            .ledger
            .adjust_open_interest(ctx.pair.index, ctx.group.index, trade.side, trade.notional().negate());

        if !borrowing_fee.is_zero() {
            self.emit_event(EventPayload::BorrowingFeeCharged(BorrowingFeeChargedEvent {
                key,
                amount: borrowing_fee,
            }));
        }
        let mut closed = trade.clone();
        closed.is_open = false;
        self.emit_event(EventPayload::TradeClosed(TradeClosedEvent {
            trade: closed,
            reason,
            close_price,
            pnl,
            borrowing_fee,
            keeper,
            keeper_reward,
            payout,
        }));

        self.pending_transfers.push(key.trader, payout);
        if let Some(keeper) = keeper {
            self.pending_transfers.push(keeper, keeper_reward);
        }
        self.pending_transfers.report_realized_pnl(payout.sub(collateral));

        Ok(CloseResult {
            key,
            reason,
            close_price,
            pnl,
            borrowing_fee,
            keeper_reward,
            payout,
        })
    }
}
