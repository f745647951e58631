//! Price ingestion and read-side pricing helpers.

use super::core::{Engine, EngineState};
use super::results::EngineError;
use crate::borrowing::{checkpoint, trade_borrowing_fee, AccumulatorView, BorrowingCheckpoint, BorrowingInputs};
use crate::events::{EventPayload, PriceQuoteAcceptedEvent};
use crate::ledger::{StoredTrade, Trade, TradeKey};
use crate::oracle::{IngestReport, SignedQuote};
use crate::provider::CollateralProvider;
use crate::types::{GroupIndex, PairIndex, Price, Quote, Side, TradeIndex, TraderId};
use rust_decimal::Decimal;

fn borrowing_inputs(state: &EngineState, pair: PairIndex, group: GroupIndex) -> BorrowingInputs<'_> {
    BorrowingInputs {
        pair,
        group,
        pair_params: state.registry.pair_borrowing(pair),
        group_params: state.registry.group_borrowing(group),
        pair_oi: state.ledger.open_interest(pair),
        group_oi: state.ledger.group_open_interest(group),
    }
}

impl<P: CollateralProvider> Engine<P> {
    /// Verifies and stores a batch of signed quotes. rejected quotes are reported, not fatal.
    pub fn submit_quotes(&mut self, batch: &[SignedQuote]) -> Result<IngestReport, EngineError> {
        self.transition("submit_quotes", |engine| Ok(engine.ingest_quotes(batch)))
    }

    pub(super) fn ingest_quotes(&mut self, batch: &[SignedQuote]) -> IngestReport {
        let report = self
            .state
            .prices
            .ingest(self.verifier.as_ref(), &self.config.oracle, batch, self.now);
        for &(instrument, price, publish_time) in &report.accepted {
            self.emit_event(EventPayload::PriceQuoteAccepted(PriceQuoteAcceptedEvent {
                instrument,
                price,
                publish_time,
            }));
        }
        report
    }

    /// Latest trusted oracle price for a pair.
    pub fn current_price(&self, pair: PairIndex) -> Result<Price, EngineError> {
        let instrument = self.state.registry.pair(pair)?.instrument_id;
        Ok(self
            .state
            .prices
            .current_price(instrument, &self.config.oracle, self.now)?)
    }

    fn group_of(&self, pair: PairIndex) -> Result<GroupIndex, EngineError> {
        Ok(self.state.registry.pair(pair)?.group_index)
    }

    /// Brings the pair and group accumulators to the current tick. call before any OI change.
    pub(super) fn sync_borrowing(&mut self, pair: PairIndex) -> Result<(), EngineError> {
        let group = self.group_of(pair)?;
        let state = &mut self.state;
        let inputs = BorrowingInputs {
            pair,
            group,
            pair_params: state.registry.pair_borrowing(pair),
            group_params: state.registry.group_borrowing(group),
            pair_oi: state.ledger.open_interest(pair),
            group_oi: state.ledger.group_open_interest(group),
        };
        state.borrowing.sync(&inputs, self.tick);
        Ok(())
    }

    pub(super) fn accumulator_view(&self, pair: PairIndex, side: Side) -> Result<AccumulatorView, EngineError> {
        let group = self.group_of(pair)?;
        let inputs = borrowing_inputs(&self.state, pair, group);
        Ok(self.state.borrowing.view(&inputs, side, self.tick))
    }

    /// Fresh checkpoint for a trade whose size just changed.
    pub(super) fn borrowing_checkpoint(&self, pair: PairIndex, side: Side) -> Result<BorrowingCheckpoint, EngineError> {
        Ok(checkpoint(self.accumulator_view(pair, side)?, self.tick))
    }

    pub(super) fn accrued_borrowing_fee(&self, stored: &StoredTrade) -> Result<Quote, EngineError> {
        let trade = &stored.trade;
        let view = self.accumulator_view(trade.pair_index, trade.side)?;
        Ok(trade_borrowing_fee(trade.notional(), &stored.info.borrowing, view))
    }

    pub(super) fn threshold_p(&self, trade: &Trade) -> Result<Decimal, EngineError> {
        let group = self.group_of(trade.pair_index)?;
        Ok(self
            .state
            .registry
            .liquidation_threshold_p(group, trade.leverage)?)
    }

    /// Borrowing fee the trade would pay if settled now.
    pub fn pending_borrowing_fee(&self, trader: TraderId, index: TradeIndex) -> Result<Quote, EngineError> {
        let stored = self.state.ledger.active(TradeKey { trader, index })?;
        self.accrued_borrowing_fee(stored)
    }

    /// Price at which the trade becomes liquidatable, accrued borrowing fee included.
    pub fn liquidation_price(&self, trader: TraderId, index: TradeIndex) -> Result<Price, EngineError> {
        let stored = self.state.ledger.active(TradeKey { trader, index })?;
        let threshold_p = self.threshold_p(&stored.trade)?;
        let fee = self.accrued_borrowing_fee(stored)?;
        Ok(stored.trade.liquidation_price(threshold_p, fee))
    }
}
