// 8.0 engine/core.rs: main engine. holds registry, ledger, borrowing book, price board.
// every public mutation goes through `transition`, which restores the checkpoint on error.

use super::results::EngineError;
use crate::borrowing::BorrowingBook;
use crate::config::ProtocolConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::fees::{FeeAdjuster, FlatFees};
use crate::ledger::Ledger;
use crate::oracle::{PriceFeed, QuoteVerifier};
use crate::provider::{CollateralProvider, InMemoryVault, TransferBatch};
use crate::registry::Registry;
use crate::types::{Tick, Timestamp, TraderId};
use tracing::{debug, info, warn};

/// Everything a failed transition must roll back.
#[derive(Debug, Clone)]
pub(super) struct EngineState {
    pub(super) registry: Registry,
    pub(super) ledger: Ledger,
    pub(super) borrowing: BorrowingBook,
    pub(super) prices: PriceFeed,
}

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<P: CollateralProvider = InMemoryVault> {
    pub(super) config: ProtocolConfig,
    pub(super) state: EngineState,
    pub(super) verifier: Box<dyn QuoteVerifier>,
    pub(super) fees: Box<dyn FeeAdjuster>,
    pub(super) provider: P,
    pub(super) events: Vec<Event>,
    pub(super) pending_events: Vec<EventPayload>,
    pub(super) pending_transfers: TransferBatch,
    pub(super) next_event_id: u64,
    pub(super) tick: Tick,
    pub(super) now: Timestamp,
}

impl<P: CollateralProvider> Engine<P> {
    pub fn new(
        config: ProtocolConfig,
        admin: TraderId,
        verifier: impl QuoteVerifier + 'static,
        provider: P,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let ledger = Ledger::new(config.trading.max_trades_per_trader);
        Ok(Self {
            config,
            state: EngineState {
                registry: Registry::new(admin),
                ledger,
                borrowing: BorrowingBook::new(),
                prices: PriceFeed::new(),
            },
            verifier: Box::new(verifier),
            fees: Box::new(FlatFees),
            provider,
            events: Vec::new(),
            pending_events: Vec::new(),
            pending_transfers: TransferBatch::default(),
            next_event_id: 1,
            tick: Tick(0),
            now: Timestamp::from_secs(0),
        })
    }

    pub fn with_fee_adjuster(mut self, fees: impl FeeAdjuster + 'static) -> Self {
        self.fees = Box::new(fees);
        self
    }

    // 8.1.1: clock. ticks drive borrowing, seconds drive quote freshness
    pub fn set_clock(&mut self, tick: Tick, now: Timestamp) {
        self.tick = tick;
        self.now = now;
    }

    pub fn advance(&mut self, ticks: u64, secs: u64) {
        self.tick = Tick(self.tick.0 + ticks);
        self.now = Timestamp::from_secs(self.now.as_secs() + secs);
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn time(&self) -> Timestamp {
        self.now
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    pub fn borrowing(&self) -> &BorrowingBook {
        &self.state.borrowing
    }

    pub fn prices(&self) -> &PriceFeed {
        &self.state.prices
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Runs `op` against a checkpoint. on error the state and buffered events are discarded.
    pub(super) fn transition<T>(
        &mut self,
        label: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpoint = self.state.clone();
        // collateral moves once, after the state change, in a single provider call
        let result = op(self).and_then(|out| {
            let batch = std::mem::take(&mut self.pending_transfers);
            if !batch.is_empty() {
                self.provider.settle(&batch)?;
            }
            Ok(out)
        });
        match result {
            Ok(out) => {
                let emitted = self.pending_events.len();
                self.flush_events();
                info!(label, tick = self.tick.0, emitted, "transition executed");
                Ok(out)
            }
            Err(err) => {
                self.state = checkpoint;
                self.pending_events.clear();
                self.pending_transfers = TransferBatch::default();
                warn!(label, tick = self.tick.0, error = %err, kind = ?err.kind(), "transition reverted");
                Err(err)
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        self.pending_events.push(payload);
    }

    fn flush_events(&mut self) {
        for payload in std::mem::take(&mut self.pending_events) {
            let event = Event::new(EventId(self.next_event_id), self.tick, self.now, payload);
            self.next_event_id += 1;

            if self.config.engine.log_events {
                debug!(id = event.id.0, event = event.payload.name(), "event emitted");
            }

            self.events.push(event);
        }

        if self.events.len() > self.config.engine.max_events {
            let drain_count = self.events.len() - self.config.engine.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
