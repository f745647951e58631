//! Shared market setup for the integration tests.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use leverage_engine::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const ADMIN: TraderId = TraderId(1);
pub const KEEPER: TraderId = TraderId(2);
pub const ALICE: TraderId = TraderId(10);
pub const BOB: TraderId = TraderId(11);
pub const PAIR: PairIndex = PairIndex(0);
pub const GROUP: GroupIndex = GroupIndex(0);
pub const START: u64 = 1_700_000_000;

pub fn price(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

pub fn lev(value: Decimal) -> Leverage {
    Leverage::new_unchecked(value)
}

pub fn quote(value: Decimal) -> Quote {
    Quote::new(value)
}

pub fn zero_fees() -> PairFee {
    PairFee {
        index: FeeIndex(0),
        open_fee_p: Decimal::ZERO,
        close_fee_p: Decimal::ZERO,
        trigger_fee_p: Decimal::ZERO,
        min_position_size: Quote::zero(),
    }
}

/// Knobs for one test market.
#[derive(Debug, Clone)]
pub struct Setup {
    pub spread_p: Decimal,
    pub depth_above: Decimal,
    pub depth_below: Decimal,
    pub fees: PairFee,
    pub min_leverage: Decimal,
    pub max_leverage: Decimal,
    pub config: ProtocolConfig,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            spread_p: Decimal::ZERO,
            depth_above: Decimal::ZERO,
            depth_below: Decimal::ZERO,
            fees: zero_fees(),
            min_leverage: dec!(1),
            max_leverage: dec!(150),
            config: ProtocolConfig::default(),
        }
    }
}

/// Pool of 1M with 10k in each trader wallet.
pub fn funded_vault() -> InMemoryVault {
    let mut vault = InMemoryVault::with_pool(quote(dec!(1_000_000)));
    for trader in [ALICE, BOB] {
        vault.fund_wallet(trader, quote(dec!(10_000)));
    }
    vault
}

pub struct Harness<P: CollateralProvider = InMemoryVault> {
    pub engine: Engine<P>,
    pub publisher: SigningKey,
    pub instrument: InstrumentId,
}

impl Harness {
    pub fn new(setup: Setup) -> Self {
        Self::with_provider(setup, funded_vault())
    }

    pub fn wallet(&self, trader: TraderId) -> Quote {
        self.engine.provider().wallet_balance(trader)
    }
}

impl<P: CollateralProvider> Harness<P> {
    pub fn with_provider(setup: Setup, provider: P) -> Self {
        let publisher = SigningKey::from_bytes(&[42u8; 32]);
        let instrument = InstrumentId::from_label("ETH/USD");

        let mut engine = Engine::new(
            setup.config,
            ADMIN,
            PublisherSet::single(publisher.verifying_key()),
            provider,
        )
        .unwrap();
        engine.set_clock(Tick(0), Timestamp::from_secs(START));

        engine
            .add_group(
                ADMIN,
                RiskGroup {
                    index: GROUP,
                    name: "crypto".into(),
                    min_leverage: lev(setup.min_leverage),
                    max_leverage: lev(setup.max_leverage),
                    liquidation: None,
                },
            )
            .unwrap();
        engine.add_fee(ADMIN, setup.fees).unwrap();
        engine
            .add_collateral(
                ADMIN,
                CollateralInfo {
                    index: CollateralIndex(0),
                    symbol: "USDC".into(),
                    decimals: 18,
                    active: true,
                },
            )
            .unwrap();
        engine
            .add_pair(
                ADMIN,
                Pair {
                    index: PAIR,
                    from: "ETH".into(),
                    to: "USD".into(),
                    instrument_id: instrument,
                    spread_p: setup.spread_p,
                    group_index: GROUP,
                    fee_index: FeeIndex(0),
                    depth_above: setup.depth_above,
                    depth_below: setup.depth_below,
                },
            )
            .unwrap();

        Self {
            engine,
            publisher,
            instrument,
        }
    }

    /// Signed quote at the current engine time. not submitted.
    pub fn signed(&self, value: Decimal) -> SignedQuote {
        let mantissa = (value * dec!(100_000_000)).trunc();
        let quote = PriceQuote {
            instrument_id: self.instrument,
            price: i64::try_from(mantissa).unwrap(),
            confidence: 0,
            exponent: -8,
            publish_time: self.engine.time().as_secs(),
        };
        SignedQuote::sign(quote, &[&self.publisher])
    }

    /// Advances one tick and one second, then submits `value`.
    pub fn publish(&mut self, value: Decimal) {
        self.engine.advance(1, 1);
        let signed = self.signed(value);
        let report = self.engine.submit_quotes(&[signed]).unwrap();
        assert!(report.rejected.is_empty(), "quote rejected: {:?}", report.rejected);
    }

    /// Advances one tick and one second and returns a quote for a keeper to carry.
    pub fn keeper_batch(&mut self, value: Decimal) -> Vec<SignedQuote> {
        self.engine.advance(1, 1);
        vec![self.signed(value)]
    }

    pub fn market(&self, side: Side, leverage: Decimal, collateral: Decimal, expected: Decimal) -> OpenTradeRequest {
        OpenTradeRequest {
            pair_index: PAIR,
            side,
            leverage: lev(leverage),
            collateral_index: CollateralIndex(0),
            trade_type: TradeType::Market,
            collateral_amount: quote(collateral),
            open_price: price(expected),
            take_profit: None,
            stop_loss: None,
            max_slippage_p: dec!(1),
            terms_accepted: true,
        }
    }

    pub fn assert_consistent(&self) {
        self.engine.check_invariants().unwrap();
    }
}
