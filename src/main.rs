//! Leverage engine simulation.
//!
//! Walks one pooled-collateral market through its lifecycle: signed quotes,
//! impact-priced market opens, keeper-triggered limit orders and closes,
//! position resizing, borrowing accrual and liquidation.

use ed25519_dalek::SigningKey;
use leverage_engine::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing_subscriber::EnvFilter;

const ADMIN: TraderId = TraderId(1);
const KEEPER: TraderId = TraderId(2);
const ALICE: TraderId = TraderId(10);
const BOB: TraderId = TraderId(11);
const ETH: PairIndex = PairIndex(0);

type Sim = Result<(), Box<dyn Error>>;

fn main() -> Sim {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("Leverage Engine Simulation");
    println!("One pair, pooled collateral, signed oracle\n");

    scenario_1_market_open_with_impact()?;
    scenario_2_limit_order_trigger()?;
    scenario_3_take_profit_close()?;
    scenario_4_resize_position()?;
    scenario_5_borrowing_and_liquidation()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Engine with one ETH/USD pair, a funded pool and two funded traders.
struct Market {
    engine: Engine,
    publisher: SigningKey,
    instrument: InstrumentId,
}

impl Market {
    fn new(spread_p: Decimal, depth: Decimal, fees: PairFee) -> Result<Self, Box<dyn Error>> {
        let publisher = SigningKey::from_bytes(&[7u8; 32]);
        let instrument = InstrumentId::from_label("ETH/USD");
        let mut vault = InMemoryVault::with_pool(Quote::new(dec!(1_000_000)));
        vault.fund_wallet(ALICE, Quote::new(dec!(100_000)));
        vault.fund_wallet(BOB, Quote::new(dec!(100_000)));

        let mut engine = Engine::new(
            ProtocolConfig::default(),
            ADMIN,
            PublisherSet::single(publisher.verifying_key()),
            vault,
        )?;
        engine.set_clock(Tick(0), Timestamp::from_secs(1_700_000_000));

        engine.add_group(
            ADMIN,
            RiskGroup {
                index: GroupIndex(0),
                name: "crypto".into(),
                min_leverage: Leverage::new_unchecked(dec!(2)),
                max_leverage: Leverage::new_unchecked(dec!(150)),
                liquidation: None,
            },
        )?;
        engine.add_fee(ADMIN, fees)?;
        engine.add_collateral(
            ADMIN,
            CollateralInfo {
                index: CollateralIndex(0),
                symbol: "USDC".into(),
                decimals: 6,
                active: true,
            },
        )?;
        engine.add_pair(
            ADMIN,
            Pair {
                index: ETH,
                from: "ETH".into(),
                to: "USD".into(),
                instrument_id: instrument,
                spread_p,
                group_index: GroupIndex(0),
                fee_index: FeeIndex(0),
                depth_above: depth,
                depth_below: depth,
            },
        )?;

        Ok(Self {
            engine,
            publisher,
            instrument,
        })
    }

    /// Moves the clock one second and publishes `price`.
    fn publish(&mut self, price: Decimal) -> Sim {
        self.engine.advance(1, 1);
        let quote = self.signed(price)?;
        self.engine.submit_quotes(&[quote])?;
        Ok(())
    }

    /// A fresh quote for a keeper to carry, not yet submitted.
    fn signed(&self, price: Decimal) -> Result<SignedQuote, Box<dyn Error>> {
        let mantissa = (price * dec!(100_000_000)).trunc();
        let mantissa = i64::try_from(mantissa).map_err(|_| "price out of range")?;
        let quote = PriceQuote {
            instrument_id: self.instrument,
            price: mantissa,
            confidence: 0,
            exponent: -8,
            publish_time: self.engine.time().as_secs(),
        };
        Ok(SignedQuote::sign(quote, &[&self.publisher]))
    }

    fn request(&self, side: Side, leverage: Decimal, collateral: Decimal, price: Decimal) -> OpenTradeRequest {
        OpenTradeRequest {
            pair_index: ETH,
            side,
            leverage: Leverage::new_unchecked(leverage),
            collateral_index: CollateralIndex(0),
            trade_type: TradeType::Market,
            collateral_amount: Quote::new(collateral),
            open_price: Price::new_unchecked(price),
            take_profit: None,
            stop_loss: None,
            max_slippage_p: dec!(1),
            terms_accepted: true,
        }
    }
}

fn standard_fees() -> PairFee {
    PairFee {
        index: FeeIndex(0),
        open_fee_p: dec!(0.03),
        close_fee_p: dec!(0.03),
        trigger_fee_p: dec!(0.01),
        min_position_size: Quote::new(dec!(100)),
    }
}

/// Market order priced against depth, then a second one paying more impact.
fn scenario_1_market_open_with_impact() -> Sim {
    println!("Scenario 1: Market Open With Price Impact\n");

    let mut market = Market::new(dec!(0.04), dec!(500_000), standard_fees())?;
    market.publish(dec!(2000))?;

    let first = market
        .engine
        .open_trade(ALICE, market.request(Side::Long, dec!(10), dec!(1_000), dec!(2000)))?;
    println!("  Alice opens 10x long, 1,000 USDC @ oracle $2,000");
    println!("  Executed at ${}, collateral after fees {}", first.open_price, first.collateral_amount);

    let second = market
        .engine
        .open_trade(BOB, market.request(Side::Long, dec!(10), dec!(1_000), dec!(2000)))?;
    println!("  Bob opens the same size into existing long OI");
    println!("  Executed at ${} (pays Alice's OI too)", second.open_price);

    let oi = market.engine.ledger().open_interest(ETH);
    println!("  Open interest: {} long, {} short\n", oi.long, oi.short);
    market.engine.check_invariants()?;
    Ok(())
}

/// Limit order placed below market and filled by a keeper once price comes down.
fn scenario_2_limit_order_trigger() -> Sim {
    println!("Scenario 2: Limit Order Trigger\n");

    let mut market = Market::new(dec!(0), dec!(1_000_000), standard_fees())?;
    market.publish(dec!(2000))?;

    let mut request = market.request(Side::Long, dec!(20), dec!(500), dec!(1950));
    request.trade_type = TradeType::Limit;
    let order = market.engine.open_trade(ALICE, request)?;
    println!("  Alice places 20x long limit @ ${}", order.open_price);

    market.engine.advance(10, 1);
    let batch = vec![market.signed(dec!(1948))?];
    let trigger = PendingTrigger::new(TriggerType::LimitOpen, ALICE, order.index);
    let outcome = market.engine.trigger_order(KEEPER, trigger, &batch)?;
    if let TriggerOutcome::Opened(trade) = outcome {
        println!("  Keeper fills at ${}, collateral {}", trade.open_price, trade.collateral_amount);
    }
    println!(
        "  Keeper wallet: {}\n",
        market.engine.provider().wallet_balance(KEEPER)
    );
    market.engine.check_invariants()?;
    Ok(())
}

/// Take profit set above the profit cap is pulled back, then fired by a keeper.
fn scenario_3_take_profit_close() -> Sim {
    println!("Scenario 3: Take Profit Close\n");

    let mut market = Market::new(dec!(0), dec!(0), standard_fees())?;
    market.publish(dec!(2000))?;

    let trade = market
        .engine
        .open_trade(ALICE, market.request(Side::Long, dec!(5), dec!(2_000), dec!(2000)))?;
    let trade = market
        .engine
        .update_tp(ALICE, trade.index, Some(Price::new_unchecked(dec!(10_000))))?;
    println!("  Alice asks for TP $10,000, stored TP ${:?}", trade.take_profit.map(|p| p.value()));
    let trade = market
        .engine
        .update_sl(ALICE, trade.index, Some(Price::new_unchecked(dec!(1500))))?;
    println!("  SL $1,500 clamped to ${:?}", trade.stop_loss.map(|p| p.value()));

    market.engine.advance(100, 1);
    let batch = vec![market.signed(dec!(2400))?];
    let tp = PendingTrigger::new(TriggerType::TpClose, ALICE, trade.index);
    match market.engine.trigger_order(KEEPER, tp, &batch) {
        Ok(_) => println!("  TP unexpectedly fired at $2,400"),
        Err(err) => println!("  TP at $2,400 rejected: {}", err),
    }

    let trade = market
        .engine
        .update_tp(ALICE, trade.index, Some(Price::new_unchecked(dec!(2300))))?;
    market.engine.advance(1, 1);
    let batch = vec![market.signed(dec!(2310))?];
    let tp = PendingTrigger::new(TriggerType::TpClose, ALICE, trade.index);
    if let TriggerOutcome::Closed(close) = market.engine.trigger_order(KEEPER, tp, &batch)? {
        println!(
            "  TP fired at ${}: pnl {}, payout {}, keeper {}\n",
            close.close_price, close.pnl, close.payout, close.keeper_reward
        );
    }
    market.engine.check_invariants()?;
    Ok(())
}

/// Leverage change, size increase with a re-blended open price, partial decrease.
fn scenario_4_resize_position() -> Sim {
    println!("Scenario 4: Resizing a Position\n");

    let mut market = Market::new(dec!(0), dec!(0), standard_fees())?;
    market.publish(dec!(2000))?;

    let trade = market
        .engine
        .open_trade(BOB, market.request(Side::Short, dec!(10), dec!(1_000), dec!(2000)))?;
    println!("  Bob: 10x short, collateral {}, notional {}", trade.collateral_amount, trade.notional());

    let trade = market
        .engine
        .update_leverage(BOB, trade.index, Leverage::new_unchecked(dec!(20)))?;
    println!("  Leverage to 20x: collateral {}, notional {}", trade.collateral_amount, trade.notional());

    market.publish(dec!(1900))?;
    let trade = market.engine.increase_position_size(
        BOB,
        trade.index,
        Quote::new(dec!(500)),
        dec!(10),
        Price::new_unchecked(dec!(1900)),
        dec!(1),
    )?;
    println!("  Adds 500 @ 10x at $1,900: open ${}, leverage {}", trade.open_price, trade.leverage);

    let result = market
        .engine
        .decrease_position_size(BOB, trade.index, Quote::new(dec!(300)), Decimal::ZERO)?;
    println!(
        "  Takes 300 collateral out: partial pnl {}, payout {}",
        result.partial_pnl, result.payout
    );

    let close = market.engine.close_trade_market(BOB, trade.index)?;
    println!("  Closes the rest: pnl {}, payout {}\n", close.pnl, close.payout);
    market.engine.check_invariants()?;
    Ok(())
}

/// Borrowing accrues per tick and pulls the liquidation price in.
fn scenario_5_borrowing_and_liquidation() -> Sim {
    println!("Scenario 5: Borrowing Fees and Liquidation\n");

    let mut market = Market::new(dec!(0), dec!(0), standard_fees())?;
    market.engine.set_borrowing_pair_params(
        ADMIN,
        ETH,
        BorrowingParams {
            fee_per_tick: dec!(0.000001),
            max_open_interest: dec!(100_000),
            fee_exponent: Decimal::ONE,
        },
    )?;
    market.publish(dec!(2000))?;

    let trade = market
        .engine
        .open_trade(ALICE, market.request(Side::Long, dec!(50), dec!(1_000), dec!(2000)))?;
    let before = market.engine.liquidation_price(ALICE, trade.index)?;
    println!("  Alice: 50x long @ ${}, liquidation ${}", trade.open_price, before);

    market.engine.advance(2_000, 1);
    let fee = market.engine.pending_borrowing_fee(ALICE, trade.index)?;
    let after = market.engine.liquidation_price(ALICE, trade.index)?;
    println!("  After 2,000 ticks: borrowing fee {}, liquidation ${}", fee, after);

    let crash = (after.value() - dec!(1)).trunc();
    let batch = vec![market.signed(crash)?];
    let liq = PendingTrigger::new(TriggerType::LiquidationClose, ALICE, trade.index);
    if let TriggerOutcome::Closed(close) = market.engine.trigger_order(KEEPER, liq, &batch)? {
        println!(
            "  Liquidated at ${}: payout {}, keeper {}",
            close.close_price, close.payout, close.keeper_reward
        );
    }

    market.engine.advance(1, 1);
    let batch = vec![market.signed(crash)?];
    match market.engine.trigger_order(KEEPER, liq, &batch) {
        Ok(_) => println!("  Second liquidation unexpectedly succeeded"),
        Err(err) => println!("  Second keeper reverts: {}\n", err),
    }
    market.engine.check_invariants()?;
    Ok(())
}
