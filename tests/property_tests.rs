//! Property-based tests for the pricing and fee math.
//!
//! These tests verify invariants hold under random inputs.

mod common;

use common::*;
use leverage_engine::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..1_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $1 to $10,000
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (2u32..=50u32).prop_map(Decimal::from) // 2x to 50x
}

fn collateral_strategy() -> impl Strategy<Value = Decimal> {
    (1_000i64..20_000i64).prop_map(|x| Decimal::new(x, 2)) // 10 to 200
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

/// Multiplier grid built so every cell is at most its left and upper neighbours.
fn fee_table_strategy() -> impl Strategy<Value = FeeTable> {
    (1usize..5, 1usize..5).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(0u32..1_500, rows * cols).prop_map(move |steps| {
            let mut grid = vec![vec![0u32; cols]; rows];
            for row in 0..rows {
                for col in 0..cols {
                    let left = if col == 0 { BPS_DENOMINATOR } else { grid[row][col - 1] };
                    let up = if row == 0 { BPS_DENOMINATOR } else { grid[row - 1][col] };
                    grid[row][col] = left.min(up).saturating_sub(steps[row * cols + col]);
                }
            }
            FeeTable {
                notional_buckets: (0..rows).map(|i| Decimal::from(i as u64 * 10_000)).collect(),
                stake_buckets: (0..cols).map(|i| Decimal::from(i as u64 * 1_000)).collect(),
                multipliers_bps: grid,
            }
        })
    })
}

fn flat_pair(depth: Decimal, spread_p: Decimal) -> Pair {
    Pair {
        index: PAIR,
        from: "ETH".into(),
        to: "USD".into(),
        instrument_id: InstrumentId::from_label("ETH/USD"),
        spread_p,
        group_index: GROUP,
        fee_index: FeeIndex(0),
        depth_above: depth,
        depth_below: depth,
    }
}

proptest! {
    /// Notional survives a leverage change up to one truncation step
    #[test]
    fn leverage_update_keeps_notional(
        collateral in collateral_strategy(),
        old_leverage in leverage_strategy(),
        new_leverage in leverage_strategy(),
    ) {
        prop_assume!(old_leverage != new_leverage);
        let mut h = Harness::new(Setup::default());
        h.publish(dec!(100));
        let trade = h
            .engine
            .open_trade(ALICE, h.market(Side::Long, old_leverage, collateral, dec!(100)))
            .unwrap();

        let updated = h.engine.update_leverage(ALICE, trade.index, lev(new_leverage)).unwrap();
        let drift = (updated.notional().value() - trade.notional().value()).abs();
        prop_assert!(drift <= new_leverage * dec!(0.0000000001), "drift {}", drift);
        prop_assert_eq!(
            h.engine.ledger().open_interest(PAIR).long,
            updated.notional().value()
        );
        prop_assert!(h.engine.check_invariants().is_ok());
    }

    /// A clamped stop loss never implies more loss than threshold less buffer
    #[test]
    fn stop_loss_never_beyond_liquidation_buffer(
        open in price_strategy(),
        leverage in leverage_strategy(),
        move_p in 1u32..99u32,
        threshold in 10u32..100u32,
        side in side_strategy(),
    ) {
        let open = price(open);
        let leverage = lev(leverage);
        let threshold_p = Decimal::from(threshold);
        let buffer_p = dec!(5);
        let move_fraction = Decimal::from(move_p) / dec!(100);
        let requested = match side {
            Side::Long => price(open.value() * (Decimal::ONE - move_fraction)),
            Side::Short => price(open.value() * (Decimal::ONE + move_fraction)),
        };

        let clamped = clamp_stop_loss(side, open, leverage, threshold_p, buffer_p, requested);
        // cross-multiplied so the bound is checked exactly
        let max_loss_p = threshold_p - buffer_p;
        let within = |level: Price| {
            (open.value() - level.value()) * side.sign() * dec!(100) * leverage.value()
                <= max_loss_p * open.value()
        };
        prop_assert!(within(clamped), "loss {}%", loss_p_at(side, open, clamped, leverage));

        if within(requested) {
            prop_assert_eq!(clamped, requested);
        }
    }

    /// A partial decrease followed by a close pays what one close would have
    #[test]
    fn decrease_then_close_matches_single_close(
        close_at in (9_200i64..10_800i64).prop_map(|x| Decimal::new(x, 2)), // within 8% of 100
        side in side_strategy(),
        by_leverage in any::<bool>(),
        delta_collateral in (1i64..100i64).prop_map(Decimal::from),
        delta_leverage in (1i64..10i64).prop_map(Decimal::from),
    ) {
        let open = |h: &mut Harness| {
            h.publish(dec!(100));
            h.engine.open_trade(ALICE, h.market(side, dec!(10), dec!(100), dec!(100))).unwrap()
        };

        let mut single = Harness::new(Setup::default());
        let trade = open(&mut single);
        single.publish(close_at);
        let whole = single.engine.close_trade_market(ALICE, trade.index).unwrap();

        let mut split = Harness::new(Setup::default());
        let trade = open(&mut split);
        split.publish(close_at);
        let (delta_collateral, delta_leverage) = if by_leverage {
            (Quote::zero(), delta_leverage)
        } else {
            (quote(delta_collateral), Decimal::ZERO)
        };
        let part = split
            .engine
            .decrease_position_size(ALICE, trade.index, delta_collateral, delta_leverage)
            .unwrap();
        prop_assert_eq!(part.trade.open_price, trade.open_price);
        let rest = split.engine.close_trade_market(ALICE, trade.index).unwrap();

        let drift = (part.payout.add(rest.payout).value() - whole.payout.value()).abs();
        // leverage is re-derived at 10 dp when a loss is netted into collateral
        prop_assert!(drift <= dec!(0.00000001), "drift {}", drift);
        prop_assert!(split.engine.check_invariants().is_ok());
    }

    /// More elapsed ticks never means a smaller fee when the rate is positive
    #[test]
    fn borrowing_fee_monotone_in_ticks(
        fee_per_tick in (1i64..10_000i64).prop_map(|x| Decimal::new(x, 9)),
        oi in (1i64..1_000_000i64).prop_map(Decimal::from),
        exponent in prop_oneof![Just(dec!(1)), Just(dec!(2)), Just(dec!(1.5))],
        t1 in 0u64..100_000,
        extra in 0u64..100_000,
    ) {
        let params = BorrowingParams {
            fee_per_tick,
            max_open_interest: dec!(1_000_000),
            fee_exponent: exponent,
        };
        let inputs = BorrowingInputs {
            pair: PAIR,
            group: GROUP,
            pair_params: Some(&params),
            group_params: None,
            pair_oi: OpenInterest { long: oi, short: Decimal::ZERO },
            group_oi: OpenInterest::default(),
        };
        let mut book = BorrowingBook::new();
        book.sync(&inputs, Tick(0));
        let start = checkpoint(book.view(&inputs, Side::Long, Tick(0)), Tick(0));
        let notional = quote(oi);

        let earlier = trade_borrowing_fee(notional, &start, book.view(&inputs, Side::Long, Tick(t1)));
        let later = trade_borrowing_fee(notional, &start, book.view(&inputs, Side::Long, Tick(t1 + extra)));
        prop_assert!(earlier.value() >= Decimal::ZERO);
        prop_assert!(later >= earlier, "{} < {}", later, earlier);
    }

    /// Long and short of the same size move the price by the same amount in opposite directions
    #[test]
    fn impact_symmetric_between_sides(
        oracle in price_strategy(),
        depth in (1_000i64..10_000_000i64).prop_map(Decimal::from),
        spread_bps in 0u32..50u32,
        oi in (0i64..1_000_000i64).prop_map(Decimal::from),
        notional in (1i64..1_000_000i64).prop_map(Decimal::from),
    ) {
        let pair = flat_pair(depth, Decimal::from(spread_bps) / dec!(100));
        let oracle = price(oracle);
        let long = trade_price_impact(&pair, Side::Long, oracle, oi, quote(notional));
        let short = trade_price_impact(&pair, Side::Short, oracle, oi, quote(notional));
        match (long, short) {
            (Ok(long), Ok(short)) => {
                prop_assert_eq!(long.price_impact_p, short.price_impact_p);
                prop_assert_eq!(
                    long.exec_price.value() - oracle.value(),
                    oracle.value() - short.exec_price.value()
                );
                prop_assert!(long.exec_price >= oracle && short.exec_price <= oracle);
            }
            // impact past 100% only fails for the short leg
            (Ok(_), Err(ImpactError::ExecutionPriceNotPositive { .. })) => {}
            (long, short) => prop_assert!(false, "unexpected {:?} / {:?}", long, short),
        }
    }

    /// The first half of a split order pays less impact than the whole order at once
    #[test]
    fn whole_order_pays_more_than_its_first_half(
        depth in (1_000i64..10_000_000i64).prop_map(Decimal::from),
        notional in (2i64..1_000_000i64).prop_map(|x| Decimal::from(x * 2)),
    ) {
        let whole = price_impact_p(Decimal::ZERO, Decimal::ZERO, notional, depth);
        let first = price_impact_p(Decimal::ZERO, Decimal::ZERO, notional / dec!(2), depth);
        prop_assert!(whole >= first);
    }

    /// Validated tables never charge more for a larger notional or a larger stake
    #[test]
    fn fee_tiers_monotone_in_notional_and_stake(
        table in fee_table_strategy(),
        n1 in 0u64..60_000,
        n2 in 0u64..60_000,
        s1 in 0u64..6_000,
        s2 in 0u64..6_000,
    ) {
        prop_assert!(table.validate(FeeLeg::Open).is_ok());
        let (n_lo, n_hi) = (Decimal::from(n1.min(n2)), Decimal::from(n1.max(n2)));
        let (s_lo, s_hi) = (Decimal::from(s1.min(s2)), Decimal::from(s1.max(s2)));
        prop_assert!(table.lookup(n_hi, s_lo) <= table.lookup(n_lo, s_lo));
        prop_assert!(table.lookup(n_lo, s_hi) <= table.lookup(n_lo, s_lo));

        let schedule = FeeTierSchedule::new(table.clone(), table).unwrap();
        for leg in [FeeLeg::Open, FeeLeg::Close] {
            let small = adjusted_fee(&schedule, ALICE, quote(n_lo), leg, dec_fee());
            let large = adjusted_fee(&schedule, ALICE, quote(n_hi), leg, dec_fee());
            prop_assert!(large <= small);
        }
    }

    /// Raising any cell above a neighbour is rejected
    #[test]
    fn non_monotone_tables_rejected(
        table in fee_table_strategy(),
        row_pick in 0usize..4,
        col_pick in 0usize..4,
    ) {
        let rows = table.multipliers_bps.len();
        let cols = table.multipliers_bps[0].len();
        prop_assume!(rows * cols > 1);
        let (row, col) = (row_pick % rows, col_pick % cols);
        prop_assume!(row > 0 || col > 0);

        let mut broken = table;
        let left = if col == 0 { 0 } else { broken.multipliers_bps[row][col - 1] };
        let up = if row == 0 { 0 } else { broken.multipliers_bps[row - 1][col] };
        let ceiling = left.max(up);
        prop_assume!(ceiling < BPS_DENOMINATOR);
        broken.multipliers_bps[row][col] = ceiling + 1;
        let not_monotone = matches!(
            broken.validate(FeeLeg::Close),
            Err(FeeTierError::NotMonotone { .. })
        );
        prop_assert!(not_monotone);
    }
}

fn dec_fee() -> Quote {
    quote(dec!(24.5))
}
