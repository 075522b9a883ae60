//! Property tests for trigger invariants.
//!
//! 1. Determinism: replaying a sequence through two fresh triggers gives the
//!    same decisions.
//! 2. Accounting: every released amount is at least the threshold and equals
//!    the sum of contributions since the previous release.
//! 3. Non-negativity: the accumulator never goes below zero.
//! 4. Flat prices never release.

use accrual_bot::accumulator::{AccumulatorConfig, AccumulatorTrigger, ReleaseDecision};
use proptest::prelude::*;

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..1_000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(arb_price(), 1..200)
}

fn arb_threshold() -> impl Strategy<Value = f64> {
    0.01..500.0_f64
}

fn run(config: &AccumulatorConfig, prices: &[f64]) -> Vec<ReleaseDecision> {
    let mut t = AccumulatorTrigger::new(config.clone()).unwrap();
    prices.iter().map(|p| t.observe(*p).unwrap()).collect()
}

proptest! {
    #[test]
    fn replay_is_deterministic(
        prices in arb_prices(),
        threshold in arb_threshold(),
        min_delta in 0.0..5.0_f64,
    ) {
        let config = AccumulatorConfig::new(threshold).with_min_delta(min_delta);
        prop_assert_eq!(run(&config, &prices), run(&config, &prices));
    }

    #[test]
    fn released_amount_matches_contributions(
        prices in arb_prices(),
        threshold in arb_threshold(),
    ) {
        let mut t = AccumulatorTrigger::new(AccumulatorConfig::new(threshold)).unwrap();
        let mut expected = 0.0_f64;
        let mut moves = 0_u64;
        let mut prev: Option<f64> = None;

        for &p in &prices {
            if let Some(prev) = prev {
                let delta = (p - prev).abs();
                if delta > 0.0 {
                    expected += delta;
                    moves += 1;
                }
            }
            prev = Some(p);

            match t.observe(p).unwrap() {
                ReleaseDecision::Release { amount, trade_count } => {
                    prop_assert!(amount >= threshold);
                    prop_assert_eq!(amount, expected);
                    prop_assert_eq!(trade_count, moves);
                    prop_assert_eq!(t.state().accumulated(), 0.0);
                    expected = 0.0;
                    moves = 0;
                }
                ReleaseDecision::NoRelease => {
                    prop_assert!(t.state().accumulated() < threshold);
                    prop_assert_eq!(t.state().accumulated(), expected);
                }
            }
            prop_assert!(t.state().accumulated() >= 0.0);
            prop_assert_eq!(t.state().previous_price(), Some(p));
        }
    }

    #[test]
    fn flat_prices_never_release(
        price in arb_price(),
        len in 1usize..100,
        threshold in arb_threshold(),
    ) {
        let prices = vec![price; len];
        let decisions = run(&AccumulatorConfig::new(threshold), &prices);
        prop_assert!(decisions.iter().all(|d| *d == ReleaseDecision::NoRelease));
    }

    #[test]
    fn first_observation_is_always_baseline(price in arb_price(), threshold in arb_threshold()) {
        let mut t = AccumulatorTrigger::new(AccumulatorConfig::new(threshold)).unwrap();
        prop_assert_eq!(t.observe(price).unwrap(), ReleaseDecision::NoRelease);
        prop_assert_eq!(t.state().accumulated(), 0.0);
    }
}
