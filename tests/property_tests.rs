//! Property tests for the trailing stop and signal voting.

use chrono::Utc;
use proptest::prelude::*;
use ticktrader::models::{Position, Side, SignalDirection, SignalVote, Tick};
use ticktrader::signals::aggregate;
use ticktrader::trailing::{TrailingState, TrailingStopEngine};

// ── Strategies ───────────────────────────────────────────────────────

fn arb_engine() -> impl Strategy<Value = TrailingStopEngine> {
    (0.5..4.0_f64, 0.0..0.5_f64, 0.0..0.01_f64, 0.0..0.002_f64).prop_map(
        |(atr_multiplier, break_even_offset, trailing_profit_threshold, min_atr_pct)| TrailingStopEngine {
            atr_multiplier,
            break_even_offset,
            trailing_profit_threshold,
            min_atr_pct,
        },
    )
}

/// Mid prices wandering around 100
fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(90.0..110.0_f64, 1..60)
}

fn arb_atr() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), Just(f64::NAN), 0.001..2.0_f64]
}

fn arb_direction() -> impl Strategy<Value = SignalDirection> {
    prop_oneof![
        Just(SignalDirection::Buy),
        Just(SignalDirection::Sell),
        Just(SignalDirection::Hold),
        Just(SignalDirection::Close),
        Just(SignalDirection::None),
    ]
}

fn arb_votes() -> impl Strategy<Value = Vec<SignalVote>> {
    prop::collection::vec((arb_direction(), any::<bool>()), 0..12).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (direction, broken))| {
                let vote = SignalVote::new(&format!("IND{}", i), direction);
                if broken {
                    vote.with_feature("value", f64::NAN)
                } else {
                    vote.with_feature("value", i as f64)
                }
            })
            .collect()
    })
}

/// Feed every price to the engine, confirming each recommendation like the
/// broker would. Returns every stop in effect after each tick.
fn walk(engine: &TrailingStopEngine, side: Side, path: &[f64], atr: f64) -> (Vec<Option<f64>>, Vec<bool>) {
    let initial = match side {
        Side::Long => 97.0,
        Side::Short => 103.0,
    };
    let mut position = Position {
        ticket: 1,
        symbol: "EURUSD".to_string(),
        side,
        volume: 0.01,
        open_price: 100.0,
        current_sl: Some(initial),
        take_profit: None,
        open_time: Utc::now(),
    };
    let mut state = TrailingState::new();
    state.confirm(1, side, initial);

    let mut stops = Vec::with_capacity(path.len());
    let mut triggered = Vec::with_capacity(path.len());
    for mid in path {
        let tick = Tick::quote("EURUSD", mid - 0.01, mid + 0.01, Utc::now());
        let rec = engine.recommend(&position, &tick, atr, &state);
        if let Some(stop) = rec.stop {
            state.confirm(1, side, stop);
            position.current_sl = state.last_confirmed(1);
        }
        stops.push(position.current_sl);
        triggered.push(rec.triggered);
    }
    (stops, triggered)
}

// ── Trailing stop ────────────────────────────────────────────────────

proptest! {
    /// A long stop only ever rises along any price path.
    #[test]
    fn long_stop_never_loosens(engine in arb_engine(), path in arb_path(), atr in arb_atr()) {
        let (stops, _) = walk(&engine, Side::Long, &path, atr);
        let mut previous = 97.0;
        for stop in stops {
            let stop = stop.unwrap();
            prop_assert!(stop >= previous, "stop fell from {} to {}", previous, stop);
            previous = stop;
        }
    }

    /// A short stop only ever falls along any price path.
    #[test]
    fn short_stop_never_loosens(engine in arb_engine(), path in arb_path(), atr in arb_atr()) {
        let (stops, _) = walk(&engine, Side::Short, &path, atr);
        let mut previous = 103.0;
        for stop in stops {
            let stop = stop.unwrap();
            prop_assert!(stop <= previous, "stop rose from {} to {}", previous, stop);
            previous = stop;
        }
    }

    /// Once trailing triggers, the stop stays on the profitable side of entry.
    #[test]
    fn breakeven_floor_holds_after_trigger(
        engine in arb_engine(),
        path in arb_path(),
        atr in arb_atr(),
        long in any::<bool>(),
    ) {
        let side = if long { Side::Long } else { Side::Short };
        let (stops, triggered) = walk(&engine, side, &path, atr);

        if let Some(first) = triggered.iter().position(|t| *t) {
            for stop in &stops[first..] {
                let stop = stop.unwrap();
                match side {
                    Side::Long => prop_assert!(stop >= 100.0, "long stop {} below entry", stop),
                    Side::Short => prop_assert!(stop <= 100.0, "short stop {} above entry", stop),
                }
            }
        }
    }
}

// ── Signal aggregation ───────────────────────────────────────────────

proptest! {
    /// Shuffling the votes never changes the outcome.
    #[test]
    fn aggregation_ignores_vote_order(
        (votes, shuffled) in arb_votes().prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        min_votes in 1usize..4,
    ) {
        prop_assert_eq!(aggregate(&votes, min_votes), aggregate(&shuffled, min_votes));
    }

    /// The winner has a strict lead and never comes from an abstaining or malformed vote.
    #[test]
    fn aggregation_winner_has_strict_lead(votes in arb_votes(), min_votes in 1usize..4) {
        let result = aggregate(&votes, min_votes);
        if result.direction != SignalDirection::None {
            let winner = result.tally[&result.direction];
            prop_assert!(winner >= min_votes);
            for (direction, count) in &result.tally {
                if *direction != result.direction {
                    prop_assert!(*count < winner);
                }
            }
            prop_assert_eq!(result.contributors.len(), winner);
        }
        let malformed = votes.iter().filter(|v| !v.is_well_formed()).count();
        prop_assert_eq!(result.malformed.len(), malformed);
    }
}
