use crate::models::{SignalDirection, SignalVote};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of one voting round. Recomputed every cycle, never carried over.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregatedSignal {
    pub direction: SignalDirection,
    pub tally: BTreeMap<SignalDirection, usize>,
    /// Indicators that voted for the emitted direction
    pub contributors: Vec<String>,
    /// Indicators whose output was unusable this round
    pub malformed: Vec<String>,
}

impl AggregatedSignal {
    pub fn none() -> Self {
        Self {
            direction: SignalDirection::None,
            tally: BTreeMap::new(),
            contributors: Vec::new(),
            malformed: Vec::new(),
        }
    }

    pub fn has_data_quality_issue(&self) -> bool {
        !self.malformed.is_empty()
    }
}

/// Majority vote over provider outputs.
///
/// NONE votes abstain. The leading direction wins only if it has at least
/// `min_votes` and strictly more votes than every other direction; anything
/// else (tie for the lead, too few votes) yields NONE. Order of `votes` does
/// not matter.
pub fn aggregate(votes: &[SignalVote], min_votes: usize) -> AggregatedSignal {
    let mut tally: BTreeMap<SignalDirection, usize> = BTreeMap::new();
    let mut malformed = Vec::new();

    for vote in votes {
        if !vote.is_well_formed() {
            malformed.push(vote.indicator.clone());
            continue;
        }
        if vote.direction == SignalDirection::None {
            continue;
        }
        *tally.entry(vote.direction).or_insert(0) += 1;
    }
    malformed.sort();

    let top = tally.values().copied().max().unwrap_or(0);
    let leaders: Vec<SignalDirection> = tally
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(direction, _)| *direction)
        .collect();

    let direction = match leaders.as_slice() {
        [single] if top >= min_votes.max(1) => *single,
        _ => SignalDirection::None,
    };

    let mut contributors: Vec<String> = if direction == SignalDirection::None {
        Vec::new()
    } else {
        votes
            .iter()
            .filter(|v| v.is_well_formed() && v.direction == direction)
            .map(|v| v.indicator.clone())
            .collect()
    };
    contributors.sort();

    AggregatedSignal {
        direction,
        tally,
        contributors,
        malformed,
    }
}
