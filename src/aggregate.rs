//! Per-character aggregates for the results screen.
//!
//! Pure functions over a session's samples and mistake tally. Rounding is a
//! display concern and never happens here.

use std::collections::BTreeMap;

use crate::session::{CharacterAverage, MistakeTally, ResponseSample};

/// Length of the "characters you struggled with" list.
pub const TOP_MISTAKES: usize = 5;

/// Averages below this are fast.
pub const FAST_BELOW_SECS: f64 = 0.8;
/// Averages at or above this are slow.
pub const SLOW_FROM_SECS: f64 = 3.0;

/// Percentage of bar width per second of average response time.
const BAR_PCT_PER_SEC: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedClass {
    Fast,
    Medium,
    Slow,
}

impl SpeedClass {
    pub fn classify(avg_secs: f64) -> Self {
        if avg_secs < FAST_BELOW_SECS {
            SpeedClass::Fast
        } else if avg_secs < SLOW_FROM_SECS {
            SpeedClass::Medium
        } else {
            SpeedClass::Slow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedClass::Fast => "fast",
            SpeedClass::Medium => "medium",
            SpeedClass::Slow => "slow",
        }
    }
}

/// Arithmetic mean of elapsed times per distinct character.
pub fn character_averages(samples: &[ResponseSample]) -> CharacterAverage {
    let mut sums: BTreeMap<char, (f64, u32)> = BTreeMap::new();
    for sample in samples {
        let slot = sums.entry(sample.character).or_insert((0.0, 0));
        slot.0 += sample.elapsed_seconds;
        slot.1 += 1;
    }
    sums.into_iter()
        .map(|(c, (sum, n))| (c, sum / n as f64))
        .collect()
}

/// Non-zero mistakes, most frequent first, ties in first-recorded order.
pub fn ranked_mistakes(tally: &MistakeTally) -> Vec<(char, u32)> {
    let mut ranked: Vec<(char, u32)> = tally.iter().filter(|&(_, n)| n > 0).collect();
    // sort_by is stable, so equal counts keep tally order
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_MISTAKES);
    ranked
}

/// Bar width as a percentage, capped at 100.
pub fn bar_width_pct(avg_secs: f64) -> f64 {
    (avg_secs * BAR_PCT_PER_SEC).min(100.0)
}

/// Everything the screen derives from one session's raw inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub averages: CharacterAverage,
    pub mistakes: Vec<(char, u32)>,
    pub speed: BTreeMap<char, SpeedClass>,
}

impl Aggregate {
    pub fn compute(samples: &[ResponseSample], tally: &MistakeTally) -> Self {
        let averages = character_averages(samples);
        let speed = averages
            .iter()
            .map(|(&c, &avg)| (c, SpeedClass::classify(avg)))
            .collect();
        Self {
            averages,
            mistakes: ranked_mistakes(tally),
            speed,
        }
    }
}
