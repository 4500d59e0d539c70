//! Scoring types and the health-point rules that turn scores into damage.

use serde::{Deserialize, Serialize};

use crate::config::ArenaConfig;
use crate::participant::Side;

/// Midpoint of the 0-10 judging scale.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Judge ratings for one utterance, each on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub strength: f64,
    pub relevance: f64,
    pub logic: f64,
    pub truth: f64,
    pub humor: f64,
    pub average: f64,
}

impl Score {
    /// Build a score from its five dimensions; the average is always derived here.
    pub fn new(strength: f64, relevance: f64, logic: f64, truth: f64, humor: f64) -> Self {
        let dims = [strength, relevance, logic, truth, humor].map(|d| d.clamp(0.0, 10.0));
        Self {
            strength: dims[0],
            relevance: dims[1],
            logic: dims[2],
            truth: dims[3],
            humor: dims[4],
            average: dims.iter().sum::<f64>() / dims.len() as f64,
        }
    }

    /// Substituted when the scorer fails, so every appended turn is scored.
    pub fn neutral() -> Self {
        Self::new(
            NEUTRAL_SCORE,
            NEUTRAL_SCORE,
            NEUTRAL_SCORE,
            NEUTRAL_SCORE,
            NEUTRAL_SCORE,
        )
    }
}

/// Raw health of both sides, indexed by [`Side`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthScore {
    pub first: i32,
    pub second: i32,
}

impl HealthScore {
    pub fn new(starting_hp: i32) -> Self {
        Self {
            first: starting_hp,
            second: starting_hp,
        }
    }

    pub fn get(&self, side: Side) -> i32 {
        match side {
            Side::First => self.first,
            Side::Second => self.second,
        }
    }

    pub fn apply(&mut self, delta: HealthDelta) {
        self.first += delta.first;
        self.second += delta.second;
    }

    /// The side left standing once the other reaches zero, if any.
    ///
    /// If both are down at once the side with more health wins; an exact
    /// tie favors the first participant.
    pub fn survivor(&self) -> Option<Side> {
        match (self.first <= 0, self.second <= 0) {
            (false, false) => None,
            (false, true) => Some(Side::First),
            (true, false) => Some(Side::Second),
            (true, true) if self.second > self.first => Some(Side::Second),
            (true, true) => Some(Side::First),
        }
    }

    /// Both sides clamped into the display range.
    pub fn normalized(&self, cap: i32) -> HealthScore {
        HealthScore {
            first: normalize(self.first, cap),
            second: normalize(self.second, cap),
        }
    }
}

/// Change to apply to both sides' health in one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthDelta {
    pub first: i32,
    pub second: i32,
}

impl HealthDelta {
    pub fn is_zero(&self) -> bool {
        self.first == 0 && self.second == 0
    }

    fn damage(side: Side, amount: i32) -> Self {
        match side {
            Side::First => Self {
                first: -amount,
                second: 0,
            },
            Side::Second => Self {
                first: 0,
                second: -amount,
            },
        }
    }
}

/// Clamp a raw HP value into `[0, cap]` for presentation.
pub fn normalize(raw: i32, cap: i32) -> i32 {
    raw.clamp(0, cap.max(0))
}

/// Comparative damage for one turn.
///
/// `diff` is the speaker's score minus the opponent's trailing average.
/// Outside the neutral band the weaker side takes `diff * scale`, clamped
/// to `[floor, ceiling]`.
pub fn compute_delta(
    speaker: Side,
    speaker_average: f64,
    opponent_average: f64,
    rules: &ArenaConfig,
) -> HealthDelta {
    let diff = speaker_average - opponent_average;
    if diff.abs() <= rules.neutral_band {
        return HealthDelta::default();
    }

    let amount = (diff.abs() * rules.damage_scale)
        .round()
        .clamp(f64::from(rules.damage_floor), f64::from(rules.damage_ceiling)) as i32;

    if diff > 0.0 {
        HealthDelta::damage(speaker.opponent(), amount)
    } else {
        HealthDelta::damage(speaker, amount)
    }
}
