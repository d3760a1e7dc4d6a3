//! Leg correlation model.
//!
//! Legs that share a group key (same event, or same market type across
//! the slate) draw their outcomes from a shared random source with
//! probability `strength`.
//! The same model prices pairwise correlation for the ticket builders.

use serde::{Deserialize, Serialize};

use crate::types::{Leg, SimulationError};

/// Which legs share a random source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationScope {
    /// All legs of one event.
    Event,
    /// Legs of the same market type on any event, e.g. every total.
    /// Two legs of one event market always conflict, so the event is not
    /// part of this key.
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationModel {
    pub scope: CorrelationScope,
    /// Probability in [0, 1] that a leg follows its group's shared draw.
    pub strength: f64,
}

impl Default for CorrelationModel {
    fn default() -> Self {
        Self {
            scope: CorrelationScope::Event,
            strength: 0.25,
        }
    }
}

impl CorrelationModel {
    /// Every leg sampled on its own.
    pub fn independent() -> Self {
        Self {
            scope: CorrelationScope::Event,
            strength: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(SimulationError::InvalidCorrelation(self.strength));
        }
        Ok(())
    }

    /// Shared-draw grouping key.
    pub fn group_key<'a>(&self, leg: &'a Leg) -> (&'a str, &'a str) {
        match self.scope {
            CorrelationScope::Event => (leg.event_id.as_str(), ""),
            CorrelationScope::Market => ("", leg.market.as_str()),
        }
    }

    /// Correlation weight between two distinct legs.
    pub fn pairwise(&self, a: &Leg, b: &Leg) -> f64 {
        if a.id != b.id && self.group_key(a) == self.group_key(b) {
            self.strength
        } else {
            0.0
        }
    }

    /// Sum of pairwise weights over every unordered pair.
    pub fn total_pairwise(&self, legs: &[&Leg]) -> f64 {
        let mut total = 0.0;
        for (i, a) in legs.iter().enumerate() {
            for b in &legs[i + 1..] {
                total += self.pairwise(a, b);
            }
        }
        total
    }
}
