//! Candidate combination generation.
//!
//! Enumerates every non-conflicting combination of `min_legs..=max_legs`
//! priced legs whose internal pairwise correlation stays within the limit.
//! Enumeration order is lexicographic by leg id, so a truncated candidate
//! list is still deterministic.

use tracing::{info, warn};

use crate::strategy::correlation::CorrelationModel;
use crate::types::{BuildError, Combination, Leg};

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRules {
    pub min_legs: usize,
    pub max_legs: usize,
    pub correlation_limit: f64,
    pub max_candidates: usize,
}

impl CandidateRules {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.min_legs == 0 || self.min_legs > self.max_legs {
            return Err(BuildError::InvalidLimits(format!(
                "need 1 <= min_legs <= max_legs, got {}..={}",
                self.min_legs, self.max_legs
            )));
        }
        if !(self.correlation_limit >= 0.0) {
            return Err(BuildError::InvalidLimits(format!(
                "correlation limit must be non-negative, got {}",
                self.correlation_limit
            )));
        }
        Ok(())
    }
}

/// All feasible candidate combinations, capped at `max_candidates`.
pub fn candidates(
    legs: &[Leg],
    rules: &CandidateRules,
    correlation: &CorrelationModel,
) -> Result<Vec<Combination>, BuildError> {
    rules.validate()?;

    let mut sorted: Vec<&Leg> = legs.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = Vec::new();
    let mut current: Vec<&Leg> = Vec::with_capacity(rules.max_legs);
    let truncated = extend(&sorted, 0, &mut current, 0.0, rules, correlation, &mut out)?;

    if truncated {
        warn!(
            limit = rules.max_candidates,
            "Candidate limit reached, remaining combinations skipped"
        );
    }
    info!(
        legs = legs.len(),
        candidates = out.len(),
        min_legs = rules.min_legs,
        max_legs = rules.max_legs,
        "Candidates generated"
    );

    Ok(out)
}

/// Depth-first extension of `current`. Returns true once the cap is hit.
fn extend<'a>(
    legs: &[&'a Leg],
    start: usize,
    current: &mut Vec<&'a Leg>,
    correlation_sum: f64,
    rules: &CandidateRules,
    correlation: &CorrelationModel,
    out: &mut Vec<Combination>,
) -> Result<bool, BuildError> {
    if current.len() >= rules.min_legs {
        if out.len() >= rules.max_candidates {
            return Ok(true);
        }
        out.push(Combination::new(current.iter().map(|l| (*l).clone()).collect())?);
    }
    if current.len() == rules.max_legs {
        return Ok(false);
    }

    for i in start..legs.len() {
        let leg = legs[i];
        if current.iter().any(|c| c.conflicts_with(leg)) {
            continue;
        }
        let added: f64 = current.iter().map(|c| correlation.pairwise(c, leg)).sum();
        if correlation_sum + added > rules.correlation_limit {
            continue;
        }

        current.push(leg);
        let truncated = extend(legs, i + 1, current, correlation_sum + added, rules, correlation, out)?;
        current.pop();
        if truncated {
            return Ok(true);
        }
    }

    Ok(false)
}
