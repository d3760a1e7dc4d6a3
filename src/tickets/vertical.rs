//! Vertical ticket builder.
//!
//! Groups simulated combinations from one slate into tickets. A ticket's
//! legs (the union over its member combinations) must respect the leg cap,
//! contain no conflicting pair, and keep total pairwise correlation within
//! the limit. Each ticket maximizes aggregate expected value over the
//! combinations not yet used by an earlier ticket.
//!
//! Small pools are searched exhaustively; larger ones use a greedy
//! construction by expected value followed by a swap/add improvement pass.

use std::cmp::Ordering;
use tracing::{debug, info};

use crate::strategy::correlation::CorrelationModel;
use crate::types::{BuildError, Leg, SimulationResult, Ticket, TicketNote};

/// Upper bound on the exhaustive search pool (2^n subsets).
pub const MAX_EXHAUSTIVE_POOL: usize = 20;

const MAX_IMPROVEMENT_ROUNDS: usize = 256;

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_legs: usize,
    correlation_limit: f64,
}

/// A feasible set of pool members with its aggregate score.
#[derive(Debug, Clone)]
struct Selection<'a> {
    members: Vec<usize>,
    legs: Vec<&'a Leg>,
    expected_value: f64,
    variance: f64,
    correlation: f64,
}

/// `Less` means `a` is the better selection: higher EV, then lower
/// variance, then fewer legs, then the smaller leg-id sequence.
fn rank(a: &Selection<'_>, b: &Selection<'_>) -> Ordering {
    b.expected_value
        .total_cmp(&a.expected_value)
        .then(a.variance.total_cmp(&b.variance))
        .then(a.legs.len().cmp(&b.legs.len()))
        .then_with(|| a.legs.iter().map(|l| &l.id).cmp(b.legs.iter().map(|l| &l.id)))
        .then(a.members.len().cmp(&b.members.len()))
        .then_with(|| a.members.cmp(&b.members))
}

fn is_better(a: &Selection<'_>, b: &Selection<'_>) -> bool {
    rank(a, b) == Ordering::Less
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VerticalTicketBuilder {
    correlation: CorrelationModel,
    min_legs: usize,
    max_tickets: usize,
    exhaustive_limit: usize,
}

impl VerticalTicketBuilder {
    pub fn new(correlation: CorrelationModel) -> Self {
        Self {
            correlation,
            min_legs: 2,
            max_tickets: 5,
            exhaustive_limit: 12,
        }
    }

    /// Minimum legs per member combination (2 = parlays only).
    pub fn with_min_legs(mut self, min_legs: usize) -> Self {
        self.min_legs = min_legs;
        self
    }

    pub fn with_max_tickets(mut self, max_tickets: usize) -> Self {
        self.max_tickets = max_tickets;
        self
    }

    /// Pools up to this size are searched exhaustively (capped at
    /// `MAX_EXHAUSTIVE_POOL`).
    pub fn with_exhaustive_limit(mut self, limit: usize) -> Self {
        self.exhaustive_limit = limit.min(MAX_EXHAUSTIVE_POOL);
        self
    }

    /// Build tickets in descending order of quality. Fails when not even
    /// one feasible ticket exists.
    pub fn build(
        &self,
        results: &[SimulationResult],
        max_legs_per_ticket: usize,
        correlation_limit: f64,
    ) -> Result<Vec<Ticket>, BuildError> {
        if max_legs_per_ticket < self.min_legs.max(1) {
            return Err(BuildError::InvalidLimits(format!(
                "max legs per ticket {max_legs_per_ticket} is below the minimum of {}",
                self.min_legs.max(1)
            )));
        }
        if !(correlation_limit >= 0.0) {
            return Err(BuildError::InvalidLimits(format!(
                "correlation limit must be non-negative, got {correlation_limit}"
            )));
        }
        if self.max_tickets == 0 {
            return Err(BuildError::InvalidLimits("max tickets must be positive".into()));
        }

        let limits = Limits {
            max_legs: max_legs_per_ticket,
            correlation_limit,
        };

        // Eligible pool: combinations that are feasible tickets on their own,
        // ordered best first.
        let mut scored: Vec<(&SimulationResult, Selection<'_>)> = results
            .iter()
            .filter(|r| r.combination.len() >= self.min_legs)
            .filter_map(|r| self.evaluate(&[r], &[0], limits).map(|s| (r, s)))
            .collect();
        scored.sort_by(|a, b| rank(&a.1, &b.1));
        let mut pool: Vec<&SimulationResult> = scored.into_iter().map(|(r, _)| r).collect();

        debug!(
            results = results.len(),
            eligible = pool.len(),
            max_legs = max_legs_per_ticket,
            correlation_limit,
            "Vertical pool assembled"
        );

        let mut tickets = Vec::new();
        while tickets.len() < self.max_tickets && !pool.is_empty() {
            let selection = if pool.len() <= self.exhaustive_limit {
                self.search_exhaustive(&pool, limits)
            } else {
                self.search_greedy(&pool, limits)
            };
            let Some(selection) = selection else { break };

            let notes = if selection.correlation > 0.0 {
                vec![TicketNote::Correlated]
            } else {
                Vec::new()
            };
            let members: Vec<SimulationResult> =
                selection.members.iter().map(|&i| pool[i].clone()).collect();
            let ticket = Ticket::vertical(members, notes);

            info!(
                ticket_id = %ticket.id,
                lines = ticket.lines.len(),
                legs = selection.legs.len(),
                ev = format!("{:+.4}", ticket.expected_value),
                variance = format!("{:.4}", ticket.variance),
                "Vertical ticket built"
            );
            tickets.push(ticket);

            pool = pool
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !selection.members.contains(i))
                .map(|(_, r)| r)
                .collect();
        }

        if tickets.is_empty() {
            return Err(BuildError::NoFeasibleTicket {
                pool: results.len(),
                max_legs: max_legs_per_ticket,
                correlation_limit,
            });
        }

        Ok(tickets)
    }

    /// Score a member set, or `None` if it violates any constraint.
    fn evaluate<'a>(
        &self,
        pool: &[&'a SimulationResult],
        members: &[usize],
        limits: Limits,
    ) -> Option<Selection<'a>> {
        let mut legs: Vec<&'a Leg> = members
            .iter()
            .flat_map(|&i| pool[i].combination.legs())
            .collect();
        legs.sort_by(|a, b| a.id.cmp(&b.id));
        legs.dedup_by(|a, b| a.id == b.id);

        if legs.len() > limits.max_legs {
            return None;
        }
        for (i, a) in legs.iter().enumerate() {
            if legs[i + 1..].iter().any(|b| a.conflicts_with(b)) {
                return None;
            }
        }
        let correlation = self.correlation.total_pairwise(&legs);
        if correlation > limits.correlation_limit {
            return None;
        }

        Some(Selection {
            members: members.to_vec(),
            expected_value: members.iter().map(|&i| pool[i].expected_value).sum(),
            variance: members.iter().map(|&i| pool[i].payout_variance).sum(),
            legs,
            correlation,
        })
    }

    fn search_exhaustive<'a>(
        &self,
        pool: &[&'a SimulationResult],
        limits: Limits,
    ) -> Option<Selection<'a>> {
        let n = pool.len();
        let mut best: Option<Selection<'a>> = None;
        for mask in 1u32..(1u32 << n) {
            let members: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
            if let Some(candidate) = self.evaluate(pool, &members, limits) {
                if best.as_ref().map_or(true, |b| is_better(&candidate, b)) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn search_greedy<'a>(
        &self,
        pool: &[&'a SimulationResult],
        limits: Limits,
    ) -> Option<Selection<'a>> {
        // Pool is sorted best first and every member is feasible alone.
        let mut best = self.evaluate(pool, &[0], limits)?;

        for i in 1..pool.len() {
            if let Some(candidate) = self.evaluate(pool, &with_member(&best.members, i), limits) {
                if is_better(&candidate, &best) {
                    best = candidate;
                }
            }
        }

        for _ in 0..MAX_IMPROVEMENT_ROUNDS {
            match self.improve(pool, &best, limits) {
                Some(better) => best = better,
                None => break,
            }
        }

        Some(best)
    }

    /// First strictly better neighbour: swap one member out, or add one.
    fn improve<'a>(
        &self,
        pool: &[&'a SimulationResult],
        current: &Selection<'a>,
        limits: Limits,
    ) -> Option<Selection<'a>> {
        for pos in 0..current.members.len() {
            for outside in (0..pool.len()).filter(|i| !current.members.contains(i)) {
                let mut members = current.members.clone();
                members[pos] = outside;
                members.sort_unstable();
                if let Some(candidate) = self.evaluate(pool, &members, limits) {
                    if is_better(&candidate, current) {
                        return Some(candidate);
                    }
                }
            }
        }
        for outside in (0..pool.len()).filter(|i| !current.members.contains(i)) {
            if let Some(candidate) = self.evaluate(pool, &with_member(&current.members, outside), limits) {
                if is_better(&candidate, current) {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

fn with_member(members: &[usize], extra: usize) -> Vec<usize> {
    let mut out = members.to_vec();
    out.push(extra);
    out.sort_unstable();
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
