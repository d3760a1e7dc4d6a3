//! Shared types for the SLIPWORKS core.
//!
//! These types form the data model used across all stages. Upstream leg
//! records come in, ticket records go out; everything in between is owned
//! by the core and immutable once produced.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Leg records (upstream boundary)
// ---------------------------------------------------------------------------

/// A normalized leg record as handed over by the cleaning/odds-merge stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegRecord {
    pub event_id: String,
    pub market: String,
    pub selection: String,
    /// Offered decimal odds. `None` when the merge produced no live price.
    pub price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LegRecord {
    pub fn new(event_id: &str, market: &str, selection: &str, price: f64) -> Self {
        Self {
            event_id: event_id.to_string(),
            market: market.to_string(),
            selection: selection.to_string(),
            price: Some(price),
            timestamp: Utc::now(),
        }
    }
}

/// Stable leg identifier: `event/market/selection`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegId(String);

impl LegId {
    pub fn from_parts(event_id: &str, market: &str, selection: &str) -> Self {
        Self(format!("{event_id}/{market}/{selection}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An offered quote held by the odds store (no fair probability yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegQuote {
    pub id: LegId,
    pub event_id: String,
    pub market: String,
    pub selection: String,
    pub price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<LegRecord> for LegQuote {
    fn from(record: LegRecord) -> Self {
        Self {
            id: LegId::from_parts(&record.event_id, &record.market, &record.selection),
            event_id: record.event_id,
            market: record.market,
            selection: record.selection,
            price: record.price,
            timestamp: record.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Leg & Combination
// ---------------------------------------------------------------------------

/// A priced leg with its de-vigged fair probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: LegId,
    pub event_id: String,
    pub market: String,
    pub selection: String,
    /// Decimal odds, always > 1.0.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Fair win probability in [0, 1].
    pub fair_probability: f64,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.2} (fair {:.1}%)",
            self.id,
            self.price,
            self.fair_probability * 100.0,
        )
    }
}

impl Leg {
    /// Two legs conflict when they are different selections of the same
    /// event market: at most one of them can win.
    pub fn conflicts_with(&self, other: &Leg) -> bool {
        self.event_id == other.event_id
            && self.market == other.market
            && self.selection != other.selection
    }
}

/// Ordered, duplicate-free set of legs wagered together as one parlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    legs: Vec<Leg>,
}

impl Combination {
    /// Build a combination. Legs are sorted by id; duplicates and
    /// conflicting pairs are rejected.
    pub fn new(mut legs: Vec<Leg>) -> Result<Self, BuildError> {
        legs.sort_by(|a, b| a.id.cmp(&b.id));
        for (i, a) in legs.iter().enumerate() {
            for b in &legs[i + 1..] {
                if a.id == b.id {
                    return Err(BuildError::InvalidCombination(format!(
                        "duplicate leg {}",
                        a.id
                    )));
                }
                if a.conflicts_with(b) {
                    return Err(BuildError::InvalidCombination(format!(
                        "conflicting legs {} and {}",
                        a.id, b.id
                    )));
                }
            }
        }
        Ok(Self { legs })
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Parlay price: product of the legs' decimal odds.
    pub fn combined_price(&self) -> f64 {
        self.legs.iter().map(|l| l.price).product()
    }

    pub fn leg_ids(&self) -> impl Iterator<Item = &LegId> {
        self.legs.iter().map(|l| &l.id)
    }

    /// Canonical key (`id+id+...`), stable across runs.
    pub fn key(&self) -> String {
        self.legs
            .iter()
            .map(|l| l.id.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] @ {:.2}", self.key(), self.combined_price())
    }
}

// ---------------------------------------------------------------------------
// Simulation result
// ---------------------------------------------------------------------------

/// Monte Carlo estimate for one combination. All money figures are per
/// unit stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub combination: Combination,
    pub win_probability: f64,
    /// Mean payout minus the unit stake.
    pub expected_value: f64,
    /// Population variance of the per-trial payout.
    pub payout_variance: f64,
    pub trials: u64,
    pub seed: u64,
}

impl fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} P={:.2}% EV={:+.4} var={:.4} (n={}, seed={})",
            self.combination,
            self.win_probability * 100.0,
            self.expected_value,
            self.payout_variance,
            self.trials,
            self.seed,
        )
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    Vertical,
    Horizontal,
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketKind::Vertical => write!(f, "vertical"),
            TicketKind::Horizontal => write!(f, "horizontal"),
        }
    }
}

/// How a ticket came to look the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketNote {
    /// Contains legs that share a correlation group.
    Correlated,
    /// Stake was cut to the per-ticket maximum.
    Capped,
    /// Stake was reduced to fit the remaining bankroll.
    Reduced,
}

/// One member combination of a ticket with its assigned stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketLine {
    pub result: SimulationResult,
    pub stake: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub kind: TicketKind,
    pub lines: Vec<TicketLine>,
    pub stake: Decimal,
    /// Vertical: sum of the lines' per-unit EV.
    /// Horizontal: expected profit in currency at the assigned stakes.
    pub expected_value: f64,
    /// Probability that at least one line wins, treating lines as independent.
    pub probability: f64,
    /// Vertical: sum of the lines' per-unit payout variance.
    /// Horizontal: payout variance in currency² at the assigned stakes.
    pub variance: f64,
    pub notes: Vec<TicketNote>,
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} lines={} stake=${:.2} EV={:+.4} P={:.2}%",
            self.kind,
            self.id,
            self.lines.len(),
            self.stake,
            self.expected_value,
            self.probability * 100.0,
        )
    }
}

/// Namespace for deterministic ticket ids.
const TICKET_NAMESPACE: Uuid = Uuid::from_u128(0x5b1f_0a3e_9c4d_4e21_8f7a_2d6c_13e0_b947);

impl Ticket {
    /// Build an unfunded vertical ticket from its member results.
    pub fn vertical(results: Vec<SimulationResult>, notes: Vec<TicketNote>) -> Self {
        let keys: Vec<String> = results.iter().map(|r| r.combination.key()).collect();
        let id = Uuid::new_v5(&TICKET_NAMESPACE, format!("vertical|{}", keys.join("|")).as_bytes());

        let expected_value = results.iter().map(|r| r.expected_value).sum();
        let variance = results.iter().map(|r| r.payout_variance).sum();
        let probability = any_line_probability(results.iter().map(|r| r.win_probability));

        Self {
            id: id.to_string(),
            kind: TicketKind::Vertical,
            lines: results
                .into_iter()
                .map(|result| TicketLine { result, stake: Decimal::ZERO })
                .collect(),
            stake: Decimal::ZERO,
            expected_value,
            probability,
            variance,
            notes,
        }
    }

    /// Fund a vertical ticket: one stake per line, in line order.
    pub fn horizontal(source: &Ticket, line_stakes: &[Decimal], mut notes: Vec<TicketNote>) -> Self {
        let id = Uuid::new_v5(&TICKET_NAMESPACE, format!("horizontal|{}", source.id).as_bytes());

        let lines: Vec<TicketLine> = source
            .lines
            .iter()
            .zip(line_stakes)
            .map(|(line, stake)| TicketLine {
                result: line.result.clone(),
                stake: *stake,
            })
            .collect();

        let stake = lines.iter().map(|l| l.stake).sum();
        let expected_value = lines
            .iter()
            .map(|l| l.stake.to_f64().unwrap_or(0.0) * l.result.expected_value)
            .sum();
        let variance = lines
            .iter()
            .map(|l| {
                let s = l.stake.to_f64().unwrap_or(0.0);
                s * s * l.result.payout_variance
            })
            .sum();

        for note in &source.notes {
            if !notes.contains(note) {
                notes.push(*note);
            }
        }

        Self {
            id: id.to_string(),
            kind: TicketKind::Horizontal,
            lines,
            stake,
            expected_value,
            probability: source.probability,
            variance,
            notes,
        }
    }

    /// Union of all leg ids across lines, sorted.
    pub fn leg_ids(&self) -> Vec<&LegId> {
        let mut ids: Vec<&LegId> = self
            .lines
            .iter()
            .flat_map(|l| l.result.combination.leg_ids())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn to_record(&self) -> TicketRecord {
        TicketRecord {
            ticket_id: self.id.clone(),
            kind: self.kind,
            legs: self.leg_ids().into_iter().map(|id| id.to_string()).collect(),
            lines: self
                .lines
                .iter()
                .map(|l| LineRecord {
                    legs: l.result.combination.leg_ids().map(|id| id.to_string()).collect(),
                    price: l.result.combination.combined_price(),
                    stake: l.stake,
                })
                .collect(),
            stake: self.stake,
            expected_value: self.expected_value,
            probability: self.probability,
            variance: self.variance,
            notes: self.notes.clone(),
        }
    }
}

fn any_line_probability(probabilities: impl Iterator<Item = f64>) -> f64 {
    1.0 - probabilities.map(|p| 1.0 - p).product::<f64>()
}

// ---------------------------------------------------------------------------
// Ticket records (downstream boundary)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: String,
    pub kind: TicketKind,
    pub legs: Vec<String>,
    pub lines: Vec<LineRecord>,
    pub stake: Decimal,
    pub expected_value: f64,
    pub probability: f64,
    pub variance: f64,
    pub notes: Vec<TicketNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub legs: Vec<String>,
    pub price: f64,
    pub stake: Decimal,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Malformed prices or markets that cannot be de-vigged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OddsError {
    #[error("Missing price for leg {0}")]
    MissingPrice(LegId),

    #[error("Non-positive price {price} for leg {leg}")]
    NonPositivePrice { leg: LegId, price: f64 },

    #[error("Unpayable price {price} for leg {leg}: decimal odds must exceed 1.0")]
    UnpayablePrice { leg: LegId, price: f64 },

    #[error("Market {event_id}/{market} cannot be normalized: {outcomes} outcome(s)")]
    Unnormalizable {
        event_id: String,
        market: String,
        outcomes: usize,
    },

    #[error("Duplicate leg {0}")]
    DuplicateLeg(LegId),
}

/// Invalid trial configuration or input combination.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("Trial count must be positive")]
    ZeroTrials,

    #[error("Batch size must be positive")]
    ZeroBatchSize,

    #[error("Combination #{0} is empty")]
    EmptyCombination(usize),

    #[error("Correlation strength {0} is outside [0, 1]")]
    InvalidCorrelation(f64),

    #[error("Leg {leg} has probability {probability} outside [0, 1]")]
    InvalidProbability { leg: LegId, probability: f64 },
}

/// Bankroll reservation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    #[error("Insufficient bankroll: requested ${requested:.2}, available ${available:.2}")]
    InsufficientBankroll { requested: Decimal, available: Decimal },

    #[error("Reservation amount must be positive, got ${0:.2}")]
    InvalidAmount(Decimal),

    #[error("Starting balance must be non-negative, got ${0:.2}")]
    InvalidBalance(Decimal),

    #[error("Reservation #{0} is not outstanding on this bankroll")]
    UnknownReservation(u64),
}

/// No feasible ticket, or invalid builder input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("No feasible ticket among {pool} candidate(s) (max legs {max_legs}, correlation limit {correlation_limit})")]
    NoFeasibleTicket {
        pool: usize,
        max_legs: usize,
        correlation_limit: f64,
    },

    #[error("Invalid ticket limits: {0}")]
    InvalidLimits(String),

    #[error("Invalid combination: {0}")]
    InvalidCombination(String),

    #[error("Invalid staking policy: {0}")]
    InvalidPolicy(String),

    #[error("Ticket {0} is not a vertical ticket")]
    NotVertical(String),
}

/// Any stage failure, surfaced to the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Odds(#[from] OddsError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
