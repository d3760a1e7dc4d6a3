//! Staking policies.
//!
//! Computes a target stake per ticket line using either a flat percentage
//! of the starting bankroll or fractional Kelly, then applies the
//! per-ticket cap and the minimum stake.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{BuildError, Ticket};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StakingMethod {
    /// `fraction` × starting bankroll per ticket, split evenly across lines.
    FlatPercentage,
    /// `fraction` × full Kelly × starting bankroll per line.
    FractionalKelly,
}

/// What to do when the bankroll cannot cover a ticket's target stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shortfall {
    Skip,
    /// Fund with whatever is left, scaling every line proportionally.
    Reduce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingPolicy {
    pub method: StakingMethod,
    /// Percentage (flat) or Kelly multiplier, in (0, 1].
    pub fraction: Decimal,
    /// Maximum total stake per ticket.
    pub max_stake: Decimal,
    /// Tickets whose stake would fall below this are not funded.
    #[serde(default = "default_min_stake")]
    pub min_stake: Decimal,
    pub on_shortfall: Shortfall,
}

fn default_min_stake() -> Decimal {
    dec!(0.01)
}

impl Default for StakingPolicy {
    fn default() -> Self {
        Self {
            method: StakingMethod::FlatPercentage,
            fraction: dec!(0.05),  // 5% of bankroll per ticket
            max_stake: dec!(50),
            min_stake: dec!(0.01),
            on_shortfall: Shortfall::Reduce,
        }
    }
}

// ---------------------------------------------------------------------------
// Stake plan
// ---------------------------------------------------------------------------

/// Target stakes for one ticket, before reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct StakePlan {
    pub line_stakes: Vec<Decimal>,
    /// True when the per-ticket maximum cut the stake.
    pub capped: bool,
}

impl StakePlan {
    pub fn total(&self) -> Decimal {
        self.line_stakes.iter().copied().sum()
    }

    /// Scale every line so the total does not exceed `budget`.
    pub fn scaled_to(&self, budget: Decimal) -> StakePlan {
        StakePlan {
            line_stakes: scale_to(&self.line_stakes, budget),
            capped: self.capped,
        }
    }
}

/// Round a money amount down to cents.
pub fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

fn scale_to(stakes: &[Decimal], budget: Decimal) -> Vec<Decimal> {
    let total: Decimal = stakes.iter().copied().sum();
    if total <= budget || total.is_zero() {
        return stakes.to_vec();
    }
    stakes.iter().map(|s| to_cents(*s * budget / total)).collect()
}

/// Full Kelly fraction for a binary bet at decimal odds `price` with win
/// probability `p`: f* = (b·p − q) / b, b = price − 1.
pub fn kelly_fraction(p: f64, price: f64) -> f64 {
    let b = price - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    (b * p - (1.0 - p)) / b
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

impl StakingPolicy {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.fraction <= Decimal::ZERO || self.fraction > Decimal::ONE {
            return Err(BuildError::InvalidPolicy(format!(
                "fraction must be in (0, 1], got {}",
                self.fraction
            )));
        }
        if self.max_stake <= Decimal::ZERO {
            return Err(BuildError::InvalidPolicy(format!(
                "max_stake must be positive, got {}",
                self.max_stake
            )));
        }
        if self.min_stake < Decimal::ZERO || self.min_stake > self.max_stake {
            return Err(BuildError::InvalidPolicy(format!(
                "min_stake must be in [0, max_stake], got {}",
                self.min_stake
            )));
        }
        Ok(())
    }

    /// Target stakes for every line of `ticket` given the starting bankroll.
    /// Returns `None` when the ticket should not be funded at all.
    pub fn plan(&self, ticket: &Ticket, bankroll: Decimal) -> Option<StakePlan> {
        if bankroll <= Decimal::ZERO || ticket.lines.is_empty() {
            return None;
        }

        let raw: Vec<Decimal> = match self.method {
            StakingMethod::FlatPercentage => {
                let per_line = self.fraction * bankroll / Decimal::from(ticket.lines.len());
                vec![to_cents(per_line); ticket.lines.len()]
            }
            StakingMethod::FractionalKelly => ticket
                .lines
                .iter()
                .map(|line| {
                    let kelly = kelly_fraction(
                        line.result.win_probability,
                        line.result.combination.combined_price(),
                    );
                    let kelly = Decimal::from_f64(kelly.max(0.0)).unwrap_or(Decimal::ZERO);
                    to_cents(kelly * self.fraction * bankroll)
                })
                .collect(),
        };

        let raw_total: Decimal = raw.iter().copied().sum();
        let line_stakes = scale_to(&raw, self.max_stake);
        let plan = StakePlan {
            capped: raw_total > self.max_stake,
            line_stakes,
        };

        let total = plan.total();
        if total.is_zero() || total < self.min_stake {
            debug!(
                ticket_id = %ticket.id,
                target = format!("${:.2}", total),
                min = format!("${:.2}", self.min_stake),
                "Stake below minimum"
            );
            return None;
        }

        debug!(
            ticket_id = %ticket.id,
            method = ?self.method,
            stake = format!("${:.2}", total),
            capped = plan.capped,
            "Ticket staked"
        );

        Some(plan)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
