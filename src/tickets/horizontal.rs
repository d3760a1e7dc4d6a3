//! Horizontal ticket builder.
//!
//! Funds vertical tickets in builder order. Each ticket's stake comes from
//! the staking policy against the starting bankroll, is reserved on the
//! allocator, then committed. A shortfall either skips the ticket or funds
//! it with what is left, depending on the policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::bankroll::BankrollAllocator;
use crate::strategy::staking::{to_cents, Shortfall, StakingPolicy};
use crate::types::{AllocationError, BuildError, PipelineError, Ticket, TicketKind, TicketNote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The policy's stake was zero or under the minimum.
    BelowMinimum,
    /// The bankroll could not cover the stake and the policy says skip,
    /// or what was left fell under the minimum.
    InsufficientBankroll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicket {
    pub ticket_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HorizontalReport {
    pub tickets: Vec<Ticket>,
    pub skipped: Vec<SkippedTicket>,
    pub committed: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HorizontalTicketBuilder;

impl HorizontalTicketBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        verticals: &[Ticket],
        bankroll: &BankrollAllocator,
        policy: &StakingPolicy,
    ) -> Result<HorizontalReport, PipelineError> {
        policy.validate()?;
        if let Some(t) = verticals.iter().find(|t| t.kind != TicketKind::Vertical) {
            return Err(BuildError::NotVertical(t.id.clone()).into());
        }

        let starting = bankroll.balance();
        let mut report = HorizontalReport::default();

        for vertical in verticals {
            let Some(plan) = policy.plan(vertical, starting) else {
                report.skipped.push(SkippedTicket {
                    ticket_id: vertical.id.clone(),
                    reason: SkipReason::BelowMinimum,
                });
                continue;
            };

            let mut notes = Vec::new();
            if plan.capped {
                notes.push(TicketNote::Capped);
            }

            let (plan, handle) = match bankroll.reserve(plan.total()) {
                Ok(handle) => (plan, handle),
                Err(AllocationError::InsufficientBankroll { requested, available }) => {
                    let budget = to_cents(available);
                    if policy.on_shortfall == Shortfall::Skip
                        || budget <= Decimal::ZERO
                        || budget < policy.min_stake
                    {
                        warn!(
                            ticket_id = %vertical.id,
                            requested = format!("${:.2}", requested),
                            available = format!("${:.2}", available),
                            "Bankroll short, ticket skipped"
                        );
                        report.skipped.push(SkippedTicket {
                            ticket_id: vertical.id.clone(),
                            reason: SkipReason::InsufficientBankroll,
                        });
                        continue;
                    }

                    let reduced = plan.scaled_to(budget);
                    if reduced.total() <= Decimal::ZERO || reduced.total() < policy.min_stake {
                        report.skipped.push(SkippedTicket {
                            ticket_id: vertical.id.clone(),
                            reason: SkipReason::InsufficientBankroll,
                        });
                        continue;
                    }
                    info!(
                        ticket_id = %vertical.id,
                        requested = format!("${:.2}", requested),
                        reduced = format!("${:.2}", reduced.total()),
                        "Stake reduced to remaining bankroll"
                    );
                    notes.push(TicketNote::Reduced);
                    let handle = bankroll.reserve(reduced.total())?;
                    (reduced, handle)
                }
                Err(e) => return Err(e.into()),
            };

            let committed = bankroll.commit(handle)?;
            report.committed += committed;

            let ticket = Ticket::horizontal(vertical, &plan.line_stakes, notes);
            debug!(
                ticket_id = %ticket.id,
                source = %vertical.id,
                stake = format!("${:.2}", ticket.stake),
                ev = format!("{:+.2}", ticket.expected_value),
                "Horizontal ticket funded"
            );
            report.tickets.push(ticket);
        }

        info!(
            funded = report.tickets.len(),
            skipped = report.skipped.len(),
            committed = format!("${:.2}", report.committed),
            remaining = format!("${:.2}", bankroll.available()),
            "Horizontal tickets built"
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::staking::StakingMethod;
    use crate::types::tests::{leg, result};
    use rust_decimal_macros::dec;

    fn vertical(event: &str, p: f64, ev: f64) -> Ticket {
        let legs = vec![
            leg(&format!("{event}a"), "ml", "home", 2.0, 0.5),
            leg(&format!("{event}b"), "ml", "home", 2.0, 0.5),
        ];
        Ticket::vertical(vec![result(legs, p, ev, 1.0)], vec![])
    }

    fn flat(fraction: Decimal, max_stake: Decimal, on_shortfall: Shortfall) -> StakingPolicy {
        StakingPolicy {
            method: StakingMethod::FlatPercentage,
            fraction,
            max_stake,
            min_stake: dec!(0.01),
            on_shortfall,
        }
    }

    #[test]
    fn test_flat_stakes_within_cap_and_bankroll() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let verticals: Vec<Ticket> = (0..5).map(|i| vertical(&format!("E{i}"), 0.25, 0.0)).collect();
        let report = HorizontalTicketBuilder::new()
            .build(&verticals, &bankroll, &flat(dec!(0.05), dec!(50), Shortfall::Reduce))
            .unwrap();

        assert_eq!(report.tickets.len(), 5);
        assert!(report.tickets.iter().all(|t| t.stake == dec!(50)));
        assert!(report.tickets.iter().all(|t| t.kind == TicketKind::Horizontal));
        assert_eq!(report.committed, dec!(250));
        assert_eq!(bankroll.snapshot().committed, dec!(250));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_cap_applied_and_noted() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let report = HorizontalTicketBuilder::new()
            .build(&[vertical("E", 0.25, 0.0)], &bankroll, &flat(dec!(0.10), dec!(40), Shortfall::Reduce))
            .unwrap();
        assert_eq!(report.tickets[0].stake, dec!(40));
        assert!(report.tickets[0].notes.contains(&TicketNote::Capped));
    }

    #[test]
    fn test_shortfall_reduce() {
        let bankroll = BankrollAllocator::new(dec!(100)).unwrap();
        let verticals = vec![vertical("A", 0.25, 0.0), vertical("B", 0.25, 0.0), vertical("C", 0.25, 0.0)];
        // 40% of 100 per ticket: 40, 40, then only 20 left
        let report = HorizontalTicketBuilder::new()
            .build(&verticals, &bankroll, &flat(dec!(0.40), dec!(100), Shortfall::Reduce))
            .unwrap();

        let stakes: Vec<Decimal> = report.tickets.iter().map(|t| t.stake).collect();
        assert_eq!(stakes, vec![dec!(40), dec!(40), dec!(20)]);
        assert!(report.tickets[2].notes.contains(&TicketNote::Reduced));
        assert_eq!(report.committed, dec!(100));
        assert_eq!(bankroll.available(), Decimal::ZERO);
    }

    #[test]
    fn test_shortfall_skip() {
        let bankroll = BankrollAllocator::new(dec!(100)).unwrap();
        let verticals = vec![vertical("A", 0.25, 0.0), vertical("B", 0.25, 0.0), vertical("C", 0.25, 0.0)];
        let report = HorizontalTicketBuilder::new()
            .build(&verticals, &bankroll, &flat(dec!(0.40), dec!(100), Shortfall::Skip))
            .unwrap();

        assert_eq!(report.tickets.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::InsufficientBankroll);
        assert_eq!(report.skipped[0].ticket_id, verticals[2].id);
        assert_eq!(bankroll.available(), dec!(20));
    }

    #[test]
    fn test_kelly_skips_negative_edge() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let policy = StakingPolicy {
            method: StakingMethod::FractionalKelly,
            fraction: dec!(0.5),
            max_stake: dec!(1000),
            min_stake: dec!(0.01),
            on_shortfall: Shortfall::Skip,
        };
        // Price 4.0: p = 0.30 has an edge, p = 0.20 does not
        let verticals = vec![vertical("A", 0.30, 0.2), vertical("B", 0.20, -0.2)];
        let report = HorizontalTicketBuilder::new().build(&verticals, &bankroll, &policy).unwrap();

        assert_eq!(report.tickets.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::BelowMinimum);
        // kelly = (3 × 0.3 − 0.7) / 3 = 0.0667; half of it on 1000 = 33.33
        assert_eq!(report.tickets[0].stake, dec!(33.33));
        assert!(report.committed <= dec!(1000));
    }

    #[test]
    fn test_horizontal_figures_in_currency() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let report = HorizontalTicketBuilder::new()
            .build(&[vertical("A", 0.25, 0.1)], &bankroll, &flat(dec!(0.02), dec!(50), Shortfall::Skip))
            .unwrap();
        let t = &report.tickets[0];
        assert_eq!(t.stake, dec!(20));
        assert!((t.expected_value - 2.0).abs() < 1e-9);
        assert!((t.variance - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_vertical_input() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let policy = flat(dec!(0.05), dec!(50), Shortfall::Skip);
        let source = vertical("A", 0.25, 0.0);
        let funded = Ticket::horizontal(&source, &[dec!(10)], vec![]);
        let err = HorizontalTicketBuilder::new().build(&[funded.clone()], &bankroll, &policy).unwrap_err();
        assert_eq!(err, PipelineError::Build(BuildError::NotVertical(funded.id)));
        assert_eq!(bankroll.snapshot().committed, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_policy() {
        let bankroll = BankrollAllocator::new(dec!(1000)).unwrap();
        let policy = flat(dec!(1.5), dec!(50), Shortfall::Skip);
        let err = HorizontalTicketBuilder::new().build(&[], &bankroll, &policy).unwrap_err();
        assert!(matches!(err, PipelineError::Build(BuildError::InvalidPolicy(_))));
    }

    #[test]
    fn test_total_committed_never_exceeds_bankroll() {
        for (fraction, shortfall) in [
            (dec!(0.05), Shortfall::Reduce),
            (dec!(0.33), Shortfall::Reduce),
            (dec!(0.33), Shortfall::Skip),
            (dec!(1), Shortfall::Reduce),
        ] {
            let bankroll = BankrollAllocator::new(dec!(250)).unwrap();
            let verticals: Vec<Ticket> = (0..12).map(|i| vertical(&format!("E{i}"), 0.3, 0.1)).collect();
            let report = HorizontalTicketBuilder::new()
                .build(&verticals, &bankroll, &flat(fraction, dec!(1000), shortfall))
                .unwrap();
            let total: Decimal = report.tickets.iter().map(|t| t.stake).sum();
            assert!(total <= dec!(250));
            assert_eq!(total, report.committed);
            assert!(bankroll.snapshot().is_consistent());
        }
    }
}
