//! Core engine: the odds → simulation → tickets → stakes pipeline.
//!
//! `Pipeline` carries the validated configuration and threads each stage's
//! output into the next. Every stage returns a typed error; the first
//! failure ends the run and nothing is rendered.

pub mod bankroll;
pub mod simulation;

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::odds::{OddsSource, OddsStore};
use crate::render::SlipRenderer;
use crate::strategy::devig::ProbabilityModel;
use crate::tickets::candidates::{candidates, CandidateRules};
use crate::tickets::horizontal::{HorizontalReport, HorizontalTicketBuilder};
use crate::tickets::vertical::VerticalTicketBuilder;
use crate::types::{LegRecord, PipelineError, Ticket, TicketRecord};
use bankroll::{BankrollAllocator, BankrollState};
use simulation::SimulationEngine;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub legs: usize,
    pub combinations: usize,
    pub verticals: Vec<Ticket>,
    pub horizontal: HorizontalReport,
    /// Allocator state after the last commit.
    pub bankroll: BankrollState,
}

impl PipelineOutput {
    /// Ticket records in builder order: vertical tickets, then funded
    /// horizontal tickets.
    pub fn records(&self) -> Vec<TicketRecord> {
        self.verticals
            .iter()
            .chain(&self.horizontal.tickets)
            .map(Ticket::to_record)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run every stage on one slate of leg records. Identical records and
    /// configuration give identical output.
    pub fn run(&self, records: Vec<LegRecord>) -> Result<PipelineOutput, PipelineError> {
        let cfg = &self.config;
        cfg.correlation.validate()?;

        // -- Odds ------------------------------------------------------------
        let store = OddsStore::from_records(records)?;
        let legs = ProbabilityModel::new().price_legs(&store)?;

        // -- Candidates --------------------------------------------------------
        let rules = CandidateRules {
            min_legs: cfg.vertical.min_legs,
            max_legs: cfg.vertical.max_legs_per_ticket,
            correlation_limit: cfg.vertical.correlation_limit,
            max_candidates: cfg.vertical.max_candidates,
        };
        let combinations = candidates(&legs, &rules, &cfg.correlation)?;

        // -- Simulation --------------------------------------------------------
        let engine = SimulationEngine::new(cfg.simulation.batch_size)?;
        let results = engine.simulate(
            &combinations,
            cfg.simulation.trials,
            cfg.simulation.seed,
            &cfg.correlation,
        )?;

        // -- Tickets -----------------------------------------------------------
        let verticals = VerticalTicketBuilder::new(cfg.correlation.clone())
            .with_min_legs(cfg.vertical.min_legs)
            .with_max_tickets(cfg.vertical.max_tickets)
            .with_exhaustive_limit(cfg.vertical.exhaustive_limit)
            .build(
                &results,
                cfg.vertical.max_legs_per_ticket,
                cfg.vertical.correlation_limit,
            )?;

        let bankroll = BankrollAllocator::new(cfg.bankroll.starting)?;
        let horizontal = HorizontalTicketBuilder::new().build(&verticals, &bankroll, &cfg.staking)?;
        let state = bankroll.snapshot();

        info!(
            legs = legs.len(),
            combinations = combinations.len(),
            vertical = verticals.len(),
            horizontal = horizontal.tickets.len(),
            skipped = horizontal.skipped.len(),
            bankroll = %state,
            "Pipeline complete"
        );

        Ok(PipelineOutput {
            legs: legs.len(),
            combinations: combinations.len(),
            verticals,
            horizontal,
            bankroll: state,
        })
    }

    /// Fetch, run on the blocking pool, then render. The renderer is only
    /// called when every stage succeeded.
    pub async fn execute(
        &self,
        source: &dyn OddsSource,
        renderer: &dyn SlipRenderer,
    ) -> anyhow::Result<PipelineOutput> {
        let records = source.fetch_legs().await.context("Failed to fetch leg records")?;

        let pipeline = self.clone();
        let output = tokio::task::spawn_blocking(move || pipeline.run(records))
            .await
            .context("Pipeline task aborted")??;

        renderer
            .render(&output.records())
            .await
            .context("Failed to render slips")?;

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::correlation::{CorrelationModel, CorrelationScope};
    use crate::types::{BuildError, OddsError, TicketKind, TicketNote};
    use rust_decimal_macros::dec;

    fn slate() -> Vec<LegRecord> {
        vec![
            LegRecord::new("E1", "ml", "home", 1.0 / 0.55),
            LegRecord::new("E1", "ml", "away", 1.0 / 0.45),
            LegRecord::new("E2", "total", "over", 1.0 / 0.60),
            LegRecord::new("E2", "total", "under", 1.0 / 0.40),
        ]
    }

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.simulation.trials = 20_000;
        cfg.simulation.seed = 42;
        cfg.vertical.max_legs_per_ticket = 2;
        cfg
    }

    #[test]
    fn test_run_produces_both_ticket_kinds() {
        let output = Pipeline::new(config()).run(slate()).unwrap();
        assert_eq!(output.legs, 4);
        // Two events with two outcomes each: 4 cross-event pairs
        assert_eq!(output.combinations, 4);
        assert!(!output.verticals.is_empty());
        assert!(output.verticals.iter().all(|t| t.kind == TicketKind::Vertical));
        assert!(output.horizontal.tickets.iter().all(|t| t.kind == TicketKind::Horizontal));

        let records = output.records();
        assert_eq!(records.len(), output.verticals.len() + output.horizontal.tickets.len());
        assert_eq!(records[0].kind, TicketKind::Vertical);
        assert!(output.bankroll.committed <= dec!(1000));
    }

    #[test]
    fn test_run_is_repeatable() {
        let pipeline = Pipeline::new(config());
        let a = pipeline.run(slate()).unwrap();
        let b = pipeline.run(slate()).unwrap();
        assert_eq!(a.records(), b.records());
    }

    #[test]
    fn test_odds_error_surfaces() {
        let mut records = slate();
        records[0].price = None;
        let err = Pipeline::new(config()).run(records).unwrap_err();
        assert!(matches!(err, PipelineError::Odds(OddsError::MissingPrice(_))));
    }

    #[test]
    fn test_single_event_has_no_tickets() {
        let records = vec![
            LegRecord::new("E1", "ml", "home", 1.0 / 0.55),
            LegRecord::new("E1", "ml", "away", 1.0 / 0.45),
        ];
        let err = Pipeline::new(config()).run(records).unwrap_err();
        assert!(matches!(err, PipelineError::Build(BuildError::NoFeasibleTicket { .. })));
    }

    #[test]
    fn test_market_scope_couples_totals_across_events() {
        let records = vec![
            LegRecord::new("E1", "total", "over", 1.0 / 0.55),
            LegRecord::new("E1", "total", "under", 1.0 / 0.45),
            LegRecord::new("E2", "total", "over", 1.0 / 0.60),
            LegRecord::new("E2", "total", "under", 1.0 / 0.40),
        ];
        let mut cfg = config();
        cfg.simulation.trials = 50_000;
        cfg.correlation = CorrelationModel {
            scope: CorrelationScope::Market,
            strength: 1.0,
        };
        cfg.vertical.correlation_limit = 1.0;

        let output = Pipeline::new(cfg).run(records).unwrap();
        assert_eq!(output.verticals.len(), 4);
        for ticket in &output.verticals {
            assert!(ticket.notes.contains(&TicketNote::Correlated));
            let result = &ticket.lines[0].result;
            let fair: Vec<f64> = result.combination.legs().iter().map(|l| l.fair_probability).collect();
            let independent: f64 = fair.iter().product();
            let shared = fair.iter().copied().fold(f64::INFINITY, f64::min);
            // One shared draw per market type: joint = min(p)
            assert!((result.win_probability - shared).abs() < 0.015);
            assert!(result.win_probability > independent + 0.1);
        }
    }
}
