//! End-to-end pipeline runs against mock collaborators.

use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use slipworks::config::AppConfig;
use slipworks::engine::Pipeline;
use slipworks::odds::file::JsonFileSource;
use slipworks::render::{JsonSlipWriter, SlipRenderer};
use slipworks::strategy::correlation::{CorrelationModel, CorrelationScope};
use slipworks::strategy::staking::{Shortfall, StakingMethod, StakingPolicy};
use slipworks::types::{BuildError, PipelineError, TicketKind, TicketNote, TicketRecord};

use crate::mock_source::MockOddsSource;

mock! {
    pub Renderer {}

    #[async_trait::async_trait]
    impl SlipRenderer for Renderer {
        async fn render(&self, records: &[TicketRecord]) -> anyhow::Result<()>;
    }
}

// ---- helpers ---------------------------------------------------------------

fn base_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.simulation.trials = 100_000;
    cfg.simulation.seed = 42;
    cfg.vertical.max_legs_per_ticket = 2;
    cfg.bankroll.starting = dec!(1000);
    cfg.staking = StakingPolicy {
        method: StakingMethod::FlatPercentage,
        fraction: dec!(0.05),
        max_stake: dec!(50),
        min_stake: dec!(0.01),
        on_shortfall: Shortfall::Reduce,
    };
    cfg
}

fn accepting_renderer(times: usize) -> MockRenderer {
    let mut renderer = MockRenderer::new();
    renderer.expect_render().times(times).returning(|_| Ok(()));
    renderer
}

fn horizontal_stakes(records: &[TicketRecord]) -> Vec<Decimal> {
    records
        .iter()
        .filter(|r| r.kind == TicketKind::Horizontal)
        .map(|r| r.stake)
        .collect()
}

// ---- tests -----------------------------------------------------------------

#[tokio::test]
async fn test_two_event_slate_end_to_end() {
    let source = MockOddsSource::two_event_slate();
    let renderer = accepting_renderer(1);

    let output = Pipeline::new(base_config()).execute(&source, &renderer).await.unwrap();

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(output.legs, 4);
    assert!(!output.verticals.is_empty());

    // Fair probabilities of the candidate legs come straight from the prices
    let fair: Vec<f64> = output.verticals[0].lines[0]
        .result
        .combination
        .legs()
        .iter()
        .map(|l| l.fair_probability)
        .collect();
    assert!(fair.iter().all(|p| [0.55, 0.45, 0.60, 0.40].iter().any(|q| (p - q).abs() < 1e-9)));

    let records = output.records();
    let stakes = horizontal_stakes(&records);
    assert!(!stakes.is_empty());
    assert!(stakes.iter().all(|s| *s <= dec!(50)));
    assert!(stakes.iter().copied().sum::<Decimal>() <= dec!(1000));
    assert_eq!(stakes.iter().copied().sum::<Decimal>(), output.bankroll.committed);
}

#[tokio::test]
async fn test_repeat_runs_identical() {
    let pipeline = Pipeline::new(base_config());
    let source = MockOddsSource::two_event_slate();

    let first = pipeline.execute(&source, &accepting_renderer(1)).await.unwrap();
    let second = pipeline.execute(&source, &accepting_renderer(1)).await.unwrap();

    assert_eq!(first.records(), second.records());
    for (a, b) in first.verticals.iter().zip(&second.verticals) {
        for (x, y) in a.lines.iter().zip(&b.lines) {
            assert_eq!(x.result.win_probability.to_bits(), y.result.win_probability.to_bits());
            assert_eq!(x.result.expected_value.to_bits(), y.result.expected_value.to_bits());
        }
    }
}

#[tokio::test]
async fn test_conflicting_only_slate_fails_without_rendering() {
    let source = MockOddsSource::conflicting_slate();
    let mut renderer = MockRenderer::new();
    renderer.expect_render().never();

    let err = Pipeline::new(base_config()).execute(&source, &renderer).await.unwrap_err();
    let pipeline_err = err.downcast_ref::<PipelineError>().expect("typed pipeline error");
    assert!(matches!(
        pipeline_err,
        PipelineError::Build(BuildError::NoFeasibleTicket { pool: 0, max_legs: 2, .. })
    ));
}

#[tokio::test]
async fn test_source_failure_skips_rendering() {
    let source = MockOddsSource::two_event_slate();
    source.set_error("feed unavailable");
    let mut renderer = MockRenderer::new();
    renderer.expect_render().never();

    let err = Pipeline::new(base_config()).execute(&source, &renderer).await.unwrap_err();
    assert!(format!("{err:#}").contains("feed unavailable"));
}

#[tokio::test]
async fn test_renderer_failure_propagates() {
    let source = MockOddsSource::two_event_slate();
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("disk full")));

    let err = Pipeline::new(base_config()).execute(&source, &renderer).await.unwrap_err();
    assert!(format!("{err:#}").contains("disk full"));
}

#[tokio::test]
async fn test_renderer_receives_builder_order() {
    let source = MockOddsSource::two_event_slate();
    let mut renderer = MockRenderer::new();
    renderer
        .expect_render()
        .withf(|records| {
            let first_horizontal = records.iter().position(|r| r.kind == TicketKind::Horizontal);
            match first_horizontal {
                Some(i) => records[i..].iter().all(|r| r.kind == TicketKind::Horizontal),
                None => true,
            }
        })
        .times(1)
        .returning(|_| Ok(()));

    Pipeline::new(base_config()).execute(&source, &renderer).await.unwrap();
}

#[tokio::test]
async fn test_kelly_never_exceeds_bankroll() {
    let mut cfg = base_config();
    cfg.staking = StakingPolicy {
        method: StakingMethod::FractionalKelly,
        fraction: dec!(1),
        max_stake: dec!(1000),
        min_stake: dec!(0.01),
        on_shortfall: Shortfall::Reduce,
    };
    cfg.correlation = CorrelationModel {
        scope: CorrelationScope::Event,
        strength: 0.8,
    };
    cfg.vertical.correlation_limit = 1.0;

    let source = MockOddsSource::same_event_slate();
    let output = Pipeline::new(cfg).execute(&source, &accepting_renderer(1)).await.unwrap();

    let stakes = horizontal_stakes(&output.records());
    assert!(stakes.iter().copied().sum::<Decimal>() <= dec!(1000));
    assert!(output.bankroll.is_consistent());
    assert_eq!(
        output.horizontal.tickets.len() + output.horizontal.skipped.len(),
        output.verticals.len()
    );
}

#[tokio::test]
async fn test_same_event_correlation_lifts_joint_probability() {
    let mut cfg = base_config();
    cfg.correlation = CorrelationModel {
        scope: CorrelationScope::Event,
        strength: 0.8,
    };
    cfg.vertical.correlation_limit = 1.0;

    let source = MockOddsSource::same_event_slate();
    let output = Pipeline::new(cfg).execute(&source, &accepting_renderer(1)).await.unwrap();

    let ticket = &output.verticals[0];
    assert!(ticket.notes.contains(&TicketNote::Correlated));
    let result = &ticket.lines[0].result;
    let independent: f64 = result.combination.legs().iter().map(|l| l.fair_probability).product();
    assert!(result.win_probability > independent + 0.05);
    // Correlated same-event pairs are priced as if independent, so they carry an edge
    assert!(ticket.expected_value > 0.0);
}

#[tokio::test]
async fn test_correlation_limit_blocks_same_event_pairs() {
    let mut cfg = base_config();
    cfg.correlation = CorrelationModel {
        scope: CorrelationScope::Event,
        strength: 0.8,
    };
    cfg.vertical.correlation_limit = 0.5;

    let source = MockOddsSource::same_event_slate();
    let mut renderer = MockRenderer::new();
    renderer.expect_render().never();

    let err = Pipeline::new(cfg).execute(&source, &renderer).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Build(BuildError::NoFeasibleTicket { .. }))
    ));
}

#[tokio::test]
async fn test_file_adapters_round_trip() {
    let dir = std::env::temp_dir().join(format!("slipworks_it_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("legs.json");
    let output_path = dir.join("slips.json");

    let legs = MockOddsSource::two_event_slate();
    let records = slipworks::odds::OddsSource::fetch_legs(&legs).await.unwrap();
    std::fs::write(&input, serde_json::to_string(&records).unwrap()).unwrap();

    let output = Pipeline::new(base_config())
        .execute(&JsonFileSource::new(&input), &JsonSlipWriter::new(&output_path))
        .await
        .unwrap();

    let written: Vec<TicketRecord> =
        serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
    let expected = output.records();
    assert_eq!(written.len(), expected.len());
    for (w, e) in written.iter().zip(&expected) {
        assert_eq!(w.ticket_id, e.ticket_id);
        assert_eq!(w.kind, e.kind);
        assert_eq!(w.legs, e.legs);
        assert_eq!(w.stake, e.stake);
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
