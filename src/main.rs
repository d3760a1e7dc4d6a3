//! SLIPWORKS: Monte Carlo parlay simulation and ticket construction
//!
//! Entry point. Loads configuration, initialises structured logging, reads
//! the leg export, runs the pipeline once, and writes the slips.

use anyhow::Result;
use tracing::{error, info};

use slipworks::config;
use slipworks::engine::Pipeline;
use slipworks::odds::file::JsonFileSource;
use slipworks::render::JsonSlipWriter;

const BANNER: &str = r#"
 ____  _     ___ ______        _____  ____  _  ______
/ ___|| |   |_ _|  _ \ \      / / _ \|  _ \| |/ / ___|
\___ \| |    | || |_) \ \ /\ / / | | | |_) | ' /\___ \
 ___) | |___ | ||  __/ \ V  V /| |_| |  _ <| . \ ___) |
|____/|_____|___|_|     \_/\_/  \___/|_| \_\_|\_\____/

  Monte Carlo parlays, vertical and horizontal tickets
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    println!("{BANNER}");
    info!(
        config = %config_path,
        trials = cfg.simulation.trials,
        seed = cfg.simulation.seed,
        bankroll = format!("${:.2}", cfg.bankroll.starting),
        method = ?cfg.staking.method,
        "SLIPWORKS starting up"
    );

    let source = JsonFileSource::new(&cfg.io.input);
    let writer = JsonSlipWriter::new(&cfg.io.output);
    let pipeline = Pipeline::new(cfg);

    match pipeline.execute(&source, &writer).await {
        Ok(output) => {
            info!(
                vertical = output.verticals.len(),
                horizontal = output.horizontal.tickets.len(),
                skipped = output.horizontal.skipped.len(),
                committed = format!("${:.2}", output.bankroll.committed),
                available = format!("${:.2}", output.bankroll.available()),
                output = %writer.path().display(),
                "Run complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "Run failed, no slips written");
            Err(e)
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("slipworks=info"));

    let json_logging = std::env::var("SLIPWORKS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
