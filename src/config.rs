//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Each
//! section is validated by the stage that consumes it, so a bad value
//! surfaces as that stage's typed error.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::engine::simulation::DEFAULT_BATCH_SIZE;
use crate::render::DEFAULT_SLIP_FILE;
use crate::strategy::correlation::CorrelationModel;
use crate::strategy::staking::StakingPolicy;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub correlation: CorrelationModel,
    pub vertical: VerticalConfig,
    pub bankroll: BankrollConfig,
    pub staking: StakingPolicy,
    pub io: IoConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    pub trials: u64,
    pub seed: u64,
    pub batch_size: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: 100_000,
            seed: 42,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VerticalConfig {
    /// Minimum legs per candidate combination.
    pub min_legs: usize,
    pub max_legs_per_ticket: usize,
    pub correlation_limit: f64,
    pub max_tickets: usize,
    pub max_candidates: usize,
    /// Pools up to this size get an exhaustive search.
    pub exhaustive_limit: usize,
}

impl Default for VerticalConfig {
    fn default() -> Self {
        Self {
            min_legs: 2,
            max_legs_per_ticket: 4,
            correlation_limit: 0.5,
            max_tickets: 5,
            max_candidates: 5_000,
            exhaustive_limit: 12,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BankrollConfig {
    pub starting: Decimal,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self { starting: dec!(1000) }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IoConfig {
    /// JSON array of leg records.
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("legs.json"),
            output: PathBuf::from(DEFAULT_SLIP_FILE),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}
