//! JSON file odds source.
//!
//! Reads the merged leg export written by the odds-merge stage: a JSON
//! array of `{event_id, market, selection, price, timestamp}` records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::OddsSource;
use crate::types::LegRecord;

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OddsSource for JsonFileSource {
    async fn fetch_legs(&self) -> Result<Vec<LegRecord>> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read legs from {}", self.path.display()))?;

        let records: Vec<LegRecord> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse legs from {}", self.path.display()))?;

        info!(path = %self.path.display(), legs = records.len(), "Leg records loaded");
        Ok(records)
    }
}
