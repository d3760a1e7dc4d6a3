//! Slip rendering.
//!
//! The pipeline hands finished ticket records to a `SlipRenderer`. The
//! bundled writer persists them as a pretty-printed JSON array; other
//! formats plug in behind the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::TicketRecord;

/// Downstream consumer of ticket records, called once per successful run.
#[async_trait]
pub trait SlipRenderer: Send + Sync {
    async fn render(&self, records: &[TicketRecord]) -> Result<()>;
}

/// Default output file.
pub const DEFAULT_SLIP_FILE: &str = "slips.json";

pub struct JsonSlipWriter {
    path: PathBuf,
}

impl JsonSlipWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SlipRenderer for JsonSlipWriter {
    async fn render(&self, records: &[TicketRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records).context("Failed to serialise ticket records")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write slips to {}", self.path.display()))?;

        info!(path = %self.path.display(), tickets = records.len(), "Slips written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
