//! Odds intake.
//!
//! Defines the `OddsSource` trait (the boundary with the cleaning and
//! live-odds merge stages) and the `OddsStore`, an immutable snapshot of
//! the quotes available to one pipeline run.

pub mod file;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{LegId, LegQuote, LegRecord, OddsError};

/// Abstraction over whatever produces normalized leg records.
///
/// Records are assumed de-duplicated and schema-valid; the core only checks
/// price semantics.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch every leg record for this run.
    async fn fetch_legs(&self) -> Result<Vec<LegRecord>>;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only snapshot of the quotes for one run, sorted by leg id.
#[derive(Debug, Clone)]
pub struct OddsStore {
    quotes: Vec<LegQuote>,
}

impl OddsStore {
    /// Build a snapshot from upstream records. Fails on a repeated leg id.
    pub fn from_records(records: Vec<LegRecord>) -> Result<Self, OddsError> {
        let mut quotes: Vec<LegQuote> = records.into_iter().map(LegQuote::from).collect();
        quotes.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(pair) = quotes.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(OddsError::DuplicateLeg(pair[0].id.clone()));
        }

        debug!(legs = quotes.len(), "Odds snapshot taken");

        Ok(Self { quotes })
    }

    pub fn quotes(&self) -> &[LegQuote] {
        &self.quotes
    }

    pub fn get(&self, id: &LegId) -> Option<&LegQuote> {
        self.quotes
            .binary_search_by(|q| q.id.cmp(id))
            .ok()
            .map(|i| &self.quotes[i])
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes grouped by mutually exclusive outcome set (event, market).
    pub fn market_groups(&self) -> BTreeMap<(&str, &str), Vec<&LegQuote>> {
        let mut groups: BTreeMap<(&str, &str), Vec<&LegQuote>> = BTreeMap::new();
        for quote in &self.quotes {
            groups
                .entry((quote.event_id.as_str(), quote.market.as_str()))
                .or_default()
                .push(quote);
        }
        groups
    }
}
