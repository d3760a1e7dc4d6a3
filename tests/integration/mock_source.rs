//! Mock odds source for integration testing.
//!
//! Serves a fixed slate of leg records from memory and counts fetches.
//! A forced error makes every fetch fail, as an unreachable feed would.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use slipworks::odds::OddsSource;
use slipworks::types::LegRecord;

pub struct MockOddsSource {
    records: Vec<LegRecord>,
    fetches: Arc<Mutex<usize>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockOddsSource {
    pub fn new(records: Vec<LegRecord>) -> Self {
        Self {
            records,
            fetches: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Two events, two markets: E1 moneyline (0.55 / 0.45) and E2 total
    /// (0.60 / 0.40), priced without margin.
    pub fn two_event_slate() -> Self {
        Self::new(vec![
            record("E1", "moneyline", "home", 1.0 / 0.55),
            record("E1", "moneyline", "away", 1.0 / 0.45),
            record("E2", "total", "over", 1.0 / 0.60),
            record("E2", "total", "under", 1.0 / 0.40),
        ])
    }

    /// Both markets on one event, so every cross-market pair is correlated.
    pub fn same_event_slate() -> Self {
        Self::new(vec![
            record("E1", "moneyline", "home", 1.0 / 0.55),
            record("E1", "moneyline", "away", 1.0 / 0.45),
            record("E1", "total", "over", 1.0 / 0.60),
            record("E1", "total", "under", 1.0 / 0.40),
        ])
    }

    /// One market only: every pair of legs conflicts.
    pub fn conflicting_slate() -> Self {
        Self::new(vec![
            record("E1", "moneyline", "home", 1.0 / 0.55),
            record("E1", "moneyline", "away", 1.0 / 0.45),
        ])
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

pub fn record(event_id: &str, market: &str, selection: &str, price: f64) -> LegRecord {
    LegRecord {
        event_id: event_id.to_string(),
        market: market.to_string(),
        selection: selection.to_string(),
        price: Some(price),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap(),
    }
}

#[async_trait]
impl OddsSource for MockOddsSource {
    async fn fetch_legs(&self) -> Result<Vec<LegRecord>> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.records.clone())
    }
}
