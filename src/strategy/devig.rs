//! Fair-probability model.
//!
//! Converts offered decimal odds to implied probabilities and removes the
//! bookmaker margin within each mutually exclusive outcome group
//! (event + market) so that every group sums to exactly one.

use std::collections::BTreeMap;
use tracing::debug;

use crate::odds::OddsStore;
use crate::types::{Leg, LegId, LegQuote, OddsError};

// ---------------------------------------------------------------------------
// Market book
// ---------------------------------------------------------------------------

/// De-vig summary for one outcome group.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketBook {
    pub event_id: String,
    pub market: String,
    pub outcomes: usize,
    /// Sum of implied probabilities (1.0 = no margin).
    pub overround: f64,
}

impl MarketBook {
    /// Bookmaker margin as a fraction of the book.
    pub fn margin(&self) -> f64 {
        1.0 - 1.0 / self.overround
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Multiplicative de-vig. Pure: the output depends only on the snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbabilityModel;

impl ProbabilityModel {
    pub fn new() -> Self {
        Self
    }

    /// Fair win probability for every leg in the snapshot.
    pub fn estimate(&self, store: &OddsStore) -> Result<BTreeMap<LegId, f64>, OddsError> {
        let mut fair = BTreeMap::new();
        for (book, group) in self.normalize(store)? {
            debug!(
                event_id = %book.event_id,
                market = %book.market,
                outcomes = book.outcomes,
                margin = format!("{:.2}%", book.margin() * 100.0),
                "Market de-vigged"
            );
            for (quote, _, probability) in group {
                fair.insert(quote.id.clone(), probability);
            }
        }
        Ok(fair)
    }

    /// Attach fair probabilities to the snapshot's quotes, in leg-id order.
    pub fn price_legs(&self, store: &OddsStore) -> Result<Vec<Leg>, OddsError> {
        let mut legs: Vec<Leg> = self
            .normalize(store)?
            .into_iter()
            .flat_map(|(_, group)| group)
            .map(|(quote, price, fair_probability)| Leg {
                id: quote.id.clone(),
                event_id: quote.event_id.clone(),
                market: quote.market.clone(),
                selection: quote.selection.clone(),
                price,
                timestamp: quote.timestamp,
                fair_probability,
            })
            .collect();
        legs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(legs)
    }

    /// Per-group overround report.
    pub fn books(&self, store: &OddsStore) -> Result<Vec<MarketBook>, OddsError> {
        Ok(self.normalize(store)?.into_iter().map(|(book, _)| book).collect())
    }

    #[allow(clippy::type_complexity)]
    fn normalize<'a>(
        &self,
        store: &'a OddsStore,
    ) -> Result<Vec<(MarketBook, Vec<(&'a LegQuote, f64, f64)>)>, OddsError> {
        let mut out = Vec::new();

        for ((event_id, market), quotes) in store.market_groups() {
            let mut priced = Vec::with_capacity(quotes.len());
            for quote in quotes {
                priced.push((quote, validated_price(quote)?));
            }

            if priced.len() < 2 {
                return Err(OddsError::Unnormalizable {
                    event_id: event_id.to_string(),
                    market: market.to_string(),
                    outcomes: priced.len(),
                });
            }

            let overround: f64 = priced.iter().map(|(_, price)| 1.0 / price).sum();
            let group = priced
                .into_iter()
                .map(|(quote, price)| {
                    let fair = ((1.0 / price) / overround).clamp(0.0, 1.0);
                    (quote, price, fair)
                })
                .collect::<Vec<_>>();

            out.push((
                MarketBook {
                    event_id: event_id.to_string(),
                    market: market.to_string(),
                    outcomes: group.len(),
                    overround,
                },
                group,
            ));
        }

        Ok(out)
    }
}

/// A payable decimal price: present, finite, positive, and above 1.0.
fn validated_price(quote: &LegQuote) -> Result<f64, OddsError> {
    let price = match quote.price {
        Some(p) if p.is_finite() => p,
        _ => return Err(OddsError::MissingPrice(quote.id.clone())),
    };
    if price <= 0.0 {
        return Err(OddsError::NonPositivePrice {
            leg: quote.id.clone(),
            price,
        });
    }
    if price <= 1.0 {
        return Err(OddsError::UnpayablePrice {
            leg: quote.id.clone(),
            price,
        });
    }
    Ok(price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
