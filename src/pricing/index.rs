use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::exchange::ExchangeClient;
use crate::market::MarketSnapshot;

/// Fixed linear relationship between the ETF's price and the index level:
/// `etf_fair = ETF_BASE + ETF_RATIO * level`. The same ratio converts an
/// ETF position into index-delta terms.
pub const ETF_BASE: f64 = 2.50;
pub const ETF_RATIO: f64 = 0.25;

const ETF_RETRY_ATTEMPTS: u32 = 5;
const ETF_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Synthetic index level from constituent mids, with an ETF bootstrap
/// when constituent data is incomplete.
#[derive(Debug, Clone)]
pub struct IndexValuer {
    weights: Vec<(String, f64)>,
    etf_id: String,
}

impl IndexValuer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            weights: config
                .constituents
                .iter()
                .map(|constituent| (constituent.id.clone(), constituent.weight))
                .collect(),
            etf_id: config.etf_id.clone(),
        }
    }

    /// Weighted sum of constituent mids, scaled to index points.
    pub fn weighted_level(&self, mids: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(mids)
            .map(|((_, weight), mid)| weight * mid)
            .sum::<f64>()
            / 1000.0
    }

    /// Index level implied by the ETF's midpoint, inverting the listing
    /// relationship.
    pub fn level_from_etf(etf_mid: f64) -> f64 {
        (etf_mid - ETF_BASE) / ETF_RATIO
    }

    /// Fair ETF price implied by an index level.
    pub fn etf_fair(level: f64) -> f64 {
        ETF_BASE + ETF_RATIO * level
    }

    /// Index level from the snapshot's constituent mids, if all are priced.
    pub fn from_constituents(&self, snapshot: &MarketSnapshot) -> Option<f64> {
        let mut mids = Vec::with_capacity(self.weights.len());
        for (id, _) in &self.weights {
            mids.push(snapshot.midpoint(id)?);
        }

        Some(self.weighted_level(&mids))
    }

    /// The index level for this cycle. Prefers the constituent basket;
    /// falls back to the ETF bootstrap, re-reading the ETF book with
    /// bounded backoff rather than ever proceeding on a stale level.
    pub async fn level(
        &self,
        snapshot: &MarketSnapshot,
        exchange: &dyn ExchangeClient,
    ) -> Result<f64> {
        if let Some(level) = self.from_constituents(snapshot) {
            debug!(level, etf_fair = Self::etf_fair(level), "index from constituents");
            return Ok(level);
        }

        if let Some(etf_mid) = snapshot.midpoint(&self.etf_id) {
            let level = Self::level_from_etf(etf_mid);
            debug!(level, etf_mid, "index bootstrapped from ETF");
            return Ok(level);
        }

        for attempt in 1..=ETF_RETRY_ATTEMPTS {
            warn!(attempt, etf = %self.etf_id, "ETF unpriced; retrying");
            tokio::time::sleep(ETF_RETRY_BACKOFF).await;

            let book = exchange.top_of_book(&self.etf_id).await?;
            if let Some(etf_mid) = book.midpoint() {
                let level = Self::level_from_etf(etf_mid);
                debug!(level, etf_mid, attempt, "index bootstrapped from ETF");
                return Ok(level);
            }
        }

        bail!(
            "index level unavailable: constituents incomplete and {} unpriced after {} attempts",
            self.etf_id,
            ETF_RETRY_ATTEMPTS,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::exchange::TopOfBook;
    use crate::exchange::sim::SimExchange;
    use crate::types::instrument::Instrument;
    use crate::types::price::Price;

    fn valuer() -> IndexValuer {
        IndexValuer::new(&EngineConfig::for_tests())
    }

    fn snapshot_with_mids(mids: &[(&str, f64)]) -> MarketSnapshot {
        let books = mids
            .iter()
            .map(|(id, mid)| {
                (
                    id.to_string(),
                    TopOfBook {
                        best_bid: Some(Price::new(mid - 0.05)),
                        best_ask: Some(Price::new(mid + 0.05)),
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        MarketSnapshot::with_books(books)
    }

    #[test]
    fn weighted_level_is_dot_product_over_thousand() {
        let valuer = valuer();
        let mids = [22.0, 25.0, 19.5, 23.75, 21.0];
        let expected = (908.06 * 22.0 + 129.24 * 25.0 + 124.78 * 19.5 + 2245.39 * 23.75
            + 953.21 * 21.0)
            / 1000.0;

        assert!((valuer.weighted_level(&mids) - expected).abs() < 1e-9);
    }

    #[test]
    fn uniform_hundred_mids_give_weight_sum_over_ten() {
        let valuer = valuer();
        let weight_sum = 908.06 + 129.24 + 124.78 + 2245.39 + 953.21;

        let level = valuer.weighted_level(&[100.0; 5]);
        assert!((level - weight_sum / 10.0).abs() < 1e-9);
    }

    #[test]
    fn etf_relationship_round_trips() {
        let level = 436.068;
        assert!((IndexValuer::etf_fair(level) - (2.50 + 0.25 * level)).abs() < 1e-12);
        assert!((IndexValuer::level_from_etf(IndexValuer::etf_fair(level)) - level).abs() < 1e-9);
    }

    #[test]
    fn incomplete_constituents_give_no_basket_level() {
        let valuer = valuer();
        let snapshot = snapshot_with_mids(&[
            ("NVDA", 22.0),
            ("ING", 25.0),
            ("SAN", 19.5),
            ("PFE", 23.75),
            // CSCO missing
        ]);

        assert!(valuer.from_constituents(&snapshot).is_none());
    }

    #[tokio::test]
    async fn falls_back_to_etf_when_a_constituent_is_dark() {
        let valuer = valuer();
        let exchange = SimExchange::new(Vec::new());
        let snapshot = snapshot_with_mids(&[("NVDA", 22.0), ("OB5X_ETF", 27.5)]);

        let level = valuer.level(&snapshot, &exchange).await.unwrap();
        assert!((level - (27.5 - 2.50) / 0.25).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_the_etf_book_before_giving_up() {
        let valuer = valuer();

        let exchange = SimExchange::new(vec![
            serde_json::from_str::<Instrument>(r#"{ "id": "OB5X_ETF", "type": "etf" }"#).unwrap(),
        ]);
        exchange.set_book("OB5X_ETF", Some(27.4), Some(27.6));

        // Neither constituents nor ETF in the snapshot; the retry path
        // must pick the level up from the live ETF book.
        let level = valuer.level(&MarketSnapshot::default(), &exchange).await.unwrap();
        assert!((level - (27.5 - 2.50) / 0.25).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn total_outage_is_an_error_not_a_level() {
        let valuer = valuer();
        let exchange = SimExchange::new(Vec::new());

        let result = valuer.level(&MarketSnapshot::default(), &exchange).await;
        assert!(result.is_err());
    }
}
