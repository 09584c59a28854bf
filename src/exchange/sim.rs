use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::exchange::{ExchangeClient, OpenOrder, Side, TopOfBook, Trade};
use crate::types::instrument::Instrument;
use crate::types::price::Price;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    instruments: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(flatten)]
    instrument: Instrument,
    #[serde(default)]
    book: Option<SeedBook>,
}

#[derive(Debug, Default, Copy, Clone, Deserialize)]
struct SeedBook {
    bid: Option<f64>,
    ask: Option<f64>,
}

#[derive(Debug, Default)]
struct SimState {
    books: HashMap<String, TopOfBook>,
    positions: HashMap<String, i64>,
    resting: HashMap<String, Vec<OpenOrder>>,
    unpolled: HashMap<String, Vec<Trade>>,
}

/// In-process venue. Orders crossing the seeded book fill immediately at
/// the touch; everything else rests until cancelled. Optional failure
/// injection exercises the per-side submission fault paths.
#[derive(Debug)]
pub struct SimExchange {
    instruments: Vec<Instrument>,
    failure_rate: f64,
    state: Mutex<SimState>,
}

impl SimExchange {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut state = SimState::default();
        for instrument in &instruments {
            state.positions.insert(instrument.id.clone(), 0);
        }

        Self {
            instruments,
            failure_rate: 0.0,
            state: Mutex::new(state),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;

        let catalog: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;

        let mut instruments = Vec::with_capacity(catalog.instruments.len());
        let mut seeds = Vec::new();
        for entry in catalog.instruments {
            if let Some(seed) = entry.book {
                seeds.push((entry.instrument.id.clone(), seed));
            }
            instruments.push(entry.instrument);
        }

        let exchange = Self::new(instruments);
        for (id, seed) in seeds {
            exchange.set_book(&id, seed.bid, seed.ask);
        }

        Ok(exchange)
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Replaces one instrument's top of book.
    pub fn set_book(&self, instrument_id: &str, bid: Option<f64>, ask: Option<f64>) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.books.insert(
            instrument_id.to_string(),
            TopOfBook {
                best_bid: bid.map(Price::new),
                best_ask: ask.map(Price::new),
            },
        );
    }

    #[cfg(test)]
    pub fn set_position(&self, instrument_id: &str, net: i64) {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.positions.insert(instrument_id.to_string(), net);
    }

    fn should_reject(&self) -> bool {
        self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate)
    }
}

#[async_trait]
impl ExchangeClient for SimExchange {
    async fn instruments(&self) -> Result<Vec<Instrument>> {
        Ok(self.instruments.clone())
    }

    async fn top_of_book(&self, instrument_id: &str) -> Result<TopOfBook> {
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.books.get(instrument_id).copied().unwrap_or_default())
    }

    async fn positions(&self) -> Result<HashMap<String, i64>> {
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.positions.clone())
    }

    async fn poll_new_trades(&self, instrument_id: &str) -> Result<Vec<Trade>> {
        let mut state = self.state.lock().expect("sim state poisoned");
        Ok(state.unpolled.remove(instrument_id).unwrap_or_default())
    }

    async fn outstanding_orders(&self, instrument_id: &str) -> Result<Vec<OpenOrder>> {
        let state = self.state.lock().expect("sim state poisoned");
        Ok(state.resting.get(instrument_id).cloned().unwrap_or_default())
    }

    async fn delete_order(&self, instrument_id: &str, order_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("sim state poisoned");
        let orders = state
            .resting
            .get_mut(instrument_id)
            .ok_or_else(|| anyhow!("no resting orders in {instrument_id}"))?;

        let before = orders.len();
        orders.retain(|order| order.order_id != order_id);
        if orders.len() == before {
            bail!("unknown order {order_id} in {instrument_id}");
        }

        Ok(())
    }

    async fn delete_all_orders(&self, instrument_id: &str) -> Result<()> {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.resting.remove(instrument_id);
        Ok(())
    }

    async fn insert_limit_order(
        &self,
        instrument_id: &str,
        side: Side,
        price: Price,
        volume: i64,
    ) -> Result<String> {
        if volume <= 0 {
            bail!("order volume must be > 0");
        }
        if self.should_reject() {
            bail!("order rejected by venue");
        }

        let mut state = self.state.lock().expect("sim state poisoned");
        if !state.positions.contains_key(instrument_id) {
            bail!("unknown instrument {instrument_id}");
        }

        let order_id = Uuid::new_v4().to_string();
        let book = state.books.get(instrument_id).copied().unwrap_or_default();

        let fill_price = match side {
            Side::Bid => book.best_ask.filter(|ask| price >= *ask),
            Side::Ask => book.best_bid.filter(|bid| price <= *bid),
        };

        match fill_price {
            Some(fill_price) => {
                let signed = match side {
                    Side::Bid => volume,
                    Side::Ask => -volume,
                };
                *state.positions.entry(instrument_id.to_string()).or_insert(0) += signed;
                state
                    .unpolled
                    .entry(instrument_id.to_string())
                    .or_default()
                    .push(Trade {
                        price: fill_price,
                        volume,
                        side,
                    });
                debug!(instrument = instrument_id, %side, %fill_price, volume, "sim fill");
            }
            None => {
                state
                    .resting
                    .entry(instrument_id.to_string())
                    .or_default()
                    .push(OpenOrder {
                        order_id: order_id.clone(),
                        side,
                        price,
                        volume,
                    });
            }
        }

        Ok(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(id: &str) -> Instrument {
        serde_json::from_str(&format!(r#"{{ "id": "{id}", "type": "stock" }}"#)).unwrap()
    }

    #[tokio::test]
    async fn resting_order_lifecycle() {
        let exchange = SimExchange::new(vec![stock("NVDA")]);
        exchange.set_book("NVDA", Some(22.9), Some(23.0));

        let order_id = exchange
            .insert_limit_order("NVDA", Side::Bid, Price::new(22.8), 10)
            .await
            .unwrap();

        let orders = exchange.outstanding_orders("NVDA").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, order_id);

        exchange.delete_order("NVDA", &order_id).await.unwrap();
        assert!(exchange.outstanding_orders("NVDA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn crossing_bid_fills_and_updates_position() {
        let exchange = SimExchange::new(vec![stock("NVDA")]);
        exchange.set_book("NVDA", Some(22.9), Some(23.0));

        exchange
            .insert_limit_order("NVDA", Side::Bid, Price::new(23.1), 10)
            .await
            .unwrap();

        assert_eq!(exchange.positions().await.unwrap()["NVDA"], 10);

        let trades = exchange.poll_new_trades("NVDA").await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].volume, 10);

        // Polling clears the log.
        assert!(exchange.poll_new_trades("NVDA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_injection_rejects_inserts() {
        let exchange = SimExchange::new(vec![stock("NVDA")]).with_failure_rate(1.0);

        let result = exchange
            .insert_limit_order("NVDA", Side::Bid, Price::new(22.8), 10)
            .await;
        assert!(result.is_err());
        assert!(exchange.outstanding_orders("NVDA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_instrument_is_rejected() {
        let exchange = SimExchange::new(vec![stock("NVDA")]);
        let result = exchange
            .insert_limit_order("ING", Side::Bid, Price::new(1.0), 1)
            .await;
        assert!(result.is_err());
    }
}
