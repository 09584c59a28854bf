use std::collections::HashMap;

use anyhow::Result;

use crate::exchange::{ExchangeClient, TopOfBook};

/// One cycle's view of every watched book. Built fresh at the top of each
/// control-loop iteration and replaced, never mutated.
#[derive(Debug, Default)]
pub struct MarketSnapshot {
    books: HashMap<String, TopOfBook>,
}

impl MarketSnapshot {
    pub async fn fetch(exchange: &dyn ExchangeClient, watchlist: &[String]) -> Result<Self> {
        let mut books = HashMap::with_capacity(watchlist.len());
        for instrument_id in watchlist {
            let book = exchange.top_of_book(instrument_id).await?;
            books.insert(instrument_id.clone(), book);
        }

        Ok(Self { books })
    }

    pub fn book(&self, instrument_id: &str) -> TopOfBook {
        self.books.get(instrument_id).copied().unwrap_or_default()
    }

    pub fn midpoint(&self, instrument_id: &str) -> Option<f64> {
        self.book(instrument_id).midpoint()
    }

    pub fn spread(&self, instrument_id: &str) -> Option<f64> {
        self.book(instrument_id).spread()
    }

    #[cfg(test)]
    pub fn with_books(books: HashMap<String, TopOfBook>) -> Self {
        Self { books }
    }
}
