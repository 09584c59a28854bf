pub mod sim;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::types::instrument::Instrument;
use crate::types::price::Price;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    #[default]
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
        }
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BID" | "BUY" => Ok(Self::Bid),
            "ASK" | "SELL" => Ok(Self::Ask),
            other => Err(anyhow!("unknown side: {other}")),
        }
    }
}

/// Best bid and ask for one instrument. Either side may be absent when
/// the book is one-sided or empty.
#[derive(Debug, Default, Copy, Clone)]
pub struct TopOfBook {
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
}

impl TopOfBook {
    pub fn midpoint(&self) -> Option<f64> {
        let bid = self.best_bid?.as_f64();
        let ask = self.best_ask?.as_f64();
        Some((bid + ask) / 2.0)
    }

    pub fn spread(&self) -> Option<f64> {
        let bid = self.best_bid?.as_f64();
        let ask = self.best_ask?.as_f64();
        Some(ask - bid)
    }
}

#[derive(Debug, Clone)]
pub struct Trade {
    pub price: Price,
    pub volume: i64,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub order_id: String,
    pub side: Side,
    pub price: Price,
    pub volume: i64,
}

/// The synchronous exchange capability surface the engine runs against.
/// Every call is blocking from the engine's point of view; the loop
/// suspends only here and at its pacing delays.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Static instrument catalog, fetched once at startup.
    async fn instruments(&self) -> Result<Vec<Instrument>>;

    async fn top_of_book(&self, instrument_id: &str) -> Result<TopOfBook>;

    /// Current net position per instrument. Authoritative; the engine
    /// never accumulates positions locally.
    async fn positions(&self) -> Result<HashMap<String, i64>>;

    /// Fetch and clear trades filled since the previous poll.
    async fn poll_new_trades(&self, instrument_id: &str) -> Result<Vec<Trade>>;

    async fn outstanding_orders(&self, instrument_id: &str) -> Result<Vec<OpenOrder>>;

    async fn delete_order(&self, instrument_id: &str, order_id: &str) -> Result<()>;

    async fn delete_all_orders(&self, instrument_id: &str) -> Result<()>;

    /// Returns the exchange-assigned order id.
    async fn insert_limit_order(
        &self,
        instrument_id: &str,
        side: Side,
        price: Price,
        volume: i64,
    ) -> Result<String>;
}
