use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::pricing::index::ETF_RATIO;
use crate::pricing::theoretical::{option_delta, year_fraction};
use crate::types::instrument::{Instrument, InstrumentKind, OptionKind};

/// Linear damping from net family delta to price adjustment.
const RETREAT_DAMPING: f64 = 500.0;

/// Aggregates net exposure per product family and converts it into the
/// retreat adjustment that biases fills toward flattening the book.
#[derive(Debug, Clone)]
pub struct InventorySkew {
    etf_id: String,
    volatility: f64,
    risk_free_rate: f64,
}

impl InventorySkew {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            etf_id: config.etf_id.clone(),
            volatility: config.volatility,
            risk_free_rate: config.risk_free_rate,
        }
    }

    /// Net index-family delta: futures one-for-one, the ETF at its index
    /// ratio, options weighted by their model delta at the current level.
    pub fn index_family_delta(
        &self,
        positions: &HashMap<String, i64>,
        index_futures: &[Instrument],
        index_options: &[Instrument],
        index_level: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let net = |id: &str| positions.get(id).copied().unwrap_or(0) as f64;

        let mut delta = index_futures
            .iter()
            .map(|future| net(&future.id))
            .sum::<f64>();

        delta += net(&self.etf_id) * ETF_RATIO;

        for option in index_options {
            let position = net(&option.id);
            if position == 0.0 {
                continue;
            }

            let InstrumentKind::IndexOption {
                expiry,
                strike,
                kind,
            } = &option.kind
            else {
                continue;
            };

            delta += position
                * option_delta(
                    *kind,
                    index_level,
                    *strike,
                    year_fraction(now, *expiry),
                    self.risk_free_rate,
                    self.volatility,
                );
        }

        delta
    }

    /// Net equity-family delta: the equity futures positions, one-for-one.
    pub fn equity_family_delta(
        &self,
        positions: &HashMap<String, i64>,
        equity_futures: &[Instrument],
    ) -> f64 {
        equity_futures
            .iter()
            .map(|future| positions.get(&future.id).copied().unwrap_or(0) as f64)
            .sum()
    }

    /// Damped retreat, clamped to the instrument's credit so the quoted
    /// spread is never collapsed or inverted.
    pub fn adjustment(&self, family_delta: f64, credit: f64) -> f64 {
        (family_delta / RETREAT_DAMPING).clamp(-credit, credit)
    }
}

/// Signed shift applied to both quote sides. A long book retreats futures
/// and calls downward; puts shift the other way, since raising put bids
/// is how a long-delta book sheds exposure.
pub fn quote_shift(kind: &InstrumentKind, adjustment: f64) -> f64 {
    match kind {
        InstrumentKind::IndexOption {
            kind: OptionKind::Put,
            ..
        } => adjustment,
        InstrumentKind::IndexFuture { .. }
        | InstrumentKind::EquityFuture { .. }
        | InstrumentKind::IndexOption {
            kind: OptionKind::Call,
            ..
        } => -adjustment,
        // Cash products are never quoted by the engine.
        InstrumentKind::Stock | InstrumentKind::Etf => 0.0,
    }
}
