use std::collections::HashMap;

use tracing::debug;

use crate::config::EngineConfig;
use crate::market::MarketSnapshot;

/// Converts each instrument's observed spread into the half-spread quoted
/// around its theoretical value. A wide market earns a wide quote.
#[derive(Debug, Clone)]
pub struct CreditCalculator {
    tick_size: f64,
    default_credit: f64,
}

impl CreditCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tick_size: config.tick_size,
            default_credit: config.default_credit,
        }
    }

    /// Half of the observed spread net of one tick on each side, rounded
    /// to cents. Floored at half a tick so bid and ask stay on opposite
    /// sides of theo after grid rounding.
    pub fn credit_from_spread(&self, spread: f64) -> f64 {
        let raw = (spread - 2.0 * self.tick_size) / 2.0;
        let rounded = (raw * 100.0).round() / 100.0;
        rounded.max(self.tick_size / 2.0)
    }

    /// The cycle's credit per traded instrument. A one-sided or empty book
    /// falls back to the default credit; it never halts quoting.
    pub fn schedule<'a>(
        &self,
        snapshot: &MarketSnapshot,
        instrument_ids: impl Iterator<Item = &'a str>,
    ) -> HashMap<String, f64> {
        instrument_ids
            .map(|id| {
                let credit = match snapshot.spread(id) {
                    Some(spread) => self.credit_from_spread(spread),
                    None => {
                        debug!(instrument = id, "book one-sided or empty; default credit");
                        self.default_credit
                    }
                };
                (id.to_string(), credit)
            })
            .collect()
    }
}
