use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::exchange::{ExchangeClient, Side};
use crate::quoting::skew::quote_shift;
use crate::types::instrument::Instrument;
use crate::types::price::{Price, round_down_to_tick, round_up_to_tick};
use crate::types::quote::{Quote, QuoteTarget};

/// Runs one instrument's full quote-replacement cycle:
/// drain fills, cancel the previous generation, price, size, submit.
pub struct QuoteManager<'a> {
    exchange: &'a dyn ExchangeClient,
    tick_size: f64,
    clip_volume: i64,
    position_limit: i64,
}

impl<'a> QuoteManager<'a> {
    pub fn new(exchange: &'a dyn ExchangeClient, config: &EngineConfig) -> Self {
        Self {
            exchange,
            tick_size: config.tick_size,
            clip_volume: config.clip_volume,
            position_limit: config.position_limit,
        }
    }

    pub async fn run_cycle(
        &self,
        instrument: &Instrument,
        theo: f64,
        credit: f64,
        adjustment: f64,
    ) -> Result<()> {
        self.drain_trades(instrument).await?;
        self.cancel_resting(instrument).await;

        let position = self
            .exchange
            .positions()
            .await?
            .get(&instrument.id)
            .copied()
            .unwrap_or(0);

        let target = self.compute_target(instrument, theo, credit, adjustment, position);

        if let Some(bid) = target.bid {
            self.submit(instrument, Side::Bid, bid).await;
        }
        if let Some(ask) = target.ask {
            self.submit(instrument, Side::Ask, ask).await;
        }

        Ok(())
    }

    /// Bid and ask around theo, shifted by the inventory adjustment and
    /// rounded onto the tick grid away from the theoretical value. A side
    /// is dropped when its clamped volume is non-positive or its rounded
    /// price could not rest on the book.
    pub fn compute_target(
        &self,
        instrument: &Instrument,
        theo: f64,
        credit: f64,
        adjustment: f64,
        position: i64,
    ) -> QuoteTarget {
        let shift = quote_shift(&instrument.kind, adjustment);
        let bid_price = round_down_to_tick(theo - credit + shift, self.tick_size);
        let ask_price = round_up_to_tick(theo + credit + shift, self.tick_size);

        let (bid_volume, ask_volume) = self.sized_volumes(position);

        QuoteTarget {
            bid: (bid_volume > 0 && bid_price > 0.0).then(|| Quote {
                price: Price::new(bid_price),
                volume: bid_volume,
            }),
            ask: (ask_volume > 0 && ask_price > 0.0).then(|| Quote {
                price: Price::new(ask_price),
                volume: ask_volume,
            }),
        }
    }

    /// Clip volume clamped so the position after a full fill stays within
    /// the per-instrument limit on both sides.
    fn sized_volumes(&self, position: i64) -> (i64, i64) {
        let bid = self.clip_volume.min(self.position_limit - position).max(0);
        let ask = self.clip_volume.min(self.position_limit + position).max(0);
        (bid, ask)
    }

    async fn drain_trades(&self, instrument: &Instrument) -> Result<()> {
        for trade in self.exchange.poll_new_trades(&instrument.id).await? {
            info!(
                instrument = %instrument,
                side = %trade.side,
                volume = trade.volume,
                price = %trade.price,
                "filled since last cycle",
            );
        }

        Ok(())
    }

    /// Deletes every resting order from the previous generation. Failures
    /// are logged, not retried; the next cycle's cancel reconciles.
    async fn cancel_resting(&self, instrument: &Instrument) {
        let orders = match self.exchange.outstanding_orders(&instrument.id).await {
            Ok(orders) => orders,
            Err(error) => {
                warn!(instrument = %instrument, ?error, "could not list resting orders");
                return;
            }
        };

        for order in orders {
            debug!(
                instrument = %instrument,
                order_id = %order.order_id,
                side = %order.side,
                price = %order.price,
                "deleting stale order",
            );
            if let Err(error) = self
                .exchange
                .delete_order(&instrument.id, &order.order_id)
                .await
            {
                warn!(instrument = %instrument, order_id = %order.order_id, ?error, "cancel failed");
            }
        }
    }

    /// One side's insert. A failure here never blocks the other side.
    async fn submit(&self, instrument: &Instrument, side: Side, quote: Quote) {
        match self
            .exchange
            .insert_limit_order(&instrument.id, side, quote.price, quote.volume)
            .await
        {
            Ok(_) => info!(
                instrument = %instrument,
                %side,
                price = %quote.price,
                volume = quote.volume,
                "quote placed",
            ),
            Err(error) => warn!(instrument = %instrument, %side, ?error, "insert failed"),
        }
    }
}
