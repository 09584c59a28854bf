use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::exchange::ExchangeClient;
use crate::market::MarketSnapshot;
use crate::pricing::index::IndexValuer;
use crate::pricing::theoretical::{forward_value, option_value, year_fraction};
use crate::quoting::credit::CreditCalculator;
use crate::quoting::quoter::QuoteManager;
use crate::quoting::skew::InventorySkew;
use crate::types::instrument::{Instrument, InstrumentKind};

/// Pacing between instrument groups.
const GROUP_DELAY: Duration = Duration::from_millis(250);
/// Pacing between instruments inside the options and equity groups.
const INSTRUMENT_DELAY: Duration = Duration::from_millis(150);

/// The quoting loop: index futures, then index options, then equity
/// futures, forever. Inventory skew is recomputed from fresh positions
/// before every group; the shutdown token is only honoured between
/// groups, never inside an instrument's cycle.
pub struct Engine {
    exchange: Arc<dyn ExchangeClient>,
    config: EngineConfig,
    index_futures: Vec<Instrument>,
    index_options: Vec<Instrument>,
    equity_futures: Vec<Instrument>,
    watchlist: Vec<String>,
    valuer: IndexValuer,
    credits: CreditCalculator,
    skew: InventorySkew,
}

impl Engine {
    pub async fn new(exchange: Arc<dyn ExchangeClient>, config: EngineConfig) -> Result<Self> {
        let catalog: HashMap<String, Instrument> = exchange
            .instruments()
            .await
            .context("failed to load instrument catalog")?
            .into_iter()
            .map(|instrument| (instrument.id.clone(), instrument))
            .collect();

        for constituent in &config.constituents {
            if !catalog.contains_key(&constituent.id) {
                bail!("constituent {} not in exchange catalog", constituent.id);
            }
        }
        if !catalog.contains_key(&config.etf_id) {
            bail!("ETF {} not in exchange catalog", config.etf_id);
        }

        let index_futures = resolve_group(&catalog, &config.index_futures, "index future", |kind| {
            matches!(kind, InstrumentKind::IndexFuture { .. })
        })?;
        let index_options = resolve_group(&catalog, &config.index_options, "index option", |kind| {
            matches!(kind, InstrumentKind::IndexOption { .. })
        })?;
        let equity_futures =
            resolve_group(&catalog, &config.equity_futures, "equity future", |kind| {
                matches!(kind, InstrumentKind::EquityFuture { .. })
            })?;

        for future in &equity_futures {
            if future.underlying.is_none() {
                bail!("equity future {} has no underlying reference", future.id);
            }
        }

        let watchlist = build_watchlist(&config, &equity_futures);
        let valuer = IndexValuer::new(&config);
        let credits = CreditCalculator::new(&config);
        let skew = InventorySkew::new(&config);

        Ok(Self {
            exchange,
            config,
            index_futures,
            index_options,
            equity_futures,
            watchlist,
            valuer,
            credits,
            skew,
        })
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        // Generation zero starts from a clean book: clear anything left
        // resting by a previous process.
        for instrument_id in self.config.all_traded() {
            self.exchange.delete_all_orders(instrument_id).await?;
        }
        info!("quoting loop started");

        while !shutdown.is_cancelled() {
            self.run_once(&shutdown).await?;
        }

        info!("quoting loop stopped");
        Ok(())
    }

    /// One full iteration over all three instrument groups.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<()> {
        let snapshot = MarketSnapshot::fetch(self.exchange.as_ref(), &self.watchlist).await?;

        let level = match self.valuer.level(&snapshot, self.exchange.as_ref()).await {
            Ok(level) => level,
            Err(error) => {
                warn!(?error, "no index level this cycle; nothing quoted");
                sleep(GROUP_DELAY).await;
                return Ok(());
            }
        };

        let credits = self.credits.schedule(&snapshot, self.config.all_traded());
        let quoter = QuoteManager::new(self.exchange.as_ref(), &self.config);

        self.quote_index_futures(&quoter, &credits, level).await?;
        if shutdown.is_cancelled() {
            return Ok(());
        }
        sleep(GROUP_DELAY).await;

        self.quote_index_options(&quoter, &credits, level).await?;
        if shutdown.is_cancelled() {
            return Ok(());
        }
        sleep(GROUP_DELAY).await;

        self.quote_equity_futures(&quoter, &credits, &snapshot)
            .await?;
        sleep(GROUP_DELAY).await;

        Ok(())
    }

    async fn quote_index_futures(
        &self,
        quoter: &QuoteManager<'_>,
        credits: &HashMap<String, f64>,
        level: f64,
    ) -> Result<()> {
        let started = Instant::now();
        let now = Utc::now();

        let positions = self.exchange.positions().await?;
        let family_delta = self.skew.index_family_delta(
            &positions,
            &self.index_futures,
            &self.index_options,
            level,
            now,
        );

        for instrument in &self.index_futures {
            let InstrumentKind::IndexFuture { expiry } = &instrument.kind else {
                continue;
            };

            let theo = forward_value(
                level,
                self.config.risk_free_rate,
                year_fraction(now, *expiry),
            );
            let credit = self.credit_for(credits, instrument);
            let adjustment = self.skew.adjustment(family_delta, credit);

            quoter.run_cycle(instrument, theo, credit, adjustment).await?;
        }

        debug!(elapsed = ?started.elapsed(), family_delta, "index futures quoted");
        Ok(())
    }

    async fn quote_index_options(
        &self,
        quoter: &QuoteManager<'_>,
        credits: &HashMap<String, f64>,
        level: f64,
    ) -> Result<()> {
        let started = Instant::now();
        let now = Utc::now();

        // Fills from the futures group may have moved the family delta.
        let positions = self.exchange.positions().await?;
        let family_delta = self.skew.index_family_delta(
            &positions,
            &self.index_futures,
            &self.index_options,
            level,
            now,
        );

        for instrument in &self.index_options {
            let InstrumentKind::IndexOption {
                expiry,
                strike,
                kind,
            } = &instrument.kind
            else {
                continue;
            };

            let theo = option_value(
                *kind,
                level,
                *strike,
                year_fraction(now, *expiry),
                self.config.risk_free_rate,
                self.config.volatility,
            );
            let credit = self.credit_for(credits, instrument);
            let adjustment = self.skew.adjustment(family_delta, credit);

            quoter.run_cycle(instrument, theo, credit, adjustment).await?;
            sleep(INSTRUMENT_DELAY).await;
        }

        debug!(elapsed = ?started.elapsed(), family_delta, "index options quoted");
        Ok(())
    }

    async fn quote_equity_futures(
        &self,
        quoter: &QuoteManager<'_>,
        credits: &HashMap<String, f64>,
        snapshot: &MarketSnapshot,
    ) -> Result<()> {
        let started = Instant::now();
        let now = Utc::now();

        let positions = self.exchange.positions().await?;
        let family_delta = self.skew.equity_family_delta(&positions, &self.equity_futures);

        for instrument in &self.equity_futures {
            let InstrumentKind::EquityFuture { expiry } = &instrument.kind else {
                continue;
            };
            let Some(underlying) = &instrument.underlying else {
                continue;
            };

            let Some(spot) = snapshot.midpoint(underlying) else {
                info!(instrument = %instrument, underlying, "underlying unpriced; skipping");
                continue;
            };

            let theo = forward_value(
                spot,
                self.config.risk_free_rate,
                year_fraction(now, *expiry),
            );
            let credit = self.credit_for(credits, instrument);
            let adjustment = self.skew.adjustment(family_delta, credit);

            quoter.run_cycle(instrument, theo, credit, adjustment).await?;
            sleep(INSTRUMENT_DELAY).await;
        }

        debug!(elapsed = ?started.elapsed(), family_delta, "equity futures quoted");
        Ok(())
    }

    fn credit_for(&self, credits: &HashMap<String, f64>, instrument: &Instrument) -> f64 {
        credits
            .get(&instrument.id)
            .copied()
            .unwrap_or(self.config.default_credit)
    }
}

fn resolve_group(
    catalog: &HashMap<String, Instrument>,
    ids: &[String],
    group: &str,
    matches: fn(&InstrumentKind) -> bool,
) -> Result<Vec<Instrument>> {
    ids.iter()
        .map(|id| {
            let instrument = catalog
                .get(id)
                .with_context(|| format!("{group} {id} not in exchange catalog"))?;
            if !matches(&instrument.kind) {
                bail!("instrument {id} is not an {group}");
            }
            Ok(instrument.clone())
        })
        .collect()
}

/// Everything whose book the cycle snapshot must cover: constituents,
/// the ETF, every traded instrument, and each equity underlying.
fn build_watchlist(config: &EngineConfig, equity_futures: &[Instrument]) -> Vec<String> {
    let mut watchlist = Vec::new();
    let mut seen = HashSet::new();

    let constituent_ids = config.constituents.iter().map(|c| c.id.as_str());
    let underlyings = equity_futures
        .iter()
        .filter_map(|future| future.underlying.as_deref());

    for id in constituent_ids
        .chain(std::iter::once(config.etf_id.as_str()))
        .chain(config.all_traded())
        .chain(underlyings)
    {
        if seen.insert(id.to_string()) {
            watchlist.push(id.to_string());
        }
    }

    watchlist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Side;
    use crate::exchange::sim::SimExchange;

    fn instrument(json: &str) -> Instrument {
        serde_json::from_str(json).unwrap()
    }

    fn sim_complex() -> SimExchange {
        let mut instruments = Vec::new();
        for stock in ["NVDA", "ING", "SAN", "PFE", "CSCO"] {
            instruments.push(instrument(&format!(
                r#"{{ "id": "{stock}", "type": "stock" }}"#
            )));
        }
        instruments.push(instrument(r#"{ "id": "OB5X_ETF", "type": "etf" }"#));
        instruments.push(instrument(
            r#"{ "id": "OB5X_202612_F", "type": "index-future",
                 "expiry": "2026-12-18T12:00:00Z", "underlying": "OB5X" }"#,
        ));
        instruments.push(instrument(
            r#"{ "id": "OB5X_202612_100C", "type": "index-option",
                 "expiry": "2026-12-18T12:00:00Z", "strike": 100.0, "kind": "call",
                 "underlying": "OB5X" }"#,
        ));
        instruments.push(instrument(
            r#"{ "id": "OB5X_202612_100P", "type": "index-option",
                 "expiry": "2026-12-18T12:00:00Z", "strike": 100.0, "kind": "put",
                 "underlying": "OB5X" }"#,
        ));
        instruments.push(instrument(
            r#"{ "id": "NVDA_202612_F", "type": "equity-future",
                 "expiry": "2026-12-18T12:00:00Z", "underlying": "NVDA" }"#,
        ));

        let exchange = SimExchange::new(instruments);
        for stock in ["NVDA", "ING", "SAN", "PFE", "CSCO"] {
            // Uniform mids put the synthetic index a whisker under 100.
            exchange.set_book(stock, Some(22.88), Some(22.98));
        }
        exchange.set_book("OB5X_ETF", Some(27.40), Some(27.60));
        exchange
    }

    async fn engine(exchange: &Arc<SimExchange>) -> Engine {
        Engine::new(exchange.clone(), EngineConfig::for_tests())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn one_iteration_quotes_every_traded_instrument() {
        let exchange = Arc::new(sim_complex());
        let engine = engine(&exchange).await;

        engine.run_once(&CancellationToken::new()).await.unwrap();

        for id in [
            "OB5X_202612_F",
            "OB5X_202612_100C",
            "OB5X_202612_100P",
            "NVDA_202612_F",
        ] {
            let orders = exchange.outstanding_orders(id).await.unwrap();
            assert_eq!(orders.len(), 2, "instrument {id}");

            let bid = orders.iter().find(|o| o.side == Side::Bid).unwrap();
            let ask = orders.iter().find(|o| o.side == Side::Ask).unwrap();
            assert!(bid.price.as_f64() < ask.price.as_f64(), "instrument {id}");
            assert_eq!(bid.volume, 50);
            assert_eq!(ask.volume, 50);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn iterations_never_stack_generations() {
        let exchange = Arc::new(sim_complex());
        let engine = engine(&exchange).await;
        let shutdown = CancellationToken::new();

        engine.run_once(&shutdown).await.unwrap();
        engine.run_once(&shutdown).await.unwrap();

        for id in engine.config.all_traded() {
            let orders = exchange.outstanding_orders(id).await.unwrap();
            assert!(orders.len() <= 2, "instrument {id} has stacked orders");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn near_limit_position_is_respected_end_to_end() {
        let exchange = Arc::new(sim_complex());
        exchange.set_position("OB5X_202612_F", 80);
        let engine = engine(&exchange).await;

        engine.run_once(&CancellationToken::new()).await.unwrap();

        let orders = exchange.outstanding_orders("OB5X_202612_F").await.unwrap();
        for order in orders {
            match order.side {
                Side::Bid => assert_eq!(order.volume, 20),
                Side::Ask => assert_eq!(order.volume, 50),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dark_market_skips_the_iteration_without_failing() {
        let exchange = Arc::new(sim_complex());
        // Black out every book, constituents and ETF alike.
        for id in ["NVDA", "ING", "SAN", "PFE", "CSCO", "OB5X_ETF"] {
            exchange.set_book(id, None, None);
        }
        let engine = engine(&exchange).await;

        engine.run_once(&CancellationToken::new()).await.unwrap();

        for id in engine.config.all_traded() {
            assert!(exchange.outstanding_orders(id).await.unwrap().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_the_loop() {
        let exchange = Arc::new(sim_complex());
        let engine = engine(&exchange).await;

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        engine.run(shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_group_member_is_a_startup_fault() {
        let exchange = Arc::new(sim_complex());
        let mut config = EngineConfig::for_tests();
        config.index_futures.push("OB5X_209912_F".to_string());

        assert!(Engine::new(exchange, config).await.is_err());
    }

    #[tokio::test]
    async fn miscategorized_group_member_is_a_startup_fault() {
        let exchange = Arc::new(sim_complex());
        let mut config = EngineConfig::for_tests();
        config.index_futures.push("OB5X_202612_100C".to_string());

        assert!(Engine::new(exchange, config).await.is_err());
    }
}
