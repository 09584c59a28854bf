use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// One index constituent. The weight is the constituent's baseline
/// reference price, fixed at listing time.
#[derive(Debug, Clone, Deserialize)]
pub struct Constituent {
    pub id: String,
    pub weight: f64,
}

/// All quoting parameters, loaded once at startup and passed explicitly
/// to every component. There is no dynamic reconfiguration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub constituents: Vec<Constituent>,

    /// Directly-traded instrument tracking the index, used to bootstrap
    /// the index level when constituent data is incomplete.
    pub etf_id: String,

    pub risk_free_rate: f64,

    /// Minimum price increment shared by every quoted instrument.
    pub tick_size: f64,

    /// Target quoted volume per side before position-limit clamping.
    pub clip_volume: i64,

    /// Half-spread quoted when an instrument's book is one-sided or empty.
    pub default_credit: f64,

    /// Volatility assumption fed to the option pricing model.
    pub volatility: f64,

    /// Maximum absolute net inventory permitted in one instrument.
    pub position_limit: i64,

    pub index_futures: Vec<String>,
    pub index_options: Vec<String>,
    pub equity_futures: Vec<String>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;

        let config: EngineConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse engine config {}", path.display()))?;

        config.validate().context("engine config validation failed")?;

        Ok(config)
    }

    /// Every instrument the engine quotes, in group order.
    pub fn all_traded(&self) -> impl Iterator<Item = &str> {
        self.index_futures
            .iter()
            .chain(self.index_options.iter())
            .chain(self.equity_futures.iter())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.constituents.is_empty() {
            bail!("constituents must not be empty");
        }
        for constituent in &self.constituents {
            if constituent.weight <= 0.0 {
                bail!("constituent {} weight must be > 0", constituent.id);
            }
        }
        if self.tick_size <= 0.0 {
            bail!("tick_size must be > 0");
        }
        if self.clip_volume <= 0 {
            bail!("clip_volume must be > 0");
        }
        if self.default_credit <= 0.0 {
            bail!("default_credit must be > 0");
        }
        if self.volatility <= 0.0 {
            bail!("volatility must be > 0");
        }
        if self.position_limit <= 0 {
            bail!("position_limit must be > 0");
        }
        if self.index_futures.is_empty()
            && self.index_options.is_empty()
            && self.equity_futures.is_empty()
        {
            bail!("at least one instrument group must be non-empty");
        }

        let mut seen = HashSet::new();
        for id in self.all_traded() {
            if !seen.insert(id) {
                bail!("instrument {id} appears in more than one group");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
impl EngineConfig {
    /// The five-constituent complex used across the engine's tests.
    pub fn for_tests() -> Self {
        serde_yaml::from_str(
            r#"
            constituents:
              - { id: NVDA, weight: 908.06 }
              - { id: ING, weight: 129.24 }
              - { id: SAN, weight: 124.78 }
              - { id: PFE, weight: 2245.39 }
              - { id: CSCO, weight: 953.21 }
            etf_id: OB5X_ETF
            risk_free_rate: 0.03
            tick_size: 0.10
            clip_volume: 50
            default_credit: 0.20
            volatility: 1.50
            position_limit: 100
            index_futures: [OB5X_202612_F]
            index_options: [OB5X_202612_100C, OB5X_202612_100P]
            equity_futures: [NVDA_202612_F]
            "#,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::for_tests()
    }

    #[test]
    fn parses_and_validates() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.all_traded().collect::<Vec<_>>(),
            vec![
                "OB5X_202612_F",
                "OB5X_202612_100C",
                "OB5X_202612_100P",
                "NVDA_202612_F",
            ],
        );
    }

    #[test]
    fn rejects_duplicate_group_membership() {
        let mut config = config();
        config.equity_futures.push("OB5X_202612_F".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_tick() {
        let mut config = config();
        config.tick_size = 0.0;
        assert!(config.validate().is_err());
    }
}
