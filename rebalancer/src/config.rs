//! TOML configuration loading and validation.

use std::path::Path;

use equibasket::{AccountId, Amount, AssetId, pow10};
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::target::Weights;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fund: FundConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    /// Only read by the CLI simulator.
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundConfig {
    pub account: AccountId,
    pub base_asset: AssetId,
    #[serde(default = "default_base_decimals")]
    pub base_decimals: u8,
    pub quote_assets: Vec<AssetId>,
    /// Omitted means equal weight.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

fn default_base_decimals() -> u8 {
    6
}

impl FundConfig {
    /// Configured weights, or equal weight over the quote assets.
    pub fn weights(&self) -> Result<Weights> {
        match &self.weights {
            Some(fractions) => Weights::from_fractions(fractions),
            None => Weights::equal(self.quote_assets.len()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Minimum output is the quote minus this many basis points.
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
    #[serde(default = "default_max_swaps")]
    pub max_swaps_per_run: usize,
}

fn default_slippage() -> u32 {
    50
}
fn default_deadline() -> u64 {
    1800
}
fn default_max_swaps() -> usize {
    64
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage(),
            deadline_secs: default_deadline(),
            max_swaps_per_run: default_max_swaps(),
        }
    }
}

/// What to do when the base balance cannot cover every planned buy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallPolicy {
    /// Scale every buy by `available / total`.
    #[default]
    ProRata,
    /// Fill buys in fund order until the base runs out.
    InOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Deltas smaller than this (raw base units) are not traded.
    /// Defaults to one whole unit of the base asset.
    #[serde(default)]
    pub dust_threshold: Option<u64>,
    /// Widen the threshold to the largest price impact of liquidating a
    /// single holding.
    #[serde(default = "default_impact_band")]
    pub impact_band: bool,
    #[serde(default)]
    pub shortfall: ShortfallPolicy,
    /// Warn on any single trade above this value. 0 disables.
    #[serde(default)]
    pub max_trade_value: u64,
}

fn default_impact_band() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            dust_threshold: None,
            impact_band: default_impact_band(),
            shortfall: ShortfallPolicy::default(),
            max_trade_value: 0,
        }
    }
}

impl PlannerConfig {
    /// Raw dust threshold for a base asset with `base_decimals` decimals.
    pub fn dust_threshold(&self, base_decimals: u8) -> Amount {
        match self.dust_threshold {
            Some(raw) => Amount(u128::from(raw)),
            None => Amount::units(1, base_decimals).unwrap_or(Amount::MAX),
        }
    }

    pub fn max_trade_value(&self) -> Option<Amount> {
        (self.max_trade_value > 0).then(|| Amount(u128::from(self.max_trade_value)))
    }
}

/// Seed data for the constant-product venue the CLI simulates against.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_fee")]
    pub fee_bps: u32,
    /// Base deposited into the fund before the first round, in whole units.
    pub deposit: String,
    #[serde(default = "default_start_time")]
    pub start_time: u64,
    pub pools: Vec<PoolConfig>,
}

fn default_fee() -> u32 {
    30
}
fn default_start_time() -> u64 {
    1_700_000_000
}

/// One `asset`/base pool. Reserves are in whole units.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub asset: AssetId,
    #[serde(default = "default_quote_decimals")]
    pub decimals: u8,
    pub reserve: String,
    pub base_reserve: String,
}

fn default_quote_decimals() -> u8 {
    18
}

impl SimulationConfig {
    pub fn pool(&self, asset: &AssetId) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| &p.asset == asset)
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        let fund = &self.fund;
        if fund.account.as_str().is_empty() {
            return Err(Error::Config("fund account must not be empty".into()));
        }
        if fund.base_asset.as_str().is_empty() {
            return Err(Error::Config("base_asset must not be empty".into()));
        }
        if fund.quote_assets.is_empty() {
            return Err(Error::Config("quote_assets must not be empty".into()));
        }
        if pow10(fund.base_decimals).is_none() {
            return Err(Error::Config(format!(
                "base_decimals {} out of range",
                fund.base_decimals
            )));
        }
        let mut seen = FxHashSet::default();
        for asset in &fund.quote_assets {
            if asset == &fund.base_asset {
                return Err(Error::Config(format!(
                    "base asset {asset} listed as a quote asset"
                )));
            }
            if !seen.insert(asset) {
                return Err(Error::Config(format!("duplicate quote asset: {asset}")));
            }
        }
        let weights = fund.weights().map_err(|e| match e {
            Error::InvalidConfiguration(msg) => Error::Config(msg),
            other => other,
        })?;
        if weights.len() != fund.quote_assets.len() {
            return Err(Error::Config(format!(
                "{} weights for {} quote assets",
                weights.len(),
                fund.quote_assets.len()
            )));
        }

        if self.execution.slippage_bps >= 10_000 {
            return Err(Error::Config("slippage_bps must be < 10000".into()));
        }
        if self.execution.deadline_secs == 0 {
            return Err(Error::Config("deadline_secs must be > 0".into()));
        }
        if self.execution.max_swaps_per_run < fund.quote_assets.len() {
            return Err(Error::Config(format!(
                "max_swaps_per_run {} cannot cover {} quote assets",
                self.execution.max_swaps_per_run,
                fund.quote_assets.len()
            )));
        }

        if let Some(sim) = &self.simulation {
            self.validate_simulation(sim)?;
        }
        Ok(())
    }

    fn validate_simulation(&self, sim: &SimulationConfig) -> Result<()> {
        if sim.fee_bps >= 10_000 {
            return Err(Error::Config("simulation fee_bps must be < 10000".into()));
        }
        parse_amount(&sim.deposit, self.fund.base_decimals, "deposit")?;
        for asset in &self.fund.quote_assets {
            let pool = sim
                .pool(asset)
                .ok_or_else(|| Error::Config(format!("no simulation pool for {asset}")))?;
            let reserve = parse_amount(&pool.reserve, pool.decimals, "reserve")?;
            let base_reserve =
                parse_amount(&pool.base_reserve, self.fund.base_decimals, "base_reserve")?;
            if reserve.is_zero() || base_reserve.is_zero() {
                return Err(Error::Config(format!("pool for {asset} has an empty reserve")));
            }
        }
        Ok(())
    }
}

/// Parse a whole-unit decimal string into raw units.
pub fn parse_amount(value: &str, decimals: u8, field: &str) -> Result<Amount> {
    Amount::parse_units(value, decimals)
        .map_err(|e| Error::Config(format!("{field} {value:?}: {e}")))
}
