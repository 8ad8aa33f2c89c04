//! In-memory market for dry runs: a ledger, a constant-product venue seeded
//! from `[simulation]`, and the configured fund on top of them.

use std::sync::Arc;

use equibasket::{AccountId, Amount, AssetId};
use equibasket_venue::{ConstantProductVenue, InMemoryLedger, Ledger, SwapRequest, Venue};
use log::info;
use rustc_hash::FxHashMap;

use crate::config::{Config, parse_amount};
use crate::error::{Error, Result};
use crate::fund::{Fund, FundParams};

pub type SimulatedFund = Fund<InMemoryLedger, ConstantProductVenue<InMemoryLedger>>;

/// Account that seeds the pools.
const LIQUIDITY_PROVIDER: &str = "liquidity-provider";
/// Account of the router.
const ROUTER: &str = "router";

pub struct Simulation {
    pub ledger: Arc<InMemoryLedger>,
    pub venue: Arc<ConstantProductVenue<InMemoryLedger>>,
    pub fund: SimulatedFund,
    decimals: FxHashMap<AssetId, u8>,
}

impl Simulation {
    /// Seed pools and deposit the initial base into the fund.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sim = config
            .simulation
            .as_ref()
            .ok_or_else(|| Error::Config("missing [simulation] section".into()))?;
        let base = &config.fund.base_asset;
        let base_decimals = config.fund.base_decimals;

        let ledger = Arc::new(InMemoryLedger::with_timestamp(sim.start_time));
        let venue = Arc::new(ConstantProductVenue::with_fee(
            Arc::clone(&ledger),
            AccountId::new(ROUTER),
            sim.fee_bps,
        ));

        let mut decimals = FxHashMap::default();
        decimals.insert(base.clone(), base_decimals);
        let provider = AccountId::new(LIQUIDITY_PROVIDER);
        for asset in &config.fund.quote_assets {
            let pool = sim
                .pool(asset)
                .ok_or_else(|| Error::Config(format!("no simulation pool for {asset}")))?;
            let reserve = parse_amount(&pool.reserve, pool.decimals, "reserve")?;
            let base_reserve = parse_amount(&pool.base_reserve, base_decimals, "base_reserve")?;

            ledger.mint(asset, &provider, reserve)?;
            ledger.mint(base, &provider, base_reserve)?;
            venue.add_liquidity(&provider, asset, base, reserve, base_reserve)?;
            decimals.insert(asset.clone(), pool.decimals);
            info!("Seeded {asset}/{base} pool: {} / {}", pool.reserve, pool.base_reserve);
        }

        let params = FundParams::from_config(config)?;
        let fund = Fund::new(params, Arc::clone(&ledger), Arc::clone(&venue))?;
        let simulation = Self {
            ledger,
            venue,
            fund,
            decimals,
        };
        simulation.deposit_units(&sim.deposit)?;
        Ok(simulation)
    }

    fn deposit_units(&self, units: &str) -> Result<()> {
        let amount = parse_amount(units, self.decimals(self.fund.base_asset()), "deposit")?;
        if !amount.is_zero() {
            self.deposit(self.fund.base_asset(), amount)?;
        }
        info!("Deposited {units} {} at t={}", self.fund.base_asset(), self.ledger.timestamp());
        Ok(())
    }

    /// Credit `amount` of `asset` to the fund.
    pub fn deposit(&self, asset: &AssetId, amount: Amount) -> Result<()> {
        self.ledger.mint(asset, self.fund.account(), amount)?;
        Ok(())
    }

    /// Swap as an outside trader, moving a pool's price. Returns the output.
    pub fn external_swap(
        &self,
        trader: &AccountId,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
    ) -> Result<Amount> {
        self.ledger.mint(asset_in, trader, amount_in)?;
        self.ledger
            .approve(asset_in, trader, self.venue.account(), amount_in)?;
        let out = self.venue.swap_exact_input(&SwapRequest {
            sender: trader.clone(),
            amount_in,
            min_amount_out: Amount::ZERO,
            path: vec![asset_in.clone(), asset_out.clone()],
            recipient: trader.clone(),
            deadline: self.ledger.timestamp(),
        })?;
        Ok(out)
    }

    pub fn decimals(&self, asset: &AssetId) -> u8 {
        self.decimals.get(asset).copied().unwrap_or(18)
    }

    /// `amount` of `asset` in whole units.
    pub fn format(&self, asset: &AssetId, amount: Amount) -> String {
        amount.format_units(self.decimals(asset))
    }

    pub fn balance(&self, asset: &AssetId) -> Result<Amount> {
        Ok(self.ledger.balance_of(asset, self.fund.account())?)
    }
}
