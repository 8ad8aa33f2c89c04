//! Error types for the rebalancer.

use std::path::PathBuf;

use equibasket::{Amount, AssetId, Timestamp};
use equibasket_venue::VenueError;

/// All errors that can occur during a rebalance.
///
/// Any of these aborts the invocation, and the fund reverts the ledger to
/// where it was on entry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no liquidity for {asset_in} -> {asset_out}")]
    NoLiquidity { asset_in: AssetId, asset_out: AssetId },

    #[error("quote failed: {0}")]
    QuoteFailure(String),

    #[error("slippage exceeded: received {amount_out}, minimum {min_amount_out}")]
    SlippageExceeded {
        min_amount_out: Amount,
        amount_out: Amount,
    },

    #[error("deadline {deadline} expired (now {now})")]
    DeadlineExpired { deadline: Timestamp, now: Timestamp },

    #[error("rebalance already in progress")]
    Reentrant,

    #[error("risk check failed: {0}")]
    RiskFailed(String),

    #[error("venue error: {0}")]
    Venue(VenueError),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl From<VenueError> for Error {
    fn from(e: VenueError) -> Self {
        match e {
            VenueError::NoLiquidity {
                asset_in,
                asset_out,
            } => Error::NoLiquidity {
                asset_in,
                asset_out,
            },
            VenueError::SlippageExceeded {
                min_amount_out,
                amount_out,
            } => Error::SlippageExceeded {
                min_amount_out,
                amount_out,
            },
            VenueError::DeadlineExpired { deadline, now } => {
                Error::DeadlineExpired { deadline, now }
            }
            other => Error::Venue(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_errors_map_onto_taxonomy() {
        let e: Error = VenueError::DeadlineExpired {
            deadline: 10,
            now: 11,
        }
        .into();
        assert!(matches!(e, Error::DeadlineExpired { deadline: 10, now: 11 }));

        let e: Error = VenueError::NoLiquidity {
            asset_in: AssetId::new("TKN1"),
            asset_out: AssetId::new("USDC"),
        }
        .into();
        assert_eq!(e.to_string(), "no liquidity for TKN1 -> USDC");

        let e: Error = VenueError::InsufficientInput.into();
        assert!(matches!(e, Error::Venue(VenueError::InsufficientInput)));
    }
}
