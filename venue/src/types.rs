//! Shared venue types: swap requests and paths.

use equibasket::{AccountId, Amount, AssetId, Timestamp};

use crate::error::VenueError;

/// An exact-input swap, `swapExactTokensForTokens` style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    /// Account the input is pulled from (must have approved the venue).
    pub sender: AccountId,
    pub amount_in: Amount,
    /// Swap reverts when the final output would be below this.
    pub min_amount_out: Amount,
    /// `path[0]` is sold, `path[last]` is received.
    pub path: Vec<AssetId>,
    pub recipient: AccountId,
    /// Last ledger timestamp at which the swap may execute.
    pub deadline: Timestamp,
}

impl SwapRequest {
    pub fn asset_in(&self) -> Option<&AssetId> {
        self.path.first()
    }

    pub fn asset_out(&self) -> Option<&AssetId> {
        self.path.last()
    }
}

/// A path must name at least two assets and never repeat one back to back.
pub fn validate_path(path: &[AssetId]) -> Result<(), VenueError> {
    if path.len() < 2 {
        return Err(VenueError::InvalidPath(format!(
            "path needs at least 2 assets, got {}",
            path.len()
        )));
    }
    if let Some(hop) = path.windows(2).find(|w| w[0] == w[1]) {
        return Err(VenueError::InvalidPath(format!(
            "hop from {} to itself",
            hop[0]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AssetId> {
        names.iter().map(|n| AssetId::new(*n)).collect()
    }

    #[test]
    fn path_validation() {
        assert!(validate_path(&ids(&["TKN1", "USDC"])).is_ok());
        assert!(validate_path(&ids(&["TKN1", "USDC", "TKN2"])).is_ok());
        assert!(validate_path(&ids(&["TKN1"])).is_err());
        assert!(validate_path(&ids(&["USDC", "USDC"])).is_err());
    }

    #[test]
    fn request_endpoints() {
        let req = SwapRequest {
            sender: AccountId::new("fund"),
            amount_in: Amount(10),
            min_amount_out: Amount(1),
            path: ids(&["TKN1", "USDC"]),
            recipient: AccountId::new("fund"),
            deadline: 0,
        };
        assert_eq!(req.asset_in(), Some(&AssetId::new("TKN1")));
        assert_eq!(req.asset_out(), Some(&AssetId::new("USDC")));
    }
}
