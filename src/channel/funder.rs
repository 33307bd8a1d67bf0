use core::fmt::Display;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{Balances, Params, PartIdx, State};

/// Request to fund participant `idx`'s share of a new channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingReq {
    pub params: Params,
    pub state: State,
    pub idx: PartIdx,
    /// Balances every participant agreed to deposit, per asset.
    pub agreement: Balances,
}

/// Participants that did not fund one asset in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFundingError {
    /// Index of the asset in the allocation.
    pub asset: usize,
    pub timed_out_peers: Vec<PartIdx>,
}

impl Display for AssetFundingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "asset {}: peers {:?} did not fund in time",
            self.asset, self.timed_out_peers
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("funding timed out: {}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct FundingTimeoutError {
    pub errors: Vec<AssetFundingError>,
}

/// Deposits a participant's share and waits until all shares arrived.
#[async_trait]
pub trait Funder: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fund(&self, req: &FundingReq, cancel: &CancellationToken) -> Result<(), Self::Error>;
}
