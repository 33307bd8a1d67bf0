//! Backend independent channel types and the interfaces a backend
//! implements for the channel framework.

mod adjudicator;
mod funder;
mod state;

use core::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{types::ChannelId, wallet};

pub use adjudicator::*;
pub use funder::*;
pub use state::*;

/// Index of a participant in the channel.
///
/// `0` is the proposer of the channel.
pub type PartIdx = usize;

/// Signature as produced by a [wallet::Account].
pub type Sig = Vec<u8>;

/// A blocking wait was cancelled by its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A point in time after which a channel can be progressed.
#[async_trait]
pub trait Timeout: Send + Sync + Debug {
    async fn is_elapsed(&self) -> bool;

    /// Returns once the timeout is elapsed.
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled>;
}

/// Channel identity and state signatures of one chain.
pub trait Backend: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn calc_id(&self, params: &Params) -> Result<ChannelId, Self::Error>;

    fn sign(&self, acc: &dyn wallet::Account, state: &State) -> Result<Sig, Self::Error>;

    fn verify(
        &self,
        addr: &wallet::Address,
        state: &State,
        sig: &[u8],
    ) -> Result<bool, Self::Error>;

    fn decode_asset(&self, input: &mut &[u8]) -> Result<Asset, Self::Error>;
}
