use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{Error, ExtrinsicStatusSubscription};
use crate::types::{BlockHash, Hash};

/// Status of a submitted extrinsic as reported by the transaction pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrinsicStatus {
    Future,
    Ready,
    Broadcast,
    InBlock(BlockHash),
    Retracted(BlockHash),
    FinalityTimeout(BlockHash),
    Finalized(BlockHash),
    Usurped(Hash),
    Dropped,
    Invalid,
}

impl ExtrinsicStatus {
    /// The extrinsic will not make progress anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized(_)
                | Self::FinalityTimeout(_)
                | Self::Usurped(_)
                | Self::Dropped
                | Self::Invalid
        )
    }
}

pub fn ext_is_final(status: &ExtrinsicStatus) -> bool {
    matches!(status, ExtrinsicStatus::Finalized(_))
}

/// Status updates of one submitted extrinsic.
#[derive(Debug)]
pub struct ExtStatusSub {
    statuses: ExtrinsicStatusSubscription,
}

impl ExtStatusSub {
    pub(super) fn new(statuses: ExtrinsicStatusSubscription) -> Self {
        Self { statuses }
    }

    /// Waits for the first status that satisfies `pred`.
    ///
    /// Fails if the extrinsic ends in a status that does not.
    pub async fn wait_until<P>(
        &mut self,
        pred: P,
        cancel: &CancellationToken,
    ) -> Result<ExtrinsicStatus, Error>
    where
        P: Fn(&ExtrinsicStatus) -> bool,
    {
        loop {
            let status = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                status = self.statuses.recv() => status,
            };
            match status {
                Some(Ok(status)) => {
                    trace!(?status, "Extrinsic status");
                    if pred(&status) {
                        return Ok(status);
                    }
                    if status.is_terminal() {
                        return Err(Error::ExtrinsicRejected(status));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return Err(Error::SubscriptionClosed),
            }
        }
    }
}
