use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{AdjudicatorSub, Error, EventSub, Pallet};
use crate::{
    backend::{self, event_is_concluded, event_is_disputed, PerunEvent},
    channel::{self, AdjudicatorReq, ProgressReq, SignedState, StateMap},
    substrate::{ext_is_final, Extrinsic},
    types::ChannelId,
    wallet::Account,
};

/// Disputes, concludes and withdraws channels, paying fees from one on-chain
/// account.
#[derive(Debug, Clone)]
pub struct Adjudicator {
    pallet: Pallet,
    on_chain: Arc<dyn Account>,
}

impl Adjudicator {
    pub fn new(pallet: Pallet, on_chain: Arc<dyn Account>) -> Self {
        Self { pallet, on_chain }
    }

    fn validate_register(req: &AdjudicatorReq) -> Result<(), Error> {
        if req.secondary {
            Err(Error::IncompatibleRequest("secondary is not supported"))
        } else if req.tx.state.is_final {
            Err(Error::IncompatibleRequest("cannot dispute final state"))
        } else {
            Ok(())
        }
    }

    async fn dispute(
        &self,
        cid: ChannelId,
        req: &AdjudicatorReq,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let past_blocks = self.pallet.config().past_blocks;
        let mut sub = self.pallet.subscribe(event_is_disputed(cid), past_blocks).await?;

        let ext = self
            .pallet
            .build_dispute(
                self.on_chain.as_ref(),
                &backend::new_params(&req.params)?,
                &backend::new_state(&req.tx.state)?,
                &backend::make_sigs(&req.tx.sigs)?,
            )
            .await?;
        debug!(?cid, version = req.tx.state.version, "Dispute");
        self.call(&ext, cancel).await?;

        let res = wait_for_dispute(&mut sub, req.tx.state.version, cancel).await;
        sub.close();
        res
    }

    /// Makes sure the channel is concluded with the version of `req`.
    async fn ensure_concluded(
        &self,
        cid: ChannelId,
        req: &AdjudicatorReq,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let past_blocks = self.pallet.config().past_blocks;
        let registered = match self.pallet.query_state_register(cid, past_blocks).await {
            Ok(registered) => Some(registered),
            Err(Error::NoRegisteredState) => None,
            Err(e) => return Err(e),
        };
        // A final state concludes at once, otherwise the dispute must be over.
        if let Some(registered) = registered {
            if !req.tx.state.is_final {
                trace!(?cid, timeout = registered.timeout, "Waiting for dispute timeout");
                self.pallet.make_timeout(registered.timeout).wait(cancel).await?;
            }
        }

        let mut sub = self.pallet.subscribe(event_is_concluded(cid), past_blocks).await?;
        let ext = self
            .pallet
            .build_conclude(
                self.on_chain.as_ref(),
                &backend::new_params(&req.params)?,
                &backend::new_state(&req.tx.state)?,
                &backend::make_sigs(&req.tx.sigs)?,
            )
            .await?;
        self.call(&ext, cancel).await?;
        // Either our conclude or someone else's.
        let res = wait_for_concluded(&mut sub, cancel).await;
        sub.close();
        res?;

        // The event does not carry the version.
        let registered = self.pallet.query_state_register(cid, past_blocks).await?;
        if registered.state.version != req.tx.state.version {
            return Err(Error::ConcludedWithDifferentVersion {
                expected: req.tx.state.version,
                concluded: registered.state.version,
            });
        }
        Ok(())
    }

    async fn send_withdraw(
        &self,
        cid: ChannelId,
        req: &AdjudicatorReq,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let withdrawal =
            backend::new_withdrawal(cid, &req.acc.address(), &self.on_chain.address())?;
        let ext = self
            .pallet
            .build_withdraw(self.on_chain.as_ref(), req.acc.as_ref(), &withdrawal)
            .await?;
        self.call(&ext, cancel).await
    }

    /// Sends the extrinsic and waits until it is finalized. Says nothing
    /// about whether the call succeeded, watch the pallet's events for that.
    async fn call(&self, ext: &Extrinsic, cancel: &CancellationToken) -> Result<(), Error> {
        let mut status = self.pallet.transact(ext).await?;
        trace!("Waiting for finality");
        status.wait_until(ext_is_final, cancel).await?;
        Ok(())
    }
}

#[async_trait]
impl channel::Adjudicator for Adjudicator {
    type Error = Error;
    type Subscription = AdjudicatorSub;

    async fn register(
        &self,
        req: &AdjudicatorReq,
        sub_channels: &[SignedState],
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        Self::validate_register(req)?;
        if !sub_channels.is_empty() {
            return Err(Error::IncompatibleRequest("sub-channels unsupported"));
        }
        let cid = backend::calc_id(&req.params)?;
        self.dispute(cid, req, cancel).await
    }

    async fn withdraw(
        &self,
        req: &AdjudicatorReq,
        sub_states: &StateMap,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if !sub_states.is_empty() {
            return Err(Error::IncompatibleRequest("sub-channels unsupported"));
        }
        let cid = backend::calc_id(&req.params)?;
        trace!(?cid, version = req.tx.state.version, "Withdrawing");
        self.ensure_concluded(cid, req, cancel).await?;
        self.send_withdraw(cid, req, cancel).await
    }

    async fn progress(
        &self,
        _req: &ProgressReq,
        _cancel: &CancellationToken,
    ) -> Result<(), Error> {
        Err(Error::ProgressUnsupported)
    }

    async fn subscribe(&self, cid: ChannelId) -> Result<AdjudicatorSub, Error> {
        AdjudicatorSub::new(cid, self.pallet.clone(), self.pallet.config().past_blocks).await
    }
}

/// Waits for a final `Disputed` event with at least `version`.
async fn wait_for_dispute(
    sub: &mut EventSub,
    version: u64,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    trace!(version, "Waiting for dispute event");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            event = sub.recv() => event,
        };
        match event {
            Some(Ok(PerunEvent::Disputed(event))) => {
                if !event.phase.is_apply_extrinsic() {
                    continue;
                }
                if event.state.version < version {
                    trace!(version = event.state.version, "Discarded dispute event");
                    continue;
                }
                debug!(version = event.state.version, "Accepted dispute event");
                return Ok(());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e),
            None => return Err(Error::EventSubClosed),
        }
    }
}

async fn wait_for_concluded(sub: &mut EventSub, cancel: &CancellationToken) -> Result<(), Error> {
    trace!("Waiting for concluded event");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            event = sub.recv() => event,
        };
        match event {
            Some(Ok(PerunEvent::Concluded(event))) if event.phase.is_apply_extrinsic() => {
                debug!(cid = ?event.cid, "Accepted concluded event");
                return Ok(());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e),
            None => return Err(Error::EventSubClosed),
        }
    }
}
