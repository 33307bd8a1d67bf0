use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use num_bigint::BigInt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{DepositReq, Depositor, Error, EventSub, Pallet};
use crate::{
    backend::{self, event_is_deposited, PerunEvent},
    channel::{self, AssetFundingError, FundingReq, FundingTimeoutError, PartIdx},
    types::FundingId,
    wallet::Account,
};

/// Funds channels from one on-chain account.
#[derive(Debug, Clone)]
pub struct Funder {
    pallet: Pallet,
    acc: Arc<dyn Account>,
}

impl Funder {
    pub fn new(pallet: Pallet, acc: Arc<dyn Account>) -> Self {
        Self { pallet, acc }
    }

    /// Blocks until every participant's `Deposited` total reached its agreed
    /// balance, or fails with the participants that had not when `cancel`
    /// fires.
    async fn wait_for_fundings(
        &self,
        sub: &mut EventSub,
        req: &FundingReq,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let mut fids = calc_fids(req)?;
        trace!(peers = fids.len(), "Waiting for funding");

        while !fids.is_empty() {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(make_timeout_err(&fids).into()),
                event = sub.recv() => event,
            };
            let event = match event {
                Some(Ok(PerunEvent::Deposited(event))) => event,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => return Err(Error::EventSubClosed),
            };
            if !event.phase.is_apply_extrinsic() {
                continue;
            }
            let Some(&idx) = fids.get(&event.fid) else {
                trace!(fid = ?event.fid, "Ignored funding");
                continue;
            };
            let want = &req.agreement[0][idx];
            if BigInt::from(event.balance) >= *want {
                fids.remove(&event.fid);
                trace!(fid = ?event.fid, remaining = fids.len(), "Peer funded");
            }
        }
        debug!("All peers funded");
        Ok(())
    }
}

#[async_trait]
impl channel::Funder for Funder {
    type Error = Error;

    async fn fund(&self, req: &FundingReq, cancel: &CancellationToken) -> Result<(), Error> {
        // Subscribe before depositing so that no deposit is missed.
        let mut sub = self
            .pallet
            .subscribe(event_is_deposited, self.pallet.config().past_blocks)
            .await?;

        let deposit = DepositReq::from_funding_req(req, self.acc.clone())?;
        Depositor::new(self.pallet.clone())
            .deposit(&deposit, cancel)
            .await?;

        let res = self.wait_for_fundings(&mut sub, req, cancel).await;
        sub.close();
        res
    }
}

fn make_timeout_err(remaining: &HashMap<FundingId, PartIdx>) -> FundingTimeoutError {
    let mut peers: Vec<PartIdx> = remaining.values().copied().collect();
    peers.sort_unstable();
    FundingTimeoutError {
        errors: vec![AssetFundingError {
            asset: 0,
            timed_out_peers: peers,
        }],
    }
}

fn calc_fids(req: &FundingReq) -> Result<HashMap<FundingId, PartIdx>, Error> {
    let fids = backend::make_funding_ids(req.state.id, &req.params.parts)?;
    Ok(fids.into_iter().enumerate().map(|(i, fid)| (fid, i)).collect())
}
