use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Error, Pallet};
use crate::{
    backend::{self, Balance},
    channel::FundingReq,
    substrate::{ext_is_final, Dot},
    types::FundingId,
    wallet::Account,
};

/// A deposit of `balance` into `fid`, paid by `account`.
#[derive(Debug, Clone)]
pub struct DepositReq {
    pub balance: Balance,
    pub account: Arc<dyn Account>,
    pub fid: FundingId,
}

impl DepositReq {
    pub fn new(balance: Balance, account: Arc<dyn Account>, fid: FundingId) -> Self {
        Self {
            balance,
            account,
            fid,
        }
    }

    /// The deposit of participant `req.idx` as agreed upon in the request.
    ///
    /// Only single asset agreements with one balance per participant are
    /// supported.
    pub fn from_funding_req(req: &FundingReq, account: Arc<dyn Account>) -> Result<Self, Error> {
        let [bals] = req.agreement.as_slice() else {
            return Err(Error::FundingReqIncompatible);
        };
        if bals.len() != req.params.num_parts() {
            return Err(Error::FundingReqIncompatible);
        }
        let bal = bals.get(req.idx).ok_or(Error::FundingReqIncompatible)?;
        let balance = backend::make_balance(bal).map_err(|_| Error::FundingReqIncompatible)?;
        let fid = backend::make_funding(req)
            .map_err(|_| Error::FundingReqIncompatible)?
            .id();
        Ok(Self::new(balance, account, fid))
    }
}

/// Deposits funds into channels.
#[derive(Debug, Clone)]
pub struct Depositor {
    pallet: Pallet,
}

impl Depositor {
    pub fn new(pallet: Pallet) -> Self {
        Self { pallet }
    }

    /// Returns once the deposit extrinsic is finalized. That does not mean it
    /// succeeded, watch for the `Deposited` event for that.
    pub async fn deposit(&self, req: &DepositReq, cancel: &CancellationToken) -> Result<(), Error> {
        let ext = self
            .pallet
            .build_deposit(req.account.as_ref(), req.fid, req.balance)
            .await?;
        debug!(fid = ?req.fid, "Depositing {}", Dot::from_plank(req.balance));
        let mut status = self.pallet.transact(&ext).await?;
        status.wait_until(ext_is_final, cancel).await?;
        Ok(())
    }
}
