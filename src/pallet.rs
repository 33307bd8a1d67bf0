//! Client side of the Perun pallet: its storage, its extrinsics and the
//! funding and dispute protocols built on top of them.

mod adjudicator;
mod adjudicator_sub;
mod depositor;
mod event_sub;
mod funder;


use std::sync::Arc;

use codec::{Decode, Encode};
use thiserror::Error;

use crate::{
    backend::{self, Balance, Params, RegisteredState, State, Withdrawal, PALLET},
    channel::{self, Cancelled, FundingTimeoutError},
    config::Config,
    substrate::{self, Api, ChainTimeout, ExtFactory, ExtName, ExtStatusSub, Extrinsic},
    types::{ChannelId, FundingId, Signature},
    wallet::{self, Account},
};

pub use adjudicator::Adjudicator;
pub use adjudicator_sub::AdjudicatorSub;
pub use depositor::{DepositReq, Depositor};
pub use event_sub::EventSub;
pub use funder::Funder;

pub const DEPOSIT: ExtName = ExtName::new(PALLET, "deposit");
pub const DISPUTE: ExtName = ExtName::new(PALLET, "dispute");
pub const CONCLUDE: ExtName = ExtName::new(PALLET, "conclude");
pub const WITHDRAW: ExtName = ExtName::new(PALLET, "withdraw");

#[derive(Debug, Error)]
pub enum Error {
    #[error("incompatible request: {0}")]
    IncompatibleRequest(&'static str),
    #[error("incompatible funding request")]
    FundingReqIncompatible,
    #[error("no deposit found")]
    NoDeposit,
    #[error("no registered state found")]
    NoRegisteredState,
    #[error("channel was concluded with version {concluded}, expected {expected}")]
    ConcludedWithDifferentVersion { expected: u64, concluded: u64 },
    #[error(transparent)]
    FundingTimeout(#[from] FundingTimeoutError),
    #[error("progress is not supported")]
    ProgressUnsupported,
    #[error("operation cancelled")]
    Cancelled,
    #[error("event subscription closed")]
    EventSubClosed,
    #[error(transparent)]
    Backend(#[from] backend::Error),
    #[error(transparent)]
    Substrate(substrate::Error),
    #[error(transparent)]
    Wallet(#[from] wallet::Error),
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<substrate::Error> for Error {
    fn from(e: substrate::Error) -> Self {
        match e {
            substrate::Error::Cancelled => Self::Cancelled,
            e => Self::Substrate(e),
        }
    }
}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Backend(e.into())
    }
}

/// Queries and extrinsics of the Perun pallet.
#[derive(Debug, Clone)]
pub struct Pallet {
    api: Arc<Api>,
    ext: ExtFactory,
    config: Config,
}

impl Pallet {
    pub fn new(api: Arc<Api>, config: Config) -> Self {
        Self {
            ext: ExtFactory::new(api.clone()),
            api,
            config,
        }
    }

    pub fn api(&self) -> &Arc<Api> {
        &self.api
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribes to the pallet's events that satisfy `pred`, starting
    /// `past_blocks` in the past.
    pub async fn subscribe<P>(
        &self,
        pred: P,
        past_blocks: substrate::BlockNumber,
    ) -> Result<EventSub, Error>
    where
        P: Fn(&backend::PerunEvent) -> bool + Send + Sync + 'static,
    {
        EventSub::new(&self.api, past_blocks, Box::new(pred)).await
    }

    /// Total deposit of `fid`.
    pub async fn query_deposit(
        &self,
        fid: FundingId,
        past_blocks: substrate::BlockNumber,
    ) -> Result<Balance, Error> {
        let key = self.api.build_key(PALLET, "Deposits", &[fid.as_bytes()])?;
        let data = self
            .api
            .query_one(past_blocks, &key)
            .await?
            .ok_or(Error::NoDeposit)?;
        Ok(Balance::decode(&mut data.as_slice())?)
    }

    /// Dispute state of `cid`, [Error::NoRegisteredState] if there never was
    /// a dispute.
    pub async fn query_state_register(
        &self,
        cid: ChannelId,
        past_blocks: substrate::BlockNumber,
    ) -> Result<RegisteredState, Error> {
        let key = self.api.build_key(PALLET, "StateRegister", &[cid.as_bytes()])?;
        let data = self
            .api
            .query_one(past_blocks, &key)
            .await?
            .ok_or(Error::NoRegisteredState)?;
        Ok(RegisteredState::decode(&mut data.as_slice())?)
    }

    pub async fn build_deposit(
        &self,
        acc: &dyn Account,
        fid: FundingId,
        amount: Balance,
    ) -> Result<Extrinsic, Error> {
        let args = (fid, amount).encode();
        Ok(self.ext.build_ext(DEPOSIT, args, acc).await?)
    }

    pub async fn build_dispute(
        &self,
        acc: &dyn Account,
        params: &Params,
        state: &State,
        sigs: &[Signature],
    ) -> Result<Extrinsic, Error> {
        let args = (params, state, sigs).encode();
        Ok(self.ext.build_ext(DISPUTE, args, acc).await?)
    }

    pub async fn build_conclude(
        &self,
        acc: &dyn Account,
        params: &Params,
        state: &State,
        sigs: &[Signature],
    ) -> Result<Extrinsic, Error> {
        let args = (params, state, sigs).encode();
        Ok(self.ext.build_ext(CONCLUDE, args, acc).await?)
    }

    /// Signs the withdrawal with the off-chain `part` and sends it from the
    /// on-chain `acc`.
    pub async fn build_withdraw(
        &self,
        acc: &dyn Account,
        part: &dyn Account,
        withdrawal: &Withdrawal,
    ) -> Result<Extrinsic, Error> {
        let sig = backend::make_sig(&part.sign_data(&withdrawal.encode())?)?;
        let args = (withdrawal, sig).encode();
        Ok(self.ext.build_ext(WITHDRAW, args, acc).await?)
    }

    pub async fn transact(&self, ext: &Extrinsic) -> Result<ExtStatusSub, Error> {
        Ok(self.api.transact(ext).await?)
    }

    /// Timeout at the on-chain time `when` (unix seconds).
    pub fn make_timeout(&self, when: u64) -> Arc<dyn channel::Timeout> {
        Arc::new(ChainTimeout::new(
            self.api.clone(),
            when,
            self.config.timeout_poll_interval(),
        ))
    }
}
