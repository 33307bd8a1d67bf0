use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{Params, PartIdx, Sig, SignedState, State, Timeout, Transaction};
use crate::{types::ChannelId, wallet::Account};

/// Latest states of sub-channels, keyed by channel id.
pub type StateMap = HashMap<ChannelId, State>;

/// Everything needed to dispute or conclude a channel on-chain.
#[derive(Debug, Clone)]
pub struct AdjudicatorReq {
    pub params: Params,
    /// Off-chain account of the participant, signs withdrawals.
    pub acc: Arc<dyn Account>,
    pub tx: Transaction,
    pub idx: PartIdx,
    /// Whether another participant is expected to send the transaction.
    pub secondary: bool,
}

/// Request to progress an app channel into `new_state`.
#[derive(Debug, Clone)]
pub struct ProgressReq {
    pub req: AdjudicatorReq,
    pub new_state: State,
    pub sig: Sig,
}

/// A dispute for the channel was opened or refuted on-chain.
#[derive(Debug, Clone)]
pub struct RegisteredEvent {
    pub id: ChannelId,
    pub version: u64,
    pub timeout: Arc<dyn Timeout>,
    pub state: State,
    /// Not known to the chain, always `None` when read from there.
    pub sigs: Option<Vec<Sig>>,
}

/// The channel was concluded on-chain.
#[derive(Debug, Clone)]
pub struct ConcludedEvent {
    pub id: ChannelId,
    pub version: u64,
    pub timeout: Arc<dyn Timeout>,
}

#[derive(Debug, Clone)]
pub enum AdjudicatorEvent {
    Registered(RegisteredEvent),
    Concluded(ConcludedEvent),
}

impl AdjudicatorEvent {
    pub fn id(&self) -> ChannelId {
        match self {
            Self::Registered(e) => e.id,
            Self::Concluded(e) => e.id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::Registered(e) => e.version,
            Self::Concluded(e) => e.version,
        }
    }

    pub fn timeout(&self) -> &Arc<dyn Timeout> {
        match self {
            Self::Registered(e) => &e.timeout,
            Self::Concluded(e) => &e.timeout,
        }
    }
}

/// Disputes, concludes and withdraws channels on-chain.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Subscription: AdjudicatorSubscription;

    /// Registers the state of `req` on-chain and waits until the chain
    /// accepted it or a newer version.
    async fn register(
        &self,
        req: &AdjudicatorReq,
        sub_channels: &[SignedState],
        cancel: &CancellationToken,
    ) -> Result<(), Self::Error>;

    /// Concludes the channel if necessary and withdraws the funds of
    /// participant `req.idx`.
    async fn withdraw(
        &self,
        req: &AdjudicatorReq,
        sub_states: &StateMap,
        cancel: &CancellationToken,
    ) -> Result<(), Self::Error>;

    async fn progress(&self, req: &ProgressReq, cancel: &CancellationToken)
        -> Result<(), Self::Error>;

    /// Subscribes to on-chain events of channel `cid`.
    async fn subscribe(&self, cid: ChannelId) -> Result<Self::Subscription, Self::Error>;
}

/// Stream of on-chain events of one channel.
#[async_trait]
pub trait AdjudicatorSubscription: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The next event, `None` once the subscription is closed.
    async fn next(&mut self) -> Option<AdjudicatorEvent>;

    /// Closes the subscription, a pending [Self::next] returns `None`.
    fn close(&self);

    /// The error that closed the subscription, if any.
    fn err(&self) -> Option<&Self::Error>;
}
