use codec::{Decode, Encode};
use num_bigint::BigInt;
use num_traits::Signed;

use super::{PartIdx, Sig};
use crate::{types::ChannelId, wallet::Address};

/// Balance of one participant in one asset.
pub type Bal = BigInt;

/// Balances per asset per participant.
pub type Balances = Vec<Vec<Bal>>;

/// The only asset a Perun pallet holds, the chain's native currency.
///
/// Encodes to nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct Asset;

/// Fixed parameters of a channel, they determine its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Seconds that a dispute stays open for refutation.
    pub challenge_duration: u64,
    pub parts: Vec<Address>,
    pub nonce: BigInt,
}

impl Params {
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAlloc {
    pub id: ChannelId,
    pub bals: Vec<Bal>,
    pub index_map: Vec<PartIdx>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub assets: Vec<Asset>,
    pub balances: Balances,
    /// Funds locked in sub-channels.
    pub locked: Vec<SubAlloc>,
}

impl Allocation {
    /// Single asset allocation without locked funds.
    pub fn new(balances: Vec<Bal>) -> Self {
        Self {
            assets: vec![Asset],
            balances: vec![balances],
            locked: Vec::new(),
        }
    }

    pub fn num_parts(&self) -> usize {
        self.balances.first().map_or(0, Vec::len)
    }

    /// One balance row per asset, all rows of the same width and no negative
    /// balances anywhere.
    pub fn valid(&self) -> bool {
        let parts = self.num_parts();
        !self.assets.is_empty()
            && self.balances.len() == self.assets.len()
            && self
                .balances
                .iter()
                .all(|row| row.len() == parts && row.iter().all(|b| !b.is_negative()))
            && self
                .locked
                .iter()
                .all(|sub| sub.bals.len() == self.assets.len() && sub.bals.iter().all(|b| !b.is_negative()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    pub id: ChannelId,
    pub version: u64,
    pub allocation: Allocation,
    /// App data, empty for channels without an app.
    pub data: Vec<u8>,
    pub is_final: bool,
}

impl State {
    pub fn valid(&self) -> bool {
        self.allocation.valid()
    }
}

/// A state together with the signatures of all participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub state: State,
    pub sigs: Vec<Sig>,
}

/// A fully signed state of a sub-channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedState {
    pub params: Params,
    pub state: State,
    pub sigs: Vec<Sig>,
}
