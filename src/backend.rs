//! Channel types as the Perun pallet stores them, the conversions from and
//! to the generic [crate::channel] types and the [Backend] built on them.
//!
//! Every on-chain value is SCALE encoded, ids are the Keccak-256 of that
//! encoding and state signatures are sr25519 signatures over it.

mod conversion;
mod event;


use codec::{Decode, Encode};
use thiserror::Error;

use crate::{
    channel,
    scale::to_hash,
    types::{ChannelId, FundingId, Nonce, OffIdentity, OnIdentity},
    wallet,
};

pub use conversion::*;
pub use event::*;

/// Name of the pallet in the runtime.
pub const PALLET: &str = "PerunModule";

pub const NONCE_LEN: usize = Nonce::LEN;
pub const OFF_IDENTITY_LEN: usize = OffIdentity::LEN;
pub const ON_IDENTITY_LEN: usize = OnIdentity::LEN;
pub const SIG_LEN: usize = crate::types::Signature::LEN;

pub type Balance = u128;
pub const MAX_BALANCE: Balance = Balance::MAX;

/// Seconds.
pub type ChallengeDuration = u64;
pub type Version = u64;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nonce must be in [1, 2^256)")]
    NonceOutOfRange,
    #[error("only single asset allocations without locked funds are supported")]
    AllocIncompatible,
    #[error("state is not valid")]
    StateIncompatible,
    #[error("identity has the wrong length")]
    IdentLenMismatch,
    #[error("balance must be in [0, 2^128)")]
    InvalidBalance,
    #[error("participant index {0} out of range")]
    PartIdxOutOfRange(usize),
    #[error("signature has {0} bytes, expected 64")]
    SigLenMismatch(usize),
    #[error("decoding: {0}")]
    Codec(#[from] codec::Error),
    #[error(transparent)]
    Wallet(#[from] wallet::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Params {
    pub nonce: Nonce,
    pub participants: Vec<OffIdentity>,
    pub challenge_duration: ChallengeDuration,
}

impl Params {
    pub fn id(&self) -> ChannelId {
        to_hash(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct State {
    pub channel: ChannelId,
    pub version: Version,
    /// One balance per participant.
    pub balances: Vec<Balance>,
    pub is_final: bool,
}

/// Value of `PerunModule.StateRegister`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RegisteredState {
    pub state: State,
    /// Unix seconds at which the dispute ends.
    pub timeout: u64,
    pub concluded: bool,
}

/// Deposit of one participant into one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Funding {
    pub channel: ChannelId,
    pub part: OffIdentity,
}

impl Funding {
    /// Key of the deposit in `PerunModule.Deposits`.
    pub fn id(&self) -> FundingId {
        to_hash(self)
    }
}

/// Authorizes paying out `part`'s share of `channel` to `receiver`. Signed by
/// `part`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Withdrawal {
    pub channel: ChannelId,
    pub part: OffIdentity,
    pub receiver: OnIdentity,
}

/// [channel::Backend] of the Perun pallet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backend;

impl channel::Backend for Backend {
    type Error = Error;

    fn calc_id(&self, params: &channel::Params) -> Result<ChannelId, Error> {
        calc_id(params)
    }

    fn sign(&self, acc: &dyn wallet::Account, state: &channel::State) -> Result<channel::Sig, Error> {
        let data = new_state(state)?.encode();
        Ok(acc.sign_data(&data)?)
    }

    fn verify(
        &self,
        addr: &wallet::Address,
        state: &channel::State,
        sig: &[u8],
    ) -> Result<bool, Error> {
        let data = new_state(state)?.encode();
        Ok(wallet::verify_signature(&data, sig, addr)?)
    }

    /// The pallet has a single asset which encodes to nothing.
    fn decode_asset(&self, input: &mut &[u8]) -> Result<channel::Asset, Error> {
        Ok(channel::Asset::decode(input)?)
    }
}

/// Channel id of the generic params.
pub fn calc_id(params: &channel::Params) -> Result<ChannelId, Error> {
    Ok(new_params(params)?.id())
}
