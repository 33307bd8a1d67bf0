//! Accounts that sign off-chain data and on-chain extrinsics.
//!
//! Both identities of a participant, the off-chain one that signs channel
//! states and the on-chain one that pays for extrinsics, are sr25519 keys.

pub mod sr25519;


use core::fmt::Debug;

use thiserror::Error;

use crate::{
    substrate::{Extrinsic, SignatureOptions},
    types::{AccountId, OffIdentity},
};

pub use sr25519::verify_signature;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sr25519: {0}")]
    Sr25519(schnorrkel::SignatureError),
    #[error("address has {0} bytes, expected 32")]
    AddressLength(usize),
}

// SignatureError does not implement std::error::Error, so it cannot be a source.
impl From<schnorrkel::SignatureError> for Error {
    fn from(e: schnorrkel::SignatureError) -> Self {
        Self::Sr25519(e)
    }
}

/// Public identity of an [Account].
///
/// Kept as raw bytes so that foreign or malformed addresses can be passed
/// around and rejected at the point where a fixed width is required.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(Vec<u8>);

impl Address {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The on-chain account id with the same public key.
    pub fn account_id(&self) -> Result<AccountId, Error> {
        AccountId::try_from(self.0.as_slice()).map_err(|_| Error::AddressLength(self.0.len()))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            f.write_fmt(format_args!("{:02x}", b))?;
        }
        Ok(())
    }
}

impl From<AccountId> for Address {
    fn from(id: AccountId) -> Self {
        Self(id.0.to_vec())
    }
}

impl From<OffIdentity> for Address {
    fn from(id: OffIdentity) -> Self {
        Self(id.0.to_vec())
    }
}

/// Signing capability of a participant.
///
/// Used for channel states and withdrawals (off-chain) and for paying
/// extrinsics (on-chain).
pub trait Account: Send + Sync + Debug {
    fn address(&self) -> Address;

    /// Signs arbitrary data, returning the raw signature bytes.
    fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Signs the extrinsic in place using the given options.
    fn sign_ext(&self, ext: &mut Extrinsic, opts: &SignatureOptions) -> Result<(), Error>;
}
