//! Chain access: the transport seam, storage queries and subscriptions,
//! extrinsic construction and chain time.
//!
//! Everything here is independent of the Perun pallet, see
//! [crate::pallet] for that.

mod account_info;
mod api;
mod dot;
mod event_source;
mod ext_status;
mod extrinsic;
mod timeout;


use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use codec::{Decode, Encode};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    types::{BlockHash, Hash},
    wallet,
};

pub use account_info::{AccountData, AccountInfo};
pub use api::Api;
pub use dot::Dot;
pub use event_source::{EventKey, EventSource};
pub use ext_status::{ext_is_final, ExtStatusSub, ExtrinsicStatus};
pub use extrinsic::{
    Call, CallIndex, ExtFactory, ExtName, Extrinsic, ExtrinsicSignature, SignatureOptions,
};
pub use timeout::{ChainTimeout, ExpiredTimeout, DEFAULT_TIMEOUT_POLL_INTERVAL};

/// Capacity of every event channel. A full channel blocks the producer.
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Signing context substrate uses for sr25519 signatures.
pub const SIGNATURE_CONTEXT: &[u8] = b"substrate";

pub type BlockNumber = u32;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("metadata: {0}")]
    Metadata(String),
    #[error("decoding: {0}")]
    Codec(#[from] codec::Error),
    #[error("signing: {0}")]
    Wallet(#[from] wallet::Error),
    #[error("account not found")]
    AccountNotFound,
    #[error("storage query returned {0} changes for a single key")]
    UnexpectedChanges(usize),
    #[error("subscription closed")]
    SubscriptionClosed,
    #[error("extrinsic rejected with status {0:?}")]
    ExtrinsicRejected(ExtrinsicStatus),
    #[error("operation cancelled")]
    Cancelled,
}

/// Fully built storage key, hashing is done by [Metadata::storage_key].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(pub Vec<u8>);

impl core::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            f.write_fmt(format_args!("{:02x}", b))?;
        }
        Ok(())
    }
}

/// All changes of the subscribed or queried keys within one block.
///
/// A change without data means the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChangeSet {
    pub block: BlockHash,
    pub changes: Vec<(StorageKey, Option<Vec<u8>>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RuntimeVersion {
    pub spec_version: u32,
    pub transaction_version: u32,
}

/// Phase of block execution in which an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Phase {
    /// Emitted while applying the extrinsic with this index.
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

impl Phase {
    /// Only events emitted by an applied extrinsic are trusted as final.
    pub fn is_apply_extrinsic(&self) -> bool {
        matches!(self, Phase::ApplyExtrinsic(_))
    }
}

/// One entry of `System.Events`, split by the [Metadata] but with the
/// event fields still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub phase: Phase,
    pub pallet: String,
    pub variant: String,
    pub data: Vec<u8>,
    pub topics: Vec<Hash>,
}

/// Runtime metadata of the connected node.
pub trait Metadata: Send + Sync {
    /// Builds the hashed key of a storage item, `args` are the encoded map
    /// keys (if any).
    fn storage_key(&self, pallet: &str, item: &str, args: &[&[u8]]) -> Result<StorageKey, Error>;

    fn call_index(&self, pallet: &str, function: &str) -> Result<CallIndex, Error>;

    /// Splits an encoded `System.Events` value into its records.
    fn decode_events(&self, raw: &[u8]) -> Result<Vec<EventRecord>, Error>;
}

pub type StorageSubscription = mpsc::Receiver<Result<StorageChangeSet, Error>>;
pub type ExtrinsicStatusSubscription = mpsc::Receiver<Result<ExtrinsicStatus, Error>>;

/// RPC connection to a substrate node.
///
/// Subscriptions end when their receiver is dropped.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn metadata(&self) -> Result<Arc<dyn Metadata>, Error>;

    async fn latest_header(&self) -> Result<Header, Error>;

    async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, Error>;

    async fn runtime_version(&self) -> Result<RuntimeVersion, Error>;

    /// Changes of `keys` from block `from` up to the latest block. The first
    /// set holds the values at `from`.
    async fn query_storage(
        &self,
        keys: &[StorageKey],
        from: BlockHash,
    ) -> Result<Vec<StorageChangeSet>, Error>;

    async fn subscribe_storage(&self, keys: &[StorageKey]) -> Result<StorageSubscription, Error>;

    async fn submit_and_watch(&self, ext: &Extrinsic)
        -> Result<ExtrinsicStatusSubscription, Error>;
}

/// Returns a token that is cancelled after `timeout`.
pub fn deadline(timeout: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => child.cancel(),
            _ = child.cancelled() => {}
        }
    });
    token
}
