use std::sync::Arc;

use codec::Decode;
use tokio::sync::Mutex;
use tracing::trace;

use super::{
    AccountInfo, BlockNumber, ChainClient, Error, ExtStatusSub, Extrinsic, Header, Metadata,
    RuntimeVersion, StorageChangeSet, StorageKey, StorageSubscription,
};
use crate::types::{AccountId, BlockHash};

/// Serializes all calls to a [ChainClient].
///
/// The metadata is fetched once on connect and never refreshed.
pub struct Api {
    client: Arc<dyn ChainClient>,
    meta: Arc<dyn Metadata>,
    lock: Mutex<()>,
}

impl core::fmt::Debug for Api {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Api").finish_non_exhaustive()
    }
}

impl Api {
    pub async fn connect(client: Arc<dyn ChainClient>) -> Result<Self, Error> {
        let meta = client.metadata().await?;
        Ok(Self {
            client,
            meta,
            lock: Mutex::new(()),
        })
    }

    pub fn metadata(&self) -> &Arc<dyn Metadata> {
        &self.meta
    }

    pub fn build_key(&self, pallet: &str, item: &str, args: &[&[u8]]) -> Result<StorageKey, Error> {
        self.meta.storage_key(pallet, item, args)
    }

    pub async fn latest_header(&self) -> Result<Header, Error> {
        let _guard = self.lock.lock().await;
        self.client.latest_header().await
    }

    pub async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, Error> {
        let _guard = self.lock.lock().await;
        self.client.block_hash(number).await
    }

    /// Hash of the block `past_blocks` before the latest one, or of the
    /// genesis block if the chain is shorter than that.
    pub async fn past_block(&self, past_blocks: BlockNumber) -> Result<BlockHash, Error> {
        let current = self.latest_header().await?.number;
        let number = current.saturating_sub(past_blocks);
        trace!(current, number, "Resolved past block");
        self.block_hash(number).await
    }

    pub async fn runtime_version(&self) -> Result<RuntimeVersion, Error> {
        let _guard = self.lock.lock().await;
        self.client.runtime_version().await
    }

    pub async fn subscribe(&self, keys: &[StorageKey]) -> Result<StorageSubscription, Error> {
        let _guard = self.lock.lock().await;
        self.client.subscribe_storage(keys).await
    }

    pub async fn query_all(
        &self,
        keys: &[StorageKey],
        from: BlockHash,
    ) -> Result<Vec<StorageChangeSet>, Error> {
        let _guard = self.lock.lock().await;
        self.client.query_storage(keys, from).await
    }

    /// Latest value of `key`, looking back at most `past_blocks` blocks.
    ///
    /// `None` if nothing was found or the key was removed.
    pub async fn query_one(
        &self,
        past_blocks: BlockNumber,
        key: &StorageKey,
    ) -> Result<Option<Vec<u8>>, Error> {
        let from = self.past_block(past_blocks).await?;
        let sets = self.query_all(core::slice::from_ref(key), from).await?;
        let Some(last) = sets.last() else {
            return Ok(None);
        };
        match last.changes.as_slice() {
            [(_, data)] => Ok(data.clone()),
            changes => Err(Error::UnexpectedChanges(changes.len())),
        }
    }

    pub async fn account_info(&self, who: &AccountId) -> Result<AccountInfo, Error> {
        let key = self.build_key("System", "Account", &[who.as_bytes()])?;
        let data = self.query_one(0, &key).await?.ok_or(Error::AccountNotFound)?;
        Ok(AccountInfo::decode(&mut data.as_slice())?)
    }

    /// Submits the extrinsic and returns a subscription to its status.
    pub async fn transact(&self, ext: &Extrinsic) -> Result<ExtStatusSub, Error> {
        let _guard = self.lock.lock().await;
        let statuses = self.client.submit_and_watch(ext).await?;
        Ok(ExtStatusSub::new(statuses))
    }
}
