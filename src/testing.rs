//! In-memory chain running a Perun pallet, for tests.
//!
//! Storage keys are `Pallet.Item` followed by the raw map keys, blocks are
//! produced on demand (one per extrinsic) or by [MockChain::produce_blocks].
//! Every block advances the chain time by [BLOCK_TIME_MS].

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use codec::{Decode, Encode};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    backend::{Balance, Funding, Params, RegisteredState, State, Withdrawal, PALLET},
    scale::to_hash,
    substrate::{
        AccountInfo, BlockNumber, Call, CallIndex, ChainClient, Error, EventRecord, Extrinsic,
        ExtrinsicStatus, ExtrinsicStatusSubscription, Header, Metadata, Phase, RuntimeVersion,
        SignatureOptions, StorageChangeSet, StorageKey, StorageSubscription, EVENT_BUFFER_SIZE,
    },
    types::{AccountId, BlockHash, ChannelId, FundingId, Hash, Signature},
    wallet::verify_signature,
};

pub const GENESIS_MS: u64 = 1_600_000_000_000;
pub const BLOCK_TIME_MS: u64 = 1_000;
pub const RUNTIME: RuntimeVersion = RuntimeVersion {
    spec_version: 100,
    transaction_version: 1,
};

const PERUN_PALLET_IDX: u8 = 1;
const CALLS: [&str; 4] = ["deposit", "dispute", "conclude", "withdraw"];
const SYSTEM_EVENTS: [&str; 2] = ["ExtrinsicSuccess", "ExtrinsicFailed"];
const PERUN_EVENTS: [&str; 4] = ["Deposited", "Disputed", "Concluded", "Withdrawn"];

/// How the mock encodes one entry of `System.Events`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MockRecord {
    pub phase: Phase,
    pub pallet: u8,
    pub variant: u8,
    pub data: Vec<u8>,
    pub topics: Vec<Hash>,
}

impl MockRecord {
    /// Perun pallet event named `variant` with the encoded fields `data`.
    pub fn perun(phase: Phase, variant: &str, data: Vec<u8>) -> Self {
        let variant = PERUN_EVENTS
            .iter()
            .position(|v| *v == variant)
            .expect("unknown perun event");
        Self {
            phase,
            pallet: PERUN_PALLET_IDX,
            variant: variant as u8,
            data,
            topics: Vec::new(),
        }
    }

    fn extrinsic_result(phase: Phase, ok: bool) -> Self {
        Self {
            phase,
            pallet: 0,
            variant: if ok { 0 } else { 1 },
            data: Vec::new(),
            topics: Vec::new(),
        }
    }
}

pub fn storage_key(pallet: &str, item: &str, args: &[&[u8]]) -> StorageKey {
    let mut key = format!("{}.{}", pallet, item).into_bytes();
    for arg in args {
        key.extend_from_slice(arg);
    }
    StorageKey(key)
}

pub fn account_key(who: &AccountId) -> StorageKey {
    storage_key("System", "Account", &[who.as_bytes()])
}

pub fn deposit_key(fid: &FundingId) -> StorageKey {
    storage_key(PALLET, "Deposits", &[fid.as_bytes()])
}

pub fn register_key(cid: &ChannelId) -> StorageKey {
    storage_key(PALLET, "StateRegister", &[cid.as_bytes()])
}

fn events_key() -> StorageKey {
    storage_key("System", "Events", &[])
}

fn now_key() -> StorageKey {
    storage_key("Timestamp", "Now", &[])
}

fn block_hash(number: BlockNumber) -> BlockHash {
    to_hash(&number)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockMetadata;

impl Metadata for MockMetadata {
    fn storage_key(&self, pallet: &str, item: &str, args: &[&[u8]]) -> Result<StorageKey, Error> {
        Ok(storage_key(pallet, item, args))
    }

    fn call_index(&self, pallet: &str, function: &str) -> Result<CallIndex, Error> {
        let call = CALLS
            .iter()
            .position(|c| pallet == PALLET && *c == function)
            .ok_or_else(|| Error::Metadata(format!("unknown call {}.{}", pallet, function)))?;
        Ok(CallIndex {
            pallet: PERUN_PALLET_IDX,
            call: call as u8,
        })
    }

    fn decode_events(&self, raw: &[u8]) -> Result<Vec<EventRecord>, Error> {
        let records = Vec::<MockRecord>::decode(&mut &raw[..])?;
        records
            .into_iter()
            .map(|r| {
                let (pallet, variants) = match r.pallet {
                    0 => ("System", &SYSTEM_EVENTS[..]),
                    PERUN_PALLET_IDX => (PALLET, &PERUN_EVENTS[..]),
                    idx => return Err(Error::Metadata(format!("unknown pallet {}", idx))),
                };
                let variant = variants
                    .get(r.variant as usize)
                    .ok_or_else(|| Error::Metadata(format!("unknown event {}", r.variant)))?;
                Ok(EventRecord {
                    phase: r.phase,
                    pallet: pallet.to_string(),
                    variant: variant.to_string(),
                    data: r.data,
                    topics: r.topics,
                })
            })
            .collect()
    }
}

struct Block {
    hash: BlockHash,
    storage: BTreeMap<StorageKey, Vec<u8>>,
    changes: Vec<(StorageKey, Option<Vec<u8>>)>,
}

type StorageSink = mpsc::Sender<Result<StorageChangeSet, Error>>;
type StatusSink = mpsc::Sender<Result<ExtrinsicStatus, Error>>;

struct ChainState {
    blocks: Vec<Block>,
    now_ms: u64,
    /// Params of every disputed or concluded channel, withdrawals need them.
    params: HashMap<ChannelId, Params>,
    subs: Vec<(Vec<StorageKey>, StorageSink)>,
    /// Status sinks of extrinsics that are never included, set while
    /// finality is stalled.
    stalled: Option<Vec<StatusSink>>,
}

impl ChainState {
    fn head(&self) -> &Block {
        self.blocks.last().expect("genesis exists")
    }

    fn notifications(&mut self, block: &Block) -> Vec<(StorageSink, StorageChangeSet)> {
        self.subs.retain(|(_, sink)| !sink.is_closed());
        self.subs
            .iter()
            .filter_map(|(keys, sink)| {
                let changes: Vec<_> = block
                    .changes
                    .iter()
                    .filter(|(key, _)| keys.contains(key))
                    .cloned()
                    .collect();
                (!changes.is_empty()).then(|| {
                    (
                        sink.clone(),
                        StorageChangeSet {
                            block: block.hash,
                            changes,
                        },
                    )
                })
            })
            .collect()
    }
}

/// Block under construction on top of the head's storage.
struct BlockBuilder<'a> {
    storage: BTreeMap<StorageKey, Vec<u8>>,
    writes: BTreeMap<StorageKey, Option<Vec<u8>>>,
    events: Vec<MockRecord>,
    /// Chain time in seconds.
    now: u64,
    params: &'a mut HashMap<ChannelId, Params>,
}

impl<'a> BlockBuilder<'a> {
    fn get<T: Decode>(&self, key: &StorageKey) -> Option<T> {
        self.storage
            .get(key)
            .and_then(|data| T::decode(&mut data.as_slice()).ok())
    }

    fn set(&mut self, key: StorageKey, value: Option<Vec<u8>>) {
        match &value {
            Some(data) => self.storage.insert(key.clone(), data.clone()),
            None => self.storage.remove(&key),
        };
        self.writes.insert(key, value);
    }

    fn emit(&mut self, phase: Phase, variant: &str, data: Vec<u8>) {
        self.events.push(MockRecord::perun(phase, variant, data));
    }

    fn seal(mut self, hash: BlockHash) -> Block {
        let events = self.events.encode();
        self.set(events_key(), Some(events));
        Block {
            hash,
            storage: self.storage,
            changes: self.writes.into_iter().collect(),
        }
    }

    /// Bumps the signer's nonce and dispatches the call. A failed dispatch
    /// only shows as `ExtrinsicFailed` event.
    fn apply(&mut self, ext: &Extrinsic, index: u32) {
        let Some(sig) = &ext.signature else {
            return;
        };
        let key = account_key(&sig.signer);
        let mut info: AccountInfo = self.get(&key).unwrap_or_default();
        info.nonce += 1;
        self.set(key, Some(info.encode()));

        let phase = Phase::ApplyExtrinsic(index);
        let res = self.dispatch(&sig.signer, &ext.call, phase);
        self.events.push(MockRecord::extrinsic_result(phase, res.is_ok()));
    }

    fn dispatch(&mut self, who: &AccountId, call: &Call, phase: Phase) -> Result<(), &'static str> {
        if call.index.pallet != PERUN_PALLET_IDX {
            return Err("unknown pallet");
        }
        let args = &mut call.args.as_slice();
        match call.index.call {
            0 => {
                let (fid, amount) =
                    <(FundingId, Balance)>::decode(args).map_err(|_| "bad arguments")?;
                self.deposit(who, fid, amount, phase)
            }
            1 => {
                let (params, state, sigs) = <(Params, State, Vec<Signature>)>::decode(args)
                    .map_err(|_| "bad arguments")?;
                self.dispute(params, state, &sigs, phase)
            }
            2 => {
                let (params, state, sigs) = <(Params, State, Vec<Signature>)>::decode(args)
                    .map_err(|_| "bad arguments")?;
                self.conclude(params, state, &sigs, phase)
            }
            3 => {
                let (withdrawal, sig) =
                    <(Withdrawal, Signature)>::decode(args).map_err(|_| "bad arguments")?;
                self.withdraw(withdrawal, sig, phase)
            }
            _ => Err("unknown call"),
        }
    }

    fn deposit(
        &mut self,
        who: &AccountId,
        fid: FundingId,
        amount: Balance,
        phase: Phase,
    ) -> Result<(), &'static str> {
        let key = account_key(who);
        let mut info: AccountInfo = self.get(&key).ok_or("unknown account")?;
        info.data.free = info.data.free.checked_sub(amount).ok_or("insufficient funds")?;
        let total = self
            .get::<Balance>(&deposit_key(&fid))
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or("deposit overflow")?;

        self.set(key, Some(info.encode()));
        self.set(deposit_key(&fid), Some(total.encode()));
        self.emit(phase, "Deposited", (fid, total).encode());
        Ok(())
    }

    fn dispute(
        &mut self,
        params: Params,
        state: State,
        sigs: &[Signature],
        phase: Phase,
    ) -> Result<(), &'static str> {
        let cid = check_signed(&params, &state, sigs)?;
        if let Some(reg) = self.get::<RegisteredState>(&register_key(&cid)) {
            if reg.concluded {
                return Err("already concluded");
            }
            if reg.timeout <= self.now {
                return Err("dispute is over");
            }
            if state.version <= reg.state.version {
                return Err("outdated version");
            }
        }

        let reg = RegisteredState {
            state: state.clone(),
            timeout: self.now + params.challenge_duration,
            concluded: false,
        };
        self.set(register_key(&cid), Some(reg.encode()));
        self.params.insert(cid, params);
        self.emit(phase, "Disputed", (cid, state).encode());
        Ok(())
    }

    fn conclude(
        &mut self,
        params: Params,
        state: State,
        sigs: &[Signature],
        phase: Phase,
    ) -> Result<(), &'static str> {
        let cid = check_signed(&params, &state, sigs)?;
        let concluded = match self.get::<RegisteredState>(&register_key(&cid)) {
            Some(reg) if reg.concluded => return Err("already concluded"),
            _ if state.is_final => RegisteredState {
                state,
                timeout: self.now,
                concluded: true,
            },
            Some(reg) if reg.timeout <= self.now => RegisteredState {
                concluded: true,
                ..reg
            },
            Some(_) => return Err("dispute not over"),
            None => return Err("not disputed"),
        };

        self.set(register_key(&cid), Some(concluded.encode()));
        self.params.insert(cid, params);
        self.emit(phase, "Concluded", cid.encode());
        Ok(())
    }

    fn withdraw(
        &mut self,
        withdrawal: Withdrawal,
        sig: Signature,
        phase: Phase,
    ) -> Result<(), &'static str> {
        let signed = verify_signature(&withdrawal.encode(), sig.as_bytes(), &withdrawal.part.into());
        if !signed.unwrap_or(false) {
            return Err("invalid signature");
        }
        let reg: RegisteredState = self
            .get(&register_key(&withdrawal.channel))
            .ok_or("not registered")?;
        if !reg.concluded {
            return Err("not concluded");
        }
        let params = self
            .params
            .get(&withdrawal.channel)
            .ok_or("unknown channel")?;
        let idx = params
            .participants
            .iter()
            .position(|p| *p == withdrawal.part)
            .ok_or("not a participant")?;
        let fid = Funding {
            channel: withdrawal.channel,
            part: withdrawal.part,
        }
        .id();
        if self.get::<Balance>(&deposit_key(&fid)).is_none() {
            return Err("nothing to withdraw");
        }

        let key = account_key(&withdrawal.receiver);
        let mut info: AccountInfo = self.get(&key).unwrap_or_default();
        info.data.free += reg.state.balances[idx];
        self.set(key, Some(info.encode()));
        self.set(deposit_key(&fid), None);
        self.emit(phase, "Withdrawn", fid.encode());
        Ok(())
    }
}

/// Returns the channel id if `state` belongs to `params` and is signed by
/// all participants.
fn check_signed(params: &Params, state: &State, sigs: &[Signature]) -> Result<ChannelId, &'static str> {
    let cid = params.id();
    if state.channel != cid {
        return Err("wrong channel id");
    }
    let parts = params.participants.len();
    if sigs.len() != parts || state.balances.len() != parts {
        return Err("wrong number of participants");
    }
    let data = state.encode();
    for (part, sig) in params.participants.iter().zip(sigs) {
        if !verify_signature(&data, sig.as_bytes(), &(*part).into()).unwrap_or(false) {
            return Err("invalid signature");
        }
    }
    Ok(cid)
}

pub struct MockChain {
    state: Mutex<ChainState>,
    /// Held while a block is built and announced, keeps announcements in
    /// block order.
    producing: tokio::sync::Mutex<()>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let mut storage = BTreeMap::new();
        storage.insert(now_key(), GENESIS_MS.encode());
        storage.insert(events_key(), Vec::<MockRecord>::new().encode());
        let genesis = Block {
            hash: block_hash(0),
            changes: storage.iter().map(|(k, v)| (k.clone(), Some(v.clone()))).collect(),
            storage,
        };
        Arc::new(Self {
            state: Mutex::new(ChainState {
                blocks: vec![genesis],
                now_ms: GENESIS_MS,
                params: HashMap::new(),
                subs: Vec::new(),
                stalled: None,
            }),
            producing: tokio::sync::Mutex::new(()),
        })
    }

    /// Builds the next block with `f` and announces it to all subscribers.
    async fn build<F, R>(&self, f: F) -> (R, BlockHash)
    where
        F: FnOnce(&mut BlockBuilder<'_>) -> R,
    {
        let _producing = self.producing.lock().await;
        let (ret, hash, notifications) = {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            state.now_ms += BLOCK_TIME_MS;
            let storage = state.head().storage.clone();
            let number = state.blocks.len() as BlockNumber;

            let mut builder = BlockBuilder {
                storage,
                writes: BTreeMap::new(),
                events: Vec::new(),
                now: state.now_ms / 1000,
                params: &mut state.params,
            };
            builder.set(now_key(), Some(state.now_ms.encode()));
            let ret = f(&mut builder);
            let block = builder.seal(block_hash(number));

            let notifications = state.notifications(&block);
            let hash = block.hash;
            state.blocks.push(block);
            (ret, hash, notifications)
        };
        for (sink, set) in notifications {
            let _ = sink.send(Ok(set)).await;
        }
        (ret, hash)
    }

    pub async fn produce_block(&self) -> BlockHash {
        self.build(|_| ()).await.1
    }

    /// Produces an empty block every `every` until the guard is dropped.
    pub fn produce_blocks(self: &Arc<Self>, every: Duration) -> DropGuard {
        let stop = CancellationToken::new();
        let chain = self.clone();
        let token = stop.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(every) => {
                        chain.produce_block().await;
                    }
                }
            }
        });
        stop.drop_guard()
    }

    /// Creates or tops up the account of `who`.
    pub async fn endow(&self, who: &AccountId, amount: Balance) {
        self.build(|b| {
            let key = account_key(who);
            let mut info: AccountInfo = b.get(&key).unwrap_or_default();
            info.providers = 1;
            info.data.free += amount;
            b.set(key, Some(info.encode()));
        })
        .await;
    }

    /// Produces a block that carries exactly `events`.
    pub async fn emit_events(&self, events: Vec<MockRecord>) -> BlockHash {
        self.build(|b| b.events = events).await.1
    }

    /// Produces a block that writes (or removes) `key`.
    pub async fn set_storage(&self, key: StorageKey, value: Option<Vec<u8>>) -> BlockHash {
        self.build(|b| b.set(key, value)).await.1
    }

    /// Ends all storage subscriptions as if the node went away.
    pub fn drop_subscriptions(&self) {
        self.state.lock().unwrap().subs.clear();
    }

    /// Accepts further extrinsics into the pool but never includes them.
    pub fn stall_finality(&self) {
        self.state.lock().unwrap().stalled.get_or_insert_with(Vec::new);
    }

    pub fn account(&self, who: &AccountId) -> Option<AccountInfo> {
        let state = self.state.lock().unwrap();
        let data = state.head().storage.get(&account_key(who))?;
        AccountInfo::decode(&mut data.as_slice()).ok()
    }

    pub fn free(&self, who: &AccountId) -> Balance {
        self.account(who).map_or(0, |info| info.data.free)
    }

    pub fn head(&self) -> BlockNumber {
        (self.state.lock().unwrap().blocks.len() - 1) as BlockNumber
    }

    /// Seconds, like the pallet sees it.
    pub fn now(&self) -> u64 {
        self.state.lock().unwrap().now_ms / 1000
    }

    /// Valid signature by the current nonce of the signer.
    fn admissible(&self, ext: &Extrinsic) -> bool {
        let Some(sig) = &ext.signature else {
            return false;
        };
        let state = self.state.lock().unwrap();
        let nonce = state
            .head()
            .storage
            .get(&account_key(&sig.signer))
            .and_then(|data| AccountInfo::decode(&mut data.as_slice()).ok())
            .map(|info| info.nonce);
        if nonce != Some(sig.nonce) {
            return false;
        }
        let genesis_hash = state.blocks[0].hash;
        let opts = SignatureOptions {
            block_hash: genesis_hash,
            genesis_hash,
            nonce: sig.nonce,
            spec_version: RUNTIME.spec_version,
            transaction_version: RUNTIME.transaction_version,
            tip: sig.tip,
        };
        verify_signature(
            &opts.signing_payload(&ext.call),
            sig.signature.as_bytes(),
            &sig.signer.into(),
        )
        .unwrap_or(false)
    }
}

fn unknown_block() -> Error {
    Error::Transport("unknown block".into())
}

#[async_trait]
impl ChainClient for MockChain {
    async fn metadata(&self) -> Result<Arc<dyn Metadata>, Error> {
        Ok(Arc::new(MockMetadata))
    }

    async fn latest_header(&self) -> Result<Header, Error> {
        let state = self.state.lock().unwrap();
        Ok(Header {
            number: (state.blocks.len() - 1) as BlockNumber,
            hash: state.head().hash,
        })
    }

    async fn block_hash(&self, number: BlockNumber) -> Result<BlockHash, Error> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(number as usize)
            .map(|b| b.hash)
            .ok_or_else(unknown_block)
    }

    async fn runtime_version(&self) -> Result<RuntimeVersion, Error> {
        Ok(RUNTIME)
    }

    async fn query_storage(
        &self,
        keys: &[StorageKey],
        from: BlockHash,
    ) -> Result<Vec<StorageChangeSet>, Error> {
        let state = self.state.lock().unwrap();
        let start = state
            .blocks
            .iter()
            .position(|b| b.hash == from)
            .ok_or_else(unknown_block)?;

        let first = &state.blocks[start];
        let mut sets = vec![StorageChangeSet {
            block: first.hash,
            changes: keys
                .iter()
                .map(|k| (k.clone(), first.storage.get(k).cloned()))
                .collect(),
        }];
        for block in &state.blocks[start + 1..] {
            let changes: Vec<_> = block
                .changes
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .cloned()
                .collect();
            if !changes.is_empty() {
                sets.push(StorageChangeSet {
                    block: block.hash,
                    changes,
                });
            }
        }
        Ok(sets)
    }

    async fn subscribe_storage(&self, keys: &[StorageKey]) -> Result<StorageSubscription, Error> {
        let (sink, sub) = mpsc::channel(EVENT_BUFFER_SIZE);
        self.state.lock().unwrap().subs.push((keys.to_vec(), sink));
        Ok(sub)
    }

    /// Applies the extrinsic in a new block, which is final at once.
    async fn submit_and_watch(
        &self,
        ext: &Extrinsic,
    ) -> Result<ExtrinsicStatusSubscription, Error> {
        let (sink, statuses) = mpsc::channel(4);
        if !self.admissible(ext) {
            let _ = sink.try_send(Ok(ExtrinsicStatus::Invalid));
            return Ok(statuses);
        }
        let _ = sink.try_send(Ok(ExtrinsicStatus::Ready));
        {
            let mut state = self.state.lock().unwrap();
            if let Some(stalled) = state.stalled.as_mut() {
                stalled.push(sink);
                return Ok(statuses);
            }
        }
        let (_, hash) = self.build(|b| b.apply(ext, 0)).await;
        let _ = sink.try_send(Ok(ExtrinsicStatus::InBlock(hash)));
        let _ = sink.try_send(Ok(ExtrinsicStatus::Finalized(hash)));
        Ok(statuses)
    }
}
