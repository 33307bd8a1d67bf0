use core::fmt::Display;
use std::sync::Arc;

use blake2::{digest::consts::U32, Blake2b, Digest};
use codec::{Compact, Decode, Encode, Output};
use tracing::trace;

use super::{Api, Error};
use crate::{
    types::{AccountId, BlockHash, Signature},
    wallet::Account,
};

/// Version 4 extrinsic format, the top bit marks it as signed.
const EXTRINSIC_VERSION: u8 = 4;
const SIGNED_BIT: u8 = 0b1000_0000;
/// `MultiAddress::Id`
const MULTI_ADDRESS_ID: u8 = 0;
/// `MultiSignature::Sr25519`
const MULTI_SIGNATURE_SR25519: u8 = 1;
/// Encoding of an immortal `Era`.
const IMMORTAL_ERA: u8 = 0;
/// Payloads longer than this are hashed before signing.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Names a dispatchable as `Pallet.function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtName {
    pub pallet: &'static str,
    pub function: &'static str,
}

impl ExtName {
    pub const fn new(pallet: &'static str, function: &'static str) -> Self {
        Self { pallet, function }
    }
}

impl Display for ExtName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.pallet, self.function)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct CallIndex {
    pub pallet: u8,
    pub call: u8,
}

/// A dispatchable call with already encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub index: CallIndex,
    pub args: Vec<u8>,
}

impl Encode for Call {
    fn size_hint(&self) -> usize {
        2 + self.args.len()
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.index.encode_to(dest);
        dest.write(&self.args);
    }
}

/// Everything that is signed besides the call itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureOptions {
    /// Checkpoint of the mortality period, the genesis hash for immortal
    /// extrinsics.
    pub block_hash: BlockHash,
    pub genesis_hash: BlockHash,
    pub nonce: u32,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub tip: u128,
}

impl SignatureOptions {
    /// The bytes that the signer of an extrinsic signs.
    pub fn signing_payload(&self, call: &Call) -> Vec<u8> {
        let payload = (
            call,
            IMMORTAL_ERA,
            Compact(self.nonce),
            Compact(self.tip),
            self.spec_version,
            self.transaction_version,
            self.genesis_hash,
            self.block_hash,
        )
            .encode();
        if payload.len() > MAX_UNHASHED_PAYLOAD {
            Blake2b::<U32>::digest(&payload).to_vec()
        } else {
            payload
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrinsicSignature {
    pub signer: AccountId,
    pub signature: Signature,
    pub nonce: u32,
    pub tip: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extrinsic {
    pub call: Call,
    pub signature: Option<ExtrinsicSignature>,
}

impl Extrinsic {
    pub fn new(call: Call) -> Self {
        Self {
            call,
            signature: None,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn attach_signature(
        &mut self,
        signer: AccountId,
        signature: Signature,
        opts: &SignatureOptions,
    ) {
        self.signature = Some(ExtrinsicSignature {
            signer,
            signature,
            nonce: opts.nonce,
            tip: opts.tip,
        });
    }
}

/// Length prefixed, as submitted to `author_submitAndWatchExtrinsic`.
impl Encode for Extrinsic {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        let mut inner = Vec::new();
        match &self.signature {
            Some(sig) => {
                inner.push(EXTRINSIC_VERSION | SIGNED_BIT);
                inner.push(MULTI_ADDRESS_ID);
                sig.signer.encode_to(&mut inner);
                inner.push(MULTI_SIGNATURE_SR25519);
                sig.signature.encode_to(&mut inner);
                inner.push(IMMORTAL_ERA);
                Compact(sig.nonce).encode_to(&mut inner);
                Compact(sig.tip).encode_to(&mut inner);
            }
            None => inner.push(EXTRINSIC_VERSION),
        }
        self.call.encode_to(&mut inner);
        inner.encode_to(dest);
    }
}

/// Builds signed extrinsics for calls given by name.
#[derive(Debug, Clone)]
pub struct ExtFactory {
    api: Arc<Api>,
}

impl ExtFactory {
    pub fn new(api: Arc<Api>) -> Self {
        Self { api }
    }

    pub fn build_call(&self, name: ExtName, args: Vec<u8>) -> Result<Call, Error> {
        let index = self.api.metadata().call_index(name.pallet, name.function)?;
        Ok(Call { index, args })
    }

    /// Builds the call and signs it with the on-chain account `signer`.
    pub async fn build_ext(
        &self,
        name: ExtName,
        args: Vec<u8>,
        signer: &dyn Account,
    ) -> Result<Extrinsic, Error> {
        let mut ext = Extrinsic::new(self.build_call(name, args)?);
        let who = signer.address().account_id()?;
        let opts = self.sig_options(&who).await?;
        signer.sign_ext(&mut ext, &opts)?;
        trace!(%name, nonce = opts.nonce, "Built extrinsic");
        Ok(ext)
    }

    /// Immortal era, zero tip and the next nonce of `who`.
    pub async fn sig_options(&self, who: &AccountId) -> Result<SignatureOptions, Error> {
        let info = self.api.account_info(who).await?;
        let genesis_hash = self.api.block_hash(0).await?;
        let version = self.api.runtime_version().await?;
        Ok(SignatureOptions {
            block_hash: genesis_hash,
            genesis_hash,
            nonce: info.nonce,
            spec_version: version.spec_version,
            transaction_version: version.transaction_version,
            tip: 0,
        })
    }
}
