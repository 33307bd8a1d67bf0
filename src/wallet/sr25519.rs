//! Signer using the schnorrkel crate (sr25519, as used by substrate).

use core::fmt::Debug;

use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey};

use super::{Account as _, Address, Error};
use crate::{
    substrate::{Extrinsic, SignatureOptions, SIGNATURE_CONTEXT},
    types::{AccountId, OnIdentity, Signature},
};

pub struct Account {
    keypair: Keypair,
}

impl Debug for Account {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish()
    }
}

impl Account {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        Self::from_mini_secret(MiniSecretKey::generate_with(rng))
    }

    /// Derives the keypair from a 32 byte seed the same way substrate does.
    pub fn from_seed(seed: &[u8]) -> Result<Self, Error> {
        Ok(Self::from_mini_secret(MiniSecretKey::from_bytes(seed)?))
    }

    fn from_mini_secret(secret: MiniSecretKey) -> Self {
        Self {
            keypair: secret.expand_to_keypair(ExpansionMode::Ed25519),
        }
    }

    pub fn account_id(&self) -> AccountId {
        OnIdentity(self.keypair.public.to_bytes())
    }

    fn sign(&self, data: &[u8]) -> Signature {
        Signature(
            self.keypair
                .sign_simple(SIGNATURE_CONTEXT, data)
                .to_bytes(),
        )
    }
}

impl super::Account for Account {
    fn address(&self) -> Address {
        self.account_id().into()
    }

    fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(self.sign(data).0.to_vec())
    }

    fn sign_ext(&self, ext: &mut Extrinsic, opts: &SignatureOptions) -> Result<(), Error> {
        let payload = opts.signing_payload(&ext.call);
        let sig = self.sign(&payload);
        ext.attach_signature(self.account_id(), sig, opts);
        Ok(())
    }
}

/// Verifies that `sig` was created by `addr` over `msg`.
///
/// Malformed signatures or keys are errors, a well-formed signature by
/// another key is `Ok(false)`.
pub fn verify_signature(msg: &[u8], sig: &[u8], addr: &Address) -> Result<bool, Error> {
    let sig = schnorrkel::Signature::from_bytes(sig)?;
    let pk = PublicKey::from_bytes(addr.as_bytes())?;
    Ok(pk.verify_simple(SIGNATURE_CONTEXT, msg, &sig).is_ok())
}
