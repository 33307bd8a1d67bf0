use num_bigint::{BigInt, Sign};

use super::{Balance, Error, Funding, Params, State, Withdrawal, NONCE_LEN};
use crate::{
    channel::{self, Allocation},
    types::{ChannelId, FundingId, Nonce, OffIdentity, OnIdentity, Signature},
    wallet::Address,
};

pub fn make_balance(bal: &BigInt) -> Result<Balance, Error> {
    Balance::try_from(bal).map_err(|_| Error::InvalidBalance)
}

pub fn make_perun_balance(bal: Balance) -> BigInt {
    BigInt::from(bal)
}

/// Big-endian bytes of `nonce`, left aligned in the 32 byte array as the
/// pallet expects. Zero and negative nonces are rejected.
pub fn make_nonce(nonce: &BigInt) -> Result<Nonce, Error> {
    if nonce.sign() != Sign::Plus || nonce.bits() > (8 * NONCE_LEN) as u64 {
        return Err(Error::NonceOutOfRange);
    }
    let (_, bytes) = nonce.to_bytes_be();
    let mut ret = Nonce::default();
    ret.0[..bytes.len()].copy_from_slice(&bytes);
    Ok(ret)
}

pub fn make_sig(sig: &[u8]) -> Result<Signature, Error> {
    Signature::try_from(sig).map_err(|_| Error::SigLenMismatch(sig.len()))
}

pub fn make_sigs(sigs: &[channel::Sig]) -> Result<Vec<Signature>, Error> {
    sigs.iter().map(|s| make_sig(s)).collect()
}

pub fn make_off_ident(part: &Address) -> Result<OffIdentity, Error> {
    OffIdentity::try_from(part.as_bytes()).map_err(|_| Error::IdentLenMismatch)
}

pub fn make_off_idents(parts: &[Address]) -> Result<Vec<OffIdentity>, Error> {
    parts.iter().map(make_off_ident).collect()
}

pub fn make_on_ident(addr: &Address) -> Result<OnIdentity, Error> {
    OnIdentity::try_from(addr.as_bytes()).map_err(|_| Error::IdentLenMismatch)
}

pub fn new_params(p: &channel::Params) -> Result<Params, Error> {
    Ok(Params {
        nonce: make_nonce(&p.nonce)?,
        participants: make_off_idents(&p.parts)?,
        challenge_duration: p.challenge_duration,
    })
}

/// Balances of the only asset.
pub fn make_alloc(a: &Allocation) -> Result<Vec<Balance>, Error> {
    match (a.assets.as_slice(), a.balances.as_slice()) {
        ([_], [bals]) if a.locked.is_empty() => bals.iter().map(make_balance).collect(),
        _ => Err(Error::AllocIncompatible),
    }
}

pub fn make_perun_alloc(bals: &[Balance]) -> Allocation {
    Allocation::new(bals.iter().copied().map(make_perun_balance).collect())
}

/// Drops the app data, app channels are not supported by the pallet.
pub fn new_state(s: &channel::State) -> Result<State, Error> {
    if !s.valid() {
        return Err(Error::StateIncompatible);
    }
    Ok(State {
        channel: s.id,
        version: s.version,
        balances: make_alloc(&s.allocation)?,
        is_final: s.is_final,
    })
}

/// The generic state, without app data.
pub fn new_perun_state(s: &State) -> channel::State {
    channel::State {
        id: s.channel,
        version: s.version,
        allocation: make_perun_alloc(&s.balances),
        data: Vec::new(),
        is_final: s.is_final,
    }
}

pub fn new_withdrawal(
    cid: ChannelId,
    part: &Address,
    receiver: &Address,
) -> Result<Withdrawal, Error> {
    Ok(Withdrawal {
        channel: cid,
        part: make_off_ident(part)?,
        receiver: make_on_ident(receiver)?,
    })
}

/// Deposit of the requesting participant.
pub fn make_funding(req: &channel::FundingReq) -> Result<Funding, Error> {
    let part = req.params.parts.get(req.idx).ok_or(Error::PartIdxOutOfRange(req.idx))?;
    Ok(Funding {
        channel: req.state.id,
        part: make_off_ident(part)?,
    })
}

/// Funding ids of all participants, in participant order.
pub fn make_funding_ids(cid: ChannelId, parts: &[Address]) -> Result<Vec<FundingId>, Error> {
    parts
        .iter()
        .map(|p| {
            Ok(Funding {
                channel: cid,
                part: make_off_ident(p)?,
            }
            .id())
        })
        .collect()
}
