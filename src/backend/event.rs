use codec::DecodeAll;
use tracing::trace;

use super::{Balance, State, PALLET};
use crate::{
    substrate::{EventRecord, Phase},
    types::{ChannelId, FundingId},
};

/// A funding id received a deposit, `balance` is its new total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositedEvent {
    pub phase: Phase,
    pub fid: FundingId,
    pub balance: Balance,
}

/// A dispute was opened or refuted with `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputedEvent {
    pub phase: Phase,
    pub cid: ChannelId,
    pub state: State,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcludedEvent {
    pub phase: Phase,
    pub cid: ChannelId,
}

/// All funds of a funding id were withdrawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawnEvent {
    pub phase: Phase,
    pub fid: FundingId,
}

/// Event emitted by the Perun pallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerunEvent {
    Deposited(DepositedEvent),
    Disputed(DisputedEvent),
    Concluded(ConcludedEvent),
    Withdrawn(WithdrawnEvent),
}

impl PerunEvent {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Deposited(e) => e.phase,
            Self::Disputed(e) => e.phase,
            Self::Concluded(e) => e.phase,
            Self::Withdrawn(e) => e.phase,
        }
    }

    /// Decodes a record of `System.Events`.
    ///
    /// `None` for events of other pallets and unknown variants.
    pub fn from_record(record: &EventRecord) -> Result<Option<Self>, codec::Error> {
        if record.pallet != PALLET {
            return Ok(None);
        }
        let phase = record.phase;
        let data = &mut record.data.as_slice();
        let event = match record.variant.as_str() {
            "Deposited" => {
                let (fid, balance) = <(FundingId, Balance)>::decode_all(data)?;
                Self::Deposited(DepositedEvent { phase, fid, balance })
            }
            "Disputed" => {
                let (cid, state) = <(ChannelId, State)>::decode_all(data)?;
                Self::Disputed(DisputedEvent { phase, cid, state })
            }
            "Concluded" => Self::Concluded(ConcludedEvent {
                phase,
                cid: ChannelId::decode_all(data)?,
            }),
            "Withdrawn" => Self::Withdrawn(WithdrawnEvent {
                phase,
                fid: FundingId::decode_all(data)?,
            }),
            variant => {
                trace!(variant, "Unknown pallet event");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

/// Decides which events an event subscription forwards.
pub type EventPredicate = Box<dyn Fn(&PerunEvent) -> bool + Send + Sync>;

pub fn event_is_deposited(e: &PerunEvent) -> bool {
    matches!(e, PerunEvent::Deposited(_))
}

pub fn event_is_disputed(cid: ChannelId) -> impl Fn(&PerunEvent) -> bool + Send + Sync {
    move |e| matches!(e, PerunEvent::Disputed(d) if d.cid == cid)
}

pub fn event_is_concluded(cid: ChannelId) -> impl Fn(&PerunEvent) -> bool + Send + Sync {
    move |e| matches!(e, PerunEvent::Concluded(c) if c.cid == cid)
}

pub fn event_is_withdrawn(e: &PerunEvent) -> bool {
    matches!(e, PerunEvent::Withdrawn(_))
}
