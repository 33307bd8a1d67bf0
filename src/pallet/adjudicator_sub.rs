use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use super::{Error, EventSub, Pallet};
use crate::{
    backend::{self, event_is_concluded, event_is_disputed, PerunEvent},
    channel::{AdjudicatorEvent, AdjudicatorSubscription, ConcludedEvent, RegisteredEvent},
    substrate::BlockNumber,
    types::ChannelId,
};

/// Disputed and Concluded events of one channel.
///
/// Bursts of events are coalesced: [AdjudicatorSubscription::next]
/// returns the last event of a burst once no new event arrived for the
/// quiescence window.
#[derive(Debug)]
pub struct AdjudicatorSub {
    cid: ChannelId,
    sub: EventSub,
    pallet: Pallet,
    window: Duration,
    closer: CancellationToken,
    err: Option<Error>,
}

impl AdjudicatorSub {
    pub(crate) async fn new(
        cid: ChannelId,
        pallet: Pallet,
        past_blocks: BlockNumber,
    ) -> Result<Self, Error> {
        let (disputed, concluded) = (event_is_disputed(cid), event_is_concluded(cid));
        let sub = pallet
            .subscribe(move |e| disputed(e) || concluded(e), past_blocks)
            .await?;
        Ok(Self {
            cid,
            sub,
            window: pallet.config().quiescence_window(),
            pallet,
            closer: CancellationToken::new(),
            err: None,
        })
    }

    /// Token that closes this subscription when cancelled, usable while
    /// another task waits in `next`.
    pub fn closer(&self) -> CancellationToken {
        self.closer.clone()
    }

    fn fail(&mut self, e: Error) {
        error!(cid = ?self.cid, error = %e, "Adjudicator subscription failed");
        self.err = Some(e);
        self.close();
    }

    /// Converts the pallet event, the version of a conclusion and the
    /// timeouts are read from the latest register.
    async fn make_event(&self, event: PerunEvent) -> Result<AdjudicatorEvent, Error> {
        match event {
            PerunEvent::Disputed(event) => {
                trace!(cid = ?event.cid, "Creating registered event");
                let dispute = self.pallet.query_state_register(event.cid, 0).await?;
                Ok(AdjudicatorEvent::Registered(RegisteredEvent {
                    id: event.cid,
                    version: event.state.version,
                    timeout: self.pallet.make_timeout(dispute.timeout),
                    state: backend::new_perun_state(&event.state),
                    sigs: None,
                }))
            }
            PerunEvent::Concluded(event) => {
                trace!(cid = ?event.cid, "Creating concluded event");
                let dispute = self.pallet.query_state_register(event.cid, 0).await?;
                Ok(AdjudicatorEvent::Concluded(ConcludedEvent {
                    id: event.cid,
                    version: dispute.state.version,
                    timeout: self.pallet.make_timeout(dispute.timeout),
                }))
            }
            event => unreachable!("adjudicator subscription received {:?}", event),
        }
    }
}

#[async_trait]
impl AdjudicatorSubscription for AdjudicatorSub {
    type Error = Error;

    async fn next(&mut self) -> Option<AdjudicatorEvent> {
        if self.closer.is_cancelled() {
            return None;
        }

        let first = tokio::select! {
            _ = self.closer.cancelled() => return None,
            event = self.sub.recv() => event,
        };
        let mut last = match first {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                self.fail(e);
                return None;
            }
            None => {
                self.close();
                return None;
            }
        };

        // Keep the newest event until the stream is quiet for a window.
        loop {
            tokio::select! {
                _ = self.closer.cancelled() => return None,
                _ = tokio::time::sleep(self.window) => break,
                event = self.sub.recv() => match event {
                    Some(Ok(event)) => last = event,
                    Some(Err(e)) => {
                        self.fail(e);
                        return None;
                    }
                    None => {
                        self.close();
                        return None;
                    }
                },
            }
        }

        match self.make_event(last).await {
            Ok(event) => Some(event),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn close(&self) {
        self.closer.cancel();
        self.sub.close();
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}

impl Drop for AdjudicatorSub {
    fn drop(&mut self) {
        self.closer.cancel();
    }
}
