use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{
    Api, BlockNumber, Error, StorageChangeSet, StorageKey, StorageSubscription, EVENT_BUFFER_SIZE,
};
use crate::types::AccountId;

/// Storage keys whose changes can be streamed by an [EventSource].
pub struct EventKey;

impl EventKey {
    /// `System.Events`, the events of the current block.
    pub fn system_events(api: &Api) -> Result<StorageKey, Error> {
        api.build_key("System", "Events", &[])
    }

    /// `System.Account` of `who`, its nonce and balances.
    pub fn system_account(api: &Api, who: &AccountId) -> Result<StorageKey, Error> {
        api.build_key("System", "Account", &[who.as_bytes()])
    }
}

/// Streams the raw values of one storage key, starting with the changes of
/// the last `past_blocks` blocks followed by all new changes.
///
/// Entries are delivered in order, at least once. A full buffer blocks the
/// producer, nothing is dropped. Removed values are skipped.
#[derive(Debug)]
pub struct EventSource {
    events: mpsc::Receiver<Vec<u8>>,
    err: mpsc::Receiver<Error>,
    cancel: CancellationToken,
}

impl EventSource {
    pub async fn new(api: &Api, key: StorageKey, past_blocks: BlockNumber) -> Result<Self, Error> {
        let keys = [key];
        // Subscribe first so that no block falls between history and live.
        let live = api.subscribe(&keys).await?;
        let from = api.past_block(past_blocks).await?;
        let past = api.query_all(&keys, from).await?;
        debug!(past_sets = past.len(), "Event source started");

        let (sink, events) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (err_sink, err) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(forward(past, live, sink, err_sink, cancel.clone()));

        Ok(Self {
            events,
            err,
            cancel,
        })
    }

    /// Next entry, an error if the source failed, `None` once closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<Result<Vec<u8>, Error>> {
        match self.events.recv().await {
            Some(data) => Some(Ok(data)),
            // The forwarder publishes its error before it drops the sink.
            None => self.err.try_recv().ok().map(Err),
        }
    }

    /// Stops the source. Entries that were already published can still be
    /// received.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward(
    past: Vec<StorageChangeSet>,
    mut live: StorageSubscription,
    sink: mpsc::Sender<Vec<u8>>,
    err: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    for set in past {
        if !publish(set, &sink, &cancel).await {
            return;
        }
    }

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = live.recv() => next,
        };
        match next {
            Some(Ok(set)) => {
                if !publish(set, &sink, &cancel).await {
                    break;
                }
            }
            Some(Err(e)) => {
                let _ = err.try_send(e);
                break;
            }
            None => {
                let _ = err.try_send(Error::SubscriptionClosed);
                break;
            }
        }
    }
    debug!("Event source stopped");
}

/// Returns false if the source should stop.
async fn publish(
    set: StorageChangeSet,
    sink: &mpsc::Sender<Vec<u8>>,
    cancel: &CancellationToken,
) -> bool {
    for (key, data) in set.changes {
        let Some(data) = data else {
            trace!(?key, "Skipping removed value");
            continue;
        };
        tokio::select! {
            _ = cancel.cancelled() => return false,
            sent = sink.send(data) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
    true
}
