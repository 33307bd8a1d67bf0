use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Error;
use crate::{
    backend::{EventPredicate, PerunEvent},
    substrate::{Api, BlockNumber, EventKey, EventSource, Metadata, EVENT_BUFFER_SIZE},
};

/// Filtered stream of Perun pallet events.
///
/// Decodes `System.Events` blocks in order and forwards every Perun event
/// that satisfies the predicate. Events of other pallets are skipped.
#[derive(Debug)]
pub struct EventSub {
    events: mpsc::Receiver<PerunEvent>,
    err: mpsc::Receiver<Error>,
    cancel: CancellationToken,
}

impl EventSub {
    pub(crate) async fn new(
        api: &Api,
        past_blocks: BlockNumber,
        pred: EventPredicate,
    ) -> Result<Self, Error> {
        let key = EventKey::system_events(api)?;
        let source = EventSource::new(api, key, past_blocks).await?;

        let (sink, events) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (err_sink, err) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tokio::spawn(run(
            source,
            api.metadata().clone(),
            pred,
            sink,
            err_sink,
            cancel.clone(),
        ));

        Ok(Self {
            events,
            err,
            cancel,
        })
    }

    /// Next matching event, the terminal error if the subscription failed or
    /// `None` once it was closed and drained.
    pub async fn recv(&mut self) -> Option<Result<PerunEvent, Error>> {
        match self.events.recv().await {
            Some(event) => Some(Ok(event)),
            None => self.err.try_recv().ok().map(Err),
        }
    }

    /// Stops the subscription and its event source. Already forwarded events
    /// can still be received.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for EventSub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    mut source: EventSource,
    meta: Arc<dyn Metadata>,
    pred: EventPredicate,
    sink: mpsc::Sender<PerunEvent>,
    err: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    if let Err(e) = forward(&mut source, meta.as_ref(), &pred, &sink, &cancel).await {
        debug!(error = %e, "Event subscription failed");
        let _ = err.try_send(e);
    }
    source.close();
    debug!("Event subscription stopped");
}

async fn forward(
    source: &mut EventSource,
    meta: &dyn Metadata,
    pred: &EventPredicate,
    sink: &mpsc::Sender<PerunEvent>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            raw = source.recv() => raw,
        };
        let Some(raw) = raw else {
            return Ok(());
        };

        for record in meta.decode_events(&raw?)? {
            let Some(event) = PerunEvent::from_record(&record)? else {
                continue;
            };
            if !pred(&event) {
                trace!(?event, "Event filtered");
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = sink.send(event) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
