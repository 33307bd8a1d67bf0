use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use codec::Decode;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use super::{Api, Error};
use crate::channel::{Cancelled, Timeout};

pub const DEFAULT_TIMEOUT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Always elapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiredTimeout;

#[async_trait]
impl Timeout for ExpiredTimeout {
    async fn is_elapsed(&self) -> bool {
        true
    }

    async fn wait(&self, _cancel: &CancellationToken) -> Result<(), Cancelled> {
        Ok(())
    }
}

/// Elapses once the chain time (`Timestamp.Now`) reaches `when`.
#[derive(Debug, Clone)]
pub struct ChainTimeout {
    /// Unix seconds.
    when: u64,
    poll_interval: Duration,
    api: Arc<Api>,
}

impl ChainTimeout {
    pub fn new(api: Arc<Api>, when: u64, poll_interval: Duration) -> Self {
        Self {
            when,
            poll_interval,
            api,
        }
    }

    pub fn when(&self) -> u64 {
        self.when
    }

    /// Current chain time in unix seconds.
    async fn poll_time(&self) -> Result<u64, Error> {
        let key = self.api.build_key("Timestamp", "Now", &[])?;
        let now = match self.api.query_one(0, &key).await? {
            Some(data) => u64::decode(&mut data.as_slice())?,
            None => 0,
        };
        Ok(now / 1000)
    }
}

#[async_trait]
impl Timeout for ChainTimeout {
    /// A failed poll counts as not elapsed.
    async fn is_elapsed(&self) -> bool {
        let now = match self.poll_time().await {
            Ok(now) => now,
            Err(e) => {
                error!(error = %e, "Polling chain time failed");
                return false;
            }
        };
        let elapsed = self.when <= now;
        trace!(when = self.when, now, elapsed, "Polled chain time");
        elapsed
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            if self.is_elapsed().await {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
