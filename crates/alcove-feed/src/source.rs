use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use alcove_types::models::{ChatScope, Message};

use crate::client::PageClient;
use crate::gateway::{GatewayConfig, GatewaySource};

/// How often the first page is re-fetched while the push channel is
/// down.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between gateway reconnection attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// One update for the reconciler to merge.
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    Created(Message),
    Updated(Message),
    Typing {
        display_name: String,
        author_id: Uuid,
    },
    /// Degraded-mode re-fetch of the first page, newest first, to be
    /// diffed against the cache.
    Snapshot(Vec<Message>),
    /// The push channel came up (true) or went away (false).
    ConnectionChanged(bool),
}

/// Abstract stream of feed updates. The reconciler never learns whether
/// they arrived over the push channel or from the polling fallback.
#[async_trait]
pub trait UpdateSource: Send {
    /// Next update, or None once the source is permanently finished.
    async fn recv(&mut self) -> Option<FeedUpdate>;
}

/// Timed re-fetch of the first page against the read API. Never
/// finishes on its own; fetch failures are logged and retried on the
/// next tick.
pub struct PollingSource {
    client: Arc<dyn PageClient>,
    scope: ChatScope,
    ticker: Interval,
}

impl PollingSource {
    pub fn new(client: Arc<dyn PageClient>, scope: ChatScope) -> Self {
        let mut ticker = time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            client,
            scope,
            ticker,
        }
    }
}

#[async_trait]
impl UpdateSource for PollingSource {
    async fn recv(&mut self) -> Option<FeedUpdate> {
        loop {
            self.ticker.tick().await;
            match self.client.fetch_page(&self.scope, None, 1).await {
                Ok(page) => {
                    let items = page.items.into_iter().map(|item| item.message).collect();
                    return Some(FeedUpdate::Snapshot(items));
                }
                Err(e) => warn!("poll fetch failed, retrying next tick: {e}"),
            }
        }
    }
}

/// Runtime selection between the push channel and the polling fallback:
/// gateway events while connected, polling snapshots otherwise, with
/// reconnection attempts on a fixed cadence. Emits ConnectionChanged on
/// every transition so the UI can show its live/fallback badge.
pub struct FailoverSource {
    config: GatewayConfig,
    poll: PollingSource,
    gateway: Option<GatewaySource>,
    next_attempt: Instant,
    announced_live: bool,
}

impl FailoverSource {
    pub fn new(config: GatewayConfig, poll: PollingSource) -> Self {
        Self {
            config,
            poll,
            gateway: None,
            next_attempt: Instant::now(),
            announced_live: false,
        }
    }

    async fn try_connect(&mut self) {
        match GatewaySource::connect(&self.config).await {
            Ok(gateway) => {
                debug!("gateway connected for chat {}", self.config.chat_id);
                self.gateway = Some(gateway);
            }
            Err(e) => {
                warn!("gateway connect failed, staying on polling: {e}");
                self.next_attempt = Instant::now() + RECONNECT_INTERVAL;
            }
        }
    }
}

#[async_trait]
impl UpdateSource for FailoverSource {
    async fn recv(&mut self) -> Option<FeedUpdate> {
        loop {
            if let Some(gateway) = self.gateway.as_mut() {
                if !self.announced_live {
                    self.announced_live = true;
                    return Some(FeedUpdate::ConnectionChanged(true));
                }
                match gateway.next_update().await {
                    Some(update) => return Some(update),
                    None => {
                        warn!("gateway connection lost, falling back to polling");
                        self.gateway = None;
                        self.announced_live = false;
                        self.next_attempt = Instant::now() + RECONNECT_INTERVAL;
                        return Some(FeedUpdate::ConnectionChanged(false));
                    }
                }
            }

            if Instant::now() >= self.next_attempt {
                self.try_connect().await;
                if self.gateway.is_some() {
                    continue;
                }
            }

            // Poll until the next reconnection attempt is due.
            tokio::select! {
                update = self.poll.recv() => return update,
                _ = time::sleep_until(self.next_attempt) => {}
            }
        }
    }
}
