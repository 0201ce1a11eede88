use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};
use uuid::Uuid;

use alcove_types::models::ChatScope;

use crate::cache::{FeedPage, FeedState, FeedStatus};
use crate::client::{HttpPageClient, PageClient};
use crate::gateway::GatewayConfig;
use crate::reconciler::Reconciler;
use crate::source::{FailoverSource, FeedUpdate, PollingSource, UpdateSource};

/// Everything needed to open one chat view against a server.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// http(s):// base of the read API.
    pub base_url: String,
    /// ws(s):// URL of the gateway endpoint.
    pub gateway_url: String,
    pub token: String,
    pub scope: ChatScope,
}

/// Explicit pagination position: the continuation cursor plus the
/// 1-based page counter the server's neighbor probes key off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationSession {
    pub cursor: Option<Uuid>,
    pub page_number: u32,
}

impl PaginationSession {
    pub fn new() -> Self {
        Self {
            cursor: None,
            page_number: 1,
        }
    }

    /// Record a fetched page: adopt its continuation cursor and advance
    /// the page counter.
    pub fn advance(&mut self, next_cursor: Option<Uuid>) {
        self.cursor = next_cursor;
        self.page_number += 1;
    }

    /// Whether an older page can still be requested.
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }
}

impl Default for PaginationSession {
    fn default() -> Self {
        Self::new()
    }
}

enum FeedCommand {
    LoadMore,
    Reload,
}

/// Point-in-time view of the feed for rendering.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub status: FeedStatus,
    /// Newest page first, newest item first within each page.
    pub pages: Vec<FeedPage>,
    pub typing: Option<TypingUser>,
    /// Whether an older page can still be requested.
    pub has_more: bool,
    /// True while updates arrive over the push channel.
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    pub display_name: String,
    pub author_id: Uuid,
}

/// Handle owned by the chat view. Dropping it tears the session down:
/// the actor task, its update source, and any pending typing expiry.
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<FeedCommand>,
    snapshots: watch::Receiver<FeedSnapshot>,
}

impl FeedHandle {
    /// Request the next older page. No-op while no continuation cursor
    /// is known.
    pub fn load_more(&self) {
        let _ = self.commands.send(FeedCommand::LoadMore);
    }

    /// Discard everything and refetch from the top. The UI's manual
    /// error recovery.
    pub fn reload(&self) {
        let _ = self.commands.send(FeedCommand::Reload);
    }

    /// Current state of the feed.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch endpoint for renderers that react to changes.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshots.clone()
    }
}

pub struct ChatFeed;

impl ChatFeed {
    /// Open a feed session against a live server: HTTP page fetches plus
    /// the gateway-with-polling-fallback update source.
    pub fn connect(config: FeedConfig) -> FeedHandle {
        let client: Arc<dyn PageClient> = Arc::new(HttpPageClient::new(
            config.base_url.clone(),
            config.token.clone(),
        ));
        let poll = PollingSource::new(client.clone(), config.scope);
        let source = FailoverSource::new(
            GatewayConfig {
                url: config.gateway_url,
                token: config.token,
                chat_id: config.scope.chat_id(),
            },
            poll,
        );
        Self::spawn(client, source, config.scope)
    }

    /// Open a feed session over explicit collaborators. Tests drive this
    /// with fakes.
    pub fn spawn(
        client: Arc<dyn PageClient>,
        source: impl UpdateSource + 'static,
        scope: ChatScope,
    ) -> FeedHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let initial = snapshot_of(&FeedState::new(), false);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let session = FeedSession {
            state: FeedState::new(),
            pagination: PaginationSession::new(),
            client,
            scope,
            commands: command_rx,
            snapshots: snapshot_tx,
        };
        tokio::spawn(session.run(source));

        FeedHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }
}

struct FeedSession {
    state: FeedState,
    pagination: PaginationSession,
    client: Arc<dyn PageClient>,
    scope: ChatScope,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    snapshots: watch::Sender<FeedSnapshot>,
}

impl FeedSession {
    /// Actor loop. All state mutation happens here, one step at a time:
    /// source updates, view commands, and the typing expiry timer.
    async fn run(mut self, source: impl UpdateSource + 'static) {
        let (update_tx, mut updates) = mpsc::unbounded_channel();
        let pump = spawn_source_pump(source, update_tx);
        let mut updates_open = true;

        self.initial_load().await;

        loop {
            let typing_deadline = self.state.typing_deadline();
            tokio::select! {
                update = updates.recv(), if updates_open => {
                    match update {
                        Some(update) => {
                            Reconciler::apply(&mut self.state, update, Instant::now());
                            self.publish();
                        }
                        // The pump only stops when the source is finished
                        // for good.
                        None => {
                            updates_open = false;
                            if self.state.live {
                                self.state.live = false;
                                self.publish();
                            }
                        }
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(FeedCommand::LoadMore) => self.load_more().await,
                        Some(FeedCommand::Reload) => {
                            self.state.reset();
                            self.pagination = PaginationSession::new();
                            self.publish();
                            self.initial_load().await;
                        }
                        // Handle dropped: the view is gone.
                        None => break,
                    }
                }
                _ = maybe_sleep(typing_deadline) => {
                    self.state.clear_typing();
                    self.publish();
                }
            }
        }

        pump.abort();
        debug!("feed session for chat {} closed", self.scope.chat_id());
    }

    async fn initial_load(&mut self) {
        self.fetch_next().await;
    }

    async fn load_more(&mut self) {
        if !self.pagination.has_more() {
            return;
        }
        self.fetch_next().await;
    }

    /// Fetch the page the pagination session points at and absorb it.
    /// Any fetch failure parks the feed in the error state until a
    /// reload.
    async fn fetch_next(&mut self) {
        let result = self
            .client
            .fetch_page(&self.scope, self.pagination.cursor, self.pagination.page_number)
            .await;

        match result {
            Ok(page) => {
                self.pagination.advance(page.next_cursor);
                Reconciler::absorb_page(&mut self.state, page);
            }
            Err(e) => {
                warn!("page fetch failed: {e}");
                self.state.status = FeedStatus::Error(e.to_string());
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(snapshot_of(&self.state, self.pagination.has_more()));
    }
}

fn snapshot_of(state: &FeedState, has_more: bool) -> FeedSnapshot {
    FeedSnapshot {
        status: state.status.clone(),
        pages: state.cache.pages().to_vec(),
        typing: state.typing.as_ref().map(|t| TypingUser {
            display_name: t.display_name.clone(),
            author_id: t.author_id,
        }),
        has_more,
        live: state.live,
    }
}

/// Drain the source into the session's queue from its own task, so a
/// slow fetch inside the session never blocks the source.
fn spawn_source_pump(
    mut source: impl UpdateSource + 'static,
    updates: mpsc::UnboundedSender<FeedUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = source.recv().await {
            if updates.send(update).is_err() {
                break;
            }
        }
    })
}

async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
