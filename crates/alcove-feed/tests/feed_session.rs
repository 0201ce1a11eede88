use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use uuid::Uuid;

use alcove_feed::{
    ChatFeed, FeedSnapshot, FeedStatus, FeedUpdate, FetchError, PageClient, UpdateSource,
};
use alcove_types::api::MessagePage;
use alcove_types::models::{AuthorProfile, ChatScope, LinkedMessage, Message};

const CHANNEL: u128 = 0xCAFE;

fn mk_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn message(n: u128, author: u128) -> Message {
    let author_id = mk_id(author);
    let at: chrono::DateTime<chrono::Utc> = format!("2026-07-01T12:00:00.{:03}Z", n % 1000)
        .parse()
        .unwrap();
    Message {
        id: mk_id(n),
        scope: ChatScope::channel(mk_id(CHANNEL)),
        author_id,
        content: Some(format!("message {n}")),
        attachment_url: None,
        deleted: false,
        created_at: at,
        updated_at: at,
        author: AuthorProfile {
            id: author_id,
            display_name: format!("user{author}"),
            avatar_url: None,
        },
    }
}

/// Newest-first history with ids `newest` down to `oldest`.
fn history(newest: u128, oldest: u128) -> Vec<Message> {
    (oldest..=newest).rev().map(|n| message(n, 0xA)).collect()
}

fn ids(snapshot: &FeedSnapshot) -> Vec<Uuid> {
    snapshot
        .pages
        .iter()
        .flat_map(|p| p.items.iter())
        .map(|m| m.message.id)
        .collect()
}

/// In-memory page store that follows the server's read contract:
/// batches of ten, continuation cursor excluded from the batch, next
/// cursor only when the batch is full.
struct FakePageClient {
    history: Mutex<Vec<Message>>,
    fail: Mutex<bool>,
}

impl FakePageClient {
    fn new(history: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            history: Mutex::new(history),
            fail: Mutex::new(false),
        })
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl PageClient for FakePageClient {
    async fn fetch_page(
        &self,
        _scope: &ChatScope,
        cursor: Option<Uuid>,
        _page_number: u32,
    ) -> Result<MessagePage, FetchError> {
        if *self.fail.lock().unwrap() {
            return Err(FetchError::Server("500 Internal Server Error: boom".to_string()));
        }
        let history = self.history.lock().unwrap();
        let start = match cursor {
            Some(cursor) => match history.iter().position(|m| m.id == cursor) {
                Some(pos) => pos + 1,
                None => {
                    return Ok(MessagePage {
                        items: Vec::new(),
                        next_cursor: None,
                    });
                }
            },
            None => 0,
        };
        let batch: Vec<Message> = history.iter().skip(start).take(10).cloned().collect();
        let next_cursor = if batch.len() == 10 {
            batch.last().map(|m| m.id)
        } else {
            None
        };
        Ok(MessagePage {
            items: batch.into_iter().map(LinkedMessage::bare).collect(),
            next_cursor,
        })
    }
}

/// Update source the test drives by hand.
struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<FeedUpdate>,
}

impl ScriptedSource {
    fn new() -> (mpsc::UnboundedSender<FeedUpdate>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn recv(&mut self) -> Option<FeedUpdate> {
        self.rx.recv().await
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<FeedSnapshot>,
    mut pred: impl FnMut(&FeedSnapshot) -> bool,
) -> FeedSnapshot {
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("feed session ended early");
        }
    })
    .await
    .expect("snapshot condition not reached in time")
}

#[tokio::test]
async fn test_initial_load_fills_first_page() {
    let client = FakePageClient::new(history(25, 1));
    let (_updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();

    let snapshot = wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(
        ids(&snapshot),
        (16..=25).rev().map(mk_id).collect::<Vec<_>>()
    );
    assert!(snapshot.has_more);
    assert!(!snapshot.live);
}

#[tokio::test]
async fn test_empty_feed_is_ready_with_no_items() {
    let client = FakePageClient::new(Vec::new());
    let (_updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();

    let snapshot = wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;
    assert!(ids(&snapshot).is_empty());
    assert!(!snapshot.has_more);
}

#[tokio::test]
async fn test_load_more_walks_history_to_the_end() {
    let client = FakePageClient::new(history(25, 1));
    let (_updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;

    handle.load_more();
    let snapshot = wait_for(&mut rx, |s| s.pages.len() == 2).await;
    assert_eq!(snapshot.pages[1].items.len(), 10);
    assert!(snapshot.has_more);

    handle.load_more();
    let snapshot = wait_for(&mut rx, |s| s.pages.len() == 3).await;
    assert_eq!(snapshot.pages[2].items.len(), 5);
    assert!(!snapshot.has_more);
    assert_eq!(ids(&snapshot), (1..=25).rev().map(mk_id).collect::<Vec<_>>());

    // History exhausted: a further load-more publishes nothing.
    handle.load_more();
    let unchanged = timeout(Duration::from_millis(100), rx.changed()).await;
    assert!(unchanged.is_err(), "exhausted feed should ignore load-more");
}

#[tokio::test]
async fn test_live_creation_prepends_and_dedups() {
    let client = FakePageClient::new(history(10, 1));
    let (updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;

    let created = message(11, 0xB);
    updates.send(FeedUpdate::Created(created.clone())).unwrap();
    let snapshot = wait_for(&mut rx, |s| ids(s).first() == Some(&mk_id(11))).await;
    assert_eq!(snapshot.pages[0].items.len(), 11);

    // Redelivery of the same event must not duplicate the row. Chase it
    // with an edit so there is a snapshot to wait for.
    let mut edited = message(11, 0xB);
    edited.content = Some("edited".to_string());
    updates.send(FeedUpdate::Created(created)).unwrap();
    updates.send(FeedUpdate::Updated(edited)).unwrap();
    let snapshot = wait_for(&mut rx, |s| {
        s.pages
            .first()
            .and_then(|p| p.items.first())
            .is_some_and(|m| m.message.content.as_deref() == Some("edited"))
    })
    .await;
    assert_eq!(ids(&snapshot).len(), 11);
}

#[tokio::test]
async fn test_typing_clears_when_the_author_posts() {
    let client = FakePageClient::new(Vec::new());
    let (updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;

    updates
        .send(FeedUpdate::Typing {
            display_name: "bea".to_string(),
            author_id: mk_id(0xB),
        })
        .unwrap();
    let snapshot = wait_for(&mut rx, |s| s.typing.is_some()).await;
    assert_eq!(snapshot.typing.unwrap().display_name, "bea");

    // Someone else's message leaves the indicator alone.
    updates.send(FeedUpdate::Created(message(1, 0xC))).unwrap();
    let snapshot = wait_for(&mut rx, |s| ids(s).len() == 1).await;
    assert!(snapshot.typing.is_some());

    // The typing author's own message clears it.
    updates.send(FeedUpdate::Created(message(2, 0xB))).unwrap();
    let snapshot = wait_for(&mut rx, |s| s.typing.is_none()).await;
    assert_eq!(ids(&snapshot)[0], mk_id(2));
}

#[tokio::test(start_paused = true)]
async fn test_typing_indicator_expires_after_ttl() {
    let client = FakePageClient::new(Vec::new());
    let (updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();

    updates
        .send(FeedUpdate::Typing {
            display_name: "bea".to_string(),
            author_id: mk_id(0xB),
        })
        .unwrap();
    while handle.snapshot().typing.is_none() {
        rx.changed().await.unwrap();
    }

    // No further input: the deadline timer alone must clear it.
    while handle.snapshot().typing.is_some() {
        rx.changed().await.unwrap();
    }
    assert!(handle.snapshot().typing.is_none());
}

#[tokio::test]
async fn test_snapshot_diff_converges_in_polling_mode() {
    let client = FakePageClient::new(history(3, 1));
    let (updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;

    // A poll re-fetch of the first page that carries one new message
    // and one edit alongside the rows already cached.
    let mut edited = message(2, 0xA);
    edited.content = Some("fixed".to_string());
    let poll = vec![message(4, 0xB), message(3, 0xA), edited, message(1, 0xA)];
    updates.send(FeedUpdate::Snapshot(poll)).unwrap();

    let snapshot = wait_for(&mut rx, |s| ids(s).first() == Some(&mk_id(4))).await;
    assert_eq!(ids(&snapshot), vec![mk_id(4), mk_id(3), mk_id(2), mk_id(1)]);
    let m2 = snapshot
        .pages
        .iter()
        .flat_map(|p| p.items.iter())
        .find(|m| m.message.id == mk_id(2))
        .unwrap();
    assert_eq!(m2.message.content.as_deref(), Some("fixed"));
}

#[tokio::test]
async fn test_fetch_error_parks_feed_until_reload() {
    let client = FakePageClient::new(history(5, 1));
    client.set_fail(true);
    let (_updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client.clone(), source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();

    let snapshot = wait_for(&mut rx, |s| matches!(s.status, FeedStatus::Error(_))).await;
    assert!(ids(&snapshot).is_empty());

    client.set_fail(false);
    handle.reload();
    let snapshot = wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;
    assert_eq!(ids(&snapshot), (1..=5).rev().map(mk_id).collect::<Vec<_>>());
    assert!(!snapshot.has_more);
}

#[tokio::test]
async fn test_source_ending_drops_live_flag() {
    let client = FakePageClient::new(history(3, 1));
    let (updates, source) = ScriptedSource::new();
    let handle = ChatFeed::spawn(client, source, ChatScope::channel(mk_id(CHANNEL)));
    let mut rx = handle.subscribe();
    wait_for(&mut rx, |s| s.status == FeedStatus::Ready).await;

    updates.send(FeedUpdate::ConnectionChanged(true)).unwrap();
    wait_for(&mut rx, |s| s.live).await;

    drop(updates);
    let snapshot = wait_for(&mut rx, |s| !s.live).await;
    assert_eq!(snapshot.status, FeedStatus::Ready);
}
