use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use alcove_types::api::MessagePage;
use alcove_types::models::{LinkedMessage, Message};

/// Typing indicators lapse this long after the most recent typing event
/// unless refreshed, or cleared early by a creation from the same
/// author.
pub const TYPING_TTL: Duration = Duration::from_secs(10);

/// Feed lifecycle as observed by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Loading,
    Ready,
    Error(String),
}

/// One cached page. Live prepends land in the head page, which may have
/// been synthesized and therefore carries no cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<LinkedMessage>,
    pub next_cursor: Option<Uuid>,
}

impl From<MessagePage> for FeedPage {
    fn from(page: MessagePage) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// Ordered, paged cache of one chat's messages: newest page first,
/// newest item first within each page. No message id appears twice
/// anywhere in the cache.
#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    pages: Vec<FeedPage>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    pub fn pages(&self) -> &[FeedPage] {
        &self.pages
    }

    /// Total cached message count across pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.items.is_empty())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: Uuid) -> Option<&LinkedMessage> {
        self.pages
            .iter()
            .flat_map(|p| p.items.iter())
            .find(|m| m.message.id == id)
    }

    /// All cached messages, newest to oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &LinkedMessage> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    /// Continuation cursor for the next older page, if the tail page
    /// reported more history.
    pub fn next_cursor(&self) -> Option<Uuid> {
        self.pages.last().and_then(|p| p.next_cursor)
    }

    /// Append an older page at the tail. Items already cached are
    /// dropped: a live creation can race the fetch that also contains
    /// it, and ids must stay unique.
    pub fn append_page(&mut self, page: FeedPage) {
        let items: Vec<LinkedMessage> = page
            .items
            .into_iter()
            .filter(|item| !self.contains(item.message.id))
            .collect();
        self.pages.push(FeedPage {
            items,
            next_cursor: page.next_cursor,
        });
    }

    /// Prepend a newly created message to the head page, synthesizing a
    /// first page when the cache is empty. False for duplicates.
    pub fn prepend_new(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            return false;
        }
        let item = LinkedMessage::bare(message);
        match self.pages.first_mut() {
            Some(head) => head.items.insert(0, item),
            None => self.pages.push(FeedPage {
                items: vec![item],
                next_cursor: None,
            }),
        }
        true
    }

    /// Replace a message in place by id, keeping its slot. The
    /// replacement mirrors the event payload, which carries no neighbor
    /// annotations. False when the id is not cached, meaning the row
    /// lives in a page that was never loaded.
    pub fn replace_by_id(&mut self, message: Message) -> bool {
        for page in &mut self.pages {
            if let Some(item) = page.items.iter_mut().find(|m| m.message.id == message.id) {
                *item = LinkedMessage::bare(message);
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

/// Ephemeral typing indicator: who is typing and when the indicator
/// lapses unless refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub display_name: String,
    pub author_id: Uuid,
    pub deadline: Instant,
}

/// Everything one chat view renders: lifecycle status, the paged cache,
/// the typing indicator, and whether updates arrive live or via
/// polling.
#[derive(Debug, Clone)]
pub struct FeedState {
    pub status: FeedStatus,
    pub cache: FeedCache,
    pub typing: Option<TypingState>,
    pub live: bool,
}

impl FeedState {
    pub fn new() -> Self {
        Self {
            status: FeedStatus::Loading,
            cache: FeedCache::new(),
            typing: None,
            live: false,
        }
    }

    /// Start or refresh the typing indicator.
    pub fn set_typing(&mut self, display_name: String, author_id: Uuid, now: Instant) {
        self.typing = Some(TypingState {
            display_name,
            author_id,
            deadline: now + TYPING_TTL,
        });
    }

    /// Clear the indicator if this author owns it. A creation from one
    /// user must not clear another user's indicator.
    pub fn clear_typing_for(&mut self, author_id: Uuid) {
        if self.typing.as_ref().is_some_and(|t| t.author_id == author_id) {
            self.typing = None;
        }
    }

    pub fn clear_typing(&mut self) {
        self.typing = None;
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.as_ref().map(|t| t.deadline)
    }

    /// Back to a blank loading state, for a manual reload.
    pub fn reset(&mut self) {
        self.status = FeedStatus::Loading;
        self.cache.clear();
        self.typing = None;
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}
