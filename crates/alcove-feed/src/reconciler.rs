use tokio::time::Instant;

use alcove_types::api::MessagePage;
use alcove_types::models::Message;

use crate::cache::{FeedPage, FeedState, FeedStatus};
use crate::source::FeedUpdate;

/// Merges live updates and fetched pages into the feed state. Every
/// entry point takes the state by exclusive reference and completes
/// synchronously; the session applies one update at a time in arrival
/// order, so no two mutations interleave.
pub struct Reconciler;

impl Reconciler {
    /// Apply one update from the active source.
    pub fn apply(state: &mut FeedState, update: FeedUpdate, now: Instant) {
        match update {
            FeedUpdate::Created(message) => Self::apply_create(state, message),
            FeedUpdate::Updated(message) => Self::apply_update(state, message),
            FeedUpdate::Typing {
                display_name,
                author_id,
            } => {
                state.set_typing(display_name, author_id, now);
            }
            FeedUpdate::Snapshot(items) => Self::absorb_snapshot(state, items),
            FeedUpdate::ConnectionChanged(live) => state.live = live,
        }
    }

    /// Absorb a fetched page at the tail: initial load and load-more
    /// both land here.
    pub fn absorb_page(state: &mut FeedState, page: MessagePage) {
        state.cache.append_page(FeedPage::from(page));
        state.status = FeedStatus::Ready;
    }

    fn apply_create(state: &mut FeedState, message: Message) {
        let author_id = message.author.id;
        state.cache.prepend_new(message);
        // The author's message landing means they stopped typing.
        state.clear_typing_for(author_id);
    }

    fn apply_update(state: &mut FeedState, message: Message) {
        // Ids that miss belong to pages never loaded. Dropped silently;
        // a later fetch of that page returns the new revision anyway.
        state.cache.replace_by_id(message);
    }

    /// Degraded-mode merge: diff a re-fetched first page against the
    /// cache and route each difference through the same create/update
    /// paths a live event would take.
    fn absorb_snapshot(state: &mut FeedState, items: Vec<Message>) {
        // Oldest first, so successive prepends leave the newest at the
        // head.
        for message in items.into_iter().rev() {
            let cached_differs = state
                .cache
                .get(message.id)
                .map(|existing| existing.message != message);

            match cached_differs {
                None => Self::apply_create(state, message),
                Some(true) => Self::apply_update(state, message),
                Some(false) => {}
            }
        }
    }
}
