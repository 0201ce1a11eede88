//! Client-side kernel for a chat message feed: cursor-paginated history
//! over HTTP, live updates over the gateway WebSocket, and a polling
//! fallback that keeps the feed converging when the push channel is
//! down.

pub mod cache;
pub mod client;
pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod session;
pub mod source;

pub use cache::{FeedCache, FeedPage, FeedState, FeedStatus, TYPING_TTL, TypingState};
pub use client::{HttpPageClient, PageClient};
pub use error::FetchError;
pub use gateway::{GatewayConfig, GatewaySource};
pub use reconciler::Reconciler;
pub use session::{ChatFeed, FeedConfig, FeedHandle, FeedSnapshot, PaginationSession, TypingUser};
pub use source::{
    FailoverSource, FeedUpdate, POLL_INTERVAL, PollingSource, RECONNECT_INTERVAL, UpdateSource,
};
