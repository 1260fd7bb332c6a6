//! Shared types for the CampusLink client SDK
//!
//! DTOs exchanged with the remote API, the client-side error taxonomy,
//! and the opaque pagination cursor codec. Both the transport crate and
//! the cache layer depend on these, so they live in one place.

mod cursor;
mod error;
mod models;

pub use cursor::Cursor;
pub use error::{ApiError, ApiResult};
pub use models::{
    ActingIdentity, AuthorRef, Comment, FeedItem, FeedScope, IdentityKind, LikeAck, LikeTarget,
    MediaItem, NewComment, NewPost, OrgRef, Page, Post, SuggestionCard, Visibility,
    MAX_COMMENT_LENGTH, MAX_REPLY_DEPTH,
};
