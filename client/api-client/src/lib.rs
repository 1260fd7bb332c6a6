//! Remote API seam for the CampusLink client SDK
//!
//! The cache layer talks to the backend exclusively through the
//! [`SocialApi`] trait so tests can substitute scripted or mocked
//! transports. [`HttpApi`] is the production implementation.
//!
//! Every write carries the acting identity's attribution; the backend
//! decides whether that attribution is authorized and the client only
//! ever sees the result as an `ApiError::Unauthorized`.

mod http;

pub use http::{HttpApi, HttpApiConfig};

use async_trait::async_trait;
use uuid::Uuid;

use api_types::{
    ActingIdentity, ApiResult, Comment, FeedItem, FeedScope, LikeAck, LikeTarget, NewComment,
    NewPost, OrgRef, Page, Post,
};

/// Operations the remote API exposes to the cache layer
///
/// Reads are viewer-scoped: `has_liked` and visibility-filtered results
/// differ per acting identity, which is why the cache keys fetched data
/// by viewer as well.
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Fetch one page of a feed stream
    async fn fetch_feed<'a>(
        &self,
        scope: &FeedScope,
        cursor: Option<&'a str>,
        limit: u32,
        viewer: &ActingIdentity,
    ) -> ApiResult<Page<FeedItem>>;

    /// Fetch a single post
    async fn fetch_post(&self, post_id: Uuid, viewer: &ActingIdentity) -> ApiResult<Post>;

    /// Fetch one page of a post's comments (replies inlined, one level)
    async fn fetch_comments<'a>(
        &self,
        post_id: Uuid,
        cursor: Option<&'a str>,
        limit: u32,
        viewer: &ActingIdentity,
    ) -> ApiResult<Page<Comment>>;

    /// Set the like state of a post or comment; the server does not
    /// return the new counter, the client predicts it
    async fn toggle_like(
        &self,
        target: LikeTarget,
        liked: bool,
        acting: &ActingIdentity,
    ) -> ApiResult<LikeAck>;

    /// Create a post, returning the canonical object
    async fn create_post(&self, payload: &NewPost, acting: &ActingIdentity) -> ApiResult<Post>;

    /// Create a comment, returning the canonical object used to replace
    /// the optimistic placeholder
    async fn create_comment(
        &self,
        payload: &NewComment,
        acting: &ActingIdentity,
    ) -> ApiResult<Comment>;

    /// Delete a comment
    async fn delete_comment(&self, comment_id: Uuid, acting: &ActingIdentity) -> ApiResult<()>;

    /// Delete a post
    async fn delete_post(&self, post_id: Uuid, acting: &ActingIdentity) -> ApiResult<()>;

    /// Organizations the signed-in user currently administers; the
    /// identity context revalidates against this after authorization
    /// failures
    async fn administered_orgs(&self, user_id: Uuid) -> ApiResult<Vec<OrgRef>>;
}
