//! reqwest-backed implementation of [`SocialApi`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use api_types::{
    ActingIdentity, ApiError, ApiResult, Comment, FeedItem, FeedScope, IdentityKind, LikeAck,
    LikeTarget, NewComment, NewPost, OrgRef, Page, Post,
};

use crate::SocialApi;

/// Header carrying the acting-identity attribution on every request
pub const ACTING_AS_HEADER: &str = "x-acting-as";

/// Transport configuration
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub bearer_token: Option<String>,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
            bearer_token: None,
        }
    }
}

/// HTTP transport for the remote social API
///
/// Timeouts are delegated to reqwest; a failed request is reported once
/// as `ApiError::Transport` and never retried automatically.
pub struct HttpApi {
    client: Client,
    config: HttpApiConfig,
}

impl HttpApi {
    pub fn new(config: HttpApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Attach bearer auth and the acting-identity attribution
    fn attributed(&self, builder: RequestBuilder, acting: &ActingIdentity) -> RequestBuilder {
        let builder = match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let kind = match acting.kind {
            IdentityKind::Personal => "personal",
            IdentityKind::Organization => "organization",
        };
        builder.header(ACTING_AS_HEADER, format!("{}:{}", kind, acting.id))
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        acting: &ActingIdentity,
    ) -> ApiResult<T> {
        let builder = self
            .attributed(self.client.get(self.url(path)), acting)
            .query(query);
        decode(self.send(builder).await?).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        acting: &ActingIdentity,
    ) -> ApiResult<T> {
        let builder = self
            .attributed(self.client.post(self.url(path)), acting)
            .json(body);
        decode(self.send(builder).await?).await
    }
}

/// Map connection-level failures onto the transport error kind
fn transport_error(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

/// Map non-success statuses onto the error taxonomy
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };

    debug!(status = %status, "request rejected by server");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::Validation(message)
        }
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        _ => ApiError::Internal(message),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ApiResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Internal(format!("response decode failed: {}", e)))
}

fn feed_path(scope: &FeedScope) -> String {
    match scope {
        FeedScope::Home => "/api/v1/feed".to_string(),
        FeedScope::Profile { user_id } => format!("/api/v1/users/{}/posts", user_id),
        FeedScope::Organization { org_id } => format!("/api/v1/orgs/{}/posts", org_id),
    }
}

#[derive(Serialize)]
struct LikeToggleBody {
    #[serde(flatten)]
    target: LikeTarget,
    liked: bool,
}

#[async_trait]
impl SocialApi for HttpApi {
    async fn fetch_feed<'a>(
        &self,
        scope: &FeedScope,
        cursor: Option<&'a str>,
        limit: u32,
        viewer: &ActingIdentity,
    ) -> ApiResult<Page<FeedItem>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        self.get_json(&feed_path(scope), &query, viewer).await
    }

    async fn fetch_post(&self, post_id: Uuid, viewer: &ActingIdentity) -> ApiResult<Post> {
        self.get_json(&format!("/api/v1/posts/{}", post_id), &[], viewer)
            .await
    }

    async fn fetch_comments<'a>(
        &self,
        post_id: Uuid,
        cursor: Option<&'a str>,
        limit: u32,
        viewer: &ActingIdentity,
    ) -> ApiResult<Page<Comment>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        self.get_json(&format!("/api/v1/posts/{}/comments", post_id), &query, viewer)
            .await
    }

    async fn toggle_like(
        &self,
        target: LikeTarget,
        liked: bool,
        acting: &ActingIdentity,
    ) -> ApiResult<LikeAck> {
        self.post_json("/api/v1/likes", &LikeToggleBody { target, liked }, acting)
            .await
    }

    async fn create_post(&self, payload: &NewPost, acting: &ActingIdentity) -> ApiResult<Post> {
        self.post_json("/api/v1/posts", payload, acting).await
    }

    async fn create_comment(
        &self,
        payload: &NewComment,
        acting: &ActingIdentity,
    ) -> ApiResult<Comment> {
        self.post_json("/api/v1/comments", payload, acting).await
    }

    async fn delete_comment(&self, comment_id: Uuid, acting: &ActingIdentity) -> ApiResult<()> {
        let builder = self.attributed(
            self.client
                .delete(self.url(&format!("/api/v1/comments/{}", comment_id))),
            acting,
        );
        self.send(builder).await?;
        Ok(())
    }

    async fn delete_post(&self, post_id: Uuid, acting: &ActingIdentity) -> ApiResult<()> {
        let builder = self.attributed(
            self.client
                .delete(self.url(&format!("/api/v1/posts/{}", post_id))),
            acting,
        );
        self.send(builder).await?;
        Ok(())
    }

    async fn administered_orgs(&self, user_id: Uuid) -> ApiResult<Vec<OrgRef>> {
        let builder = match &self.config.bearer_token {
            Some(token) => self
                .client
                .get(self.url(&format!("/api/v1/users/{}/administered-orgs", user_id)))
                .bearer_auth(token),
            None => self
                .client
                .get(self.url(&format!("/api/v1/users/{}/administered-orgs", user_id))),
        };
        decode(self.send(builder).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_api_creation() {
        let api = HttpApi::new(HttpApiConfig::default()).unwrap();
        assert_eq!(api.config.base_url, "http://localhost:8000");
        assert_eq!(api.config.timeout_secs, 30);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = HttpApi::new(HttpApiConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(api.url("/api/v1/feed"), "http://localhost:8000/api/v1/feed");
    }

    #[test]
    fn test_feed_paths_per_scope() {
        let user_id = Uuid::new_v4();
        assert_eq!(feed_path(&FeedScope::Home), "/api/v1/feed");
        assert_eq!(
            feed_path(&FeedScope::Profile { user_id }),
            format!("/api/v1/users/{}/posts", user_id)
        );
    }

    #[test]
    fn test_like_toggle_body_shape() {
        let body = LikeToggleBody {
            target: LikeTarget::Post { id: Uuid::nil() },
            liked: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["target"], "post");
        assert_eq!(json["liked"], true);
    }
}
