use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum comment length accepted before a request is dispatched
pub const MAX_COMMENT_LENGTH: usize = 2000;

/// Replies may nest one level below a top-level comment, no deeper
pub const MAX_REPLY_DEPTH: u32 = 1;

/// Kind of persona a write operation is attributed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Personal,
    Organization,
}

/// The persona attributed to reads and writes: the signed-in user
/// themselves, or an organization they administer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActingIdentity {
    pub kind: IdentityKind,
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

impl ActingIdentity {
    pub fn personal(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Personal,
            id,
            name: name.into(),
            image_url: None,
        }
    }

    pub fn organization(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Organization,
            id,
            name: name.into(),
            image_url: None,
        }
    }

    pub fn is_organization(&self) -> bool {
        self.kind == IdentityKind::Organization
    }
}

/// Reference to an organization entity (tagged in posts, or the target
/// of an identity switch)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgRef {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

/// Denormalized author reference embedded in posts and comments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: Uuid,
    pub kind: IdentityKind,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&ActingIdentity> for AuthorRef {
    fn from(identity: &ActingIdentity) -> Self {
        Self {
            id: identity.id,
            kind: identity.kind,
            display_name: identity.name.clone(),
            avatar_url: identity.image_url.clone(),
        }
    }
}

/// Post audience
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Followers,
    College,
    Private,
}

/// Media attachment on a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    #[serde(default)]
    pub media_type: String,
    pub thumbnail_url: Option<String>,
}

/// Post entity as served by the remote API
///
/// `like_count`, `comment_count` and `has_liked` are derived, viewer- and
/// identity-relative fields mirrored from the server; they are never
/// locally authoritative. Counters are unsigned so non-negativity holds by
/// construction; all local adjustments go through clamped arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub author: AuthorRef,
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    pub visibility: Visibility,
    pub like_count: u32,
    pub comment_count: u32,
    pub has_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tagged_org: Option<OrgRef>,
}

/// Comment entity; `parent_comment_id` is set for one level of threaded
/// replies and must reference a comment on the same post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub author: AuthorRef,
    pub content: String,
    pub like_count: u32,
    pub has_liked: bool,
    pub reply_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Nesting depth: 0 for a top-level comment, 1 for a reply. With the
    /// cap at [`MAX_REPLY_DEPTH`] the parent link alone determines it.
    pub fn depth(&self) -> u32 {
        u32::from(self.parent_comment_id.is_some())
    }
}

/// Injected "suggested accounts" card; not a post, exempt from feed dedup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestionCard {
    pub id: Uuid,
    pub title: String,
    pub accounts: Vec<AuthorRef>,
}

/// One item of the merged feed stream
///
/// The server merges several sources (connections, trending) into a single
/// cursor stream, so posts can repeat across pages; suggestion cards are
/// interleaved server-side and pass through the assembler untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedItem {
    Post(Post),
    Suggestions(SuggestionCard),
}

impl FeedItem {
    /// Post identity used for dedup; `None` for non-post items
    pub fn post_id(&self) -> Option<Uuid> {
        match self {
            FeedItem::Post(post) => Some(post.id),
            FeedItem::Suggestions(_) => None,
        }
    }
}

/// One fetched page of an ordered collection; `next_cursor` is an opaque
/// continuation token, absent when the collection is exhausted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Which feed stream a fetch addresses; part of the cache key and the
/// fetch request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum FeedScope {
    /// Merged connections + trending stream for the signed-in viewer
    Home,
    /// Posts authored by one profile
    Profile { user_id: Uuid },
    /// Posts tagged with or authored by one organization
    Organization { org_id: Uuid },
}

/// Target of a like toggle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum LikeTarget {
    Post { id: Uuid },
    Comment { id: Uuid },
}

impl LikeTarget {
    pub fn id(&self) -> Uuid {
        match self {
            LikeTarget::Post { id } | LikeTarget::Comment { id } => *id,
        }
    }
}

/// Server acknowledgement of a like toggle; the new counter is not
/// returned, the client predicts it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeAck {
    pub liked: bool,
}

/// Payload for comment creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
}

impl NewComment {
    /// Local validation, run before any cache mutation is attempted
    pub fn validate(&self) -> Result<(), String> {
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            return Err("comment content must not be empty".to_string());
        }
        if trimmed.chars().count() > MAX_COMMENT_LENGTH {
            return Err(format!(
                "comment content exceeds {} characters",
                MAX_COMMENT_LENGTH
            ));
        }
        Ok(())
    }
}

/// Payload for post creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    pub visibility: Visibility,
    pub tagged_org: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> AuthorRef {
        AuthorRef {
            id: Uuid::new_v4(),
            kind: IdentityKind::Personal,
            display_name: "Test User".to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_feed_item_post_id() {
        let post = Post {
            id: Uuid::new_v4(),
            author: author(),
            content: "hello".to_string(),
            media: vec![],
            visibility: Visibility::Public,
            like_count: 0,
            comment_count: 0,
            has_liked: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tagged_org: None,
        };
        let id = post.id;
        assert_eq!(FeedItem::Post(post).post_id(), Some(id));

        let card = FeedItem::Suggestions(SuggestionCard {
            id: Uuid::new_v4(),
            title: "People you may know".to_string(),
            accounts: vec![],
        });
        assert_eq!(card.post_id(), None);
    }

    #[test]
    fn test_comment_depth() {
        let mut comment = Comment {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            parent_comment_id: None,
            author: author(),
            content: "top level".to_string(),
            like_count: 0,
            has_liked: false,
            reply_count: 0,
            created_at: Utc::now(),
        };
        assert_eq!(comment.depth(), 0);
        assert!(comment.depth() < MAX_REPLY_DEPTH);

        comment.parent_comment_id = Some(Uuid::new_v4());
        assert_eq!(comment.depth(), MAX_REPLY_DEPTH);
    }

    #[test]
    fn test_new_comment_validation() {
        let mut comment = NewComment {
            post_id: Uuid::new_v4(),
            parent_comment_id: None,
            content: "  ".to_string(),
        };
        assert!(comment.validate().is_err());

        comment.content = "a".repeat(MAX_COMMENT_LENGTH + 1);
        assert!(comment.validate().is_err());

        comment.content = "looks good".to_string();
        assert!(comment.validate().is_ok());
    }

    #[test]
    fn test_feed_item_serde_tagging() {
        let card = FeedItem::Suggestions(SuggestionCard {
            id: Uuid::new_v4(),
            title: "Suggested".to_string(),
            accounts: vec![author()],
        });
        let json = serde_json::to_string(&card).unwrap();
        assert!(json.contains("\"kind\":\"suggestions\""));
        let round: FeedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(round, card);
    }

    #[test]
    fn test_acting_identity_to_author_ref() {
        let org = ActingIdentity::organization(Uuid::new_v4(), "Chess Club");
        let author = AuthorRef::from(&org);
        assert_eq!(author.kind, IdentityKind::Organization);
        assert_eq!(author.display_name, "Chess Club");
    }
}
