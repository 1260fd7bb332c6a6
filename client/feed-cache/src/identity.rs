//! Acting identity context
//!
//! A signed-in user acts either as themselves or as one organization they
//! administer. Exactly one identity is active at a time; every read and
//! write in the client is attributed to it. Switches are announced over a
//! watch channel so the cache layer can drop the outgoing viewer's
//! entries.
//!
//! Authorization is the backend's call. The context holds whatever the
//! application last selected and only revalidates after the backend
//! rejects a write, demoting to the personal identity if organization
//! rights turn out to be revoked.

use std::sync::RwLock;

use tokio::sync::watch;
use tracing::{info, warn};

use api_client::SocialApi;
use api_types::{ActingIdentity, ApiError, ApiResult, IdentityKind, OrgRef};

/// Outcome of [`IdentityContext::revalidate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    /// The active identity is still legitimate (or was already personal)
    Unchanged,
    /// Organization rights were revoked; reverted to this personal identity
    Demoted {
        org_id: uuid::Uuid,
        org_name: String,
        personal: ActingIdentity,
    },
}

pub struct IdentityContext {
    active: watch::Sender<Option<ActingIdentity>>,
    personal: RwLock<Option<ActingIdentity>>,
}

impl IdentityContext {
    pub fn new() -> Self {
        let (active, _) = watch::channel(None);
        Self {
            active,
            personal: RwLock::new(None),
        }
    }

    pub fn signed_in(personal: ActingIdentity) -> Self {
        let ctx = Self::new();
        ctx.sign_in(personal);
        ctx
    }

    /// Record the signed-in user and make their personal identity active
    pub fn sign_in(&self, personal: ActingIdentity) {
        let personal = ActingIdentity {
            kind: IdentityKind::Personal,
            ..personal
        };
        if let Ok(mut slot) = self.personal.write() {
            *slot = Some(personal.clone());
        }
        info!(user_id = %personal.id, "signed in");
        self.active.send_replace(Some(personal));
    }

    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.personal.write() {
            *slot = None;
        }
        self.active.send_replace(None);
    }

    pub fn active(&self) -> Option<ActingIdentity> {
        self.active.borrow().clone()
    }

    /// The active identity, or `Unauthorized` when signed out
    pub fn require_active(&self) -> ApiResult<ActingIdentity> {
        self.active()
            .ok_or_else(|| ApiError::Unauthorized("no active identity".to_string()))
    }

    pub fn personal(&self) -> Option<ActingIdentity> {
        self.personal.read().ok().and_then(|slot| slot.clone())
    }

    /// Switch attribution to an organization the user administers.
    /// Accepted as-is; the backend re-checks on every write.
    pub fn act_as_organization(&self, org: &OrgRef) -> ApiResult<()> {
        if self.personal().is_none() {
            return Err(ApiError::Unauthorized("no active identity".to_string()));
        }
        info!(org_id = %org.id, org_name = %org.name, "acting as organization");
        self.active.send_replace(Some(ActingIdentity {
            kind: IdentityKind::Organization,
            id: org.id,
            name: org.name.clone(),
            image_url: org.image_url.clone(),
        }));
        Ok(())
    }

    /// Switch back to the personal identity. Returns whether the active
    /// identity actually changed.
    pub fn revert_to_personal(&self) -> bool {
        let Some(personal) = self.personal() else {
            return false;
        };
        let changed = self
            .active()
            .map(|active| active.id != personal.id || active.kind != personal.kind)
            .unwrap_or(true);
        if changed {
            self.active.send_replace(Some(personal));
        }
        changed
    }

    /// Observe identity changes; the receiver yields the current value
    /// first and then every switch
    pub fn subscribe(&self) -> watch::Receiver<Option<ActingIdentity>> {
        self.active.subscribe()
    }

    /// Re-check an active organization identity against the backend's
    /// current administration list, reverting to personal when the
    /// organization is gone from it. Called after an `Unauthorized` write
    /// failure. Transport errors during the check leave the identity
    /// untouched.
    pub async fn revalidate(&self, api: &dyn SocialApi) -> Revalidation {
        let Some(active) = self.active() else {
            return Revalidation::Unchanged;
        };
        if !active.is_organization() {
            return Revalidation::Unchanged;
        }
        let Some(personal) = self.personal() else {
            return Revalidation::Unchanged;
        };

        match api.administered_orgs(personal.id).await {
            Ok(orgs) => {
                if orgs.iter().any(|org| org.id == active.id) {
                    Revalidation::Unchanged
                } else {
                    warn!(org_id = %active.id, "organization rights revoked, reverting to personal identity");
                    self.active.send_replace(Some(personal.clone()));
                    Revalidation::Demoted {
                        org_id: active.id,
                        org_name: active.name,
                        personal,
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "identity revalidation failed, keeping current identity");
                Revalidation::Unchanged
            }
        }
    }
}

impl Default for IdentityContext {
    fn default() -> Self {
        Self::new()
    }
}
