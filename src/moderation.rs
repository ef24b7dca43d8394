use serde_json::json;
use tracing::info;

use crate::{
    api::{ApiRequest, Backend},
    cache::QueryKey,
    domain::{CatalogKind, DomainError},
    engagement::Engagement,
    error::EngagementError,
    invalidation::{self, Mutation},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    Approve { kind: CatalogKind, id: String },
    Deny { kind: CatalogKind, id: String, reason: String },
    ResolveFlaggedReview { kind: CatalogKind, review_id: String },
    DeleteFlaggedReview { kind: CatalogKind, review_id: String },
    DeletePost { post_id: String },
}

impl ModerationAction {
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Deny { reason, .. } if reason.trim().is_empty() => Err(DomainError::EmptyReason),
            _ => Ok(()),
        }
    }

    pub fn request(&self) -> ApiRequest {
        match self {
            Self::Approve { kind, id } => {
                ApiRequest::patch(format!("/admin/{}/{id}/approve", kind.collection()), None)
            }
            Self::Deny { kind, id, reason } => ApiRequest::patch(
                format!("/admin/{}/{id}/deny", kind.collection()),
                Some(json!({ "reason": reason.trim() })),
            ),
            Self::ResolveFlaggedReview { kind, review_id } => {
                ApiRequest::patch(format!("{}/{review_id}/resolve", review_base(*kind)), None)
            }
            Self::DeleteFlaggedReview { kind, review_id } => {
                ApiRequest::delete(format!("{}/{review_id}", review_base(*kind)))
            }
            Self::DeletePost { post_id } => ApiRequest::delete(format!("/admin/posts/{post_id}")),
        }
    }

    pub fn stale_keys(&self) -> Vec<QueryKey> {
        match self {
            Self::Approve { kind, .. } | Self::Deny { kind, .. } => match kind {
                CatalogKind::Restaurant => vec![
                    QueryKey::new(["pendingRestaurants"]),
                    QueryKey::new(["adminRestaurants"]),
                ],
                CatalogKind::Food => vec![
                    QueryKey::new(["pendingFoods"]),
                    QueryKey::new(["adminFoods"]),
                ],
            },
            Self::ResolveFlaggedReview { kind, .. } | Self::DeleteFlaggedReview { kind, .. } => {
                match kind {
                    CatalogKind::Restaurant => vec![QueryKey::new(["adminFlaggedReviews"])],
                    CatalogKind::Food => vec![QueryKey::new(["adminFlaggedFoodReviews"])],
                }
            }
            Self::DeletePost { .. } => vec![QueryKey::new(["adminPosts"])],
        }
    }
}

fn review_base(kind: CatalogKind) -> &'static str {
    match kind {
        CatalogKind::Restaurant => "/admin/reviews",
        CatalogKind::Food => "/admin/foods/reviews",
    }
}

impl<B: Backend> Engagement<B> {
    /// Runs an admin moderation action. The viewer's role is checked
    /// locally when it is known; the server enforces it regardless.
    pub async fn moderate(&self, action: ModerationAction) -> Result<(), EngagementError> {
        action.validate()?;
        if let Some(role) = self.viewer_role()
            && role != "admin"
        {
            return Err(DomainError::NotAdmin {
                user_id: self.viewer_id().to_string(),
            }
            .into());
        }

        self.backend().send(action.request()).await?;
        info!(action = ?action, "moderation applied");
        invalidation::apply(self.cache(), &Mutation::Moderation(action)).await;
        Ok(())
    }
}
