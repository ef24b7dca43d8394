use chrono::Utc;
use futures_util::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    api::{ApiError, ApiRequest, Backend, Envelope, FavoritesOutcome, VoteOutcome, decode},
    cache::{QueryCache, QueryKey},
    domain::{
        CatalogKind, Comment, Direction, DomainError, Post, Review, ToggleRelation, UserSnapshot,
        Votable, has_saved, is_following, liked_by, validate_votes,
    },
    error::EngagementError,
    id::{IdRef, extract_id},
    invalidation::{self, Mutation},
    toggle::{FavoritesControl, InFlight, RelationControl, VoteControl},
};

/// One viewer's session against the API: the backend, the shared read
/// cache and the viewer's identity, handed to every toggle it drives.
pub struct Engagement<B> {
    backend: B,
    cache: QueryCache,
    viewer_id: String,
    viewer_role: Option<String>,
}

impl<B: Backend> Engagement<B> {
    pub fn new(backend: B, cache: QueryCache, viewer_id: impl Into<String>) -> Self {
        Self {
            backend,
            cache,
            viewer_id: viewer_id.into(),
            viewer_role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.viewer_role = Some(role.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn viewer_role(&self) -> Option<&str> {
        self.viewer_role.as_deref()
    }

    async fn read_through<T: DeserializeOwned>(
        &self,
        key: QueryKey,
        path: String,
    ) -> Result<T, ApiError> {
        self.cache.gc(Utc::now()).await;
        let value = self
            .cache
            .fetch_with(key, || async move {
                self.backend.send(ApiRequest::get(path)).await?.into_data()
            })
            .await?;
        decode(value)
    }

    pub async fn fetch_posts(&self) -> Result<Vec<Post>, ApiError> {
        let posts: Vec<Post> = self
            .read_through(QueryKey::posts(), "/posts".to_string())
            .await?;
        posts.iter().for_each(warn_on_vote_overlap);
        Ok(posts)
    }

    pub async fn fetch_post(&self, post_id: &str) -> Result<Post, ApiError> {
        let post: Post = self
            .read_through(QueryKey::post(post_id), format!("/posts/{post_id}"))
            .await?;
        warn_on_vote_overlap(&post);
        Ok(post)
    }

    pub async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        let comments: Vec<Comment> = self
            .read_through(QueryKey::comments(post_id), format!("/comments/{post_id}"))
            .await?;
        comments.iter().for_each(warn_on_vote_overlap);
        Ok(comments)
    }

    pub async fn fetch_reviews(
        &self,
        kind: CatalogKind,
        parent_id: &str,
    ) -> Result<Vec<Review>, ApiError> {
        self.read_through(
            QueryKey::reviews(kind, parent_id),
            ApiRequest::reviews(kind, parent_id).path,
        )
        .await
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<UserSnapshot, ApiError> {
        self.read_through(QueryKey::user(user_id), format!("/users/{user_id}"))
            .await
    }

    pub async fn fetch_viewer(&self) -> Result<UserSnapshot, ApiError> {
        self.fetch_user(&self.viewer_id).await
    }

    /// The viewer's saved posts, each fetched concurrently.
    pub async fn fetch_saved_posts(&self) -> Result<Vec<Post>, ApiError> {
        let viewer = self.fetch_viewer().await?;
        if viewer.saved_posts.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = viewer.saved_posts.iter().map(extract_id).collect();
        let key = QueryKey::saved_posts_for(ids.iter().copied());
        let value = self
            .cache
            .fetch_with(key, || async move {
                let posts = try_join_all(ids.iter().map(|id| async move {
                    self.backend
                        .send(ApiRequest::get(format!("/posts/{id}")))
                        .await?
                        .into_data()
                }))
                .await?;
                Ok::<_, ApiError>(Value::Array(posts))
            })
            .await?;
        decode(value)
    }

    pub fn vote_control<V: Votable>(&self, entity: &V) -> VoteControl {
        VoteControl::from_entity(entity, &self.viewer_id)
    }

    pub fn follow_control(&self, target: &UserSnapshot) -> RelationControl {
        RelationControl::new(is_following(target, &self.viewer_id))
    }

    pub fn save_control(&self, viewer: &UserSnapshot, post_id: &str) -> RelationControl {
        RelationControl::new(has_saved(viewer, post_id))
    }

    pub fn like_control(&self, review: &Review) -> RelationControl {
        RelationControl::new(liked_by(review, &self.viewer_id))
    }

    pub fn favorites_control(
        &self,
        viewer: &UserSnapshot,
        kind: CatalogKind,
        limit: usize,
    ) -> FavoritesControl {
        FavoritesControl::new(kind, viewer.favorites(kind), limit)
    }

    pub async fn vote_post(
        &self,
        control: &mut VoteControl,
        post_id: &str,
        direction: Direction,
    ) -> Result<VoteOutcome, EngagementError> {
        let target = control.click(direction)?;
        let mut control = InFlight::new(control);
        let result = self
            .backend
            .send(ApiRequest::vote_post(post_id, target))
            .await
            .and_then(Envelope::decode::<VoteOutcome>);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(post_id, error = %e, "post vote failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        control.confirm(outcome);
        info!(
            post_id,
            value = outcome.value.value(),
            score = outcome.score,
            "post vote confirmed"
        );
        let mutation = Mutation::VotePost {
            post_id: post_id.to_string(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(outcome)
    }

    pub async fn vote_comment(
        &self,
        control: &mut VoteControl,
        post_id: &str,
        comment_id: &str,
        direction: Direction,
    ) -> Result<VoteOutcome, EngagementError> {
        let target = control.click(direction)?;
        let mut control = InFlight::new(control);
        let result = self
            .backend
            .send(ApiRequest::vote_comment(comment_id, target))
            .await
            .and_then(Envelope::decode::<VoteOutcome>);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(comment_id, error = %e, "comment vote failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        control.confirm(outcome);
        info!(
            comment_id,
            value = outcome.value.value(),
            score = outcome.score,
            "comment vote confirmed"
        );
        let mutation = Mutation::VoteComment {
            post_id: post_id.to_string(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(outcome)
    }

    /// Follows or unfollows `target_id`, whichever flips the control.
    pub async fn follow_toggle(
        &self,
        control: &mut RelationControl,
        target_id: &str,
    ) -> Result<bool, EngagementError> {
        let target = control.click()?;
        let mut control = InFlight::new(control);
        let req = if target {
            ApiRequest::follow(target_id)
        } else {
            ApiRequest::unfollow(target_id)
        };
        let env = match self.backend.send(req).await {
            Ok(env) => env,
            Err(e) => {
                warn!(relation = %ToggleRelation::Follow, target_id, follow = target, error = %e, "toggle failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        let confirmed = env
            .data
            .as_ref()
            .and_then(|data| follow_state_from(data, &self.viewer_id, target_id))
            .unwrap_or(target);
        control.confirm(confirmed);
        info!(relation = %ToggleRelation::Follow, target_id, following = confirmed, "toggle confirmed");
        let mutation = Mutation::Follow {
            target_id: target_id.to_string(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(confirmed)
    }

    pub async fn save_toggle(
        &self,
        control: &mut RelationControl,
        post_id: &str,
    ) -> Result<bool, EngagementError> {
        let target = control.click()?;
        let mut control = InFlight::new(control);
        let env = match self.backend.send(ApiRequest::toggle_save(post_id)).await {
            Ok(env) => env,
            Err(e) => {
                warn!(relation = %ToggleRelation::Save, post_id, error = %e, "toggle failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        let confirmed = env
            .data
            .as_ref()
            .and_then(|data| saved_state_from(data, post_id))
            .unwrap_or(target);
        control.confirm(confirmed);
        info!(relation = %ToggleRelation::Save, post_id, saved = confirmed, "toggle confirmed");
        let mutation = Mutation::Save {
            viewer_id: self.viewer_id.clone(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(confirmed)
    }

    /// Toggles `entity_id` in the viewer's favorites. Returns whether it is
    /// a favorite according to the server.
    pub async fn favorite_toggle(
        &self,
        control: &mut FavoritesControl,
        entity_id: &str,
    ) -> Result<bool, EngagementError> {
        let kind = control.kind();
        control.click(entity_id)?;
        let mut control = InFlight::new(control);
        let result = self
            .backend
            .send(ApiRequest::toggle_favorite(kind, entity_id))
            .await
            .and_then(Envelope::decode::<FavoritesOutcome>);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(relation = %ToggleRelation::Favorite(kind), entity_id, error = %e, "toggle failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        control.confirm(&outcome.favorites);
        let favorite = control.contains(entity_id);
        info!(
            relation = %ToggleRelation::Favorite(kind),
            entity_id,
            favorite,
            count = control.ids().len(),
            "toggle confirmed"
        );
        let mutation = Mutation::Favorite {
            viewer_id: self.viewer_id.clone(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(favorite)
    }

    /// Likes or unlikes `review_id`, whichever flips the control. The
    /// review list of `parent_id` is staled on success.
    pub async fn like_review(
        &self,
        control: &mut RelationControl,
        kind: CatalogKind,
        parent_id: &str,
        review_id: &str,
    ) -> Result<bool, EngagementError> {
        let relation = ToggleRelation::LikeReview(kind);
        let target = control.click()?;
        let mut control = InFlight::new(control);
        let env = match self
            .backend
            .send(ApiRequest::like_review(kind, review_id))
            .await
        {
            Ok(env) => env,
            Err(e) => {
                warn!(%relation, review_id, error = %e, "toggle failed");
                control.fail(&e);
                return Err(e.into());
            }
        };

        let confirmed = env
            .data
            .as_ref()
            .and_then(|data| liked_state_from(data, &self.viewer_id))
            .unwrap_or(target);
        control.confirm(confirmed);
        info!(%relation, review_id, liked = confirmed, "toggle confirmed");
        let mutation = Mutation::LikeReview {
            kind,
            parent_id: parent_id.to_string(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(confirmed)
    }

    /// Posts a comment on `post_id`. Blank content is refused before any
    /// request. Returns the created comment when the server echoes it.
    pub async fn add_comment(
        &self,
        post_id: &str,
        content: &str,
    ) -> Result<Option<Comment>, EngagementError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DomainError::EmptyContent.into());
        }
        let env = self
            .backend
            .send(ApiRequest::add_comment(post_id, content))
            .await
            .inspect_err(|e| warn!(post_id, error = %e, "comment failed"))?;
        let created = env.data.and_then(|data| decode::<Comment>(data).ok());
        info!(
            post_id,
            comment_id = created.as_ref().map(|c| c.id.as_str()),
            "comment posted"
        );
        let mutation = Mutation::Comment {
            post_id: post_id.to_string(),
        };
        invalidation::apply(&self.cache, &mutation).await;
        Ok(created)
    }

    pub async fn flag_review(
        &self,
        kind: CatalogKind,
        review_id: &str,
        reason: &str,
    ) -> Result<(), EngagementError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::EmptyReason.into());
        }
        self.backend
            .send(ApiRequest::flag_review(kind, review_id, reason))
            .await?;
        info!(%kind, review_id, "review flagged");
        invalidation::apply(&self.cache, &Mutation::FlagReview).await;
        Ok(())
    }
}

/// Derivation still works on an overlapping snapshot (up wins), so this only
/// reports it.
fn warn_on_vote_overlap<V: Votable>(entity: &V) {
    if let Err(e) = validate_votes(entity) {
        warn!(error = %e, code = e.code(), "inconsistent vote snapshot");
    }
}

fn list_contains(value: Option<&Value>, id: &str) -> Option<bool> {
    let refs: Vec<IdRef> = serde_json::from_value(value?.clone()).ok()?;
    Some(refs.iter().any(|r| extract_id(r) == id))
}

/// Reads the follow edge back from whatever the server returned: an explicit
/// flag, the target user (its followers), or the viewer (its following).
fn follow_state_from(data: &Value, viewer_id: &str, target_id: &str) -> Option<bool> {
    if let Some(flag) = data.get("isFollowing").and_then(Value::as_bool) {
        return Some(flag);
    }
    match data.get("_id").and_then(Value::as_str) {
        Some(id) if id == target_id => list_contains(data.get("followers"), viewer_id),
        Some(id) if id == viewer_id => list_contains(data.get("following"), target_id),
        _ => None,
    }
}

/// Reads the like edge from an explicit flag or the review's `likes` list.
fn liked_state_from(data: &Value, viewer_id: &str) -> Option<bool> {
    if let Some(flag) = ["liked", "isLiked"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_bool))
    {
        return Some(flag);
    }
    list_contains(data.get("likes"), viewer_id)
}

fn saved_state_from(data: &Value, post_id: &str) -> Option<bool> {
    if data.is_array() {
        return list_contains(Some(data), post_id);
    }
    if let Some(flag) = ["saved", "isSaved"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_bool))
    {
        return Some(flag);
    }
    list_contains(data.get("savedPosts"), post_id)
}
