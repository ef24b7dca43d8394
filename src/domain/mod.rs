use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{IdRef, contains_id, normalize_ids};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    VoterInBothSets { entity_id: String, user_id: String },
    InvalidVoteValue { value: i64 },
    EmptyReason,
    EmptyContent,
    NotAdmin { user_id: String },
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::VoterInBothSets { .. } | Self::InvalidVoteValue { .. } => "invalid_state",
            Self::EmptyReason | Self::EmptyContent => "invalid_request",
            Self::NotAdmin { .. } => "forbidden",
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VoterInBothSets { entity_id, user_id } => write!(
                f,
                "user is both an upvoter and a downvoter: entity_id={entity_id} user_id={user_id}"
            ),
            Self::InvalidVoteValue { value } => write!(f, "invalid vote value: {value}"),
            Self::EmptyReason => write!(f, "reason must not be empty"),
            Self::EmptyContent => write!(f, "content must not be empty"),
            Self::NotAdmin { user_id } => write!(f, "user is not an admin: {user_id}"),
        }
    }
}

impl std::error::Error for DomainError {}

/// A viewer's vote on a post or comment. On the wire: `1`, `-1` or `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteState {
    Up,
    Down,
    #[default]
    None,
}

impl VoteState {
    pub fn value(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
            Self::None => 0,
        }
    }
}

impl TryFrom<i64> for VoteState {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            0 => Ok(Self::None),
            value => Err(DomainError::InvalidVoteValue { value }),
        }
    }
}

impl From<VoteState> for i64 {
    fn from(value: VoteState) -> Self {
        value.value()
    }
}

/// The button a viewer pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl From<Direction> for VoteState {
    fn from(value: Direction) -> Self {
        match value {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
        }
    }
}

/// A boolean viewer-to-target edge the client can flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleRelation {
    Follow,
    Save,
    Favorite(CatalogKind),
    LikeReview(CatalogKind),
}

impl std::fmt::Display for ToggleRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Follow => f.write_str("follow"),
            Self::Save => f.write_str("save"),
            Self::Favorite(kind) => write!(f, "favorite_{kind}"),
            Self::LikeReview(kind) => write!(f, "like_{kind}_review"),
        }
    }
}

/// Restaurants and foods share favorites, reviews and moderation flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CatalogKind {
    Restaurant,
    Food,
}

impl CatalogKind {
    /// Plural path segment used by the API (`/users/favorites/restaurants/...`).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurants",
            Self::Food => "foods",
        }
    }

    /// Cache key head for the review list of one restaurant or food.
    pub fn reviews_key(self) -> &'static str {
        match self {
            Self::Restaurant => "restaurantReviews",
            Self::Food => "foodReviews",
        }
    }
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restaurant => f.write_str("restaurant"),
            Self::Food => f.write_str("food"),
        }
    }
}

pub trait Votable {
    fn entity_id(&self) -> &str;
    fn upvotes(&self) -> &[IdRef];
    fn downvotes(&self) -> &[IdRef];

    fn score(&self) -> i64 {
        self.upvotes().len() as i64 - self.downvotes().len() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub upvotes: Vec<IdRef>,
    #[serde(default)]
    pub downvotes: Vec<IdRef>,
    #[serde(default)]
    pub restaurant: Option<IdRef>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub post: Option<IdRef>,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub upvotes: Vec<IdRef>,
    #[serde(default)]
    pub downvotes: Vec<IdRef>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A restaurant or food review. `likes` holds the users who liked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub likes: Vec<IdRef>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Votable for Post {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn upvotes(&self) -> &[IdRef] {
        &self.upvotes
    }

    fn downvotes(&self) -> &[IdRef] {
        &self.downvotes
    }
}

impl Votable for Comment {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn upvotes(&self) -> &[IdRef] {
        &self.upvotes
    }

    fn downvotes(&self) -> &[IdRef] {
        &self.downvotes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub followers: Vec<IdRef>,
    #[serde(default)]
    pub following: Vec<IdRef>,
    #[serde(default)]
    pub saved_posts: Vec<IdRef>,
    #[serde(default)]
    pub favorite_restaurants: Vec<IdRef>,
    #[serde(default)]
    pub favorite_foods: Vec<IdRef>,
}

impl UserSnapshot {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    pub fn favorites(&self, kind: CatalogKind) -> &[IdRef] {
        match kind {
            CatalogKind::Restaurant => &self.favorite_restaurants,
            CatalogKind::Food => &self.favorite_foods,
        }
    }
}

pub fn validate_votes<V: Votable>(entity: &V) -> Result<(), DomainError> {
    let up = normalize_ids(entity.upvotes());
    let down = normalize_ids(entity.downvotes());
    match up.intersection(&down).next() {
        Some(user_id) => Err(DomainError::VoterInBothSets {
            entity_id: entity.entity_id().to_string(),
            user_id: user_id.clone(),
        }),
        None => Ok(()),
    }
}

pub fn derive_vote_state<V: Votable>(entity: &V, viewer_id: &str) -> VoteState {
    if contains_id(entity.upvotes(), viewer_id) {
        VoteState::Up
    } else if contains_id(entity.downvotes(), viewer_id) {
        VoteState::Down
    } else {
        VoteState::None
    }
}

pub fn is_following(target: &UserSnapshot, viewer_id: &str) -> bool {
    contains_id(&target.followers, viewer_id)
}

pub fn has_saved(viewer: &UserSnapshot, post_id: &str) -> bool {
    contains_id(&viewer.saved_posts, post_id)
}

pub fn liked_by(review: &Review, viewer_id: &str) -> bool {
    contains_id(&review.likes, viewer_id)
}

pub fn favorite_ids(viewer: &UserSnapshot, kind: CatalogKind) -> BTreeSet<String> {
    normalize_ids(viewer.favorites(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(value: serde_json::Value) -> Post {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn upvoter_derives_up_with_net_score() {
        let p = post(json!({
            "_id": "p1",
            "upvotes": ["u1", "u2"],
            "downvotes": ["u3"]
        }));
        assert_eq!(derive_vote_state(&p, "u1"), VoteState::Up);
        assert_eq!(derive_vote_state(&p, "u3"), VoteState::Down);
        assert_eq!(derive_vote_state(&p, "u4"), VoteState::None);
        assert_eq!(p.score(), 1);
    }

    #[test]
    fn populated_voters_derive_like_raw_ids() {
        let raw = post(json!({
            "_id": "p1",
            "upvotes": ["u1"],
            "downvotes": ["u2", "u3"]
        }));
        let populated = post(json!({
            "_id": "p1",
            "upvotes": [{ "_id": "u1", "username": "ann" }],
            "downvotes": [{ "_id": "u2" }, "u3"]
        }));
        for viewer in ["u1", "u2", "u3", "u4"] {
            assert_eq!(
                derive_vote_state(&raw, viewer),
                derive_vote_state(&populated, viewer)
            );
        }
        assert_eq!(raw.score(), populated.score());
    }

    #[test]
    fn missing_vote_lists_default_to_empty() {
        let p = post(json!({ "_id": "p1" }));
        assert_eq!(p.score(), 0);
        assert_eq!(derive_vote_state(&p, "u1"), VoteState::None);
    }

    #[test]
    fn rejects_voter_in_both_sets() {
        let p = post(json!({
            "_id": "p1",
            "upvotes": ["u1"],
            "downvotes": [{ "_id": "u1" }]
        }));
        let err = validate_votes(&p).unwrap_err();
        assert_eq!(
            err,
            DomainError::VoterInBothSets {
                entity_id: "p1".to_string(),
                user_id: "u1".to_string()
            }
        );
        assert_eq!(err.code(), "invalid_state");
    }

    #[test]
    fn relation_labels() {
        assert_eq!(ToggleRelation::Follow.to_string(), "follow");
        assert_eq!(
            ToggleRelation::LikeReview(CatalogKind::Restaurant).to_string(),
            "like_restaurant_review"
        );
        assert_eq!(
            ToggleRelation::Favorite(CatalogKind::Food).to_string(),
            "favorite_food"
        );
    }

    #[test]
    fn review_likes_derive_from_either_shape() {
        let raw: Review = serde_json::from_value(json!({
            "_id": "rv1",
            "likes": ["u1", "u2"]
        }))
        .unwrap();
        let populated: Review = serde_json::from_value(json!({
            "_id": "rv1",
            "review": "crispy and cheap",
            "likes": [{ "_id": "u1", "username": "ann" }, { "_id": "u2" }]
        }))
        .unwrap();
        for viewer in ["u1", "u2", "u3"] {
            assert_eq!(liked_by(&raw, viewer), liked_by(&populated, viewer));
        }
        assert!(liked_by(&populated, "u1"));
        assert!(!liked_by(&populated, "u3"));

        let bare: Review = serde_json::from_value(json!({ "_id": "rv2" })).unwrap();
        assert!(!liked_by(&bare, "u1"));
    }

    #[test]
    fn vote_state_wire_values() {
        assert_eq!(serde_json::to_value(VoteState::Down).unwrap(), json!(-1));
        let v: VoteState = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(v, VoteState::Up);
        assert!(serde_json::from_value::<VoteState>(json!(2)).is_err());
    }

    #[test]
    fn relations_derive_from_either_shape() {
        let target: UserSnapshot = serde_json::from_value(json!({
            "_id": "t1",
            "followers": [{ "_id": "v1", "username": "viewer" }]
        }))
        .unwrap();
        assert!(is_following(&target, "v1"));
        assert!(!is_following(&target, "v2"));

        let viewer: UserSnapshot = serde_json::from_value(json!({
            "_id": "v1",
            "role": "admin",
            "savedPosts": ["p1"],
            "favoriteRestaurants": ["r1", { "_id": "r2", "name": "Dosa Hut" }],
            "favoriteFoods": []
        }))
        .unwrap();
        assert!(has_saved(&viewer, "p1"));
        assert!(viewer.is_admin());
        assert_eq!(
            favorite_ids(&viewer, CatalogKind::Restaurant),
            BTreeSet::from(["r1".to_string(), "r2".to_string()])
        );
        assert!(favorite_ids(&viewer, CatalogKind::Food).is_empty());
    }
}
