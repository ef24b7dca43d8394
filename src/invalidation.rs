use crate::{
    cache::{QueryCache, QueryKey},
    domain::CatalogKind,
    moderation::ModerationAction,
};

/// A confirmed mutation, described by what it can have made stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    VotePost { post_id: String },
    VoteComment { post_id: String },
    Comment { post_id: String },
    Follow { target_id: String },
    Save { viewer_id: String },
    Favorite { viewer_id: String },
    LikeReview { kind: CatalogKind, parent_id: String },
    FlagReview,
    Moderation(ModerationAction),
}

pub fn stale_keys(mutation: &Mutation) -> Vec<QueryKey> {
    match mutation {
        Mutation::VotePost { post_id } => vec![QueryKey::posts(), QueryKey::post(post_id)],
        Mutation::VoteComment { post_id } => vec![QueryKey::comments(post_id)],
        // Only the target's cached profile. The viewer's own profile and
        // following list are left as they are.
        Mutation::Follow { target_id } => vec![QueryKey::user(target_id)],
        Mutation::Save { viewer_id } => vec![QueryKey::user(viewer_id), QueryKey::saved_posts()],
        Mutation::Favorite { viewer_id } => vec![QueryKey::user(viewer_id)],
        Mutation::Comment { post_id } => {
            vec![QueryKey::post(post_id), QueryKey::comments(post_id)]
        }
        Mutation::LikeReview { kind, parent_id } => vec![QueryKey::reviews(*kind, parent_id)],
        Mutation::FlagReview => Vec::new(),
        Mutation::Moderation(action) => action.stale_keys(),
    }
}

pub async fn apply(cache: &QueryCache, mutation: &Mutation) {
    for key in stale_keys(mutation) {
        cache.invalidate(&key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn post_vote_stales_list_and_post() {
        assert_eq!(
            stale_keys(&Mutation::VotePost {
                post_id: "p1".to_string()
            }),
            vec![QueryKey::posts(), QueryKey::post("p1")]
        );
    }

    #[test]
    fn new_comment_stales_post_and_its_comments() {
        assert_eq!(
            stale_keys(&Mutation::Comment {
                post_id: "p1".to_string()
            }),
            vec![QueryKey::post("p1"), QueryKey::comments("p1")]
        );
    }

    #[test]
    fn follow_stales_only_the_target() {
        assert_eq!(
            stale_keys(&Mutation::Follow {
                target_id: "t1".to_string()
            }),
            vec![QueryKey::user("t1")]
        );
    }

    #[test]
    fn review_like_stales_its_parent_list() {
        assert_eq!(
            stale_keys(&Mutation::LikeReview {
                kind: CatalogKind::Food,
                parent_id: "f1".to_string()
            }),
            vec![QueryKey::new(["foodReviews", "f1"])]
        );
        assert!(stale_keys(&Mutation::FlagReview).is_empty());
    }

    #[tokio::test]
    async fn comment_vote_leaves_unrelated_entries_fresh() {
        let cache = QueryCache::default();
        cache.store(QueryKey::comments("p1"), json!([])).await;
        cache.store(QueryKey::comments("p2"), json!([])).await;
        cache.store(QueryKey::post("p1"), json!({})).await;

        apply(
            &cache,
            &Mutation::VoteComment {
                post_id: "p1".to_string(),
            },
        )
        .await;

        assert_eq!(cache.is_stale(&QueryKey::comments("p1")).await, Some(true));
        assert_eq!(cache.is_stale(&QueryKey::comments("p2")).await, Some(false));
        assert_eq!(cache.is_stale(&QueryKey::post("p1")).await, Some(false));
    }
}
