use anyhow::Context;
use clap::Parser;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    api::{ApiClient, ApiError},
    cache::QueryCache,
    config::{Cli, Command, Config, ModerateArgs, ModerationOp},
    domain::{CatalogKind, Votable},
    engagement::Engagement,
    error::EngagementError,
    moderation::ModerationAction,
};

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ApiError> for ExitError {
    fn from(value: ApiError) -> Self {
        Self::new(4, format!("api_error: {value}"))
    }
}

impl From<EngagementError> for ExitError {
    fn from(value: EngagementError) -> Self {
        match value {
            EngagementError::Remote(e) => e.into(),
            other => Self::new(2, format!("rejected: {other}")),
        }
    }
}

/// Runs one command and returns the process exit code. Only failures to
/// write the result surface as `Err`.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(output) => {
            let rendered =
                serde_json::to_string_pretty(&output).context("serialize command output")?;
            println!("{rendered}");
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}", e.message);
            Ok(e.code)
        }
    }
}

pub async fn execute(cli: Cli) -> Result<Value, ExitError> {
    let config = cli.config;
    let engagement = connect(&config)?;

    match cli.command {
        Command::VotePost(args) => {
            let post = engagement.fetch_post(&args.post_id).await?;
            let mut vote = engagement.vote_control(&post);
            let outcome = engagement
                .vote_post(&mut vote, &args.post_id, args.direction.into())
                .await?;
            Ok(json!({
                "post_id": args.post_id,
                "value": outcome.value,
                "score": outcome.score,
            }))
        }
        Command::VoteComment(args) => {
            let comments = engagement.fetch_comments(&args.post_id).await?;
            let comment = comments
                .iter()
                .find(|c| c.id == args.comment_id)
                .ok_or_else(|| {
                    ExitError::new(3, format!("not_found: comment {}", args.comment_id))
                })?;
            let mut vote = engagement.vote_control(comment);
            let outcome = engagement
                .vote_comment(
                    &mut vote,
                    &args.post_id,
                    &args.comment_id,
                    args.direction.into(),
                )
                .await?;
            Ok(json!({
                "comment_id": args.comment_id,
                "value": outcome.value,
                "score": outcome.score,
            }))
        }
        Command::Follow(args) => {
            let target = engagement.fetch_user(&args.user_id).await?;
            let mut follow = engagement.follow_control(&target);
            let following = engagement
                .follow_toggle(&mut follow, &args.user_id)
                .await?;
            Ok(json!({ "user_id": args.user_id, "following": following }))
        }
        Command::Save(args) => {
            let viewer = engagement.fetch_viewer().await?;
            let mut save = engagement.save_control(&viewer, &args.post_id);
            let saved = engagement.save_toggle(&mut save, &args.post_id).await?;
            Ok(json!({ "post_id": args.post_id, "saved": saved }))
        }
        Command::Favorite(args) => {
            let kind = CatalogKind::from(args.kind);
            let viewer = engagement.fetch_viewer().await?;
            let mut favorites =
                engagement.favorites_control(&viewer, kind, config.favorites_limit());
            let favorite = engagement
                .favorite_toggle(&mut favorites, &args.id)
                .await?;
            Ok(json!({
                "kind": kind.to_string(),
                "id": args.id,
                "favorite": favorite,
                "favorites": favorites.ids(),
            }))
        }
        Command::LikeReview(args) => {
            let kind = CatalogKind::from(args.kind);
            let reviews = engagement.fetch_reviews(kind, &args.parent_id).await?;
            let review = reviews
                .iter()
                .find(|r| r.id == args.review_id)
                .ok_or_else(|| {
                    ExitError::new(3, format!("not_found: review {}", args.review_id))
                })?;
            let mut like = engagement.like_control(review);
            let liked = engagement
                .like_review(&mut like, kind, &args.parent_id, &args.review_id)
                .await?;
            Ok(json!({ "review_id": args.review_id, "liked": liked }))
        }
        Command::Comment(args) => {
            let created = engagement.add_comment(&args.post_id, &args.content).await?;
            Ok(json!({
                "post_id": args.post_id,
                "comment_id": created.map(|c| c.id),
            }))
        }
        Command::FlagReview(args) => {
            engagement
                .flag_review(args.kind.into(), &args.review_id, &args.reason)
                .await?;
            Ok(json!({ "review_id": args.review_id, "flagged": true }))
        }
        Command::Moderate(args) => {
            let viewer = engagement.fetch_viewer().await?;
            let engagement = match viewer.role {
                Some(role) => engagement.with_role(role),
                None => engagement,
            };
            let action = moderation_action(args);
            engagement.moderate(action.clone()).await?;
            Ok(json!({ "action": format!("{action:?}"), "ok": true }))
        }
        Command::ShowPost(args) => {
            let post = engagement.fetch_post(&args.post_id).await?;
            let vote = engagement.vote_control(&post);
            Ok(json!({
                "post_id": post.id,
                "content": post.content,
                "score": post.score(),
                "vote": vote.value(),
            }))
        }
    }
}

fn connect(config: &Config) -> Result<Engagement<ApiClient>, ExitError> {
    let viewer_id = config.viewer_id.trim();
    if viewer_id.is_empty() {
        return Err(ExitError::new(
            2,
            "invalid_args: --viewer-id (or SAVOR_VIEWER_ID) is required",
        ));
    }
    let client = ApiClient::new(
        config.api_base_url.clone(),
        config.token.clone(),
        config.request_timeout(),
    )?;
    debug!(api_base_url = %client.base(), viewer_id, "session ready");
    let cache = QueryCache::new(config.cache_gc_after());
    Ok(Engagement::new(client, cache, viewer_id))
}

fn moderation_action(args: ModerateArgs) -> ModerationAction {
    let kind = CatalogKind::from(args.kind);
    match args.op {
        ModerationOp::Approve => ModerationAction::Approve { kind, id: args.id },
        ModerationOp::Deny => ModerationAction::Deny {
            kind,
            id: args.id,
            reason: args.reason,
        },
        ModerationOp::ResolveReview => ModerationAction::ResolveFlaggedReview {
            kind,
            review_id: args.id,
        },
        ModerationOp::DeleteReview => ModerationAction::DeleteFlaggedReview {
            kind,
            review_id: args.id,
        },
        ModerationOp::DeletePost => ModerationAction::DeletePost { post_id: args.id },
    }
}
