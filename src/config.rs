use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::domain::{CatalogKind, Direction};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "savor",
    about = "Votes, follows, saves and favorites against the Savor API",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Upvote or downvote a post. Repeating the active direction clears it.
    VotePost(VotePostArgs),

    /// Upvote or downvote a comment.
    VoteComment(VoteCommentArgs),

    /// Follow a user, or unfollow if already following.
    Follow(UserArgs),

    /// Save a post, or unsave it if already saved.
    Save(PostArgs),

    /// Add or remove a restaurant or food from the viewer's favorites.
    Favorite(FavoriteArgs),

    /// Like or unlike a restaurant or food review.
    LikeReview(LikeReviewArgs),

    /// Post a comment on a post.
    Comment(CommentArgs),

    /// Report a restaurant or food review.
    FlagReview(FlagReviewArgs),

    /// Admin moderation actions.
    Moderate(ModerateArgs),

    /// Print a post with the viewer's vote and score.
    ShowPost(PostArgs),
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Restaurant,
    Food,
}

impl From<KindArg> for CatalogKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Restaurant => CatalogKind::Restaurant,
            KindArg::Food => CatalogKind::Food,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOp {
    Approve,
    Deny,
    ResolveReview,
    DeleteReview,
    DeletePost,
}

#[derive(Args, Debug, Clone)]
pub struct VotePostArgs {
    pub post_id: String,
    #[arg(value_enum)]
    pub direction: DirectionArg,
}

#[derive(Args, Debug, Clone)]
pub struct VoteCommentArgs {
    pub post_id: String,
    pub comment_id: String,
    #[arg(value_enum)]
    pub direction: DirectionArg,
}

#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    pub user_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct PostArgs {
    pub post_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct CommentArgs {
    pub post_id: String,
    /// Comment text. Must not be blank.
    pub content: String,
}

#[derive(Args, Debug, Clone)]
pub struct FavoriteArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct LikeReviewArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    /// The restaurant or food the review belongs to.
    pub parent_id: String,
    pub review_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct FlagReviewArgs {
    #[arg(value_enum)]
    pub kind: KindArg,
    pub review_id: String,
    #[arg(long, default_value = "Suspicious review")]
    pub reason: String,
}

#[derive(Args, Debug, Clone)]
pub struct ModerateArgs {
    #[arg(value_enum)]
    pub op: ModerationOp,
    pub id: String,
    /// Restaurant or food; ignored by delete-post.
    #[arg(long, value_enum, default_value = "restaurant")]
    pub kind: KindArg,
    #[arg(long, default_value = "")]
    pub reason: String,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "SAVOR_API_BASE_URL",
        value_name = "URL",
        default_value = "http://127.0.0.1:5000/api"
    )]
    pub api_base_url: String,

    #[arg(long, global = true, env = "SAVOR_TOKEN", value_name = "TOKEN")]
    pub token: Option<String>,

    #[arg(
        long,
        global = true,
        env = "SAVOR_VIEWER_ID",
        value_name = "USER_ID",
        default_value = ""
    )]
    pub viewer_id: String,

    #[arg(
        long = "request-timeout-secs",
        global = true,
        env = "SAVOR_REQUEST_TIMEOUT_SECS",
        value_name = "SECS",
        default_value_t = 15,
        value_parser = clap::value_parser!(u64).range(1..=120)
    )]
    pub request_timeout_secs: u64,

    #[arg(
        long = "favorites-limit",
        global = true,
        env = "SAVOR_FAVORITES_LIMIT",
        value_name = "N",
        default_value_t = 4,
        value_parser = clap::value_parser!(u64).range(1..=16)
    )]
    pub favorites_limit: u64,

    #[arg(
        long = "cache-gc-secs",
        global = true,
        env = "SAVOR_CACHE_GC_SECS",
        value_name = "SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..=86400)
    )]
    pub cache_gc_secs: u64,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_gc_after(&self) -> Duration {
        Duration::from_secs(self.cache_gc_secs)
    }

    pub fn favorites_limit(&self) -> usize {
        self.favorites_limit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["savor", "show-post", "p1"]).unwrap();
        assert_eq!(cli.config.api_base_url, "http://127.0.0.1:5000/api");
        assert_eq!(cli.config.request_timeout(), Duration::from_secs(15));
        assert_eq!(cli.config.favorites_limit(), 4);
        assert_eq!(cli.config.cache_gc_after(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_invalid_request_timeout_secs() {
        let err = Cli::try_parse_from(["savor", "--request-timeout-secs", "0", "show-post", "p1"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--request-timeout-secs"));
        assert!(msg.contains("1..=120"));
    }

    #[test]
    fn rejects_invalid_favorites_limit() {
        let err = Cli::try_parse_from(["savor", "--favorites-limit", "17", "show-post", "p1"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--favorites-limit"));
        assert!(msg.contains("1..=16"));
    }

    #[test]
    fn parses_vote_and_moderation_args() {
        let cli = Cli::try_parse_from(["savor", "vote-post", "p1", "down"]).unwrap();
        match cli.command {
            Command::VotePost(args) => {
                assert_eq!(args.post_id, "p1");
                assert_eq!(Direction::from(args.direction), Direction::Down);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "savor", "moderate", "deny", "f1", "--kind", "food", "--reason", "dup",
        ])
        .unwrap();
        match cli.command {
            Command::Moderate(args) => {
                assert_eq!(args.op, ModerationOp::Deny);
                assert_eq!(CatalogKind::from(args.kind), CatalogKind::Food);
                assert_eq!(args.reason, "dup");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_comment_args() {
        let cli = Cli::try_parse_from(["savor", "comment", "p1", "great broth"]).unwrap();
        match cli.command {
            Command::Comment(args) => {
                assert_eq!(args.post_id, "p1");
                assert_eq!(args.content, "great broth");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
