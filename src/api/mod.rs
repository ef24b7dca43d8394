use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    domain::{CatalogKind, VoteState},
    id::{IdRef, new_request_id},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug)]
pub enum ApiError {
    Transport(reqwest::Error),
    Status { status: u16, message: String },
    Decode(String),
    MissingData,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Status { status, message } => write!(f, "server returned {status}: {message}"),
            Self::Decode(e) => write!(f, "malformed response: {e}"),
            Self::MissingData => write!(f, "malformed response: missing data"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One call against the REST API, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }

    pub fn patch(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            body,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }

    pub fn vote_post(post_id: &str, value: VoteState) -> Self {
        Self::post(
            format!("/posts/vote/{post_id}"),
            Some(json!({ "value": value.value() })),
        )
    }

    pub fn vote_comment(comment_id: &str, value: VoteState) -> Self {
        Self::post(
            format!("/comments/vote/{comment_id}"),
            Some(json!({ "value": value.value() })),
        )
    }

    pub fn add_comment(post_id: &str, content: &str) -> Self {
        Self::post(
            format!("/comments/{post_id}"),
            Some(json!({ "content": content })),
        )
    }

    pub fn follow(user_id: &str) -> Self {
        Self::post(format!("/users/follow/{user_id}"), None)
    }

    pub fn unfollow(user_id: &str) -> Self {
        Self::post(format!("/users/unfollow/{user_id}"), None)
    }

    pub fn toggle_save(post_id: &str) -> Self {
        Self::post(format!("/posts/save/{post_id}"), None)
    }

    pub fn toggle_favorite(kind: CatalogKind, id: &str) -> Self {
        Self::post(
            format!("/users/favorites/{}/{id}", kind.collection()),
            None,
        )
    }

    pub fn reviews(kind: CatalogKind, parent_id: &str) -> Self {
        Self::get(format!("/{}/{parent_id}/reviews", kind.collection()))
    }

    pub fn like_review(kind: CatalogKind, review_id: &str) -> Self {
        Self::post(
            format!("/{}/reviews/{review_id}/like", kind.collection()),
            None,
        )
    }

    pub fn flag_review(kind: CatalogKind, review_id: &str, reason: &str) -> Self {
        Self::post(
            format!("/{}/reviews/{review_id}/flag", kind.collection()),
            Some(json!({ "reason": reason })),
        )
    }
}

/// Every response body is wrapped as `{ "data": ... }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    pub fn into_data(self) -> Result<Value, ApiError> {
        match self.data {
            Some(Value::Null) | None => Err(ApiError::MissingData),
            Some(v) => Ok(v),
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        decode(self.into_data()?)
    }
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub value: VoteState,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FavoritesOutcome {
    pub favorites: Vec<IdRef>,
}

/// Transport seam between the engagement controllers and the REST API.
pub trait Backend: Send + Sync {
    fn send(&self, req: ApiRequest) -> impl Future<Output = Result<Envelope, ApiError>> + Send;
}

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::version::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base: base.into(),
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Backend for ApiClient {
    async fn send(&self, req: ApiRequest) -> Result<Envelope, ApiError> {
        let request_id = new_request_id();
        let mut builder = self
            .client
            .request(req.method.as_reqwest(), self.url(&req.path))
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        debug!(method = ?req.method, path = %req.path, request_id = %request_id, "api request");
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Envelope::default());
        }
        serde_json::from_slice::<Envelope>(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_paths_follow_the_api_layout() {
        assert_eq!(
            ApiRequest::vote_post("p1", VoteState::Down),
            ApiRequest {
                method: Method::Post,
                path: "/posts/vote/p1".to_string(),
                body: Some(json!({ "value": -1 })),
            }
        );
        assert_eq!(
            ApiRequest::toggle_favorite(CatalogKind::Food, "f1").path,
            "/users/favorites/foods/f1"
        );
        assert_eq!(
            ApiRequest::flag_review(CatalogKind::Restaurant, "rv1", "spam").body,
            Some(json!({ "reason": "spam" }))
        );
        assert_eq!(ApiRequest::toggle_save("p1").body, None);
        assert_eq!(
            ApiRequest::add_comment("p1", "great broth"),
            ApiRequest {
                method: Method::Post,
                path: "/comments/p1".to_string(),
                body: Some(json!({ "content": "great broth" })),
            }
        );
        assert_eq!(
            ApiRequest::reviews(CatalogKind::Restaurant, "r1").path,
            "/restaurants/r1/reviews"
        );
    }

    #[test]
    fn envelope_without_data_is_malformed() {
        let env: Envelope = serde_json::from_value(json!({ "message": "ok" })).unwrap();
        assert!(matches!(env.into_data(), Err(ApiError::MissingData)));

        let env: Envelope = serde_json::from_value(json!({ "data": null })).unwrap();
        assert!(matches!(env.into_data(), Err(ApiError::MissingData)));
    }

    #[test]
    fn decodes_vote_outcome() {
        let env: Envelope =
            serde_json::from_value(json!({ "data": { "value": 1, "score": 7 } })).unwrap();
        let outcome: VoteOutcome = env.decode().unwrap();
        assert_eq!(
            outcome,
            VoteOutcome {
                value: VoteState::Up,
                score: 7
            }
        );
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(error_message(r#"{"message":"Not authorized"}"#), "Not authorized");
        assert_eq!(error_message(r#"{"error":"nope"}"#), "nope");
        assert_eq!(error_message(" bad gateway \n"), "bad gateway");
    }

    #[test]
    fn url_joins_without_double_slashes() {
        let client =
            ApiClient::new("http://localhost:5000/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/posts/1"), "http://localhost:5000/api/posts/1");
        assert_eq!(client.url("posts"), "http://localhost:5000/api/posts");
    }
}
