//! Errors surfaced by engagement operations: toggles, review actions and
//! moderation alike.

use crate::{api::ApiError, domain::DomainError, toggle::LIMIT_REACHED_MESSAGE};

/// Local rejections (`Busy`, `LimitReached`, `Domain`) are raised before any
/// request is sent. `Remote` means the request was sent and failed.
#[derive(Debug)]
pub enum EngagementError {
    Busy,
    LimitReached { limit: usize },
    Domain(DomainError),
    Remote(ApiError),
}

impl std::fmt::Display for EngagementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "a request for this control is still pending"),
            Self::LimitReached { limit } => write!(f, "{LIMIT_REACHED_MESSAGE} (max {limit})"),
            Self::Domain(e) => write!(f, "{e}"),
            Self::Remote(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngagementError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Domain(e) => Some(e),
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for EngagementError {
    fn from(value: ApiError) -> Self {
        Self::Remote(value)
    }
}

impl From<DomainError> for EngagementError {
    fn from(value: DomainError) -> Self {
        Self::Domain(value)
    }
}

impl EngagementError {
    /// Whether the request reached the API.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_remote_failures_are_remote() {
        assert!(EngagementError::Remote(ApiError::MissingData).is_remote());
        assert!(!EngagementError::Busy.is_remote());
        assert!(!EngagementError::Domain(DomainError::EmptyReason).is_remote());
        let limit = EngagementError::LimitReached { limit: 4 };
        assert!(!limit.is_remote());
        assert!(limit.to_string().starts_with("Limit reached"));
    }
}
