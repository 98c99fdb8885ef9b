use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while maintaining or extending a platform thread.
///
/// Everything except [`PublishError::MalformedRemotePost`] ends the run for the
/// platform that raised it; the publisher records it as that platform's result.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed on {platform}: {message}")]
    AuthenticationFailure { platform: String, message: String },

    #[error("{field} is {length} characters, over the {platform} limit of {limit}")]
    ContentTooLong {
        platform: String,
        field: String,
        length: usize,
        limit: usize,
    },

    #[error("{count} images supplied, at most {max} are allowed")]
    TooManyImages { count: usize, max: usize },

    #[error("cannot read image {path}: {message}")]
    ImageUnreadable { path: PathBuf, message: String },

    #[error("{platform} request failed: {message}")]
    RemoteUnavailable { platform: String, message: String },

    #[error("ledger invariant violated: {0}")]
    LedgerInvariantViolation(String),

    #[error("could not decode remote post {post_id}: {message}")]
    MalformedRemotePost { post_id: String, message: String },

    #[error("ledger file {path}: {message}")]
    Ledger { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid covered date '{0}': expected YYYY.MM.DD")]
    InvalidDate(String),
}

impl PublishError {
    pub(crate) fn remote(platform: &str, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn auth(platform: &str, message: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            platform: platform.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn ledger(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Ledger {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = PublishError> = std::result::Result<T, E>;
