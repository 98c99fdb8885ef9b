//! Social platform adapters.
//!
//! Each adapter hides one platform's reply-tree and posting API behind
//! [`PlatformAdapter`]. Adapters are picked from configuration at startup.

mod bluesky;
mod mastodon;
mod thread;
mod traits;

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use bluesky::BlueskyAdapter;
pub use mastodon::MastodonAdapter;
pub use thread::{linear_path, pick_continuation};
pub use traits::{
    ImageAttachment, PlatformAdapter, PostLimits, RemoteImage, RemotePost, ReplyTarget,
    SessionState,
};

use crate::config::{ConfigError, PlatformSettings};
use crate::constants::USER_AGENT;
use crate::credentials::{BlueskyCredentials, CredentialTable, MastodonCredentials};
use crate::error::{PublishError, Result};

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    Bluesky,
    Mastodon,
}

impl PlatformKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bluesky => "bluesky",
            Self::Mastodon => "mastodon",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bluesky" | "atproto" | "bsky" => Ok(Self::Bluesky),
            "mastodon" => Ok(Self::Mastodon),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Build the adapter for a platform, reading its credentials file.
///
/// # Errors
///
/// Returns [`PublishError::Config`] if the credentials are missing or
/// incomplete.
pub fn build_adapter(settings: &PlatformSettings) -> Result<Box<dyn PlatformAdapter>> {
    let table = CredentialTable::from_path(&settings.credentials_path)?;
    let adapter: Box<dyn PlatformAdapter> = match settings.kind {
        PlatformKind::Bluesky => Box::new(BlueskyAdapter::new(
            BlueskyCredentials::from_table(&table)?,
            &settings.username,
            settings.limits,
        )?),
        PlatformKind::Mastodon => Box::new(MastodonAdapter::new(
            MastodonCredentials::from_table(&table)?,
            settings.limits,
        )?),
    };
    debug!(platform = %settings.kind, "Adapter ready");
    Ok(adapter)
}

/// HTTP client shared by the adapters. No request timeout is set; the
/// transport defaults apply.
fn http_client(platform: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PublishError::remote(platform, format!("failed to build HTTP client: {e}")))
}

/// Statuses that mean the credentials were refused.
const AUTH_STATUSES: &[StatusCode] = &[StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN];

/// Send a request and decode a JSON response.
///
/// 401/403 map to [`PublishError::AuthenticationFailure`]; any other failure
/// is [`PublishError::RemoteUnavailable`].
async fn send_json<T: DeserializeOwned>(
    platform: &str,
    what: &str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    send_json_with(platform, what, request, AUTH_STATUSES).await
}

/// [`send_json`], with the caller choosing which statuses are authentication
/// failures.
async fn send_json_with<T: DeserializeOwned>(
    platform: &str,
    what: &str,
    request: reqwest::RequestBuilder,
    auth_statuses: &[StatusCode],
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| PublishError::remote(platform, format!("{what}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        let message = format!("{what}: {status} - {body}");
        return Err(if auth_statuses.contains(&status) {
            PublishError::auth(platform, message)
        } else {
            PublishError::remote(platform, message)
        });
    }

    response
        .json()
        .await
        .map_err(|e| PublishError::remote(platform, format!("{what}: invalid response: {e}")))
}

/// MIME type for an image upload, from its file extension.
fn image_mime(path: &std::path::Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

async fn read_image(image: &ImageAttachment) -> Result<Vec<u8>> {
    tokio::fs::read(&image.path)
        .await
        .map_err(|e| PublishError::ImageUnreadable {
            path: image.path.clone(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind_round_trip() {
        for kind in [PlatformKind::Bluesky, PlatformKind::Mastodon] {
            assert_eq!(kind.as_str().parse::<PlatformKind>().unwrap(), kind);
        }
        assert_eq!("ATProto".parse::<PlatformKind>().unwrap(), PlatformKind::Bluesky);
        assert!("threads".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_image_mime() {
        assert_eq!(image_mime(std::path::Path::new("plot.png")), "image/png");
        assert_eq!(image_mime(std::path::Path::new("map.JPG")), "image/jpeg");
        assert_eq!(
            image_mime(std::path::Path::new("unknown")),
            "application/octet-stream"
        );
    }
}
