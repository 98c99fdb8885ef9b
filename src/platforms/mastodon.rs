use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::thread::linear_path;
use super::traits::{
    ImageAttachment, PlatformAdapter, PostLimits, RemoteImage, RemotePost, ReplyTarget,
    SessionState,
};
use super::{http_client, image_mime, read_image, send_json};
use crate::credentials::MastodonCredentials;
use crate::error::{PublishError, Result};

const PLATFORM: &str = "mastodon";
const DEFAULT_VISIBILITY: &str = "public";

#[derive(Debug, Clone, Deserialize)]
struct Account {
    id: String,
    username: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MediaAttachment {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Status {
    id: String,
    #[serde(default)]
    in_reply_to_id: Option<String>,
    created_at: String,
    #[serde(default)]
    content: String,
    #[serde(default = "default_visibility")]
    visibility: String,
    account: Account,
    #[serde(default)]
    media_attachments: Vec<MediaAttachment>,
}

fn default_visibility() -> String {
    DEFAULT_VISIBILITY.to_string()
}

impl Status {
    fn to_remote(&self) -> RemotePost {
        RemotePost {
            post_id: self.id.clone(),
            reply_to_id: self.in_reply_to_id.clone(),
            author: self.account.username.clone(),
            timestamp: Some(self.created_at.clone()),
            text: self.content.clone(),
            images: self
                .media_attachments
                .iter()
                .filter_map(|m| {
                    Some(RemoteImage {
                        url: m.url.clone()?,
                        alt_text: m.description.clone(),
                    })
                })
                .collect(),
        }
    }
}

/// Response from `GET /api/v1/statuses/:id/context`. Descendants stay raw so
/// one undecodable status is skipped rather than failing the walk.
#[derive(Debug, Deserialize)]
struct Context {
    #[serde(default)]
    descendants: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: String,
}

/// Mastodon adapter.
pub struct MastodonAdapter {
    client: reqwest::Client,
    credentials: MastodonCredentials,
    limits: PostLimits,
    account: Option<Account>,
    thread_cache: Option<Vec<Status>>,
}

impl MastodonAdapter {
    /// Create an unauthenticated adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: MastodonCredentials, limits: PostLimits) -> Result<Self> {
        Ok(Self {
            client: http_client(PLATFORM)?,
            credentials,
            limits,
            account: None,
            thread_cache: None,
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{path}", self.credentials.api_base_url)
    }

    fn ensure_logged_in(&self) -> Result<()> {
        if self.account.is_none() {
            return Err(PublishError::auth(PLATFORM, "not logged in"));
        }
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<Status> {
        self.ensure_logged_in()?;
        let request = self
            .client
            .get(self.api(&format!("v1/statuses/{id}")))
            .bearer_auth(&self.credentials.access_token);
        let raw: Value = send_json(PLATFORM, "status", request).await?;
        serde_json::from_value(raw).map_err(|e| PublishError::MalformedRemotePost {
            post_id: id.to_string(),
            message: e.to_string(),
        })
    }

    async fn walk(&self, root_id: &str) -> Result<Vec<Status>> {
        let root = self.status(root_id).await?;
        let request = self
            .client
            .get(self.api(&format!("v1/statuses/{root_id}/context")))
            .bearer_auth(&self.credentials.access_token);
        let context: Context = send_json(PLATFORM, "context", request).await?;

        let own: Vec<Status> = context
            .descendants
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Status>(raw) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(platform = PLATFORM, error = %e, "Skipping undecodable status");
                    None
                }
            })
            .filter(|s| s.account.id == root.account.id)
            .collect();

        let edges: Vec<(&str, &str)> = own
            .iter()
            .filter_map(|s| Some((s.id.as_str(), s.in_reply_to_id.as_deref()?)))
            .collect();
        let path = linear_path(&root.id, &edges);

        let mut statuses = vec![root.clone()];
        statuses.extend(
            path.iter()
                .skip(1)
                .filter_map(|id| own.iter().find(|s| s.id == *id).cloned()),
        );
        if own.len() + 1 > statuses.len() {
            debug!(
                platform = PLATFORM,
                dropped = own.len() + 1 - statuses.len(),
                "Own replies off the main thread were ignored"
            );
        }
        Ok(statuses)
    }

    /// Visibility of the post being replied to, so replies don't widen it.
    async fn parent_visibility(&self, post_id: &str) -> Result<String> {
        if let Some(status) = self
            .thread_cache
            .as_ref()
            .and_then(|statuses| statuses.iter().find(|s| s.id == post_id))
        {
            return Ok(status.visibility.clone());
        }
        Ok(self.status(post_id).await?.visibility)
    }

    async fn upload_media(&self, image: &ImageAttachment) -> Result<String> {
        let bytes = read_image(image).await?;
        let file_name = image
            .path
            .file_name()
            .map_or_else(|| "image".to_string(), |n| n.to_string_lossy().into_owned());
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&image_mime(&image.path))
            .map_err(|e| PublishError::remote(PLATFORM, format!("media part: {e}")))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("description", image.alt_text.clone());

        let request = self
            .client
            .post(self.api("v2/media"))
            .bearer_auth(&self.credentials.access_token)
            .multipart(form);
        let media: MediaResponse = send_json(PLATFORM, "media", request).await?;
        debug!(platform = PLATFORM, media_id = %media.id, path = %image.path.display(), "Uploaded image");
        Ok(media.id)
    }
}

#[async_trait]
impl PlatformAdapter for MastodonAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn state(&self) -> SessionState {
        match (&self.account, &self.thread_cache) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::Authenticated,
            (Some(_), Some(_)) => SessionState::ThreadCached,
        }
    }

    async fn login(&mut self) -> Result<()> {
        let request = self
            .client
            .get(self.api("v1/accounts/verify_credentials"))
            .bearer_auth(&self.credentials.access_token);
        let account: Account = send_json(PLATFORM, "verify_credentials", request).await?;
        info!(
            platform = PLATFORM,
            username = %account.username,
            client_id = %self.credentials.client_id,
            "Logged in"
        );
        self.account = Some(account);
        Ok(())
    }

    async fn fetch_thread(&mut self, root_id: &str) -> Result<Vec<RemotePost>> {
        self.ensure_logged_in()?;

        let cached = self
            .thread_cache
            .as_ref()
            .is_some_and(|statuses| statuses.first().is_some_and(|s| s.id == root_id));
        if !cached {
            let statuses = self.walk(root_id).await?;
            info!(platform = PLATFORM, posts = statuses.len(), "Walked thread");
            self.thread_cache = Some(statuses);
        }

        Ok(self
            .thread_cache
            .as_ref()
            .map(|statuses| statuses.iter().map(Status::to_remote).collect())
            .unwrap_or_default())
    }

    async fn get_post(&self, post_id: &str) -> Result<RemotePost> {
        Ok(self.status(post_id).await?.to_remote())
    }

    async fn create_post(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        reply_target: &ReplyTarget,
    ) -> Result<String> {
        self.limits.check(PLATFORM, text, images)?;
        self.ensure_logged_in()?;

        let (in_reply_to_id, visibility) = match reply_target {
            ReplyTarget::Root => (None, DEFAULT_VISIBILITY.to_string()),
            ReplyTarget::ReplyTo(id) => (Some(id.clone()), self.parent_visibility(id).await?),
        };

        let mut media_ids = Vec::with_capacity(images.len());
        for image in images {
            media_ids.push(self.upload_media(image).await?);
        }

        let mut body = json!({
            "status": text,
            "visibility": visibility,
        });
        if let Some(parent) = &in_reply_to_id {
            body["in_reply_to_id"] = json!(parent);
        }
        if !media_ids.is_empty() {
            body["media_ids"] = json!(media_ids);
        }

        let request = self
            .client
            .post(self.api("v1/statuses"))
            .bearer_auth(&self.credentials.access_token)
            .json(&body);
        let created: Status = send_json(PLATFORM, "post status", request).await?;

        info!(
            platform = PLATFORM,
            id = %created.id,
            reply_to = ?in_reply_to_id,
            images = images.len(),
            "Created post"
        );
        self.thread_cache = None;
        Ok(created.id)
    }
}
