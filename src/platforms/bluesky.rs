use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::thread::pick_continuation;
use super::traits::{
    ImageAttachment, PlatformAdapter, PostLimits, RemoteImage, RemotePost, ReplyTarget,
    SessionState,
};
use super::{http_client, image_mime, read_image, send_json, send_json_with};
use crate::credentials::BlueskyCredentials;
use crate::error::{PublishError, Result};

const PLATFORM: &str = "bluesky";
const POST_COLLECTION: &str = "app.bsky.feed.post";
const LOGIN_AUTH_STATUSES: &[StatusCode] = &[
    StatusCode::BAD_REQUEST,
    StatusCode::UNAUTHORIZED,
    StatusCode::FORBIDDEN,
];

/// Response from `com.atproto.server.createSession`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug)]
struct Session {
    access_jwt: String,
    did: String,
    handle: String,
}

/// Response from `app.bsky.feed.getPostThread`.
#[derive(Debug, Deserialize)]
struct PostThreadResponse {
    thread: Value,
}

/// `app.bsky.feed.defs#threadViewPost`. Replies stay raw so a single
/// not-found or blocked entry doesn't spoil the rest.
#[derive(Debug, Deserialize)]
struct ThreadViewPost {
    post: PostView,
    #[serde(default)]
    replies: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    cid: String,
    author: Author,
    record: Value,
    #[serde(default)]
    embed: Option<Value>,
    #[serde(default)]
    reply_count: u64,
}

#[derive(Debug, Deserialize)]
struct Author {
    handle: String,
}

/// The `app.bsky.feed.post` record inside a post view.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedPost {
    #[serde(default)]
    text: String,
    created_at: String,
    #[serde(default)]
    reply: Option<ReplyRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StrongRef {
    uri: String,
    cid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReplyRef {
    root: StrongRef,
    parent: StrongRef,
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
    #[allow(dead_code)]
    cid: String,
}

/// A decoded post plus the references needed to reply to it.
#[derive(Debug, Clone)]
struct ThreadNode {
    post: RemotePost,
    reference: StrongRef,
    /// Root of the thread this post belongs to; `None` if it is a root.
    thread_root: Option<StrongRef>,
    reply_count: u64,
}

impl ThreadNode {
    fn decode(view: PostView) -> Result<Self> {
        let record: FeedPost =
            serde_json::from_value(view.record).map_err(|e| PublishError::MalformedRemotePost {
                post_id: view.uri.clone(),
                message: e.to_string(),
            })?;

        let images = view
            .embed
            .as_ref()
            .map(embedded_images)
            .unwrap_or_default();

        Ok(Self {
            post: RemotePost {
                post_id: view.uri.clone(),
                reply_to_id: record.reply.as_ref().map(|r| r.parent.uri.clone()),
                author: view.author.handle,
                timestamp: Some(record.created_at),
                text: record.text,
                images,
            },
            reference: StrongRef {
                uri: view.uri,
                cid: view.cid,
            },
            thread_root: record.reply.map(|r| r.root),
            reply_count: view.reply_count,
        })
    }

    /// Reply reference for a new post answering this one. The root is carried
    /// over from this post's own reply, or is this post when it starts the
    /// thread.
    fn reply_ref(&self) -> ReplyRef {
        ReplyRef {
            root: self
                .thread_root
                .clone()
                .unwrap_or_else(|| self.reference.clone()),
            parent: self.reference.clone(),
        }
    }
}

/// Images from an `app.bsky.embed.images#view`, including the media half of a
/// record-with-media embed.
fn embedded_images(embed: &Value) -> Vec<RemoteImage> {
    let images = match embed.get("$type").and_then(Value::as_str) {
        Some("app.bsky.embed.images#view") => embed.get("images"),
        Some("app.bsky.embed.recordWithMedia#view") => {
            embed.get("media").and_then(|m| m.get("images"))
        }
        _ => None,
    };
    images
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|img| {
                    Some(RemoteImage {
                        url: img.get("fullsize")?.as_str()?.to_string(),
                        alt_text: img.get("alt").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Bluesky (AT Protocol) adapter.
pub struct BlueskyAdapter {
    client: reqwest::Client,
    credentials: BlueskyCredentials,
    /// Handle whose replies make up the thread.
    owner: String,
    limits: PostLimits,
    session: Option<Session>,
    thread_cache: Option<Vec<ThreadNode>>,
}

impl BlueskyAdapter {
    /// Create an unauthenticated adapter. `owner` is the handle whose replies
    /// are followed; an empty owner falls back to the login handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(credentials: BlueskyCredentials, owner: &str, limits: PostLimits) -> Result<Self> {
        Ok(Self {
            client: http_client(PLATFORM)?,
            owner: owner.trim().to_string(),
            credentials,
            limits,
            session: None,
            thread_cache: None,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.credentials.service)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| PublishError::auth(PLATFORM, "not logged in"))
    }

    /// Fetch one post with its direct replies.
    async fn thread_node(&self, uri: &str, depth: u8) -> Result<(ThreadNode, Vec<Value>)> {
        let session = self.session()?;
        let depth = depth.to_string();
        let request = self
            .client
            .get(self.xrpc("app.bsky.feed.getPostThread"))
            .bearer_auth(&session.access_jwt)
            .query(&[
                ("uri", uri),
                ("depth", depth.as_str()),
                ("parentHeight", "0"),
            ]);
        let response: PostThreadResponse = send_json(PLATFORM, "getPostThread", request).await?;

        let view: ThreadViewPost =
            serde_json::from_value(response.thread).map_err(|e| PublishError::MalformedRemotePost {
                post_id: uri.to_string(),
                message: format!("not a thread view: {e}"),
            })?;
        Ok((ThreadNode::decode(view.post)?, view.replies))
    }

    /// Decode the replies of a node, keeping the ones by the thread owner.
    fn own_replies(&self, replies: Vec<Value>) -> Vec<ThreadNode> {
        let owner = self.owner_handle();
        replies
            .into_iter()
            .filter_map(|raw| {
                let decoded = serde_json::from_value::<ThreadViewPost>(raw)
                    .map_err(|e| e.to_string())
                    .and_then(|view| ThreadNode::decode(view.post).map_err(|e| e.to_string()));
                match decoded {
                    Ok(node) => Some(node),
                    Err(e) => {
                        warn!(platform = PLATFORM, error = %e, "Skipping undecodable reply");
                        None
                    }
                }
            })
            .filter(|node| node.post.author == owner)
            .collect()
    }

    fn owner_handle(&self) -> String {
        if self.owner.is_empty() {
            self.session
                .as_ref()
                .map(|s| s.handle.clone())
                .unwrap_or_default()
        } else {
            self.owner.clone()
        }
    }

    async fn walk(&self, root_id: &str) -> Result<Vec<ThreadNode>> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let mut current = root_id.to_string();

        loop {
            let (node, replies) = self.thread_node(&current, 1).await?;
            seen.insert(node.post.post_id.clone());
            let candidates = self.own_replies(replies);
            nodes.push(node);

            let Some(next) = pick_continuation(&candidates, |n| n.reply_count) else {
                break;
            };
            if candidates.len() > 1 {
                warn!(
                    platform = PLATFORM,
                    post = %current,
                    branches = candidates.len(),
                    chosen = %next.post.post_id,
                    "Thread branches; following the reply with the most replies"
                );
            }
            if !seen.insert(next.post.post_id.clone()) {
                break;
            }
            current.clone_from(&next.post.post_id);
        }

        Ok(nodes)
    }

    /// A single post without its replies.
    async fn fetch_node(&self, post_id: &str) -> Result<ThreadNode> {
        Ok(self.thread_node(post_id, 0).await?.0)
    }

    /// The node to reply to: from the cached walk if present, else fetched.
    async fn lookup(&self, post_id: &str) -> Result<ThreadNode> {
        if let Some(node) = self
            .thread_cache
            .as_ref()
            .and_then(|nodes| nodes.iter().find(|n| n.post.post_id == post_id))
        {
            return Ok(node.clone());
        }
        debug!(platform = PLATFORM, post = %post_id, "Reply target not in cached walk");
        self.fetch_node(post_id).await
    }

    async fn upload_image(&self, image: &ImageAttachment) -> Result<Value> {
        let session = self.session()?;
        let bytes = read_image(image).await?;
        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, image_mime(&image.path))
            .body(bytes);
        let response: UploadBlobResponse = send_json(PLATFORM, "uploadBlob", request).await?;
        debug!(platform = PLATFORM, path = %image.path.display(), "Uploaded image");
        Ok(response.blob)
    }
}

#[async_trait]
impl PlatformAdapter for BlueskyAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn state(&self) -> SessionState {
        match (&self.session, &self.thread_cache) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::Authenticated,
            (Some(_), Some(_)) => SessionState::ThreadCached,
        }
    }

    async fn login(&mut self) -> Result<()> {
        let request = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.credentials.username,
                "password": self.credentials.app_password,
            }));

        // A bad app password comes back as 400 or 401.
        let response: SessionResponse =
            send_json_with(PLATFORM, "createSession", request, LOGIN_AUTH_STATUSES).await?;

        info!(platform = PLATFORM, handle = %response.handle, "Logged in");
        self.session = Some(Session {
            access_jwt: response.access_jwt,
            did: response.did,
            handle: response.handle,
        });
        Ok(())
    }

    async fn fetch_thread(&mut self, root_id: &str) -> Result<Vec<RemotePost>> {
        self.session()?;

        let cached = self
            .thread_cache
            .as_ref()
            .is_some_and(|nodes| nodes.first().is_some_and(|n| n.post.post_id == root_id));
        if !cached {
            let nodes = self.walk(root_id).await?;
            info!(platform = PLATFORM, posts = nodes.len(), "Walked thread");
            self.thread_cache = Some(nodes);
        }

        Ok(self
            .thread_cache
            .as_ref()
            .map(|nodes| nodes.iter().map(|n| n.post.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_post(&self, post_id: &str) -> Result<RemotePost> {
        Ok(self.fetch_node(post_id).await?.post)
    }

    async fn create_post(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        reply_target: &ReplyTarget,
    ) -> Result<String> {
        self.limits.check(PLATFORM, text, images)?;
        let did = self.session()?.did.clone();

        let reply = match reply_target {
            ReplyTarget::Root => None,
            ReplyTarget::ReplyTo(parent_id) => Some(self.lookup(parent_id).await?.reply_ref()),
        };

        let mut embedded = Vec::with_capacity(images.len());
        for image in images {
            let blob = self.upload_image(image).await?;
            embedded.push(json!({ "alt": image.alt_text, "image": blob }));
        }

        let mut record = json!({
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Some(reply) = &reply {
            record["reply"] = json!(reply);
        }
        if !embedded.is_empty() {
            record["embed"] = json!({
                "$type": "app.bsky.embed.images",
                "images": embedded,
            });
        }

        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&self.session()?.access_jwt)
            .json(&json!({
                "repo": did,
                "collection": POST_COLLECTION,
                "record": record,
            }));
        let created: CreateRecordResponse = send_json(PLATFORM, "createRecord", request).await?;

        info!(
            platform = PLATFORM,
            uri = %created.uri,
            reply_to = ?reply.as_ref().map(|r| &r.parent.uri),
            images = images.len(),
            "Created post"
        );
        self.thread_cache = None;
        Ok(created.uri)
    }
}
