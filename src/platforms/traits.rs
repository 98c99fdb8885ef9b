use std::path::PathBuf;

use async_trait::async_trait;

use crate::constants::MAX_IMAGES;
use crate::error::{PublishError, Result};
use crate::ledger::{ImageSlot, PostRecord};

/// A post as seen on the remote platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemotePost {
    pub post_id: String,
    pub reply_to_id: Option<String>,
    /// Handle or username of the author.
    pub author: String,
    pub timestamp: Option<String>,
    pub text: String,
    pub images: Vec<RemoteImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub url: String,
    pub alt_text: Option<String>,
}

impl RemotePost {
    /// Copy the remote fields into a fresh ledger record. Covered date and
    /// comment are ledger-only and stay empty.
    #[must_use]
    pub fn to_record(&self) -> PostRecord {
        let mut record = PostRecord::new(self.post_id.clone());
        self.apply_to(&mut record);
        record
    }

    /// Overwrite every field the remote side knows about.
    pub fn apply_to(&self, record: &mut PostRecord) {
        record.reply_to_id.clone_from(&self.reply_to_id);
        record.timestamp.clone_from(&self.timestamp);
        record.text = self.text.clone();
        record.images = Default::default();
        for (slot, image) in record.images.iter_mut().zip(&self.images) {
            *slot = ImageSlot {
                reference: Some(image.url.clone()),
                alt_text: image.alt_text.clone(),
            };
        }
        record.normalize();
    }
}

/// An image to attach to a new post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub path: PathBuf,
    pub alt_text: String,
}

impl ImageAttachment {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, alt_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alt_text: alt_text.into(),
        }
    }
}

/// Where a new post attaches to the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Start a new thread.
    Root,
    /// Reply to the given post.
    ReplyTo(String),
}

/// Lifecycle of an adapter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// Logged in, with the thread walk cached.
    ThreadCached,
}

/// Per-platform content limits, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostLimits {
    pub post_limit: usize,
    pub alt_text_limit: usize,
}

impl PostLimits {
    /// Reject content the platform would refuse.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ContentTooLong`] for over-long text or alt text
    /// and [`PublishError::TooManyImages`] for more than four images.
    pub fn check(&self, platform: &str, text: &str, images: &[ImageAttachment]) -> Result<()> {
        if images.len() > MAX_IMAGES {
            return Err(PublishError::TooManyImages {
                count: images.len(),
                max: MAX_IMAGES,
            });
        }

        let length = text.chars().count();
        if length > self.post_limit {
            return Err(PublishError::ContentTooLong {
                platform: platform.to_string(),
                field: "post text".to_string(),
                length,
                limit: self.post_limit,
            });
        }

        for (i, image) in images.iter().enumerate() {
            let length = image.alt_text.chars().count();
            if length > self.alt_text_limit {
                return Err(PublishError::ContentTooLong {
                    platform: platform.to_string(),
                    field: format!("alt text of image {}", i + 1),
                    length,
                    limit: self.alt_text_limit,
                });
            }
        }

        Ok(())
    }
}

/// A social platform that hosts one self-reply thread.
#[async_trait]
pub trait PlatformAdapter: Send {
    /// Short platform name used in logs and reports.
    fn platform(&self) -> &str;

    fn state(&self) -> SessionState;

    /// Authenticate once with the stored credentials. Not retried.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::AuthenticationFailure`] if the platform rejects
    /// the credentials.
    async fn login(&mut self) -> Result<()>;

    /// Walk the self-authored reply chain starting at `root_id`.
    ///
    /// The first call in a session hits the platform; later calls return the
    /// cached walk.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::RemoteUnavailable`] on transport or API errors.
    async fn fetch_thread(&mut self, root_id: &str) -> Result<Vec<RemotePost>>;

    /// Look up a single post.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::RemoteUnavailable`] on transport or API errors,
    /// or [`PublishError::MalformedRemotePost`] if it cannot be decoded.
    async fn get_post(&self, post_id: &str) -> Result<RemotePost>;

    /// Publish a post and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ContentTooLong`] before contacting the platform
    /// if the content is over the configured limits.
    async fn create_post(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        reply_target: &ReplyTarget,
    ) -> Result<String>;
}
