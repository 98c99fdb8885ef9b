//! Daily update publisher.
//!
//! Runs each configured platform in turn: sync the ledger with the remote
//! thread, reply to the tip, record the new post. A failure on one platform
//! is recorded as that platform's outcome and the next one still runs.

mod manifest;

use tracing::{error, info, warn};

pub use manifest::{DailyUpdate, Manifest, ManifestImage, PostContent, TextProducer, UpdateProducer};

use crate::config::{Config, ConfigError, PlatformSettings};
use crate::constants::MAX_IMAGES;
use crate::error::{PublishError, Result};
use crate::ledger::{CoveredDate, LedgerStore, PostRecord, ThreadLedger};
use crate::platforms::{
    build_adapter, ImageAttachment, PlatformAdapter, PlatformKind, RemoteImage, RemotePost,
    ReplyTarget, SessionState,
};
use crate::reconcile::{reconcile, resolve_tip, tag_tail};

/// Result of publishing on one platform.
#[derive(Debug)]
pub struct PlatformOutcome {
    pub platform: PlatformKind,
    pub result: Result<Published>,
}

impl PlatformOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Tip of the thread after a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub tip: String,
    /// False when the date was already covered and nothing was posted.
    pub created: bool,
}

/// One platform's adapter, ledger file and text suffix.
pub struct PlatformSession {
    kind: PlatformKind,
    adapter: Box<dyn PlatformAdapter>,
    store: LedgerStore,
    text_addition: String,
}

impl PlatformSession {
    #[must_use]
    pub fn new(
        kind: PlatformKind,
        adapter: Box<dyn PlatformAdapter>,
        store: LedgerStore,
        text_addition: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            adapter,
            store,
            text_addition: text_addition.into(),
        }
    }

    /// Build the session for a configured platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform's credentials cannot be loaded.
    pub fn from_settings(settings: &PlatformSettings) -> Result<Self> {
        Ok(Self::new(
            settings.kind,
            build_adapter(settings)?,
            settings.ledger_store(),
            settings.text_addition.clone(),
        ))
    }

    #[must_use]
    pub fn kind(&self) -> PlatformKind {
        self.kind
    }

    #[must_use]
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    async fn ensure_logged_in(&mut self) -> Result<()> {
        if self.adapter.state() == SessionState::Unauthenticated {
            self.adapter.login().await?;
        }
        Ok(())
    }

    /// Merge the remote thread into `ledger`, writing it back if anything
    /// changed.
    async fn sync_remote(&mut self, ledger: &mut ThreadLedger) -> Result<()> {
        let root_id = ledger
            .first()
            .map(|record| record.post_id.clone())
            .ok_or_else(|| {
                PublishError::LedgerInvariantViolation(format!(
                    "{} has no records; seed it with the thread root",
                    self.store.path().display()
                ))
            })?;

        self.ensure_logged_in().await?;
        let remote = self.adapter.fetch_thread(&root_id).await?;
        let report = reconcile(ledger, &remote, None, None)?;
        if report.changed() {
            self.store.persist(ledger).await?;
        }
        Ok(())
    }

    async fn publish(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        covered_date: CoveredDate,
    ) -> Result<Published> {
        let mut ledger = self.store.load().await?;
        if let Some(max) = ledger.max_covered_date() {
            if covered_date <= max {
                let tip = resolve_tip(&ledger)?;
                info!(
                    platform = %self.kind,
                    date = %covered_date,
                    latest = %max,
                    tip = %tip,
                    "Date already covered, not posting"
                );
                return Ok(Published { tip, created: false });
            }
        }

        let text = format!("{text}{}", self.text_addition);
        self.sync_remote(&mut ledger).await?;
        let tip = resolve_tip(&ledger)?;

        let post_id = self
            .adapter
            .create_post(&text, images, &ReplyTarget::ReplyTo(tip.clone()))
            .await?;

        // Recorded from what was submitted; the blank timestamp makes the next
        // sync refresh it from the platform.
        let submitted = RemotePost {
            post_id: post_id.clone(),
            reply_to_id: Some(tip),
            author: String::new(),
            timestamp: None,
            text,
            images: images
                .iter()
                .map(|image| RemoteImage {
                    url: image.path.display().to_string(),
                    alt_text: Some(image.alt_text.clone()),
                })
                .collect(),
        };
        reconcile(&mut ledger, &[submitted], Some(covered_date), None)?;
        self.store.persist(&ledger).await?;

        Ok(Published {
            tip: post_id,
            created: true,
        })
    }

    async fn sync(
        &mut self,
        covered_date: Option<CoveredDate>,
        comment: Option<&str>,
    ) -> Result<PostRecord> {
        let mut ledger = self.store.load().await?;
        self.sync_remote(&mut ledger).await?;
        let report = tag_tail(&mut ledger, covered_date, comment)?;
        if report.changed() {
            self.store.persist(&ledger).await?;
        }
        ledger.tail().cloned().ok_or_else(|| {
            PublishError::LedgerInvariantViolation("ledger is empty".to_string())
        })
    }
}

/// A configured platform. Sessions built from configuration wait until the
/// platform is first used, so a bad credentials file only fails its own
/// platform.
enum Slot {
    Ready(PlatformSession),
    Pending(PlatformSettings),
}

impl Slot {
    fn kind(&self) -> PlatformKind {
        match self {
            Self::Ready(session) => session.kind,
            Self::Pending(settings) => settings.kind,
        }
    }

    fn session(&mut self) -> Result<&mut PlatformSession> {
        match self {
            Self::Ready(session) => Ok(session),
            Self::Pending(settings) => {
                let session = PlatformSession::from_settings(settings)?;
                *self = Self::Ready(session);
                self.session()
            }
        }
    }
}

/// Publishes to every configured platform, in order.
pub struct Publisher {
    slots: Vec<Slot>,
}

impl Publisher {
    #[must_use]
    pub fn new(sessions: Vec<PlatformSession>) -> Self {
        Self {
            slots: sessions.into_iter().map(Slot::Ready).collect(),
        }
    }

    /// Set up every platform in the configuration. Credentials are read when
    /// a platform is first used.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform table is unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let slots = config
            .platform_settings()?
            .into_iter()
            .map(Slot::Pending)
            .collect();
        Ok(Self { slots })
    }

    /// Configured platforms, in publishing order.
    #[must_use]
    pub fn platforms(&self) -> Vec<PlatformKind> {
        self.slots.iter().map(Slot::kind).collect()
    }

    /// Post `text` with `images` as the update for `covered_date` on every
    /// platform. Never retries; re-running for the same date is a no-op on
    /// platforms that already have it.
    pub async fn publish(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        covered_date: CoveredDate,
    ) -> Vec<PlatformOutcome> {
        let mut outcomes = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            let platform = slot.kind();
            let result = match slot.session() {
                Ok(session) => session.publish(text, images, covered_date).await,
                Err(e) => Err(e),
            };
            match &result {
                Ok(published) if published.created => {
                    info!(platform = %platform, tip = %published.tip, date = %covered_date, "Posted update");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(platform = %platform, date = %covered_date, error = %e, "Publishing failed");
                }
            }
            outcomes.push(PlatformOutcome { platform, result });
        }
        outcomes
    }

    /// Ask the producers for the latest update and its text, then publish it.
    ///
    /// # Errors
    ///
    /// Returns an error if a producer fails or supplies more than four
    /// images. Platform failures are reported in the outcomes instead.
    pub async fn publish_update(
        &mut self,
        updates: &dyn UpdateProducer,
        texts: &dyn TextProducer,
    ) -> Result<Vec<PlatformOutcome>> {
        let update = updates.latest_update()?;
        if update.image_paths.len() > MAX_IMAGES {
            return Err(PublishError::TooManyImages {
                count: update.image_paths.len(),
                max: MAX_IMAGES,
            });
        }
        let content = texts.compose(update.covered_date)?;
        if content.alt_texts.len() != update.image_paths.len() {
            warn!(
                images = update.image_paths.len(),
                alt_texts = content.alt_texts.len(),
                "Alt text count does not match image count"
            );
        }

        let images: Vec<ImageAttachment> = update
            .image_paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                ImageAttachment::new(path.clone(), content.alt_texts.get(i).cloned().unwrap_or_default())
            })
            .collect();

        Ok(self
            .publish(&content.body, &images, update.covered_date)
            .await)
    }

    /// Bring one platform's ledger up to date with its remote thread, then
    /// optionally tag the tail with a covered date and comment. Returns the
    /// tail record.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform is not configured or its credentials
    /// are unusable, or if logging in, fetching, reconciling or writing the
    /// ledger fails. Other platforms are not touched.
    pub async fn sync(
        &mut self,
        platform: PlatformKind,
        covered_date: Option<CoveredDate>,
        comment: Option<&str>,
    ) -> Result<PostRecord> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.kind() == platform)
            .ok_or_else(|| {
                PublishError::Config(ConfigError::InvalidValue {
                    name: "platform".to_string(),
                    message: format!("{platform} is not configured"),
                })
            })?;
        let tail = slot.session()?.sync(covered_date, comment).await?;
        info!(
            platform = %platform,
            tip = %tail.post_id,
            date = ?tail.covered_date.map(|d| d.to_string()),
            "Ledger synced"
        );
        Ok(tail)
    }
}
