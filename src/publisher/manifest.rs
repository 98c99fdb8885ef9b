//! Inputs from the data pipeline.
//!
//! The melt-map pipeline writes a small JSON manifest next to the day's
//! plots. It answers both questions the publisher asks: which date and images
//! are new, and what the post should say.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::error::{PublishError, Result};
use crate::ledger::CoveredDate;

/// The newest processed day and its images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUpdate {
    pub covered_date: CoveredDate,
    pub image_paths: Vec<PathBuf>,
}

/// Body text and one alt text per image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    pub body: String,
    pub alt_texts: Vec<String>,
}

/// Supplies the latest update to publish.
pub trait UpdateProducer: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if no update is available.
    fn latest_update(&self) -> Result<DailyUpdate>;
}

/// Writes the post for a covered date.
pub trait TextProducer: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if no text can be produced for `covered_date`.
    fn compose(&self, covered_date: CoveredDate) -> Result<PostContent>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestImage {
    pub path: PathBuf,
    #[serde(default)]
    pub alt_text: String,
}

/// `update.json` as written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub covered_date: CoveredDate,
    pub text: String,
    #[serde(default)]
    pub images: Vec<ManifestImage>,
}

impl Manifest {
    /// Read a manifest. Relative image paths resolve against the manifest's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Manifest`] if the file
    /// is unreadable or not a valid manifest.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut manifest: Self =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for image in &mut manifest.images {
            if image.path.is_relative() {
                image.path = base.join(&image.path);
            }
        }
        debug!(
            path = %path.display(),
            date = %manifest.covered_date,
            images = manifest.images.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }
}

impl UpdateProducer for Manifest {
    fn latest_update(&self) -> Result<DailyUpdate> {
        Ok(DailyUpdate {
            covered_date: self.covered_date,
            image_paths: self.images.iter().map(|i| i.path.clone()).collect(),
        })
    }
}

impl TextProducer for Manifest {
    fn compose(&self, covered_date: CoveredDate) -> Result<PostContent> {
        if covered_date != self.covered_date {
            return Err(PublishError::Config(ConfigError::InvalidValue {
                name: "covered_date".to_string(),
                message: format!(
                    "manifest has text for {}, not {covered_date}",
                    self.covered_date
                ),
            }));
        }
        Ok(PostContent {
            body: self.text.clone(),
            alt_texts: self.images.iter().map(|i| i.alt_text.clone()).collect(),
        })
    }
}
