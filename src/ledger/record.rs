use serde::{Deserialize, Serialize};

use super::date::CoveredDate;
use crate::constants::MAX_IMAGES;

/// One image slot of a post. Both halves are optional so that a ledger row
/// with a gap (say, an alt text recorded without its image) survives a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSlot {
    /// Where the image lives: a CDN URL for remote posts, a local path for
    /// posts recorded straight after submission.
    pub reference: Option<String>,
    pub alt_text: Option<String>,
}

impl ImageSlot {
    #[must_use]
    pub fn new(reference: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            alt_text: Some(alt_text.into()).filter(|s: &String| !s.is_empty()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reference.is_none() && self.alt_text.is_none()
    }

    fn normalize(&mut self) {
        blank_to_none(&mut self.reference);
        blank_to_none(&mut self.alt_text);
    }
}

/// A blank cell reads back as `None`, so blank values are held as `None`.
fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

/// A single post in a platform thread, as recorded in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: String,
    /// Immediate parent. `None` only for the thread root.
    pub reply_to_id: Option<String>,
    pub covered_date: Option<CoveredDate>,
    /// Creation time exactly as the platform reported it. A blank timestamp
    /// marks the row as incomplete, so the next reconciliation refreshes it.
    pub timestamp: Option<String>,
    pub text: String,
    pub images: [ImageSlot; MAX_IMAGES],
    /// Operator annotation; never published.
    pub comment: Option<String>,
}

impl PostRecord {
    #[must_use]
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.reply_to_id.is_none()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.timestamp.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Replace blank optional fields with `None`, the form they take after a
    /// write and reload.
    pub fn normalize(&mut self) {
        blank_to_none(&mut self.reply_to_id);
        blank_to_none(&mut self.timestamp);
        blank_to_none(&mut self.comment);
        for slot in &mut self.images {
            slot.normalize();
        }
    }

    /// Number of filled image slots.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.iter().filter(|slot| slot.reference.is_some()).count()
    }
}
