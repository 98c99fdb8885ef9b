//! Flat CSV persistence for [`ThreadLedger`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use super::{CoveredDate, ImageSlot, PostRecord, ThreadLedger};
use crate::error::{PublishError, Result};

/// Column order of a ledger file. The first column is the index key.
pub const LEDGER_COLUMNS: [&str; 14] = [
    "post_id",
    "date_covered",
    "reply_to_id",
    "timestamp",
    "text",
    "img1",
    "img1_alt",
    "img2",
    "img2_alt",
    "img3",
    "img3_alt",
    "img4",
    "img4_alt",
    "comments",
];

/// One CSV row, field for field.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerRow {
    post_id: String,
    #[serde(default)]
    date_covered: Option<String>,
    #[serde(default)]
    reply_to_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    img1: Option<String>,
    #[serde(default)]
    img1_alt: Option<String>,
    #[serde(default)]
    img2: Option<String>,
    #[serde(default)]
    img2_alt: Option<String>,
    #[serde(default)]
    img3: Option<String>,
    #[serde(default)]
    img3_alt: Option<String>,
    #[serde(default)]
    img4: Option<String>,
    #[serde(default)]
    img4_alt: Option<String>,
    #[serde(default)]
    comments: Option<String>,
}

impl LedgerRow {
    fn from_record(record: &PostRecord) -> Self {
        let [s1, s2, s3, s4] = &record.images;
        Self {
            post_id: record.post_id.clone(),
            date_covered: record.covered_date.map(|d| d.to_string()),
            reply_to_id: record.reply_to_id.clone(),
            timestamp: record.timestamp.clone(),
            text: Some(escape(&record.text)),
            img1: s1.reference.clone(),
            img1_alt: s1.alt_text.as_deref().map(escape),
            img2: s2.reference.clone(),
            img2_alt: s2.alt_text.as_deref().map(escape),
            img3: s3.reference.clone(),
            img3_alt: s3.alt_text.as_deref().map(escape),
            img4: s4.reference.clone(),
            img4_alt: s4.alt_text.as_deref().map(escape),
            comments: record.comment.as_deref().map(escape),
        }
    }

    fn into_record(self, path: &Path) -> Result<PostRecord> {
        let post_id = self.post_id.trim().to_string();
        if post_id.is_empty() {
            return Err(PublishError::ledger(path, "row with a blank post_id"));
        }

        let covered_date = blank_to_none(self.date_covered)
            .map(|raw| raw.trim().parse::<CoveredDate>())
            .transpose()
            .map_err(|e| PublishError::ledger(path, format!("post {post_id}: {e}")))?;

        let slot = |reference: Option<String>, alt: Option<String>| ImageSlot {
            reference: blank_to_none(reference),
            alt_text: blank_to_none(alt).map(|a| unescape(&a)),
        };

        Ok(PostRecord {
            reply_to_id: blank_to_none(self.reply_to_id),
            covered_date,
            timestamp: blank_to_none(self.timestamp),
            text: self.text.as_deref().map(unescape).unwrap_or_default(),
            images: [
                slot(self.img1, self.img1_alt),
                slot(self.img2, self.img2_alt),
                slot(self.img3, self.img3_alt),
                slot(self.img4, self.img4_alt),
            ],
            comment: blank_to_none(self.comments).map(|c| unescape(&c)),
            post_id,
        })
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Flatten a multi-line string into a single CSV-safe line.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`]. Unknown escape sequences are kept verbatim.
#[must_use]
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Path of the copy kept aside before each overwrite: `posts.csv` becomes
/// `posts_old.csv`.
#[must_use]
pub fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_old.{}", ext.to_string_lossy()),
        None => format!("{stem}_old"),
    };
    path.with_file_name(name)
}

/// Reads and writes one platform's ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Ledger`] if the file is missing or a row cannot
    /// be decoded, and [`PublishError::LedgerInvariantViolation`] for repeated
    /// post ids.
    pub async fn load(&self) -> Result<ThreadLedger> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|e| PublishError::ledger(&self.path, e))?;
        let ledger = self.parse(&bytes)?;
        debug!(path = %self.path.display(), records = ledger.len(), "Loaded ledger");
        Ok(ledger)
    }

    fn parse(&self, bytes: &[u8]) -> Result<ThreadLedger> {
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(bytes);

        let mut ledger = ThreadLedger::new();
        for row in reader.deserialize::<LedgerRow>() {
            let row = row.map_err(|e| PublishError::ledger(&self.path, e))?;
            ledger.push(row.into_record(&self.path)?)?;
        }
        Ok(ledger)
    }

    /// Write the ledger back, keeping the previous file as a backup.
    ///
    /// The backup copy is taken first; if it fails nothing is overwritten. The
    /// new content goes to a sibling temp file that is then renamed over the
    /// ledger, so readers never see a half-written table.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Ledger`] on any I/O or encoding failure.
    pub async fn persist(&self, ledger: &ThreadLedger) -> Result<()> {
        let encoded = Self::encode(ledger).map_err(|e| PublishError::ledger(&self.path, e))?;

        let backup = backup_path_for(&self.path);
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|e| PublishError::ledger(&self.path, e))?;
        if exists {
            fs::copy(&self.path, &backup).await.map_err(|e| {
                PublishError::ledger(&self.path, format!("backup to {} failed: {e}", backup.display()))
            })?;
        }

        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, &encoded)
            .await
            .map_err(|e| PublishError::ledger(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PublishError::ledger(&self.path, e))?;

        info!(
            path = %self.path.display(),
            backup = %backup.display(),
            records = ledger.len(),
            "Ledger written"
        );
        Ok(())
    }

    fn encode(ledger: &ThreadLedger) -> std::result::Result<Vec<u8>, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(LEDGER_COLUMNS)?;
        for record in ledger.records() {
            writer.serialize(LedgerRow::from_record(record))?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}
