//! Per-platform thread ledger.
//!
//! The ledger is an append-only list of [`PostRecord`]s. Append order is the
//! thread order: the first record is the thread root, the last is the tip.

mod date;
mod record;
mod store;

use std::collections::HashMap;

pub use date::CoveredDate;
pub use record::{ImageSlot, PostRecord};
pub use store::{backup_path_for, escape, unescape, LedgerStore, LEDGER_COLUMNS};

use crate::error::{PublishError, Result};

/// Ordered collection of the posts recorded for one platform thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadLedger {
    records: Vec<PostRecord>,
    index: HashMap<String, usize>,
}

impl ThreadLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from records in append order.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::LedgerInvariantViolation`] if a `post_id` repeats.
    pub fn from_records(records: impl IntoIterator<Item = PostRecord>) -> Result<Self> {
        let mut ledger = Self::new();
        for record in records {
            ledger.push(record)?;
        }
        Ok(ledger)
    }

    /// Append a record. Blank optional fields are stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::LedgerInvariantViolation`] if the `post_id` is
    /// already present.
    pub fn push(&mut self, mut record: PostRecord) -> Result<()> {
        record.normalize();
        if self.index.contains_key(&record.post_id) {
            return Err(PublishError::LedgerInvariantViolation(format!(
                "post {} recorded twice",
                record.post_id
            )));
        }
        self.index.insert(record.post_id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[PostRecord] {
        &self.records
    }

    #[must_use]
    pub fn contains(&self, post_id: &str) -> bool {
        self.index.contains_key(post_id)
    }

    #[must_use]
    pub fn get(&self, post_id: &str) -> Option<&PostRecord> {
        self.index.get(post_id).map(|&i| &self.records[i])
    }

    pub(crate) fn get_mut(&mut self, post_id: &str) -> Option<&mut PostRecord> {
        self.index.get(post_id).map(|&i| &mut self.records[i])
    }

    /// The first record, which seeds every thread walk.
    #[must_use]
    pub fn first(&self) -> Option<&PostRecord> {
        self.records.first()
    }

    /// The most recently appended record.
    #[must_use]
    pub fn tail(&self) -> Option<&PostRecord> {
        self.records.last()
    }

    pub(crate) fn tail_mut(&mut self) -> Option<&mut PostRecord> {
        self.records.last_mut()
    }

    /// Latest covered date recorded anywhere in the ledger.
    #[must_use]
    pub fn max_covered_date(&self) -> Option<CoveredDate> {
        self.records.iter().filter_map(|r| r.covered_date).max()
    }

    /// Check the structural invariants: exactly one root, every parent
    /// resolves, and covered dates strictly increase in append order.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::LedgerInvariantViolation`] describing the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        let roots: Vec<&str> = self
            .records
            .iter()
            .filter(|r| r.is_root())
            .map(|r| r.post_id.as_str())
            .collect();
        match roots.len() {
            1 => {}
            0 if self.records.is_empty() => {}
            0 => {
                return Err(PublishError::LedgerInvariantViolation(
                    "no root post (every record has a parent)".to_string(),
                ))
            }
            _ => {
                return Err(PublishError::LedgerInvariantViolation(format!(
                    "{} root posts: {}",
                    roots.len(),
                    roots.join(", ")
                )))
            }
        }

        for record in &self.records {
            if let Some(parent) = &record.reply_to_id {
                if !self.contains(parent) {
                    return Err(PublishError::LedgerInvariantViolation(format!(
                        "post {} replies to {parent}, which is not in the ledger",
                        record.post_id
                    )));
                }
            }
        }

        let mut previous: Option<(CoveredDate, &str)> = None;
        for record in &self.records {
            let Some(date) = record.covered_date else {
                continue;
            };
            if let Some((prev_date, prev_id)) = previous {
                if date <= prev_date {
                    return Err(PublishError::LedgerInvariantViolation(format!(
                        "post {} covers {date}, not after {prev_date} covered by {prev_id}",
                        record.post_id
                    )));
                }
            }
            previous = Some((date, record.post_id.as_str()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, parent: Option<&str>, date: Option<&str>) -> PostRecord {
        PostRecord {
            reply_to_id: parent.map(str::to_string),
            covered_date: date.map(|d| d.parse().unwrap()),
            ..PostRecord::new(id)
        }
    }

    #[test]
    fn test_push_rejects_duplicate_ids() {
        let mut ledger = ThreadLedger::new();
        ledger.push(record("A", None, None)).unwrap();
        let err = ledger.push(record("A", None, None)).unwrap_err();
        assert!(matches!(err, PublishError::LedgerInvariantViolation(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_tail_and_max_date() {
        let ledger = ThreadLedger::from_records([
            record("A", None, Some("2023.12.15")),
            record("B", Some("A"), Some("2023.12.16")),
            record("C", Some("B"), None),
        ])
        .unwrap();

        assert_eq!(ledger.first().unwrap().post_id, "A");
        assert_eq!(ledger.tail().unwrap().post_id, "C");
        assert_eq!(
            ledger.max_covered_date().unwrap().to_string(),
            "2023.12.16"
        );
        assert!(ledger.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_two_roots() {
        let ledger =
            ThreadLedger::from_records([record("A", None, None), record("B", None, None)]).unwrap();
        let err = ledger.validate().unwrap_err();
        assert!(err.to_string().contains("2 root posts"));
    }

    #[test]
    fn test_validate_rejects_dangling_parent() {
        let ledger =
            ThreadLedger::from_records([record("A", None, None), record("B", Some("Z"), None)])
                .unwrap();
        assert!(matches!(
            ledger.validate(),
            Err(PublishError::LedgerInvariantViolation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_repeated_covered_date() {
        let ledger = ThreadLedger::from_records([
            record("A", None, Some("2023.12.15")),
            record("B", Some("A"), None),
            record("C", Some("B"), Some("2023.12.15")),
        ])
        .unwrap();
        let err = ledger.validate().unwrap_err();
        assert!(err.to_string().contains("covers 2023.12.15"));
    }

    #[test]
    fn test_empty_ledger_is_valid() {
        assert!(ThreadLedger::new().validate().is_ok());
        assert!(ThreadLedger::new().tail().is_none());
    }
}
