//! Thread reconciliation.
//!
//! Merges a platform's view of the thread into the local ledger and answers
//! which post is the current tip. Platform independent: the input is the
//! ordered list of [`RemotePost`]s an adapter produced.

use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::ledger::{CoveredDate, ThreadLedger};
use crate::platforms::RemotePost;

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Posts appended to the ledger.
    pub added: Vec<String>,
    /// Incomplete rows refreshed from the remote copy.
    pub refreshed: Vec<String>,
    /// Remote posts that could not be used.
    pub skipped: usize,
    /// Covered date assigned to the tail, if any.
    pub tagged: Option<CoveredDate>,
    pub comment_set: bool,
}

impl ReconcileReport {
    /// Whether the ledger needs to be written back.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
            || !self.refreshed.is_empty()
            || self.tagged.is_some()
            || self.comment_set
    }
}

/// Merge `remote_posts` (in thread order) into `ledger`.
///
/// Unknown posts are appended, rows with a blank timestamp are overwritten
/// from the remote copy, complete rows are left alone. If anything was added
/// or refreshed and the tail has no covered date yet, it gets
/// `new_covered_date`. A `new_comment` always lands on the tail.
///
/// # Errors
///
/// Returns [`PublishError::LedgerInvariantViolation`] if the merged ledger has
/// more or fewer than one root, a dangling parent, or out-of-order covered
/// dates. The ledger may already hold merged rows when this happens; callers
/// must not persist it.
pub fn reconcile(
    ledger: &mut ThreadLedger,
    remote_posts: &[RemotePost],
    new_covered_date: Option<CoveredDate>,
    new_comment: Option<&str>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for remote in remote_posts {
        if let Err(e) = check_remote(remote) {
            warn!(error = %e, "Skipping remote post");
            report.skipped += 1;
            continue;
        }

        match ledger.get_mut(&remote.post_id) {
            None => {
                ledger.push(remote.to_record())?;
                report.added.push(remote.post_id.clone());
            }
            Some(record) if !record.is_complete() => {
                remote.apply_to(record);
                report.refreshed.push(remote.post_id.clone());
            }
            Some(_) => {}
        }
    }

    let merged = !report.added.is_empty() || !report.refreshed.is_empty();
    if merged {
        if let Some(date) = new_covered_date {
            report.tagged = tag_date(ledger, date)?;
        }
    }
    if let Some(comment) = new_comment {
        report.comment_set = set_comment(ledger, comment);
    }

    ledger.validate()?;

    if report.changed() {
        info!(
            added = report.added.len(),
            refreshed = report.refreshed.len(),
            skipped = report.skipped,
            tagged = ?report.tagged.map(|d| d.to_string()),
            "Reconciled thread"
        );
    } else {
        debug!(records = ledger.len(), "Ledger already up to date");
    }
    Ok(report)
}

/// Operator correction: tag the tail with a covered date (if it has none)
/// and/or set its comment, without needing a remote change.
///
/// # Errors
///
/// Returns [`PublishError::LedgerInvariantViolation`] if the date would not
/// come after every date already recorded.
pub fn tag_tail(
    ledger: &mut ThreadLedger,
    covered_date: Option<CoveredDate>,
    comment: Option<&str>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    if let Some(date) = covered_date {
        report.tagged = tag_date(ledger, date)?;
    }
    if let Some(comment) = comment {
        report.comment_set = set_comment(ledger, comment);
    }
    ledger.validate()?;
    Ok(report)
}

/// Id of the post new content should reply to: the tail in append order.
///
/// # Errors
///
/// Returns [`PublishError::LedgerInvariantViolation`] if the ledger is empty.
pub fn resolve_tip(ledger: &ThreadLedger) -> Result<String> {
    ledger
        .tail()
        .map(|record| record.post_id.clone())
        .ok_or_else(|| PublishError::LedgerInvariantViolation("ledger is empty".to_string()))
}

fn check_remote(remote: &RemotePost) -> Result<()> {
    let malformed = |message: &str| PublishError::MalformedRemotePost {
        post_id: remote.post_id.clone(),
        message: message.to_string(),
    };
    if remote.post_id.trim().is_empty() {
        return Err(malformed("blank post id"));
    }
    if remote.reply_to_id.as_deref() == Some(remote.post_id.as_str()) {
        return Err(malformed("post replies to itself"));
    }
    Ok(())
}

/// Give an untagged tail the covered date. Returns the date if it was set.
fn tag_date(ledger: &mut ThreadLedger, date: CoveredDate) -> Result<Option<CoveredDate>> {
    let max = ledger.max_covered_date();
    let Some(tail) = ledger.tail_mut() else {
        return Ok(None);
    };
    if tail.covered_date.is_some() {
        return Ok(None);
    }
    if let Some(max) = max {
        if date <= max {
            return Err(PublishError::LedgerInvariantViolation(format!(
                "cannot tag post {} with {date}: {max} is already covered",
                tail.post_id
            )));
        }
    }
    tail.covered_date = Some(date);
    Ok(Some(date))
}

fn set_comment(ledger: &mut ThreadLedger, comment: &str) -> bool {
    let Some(tail) = ledger.tail_mut() else {
        return false;
    };
    let comment = Some(comment.to_string()).filter(|c| !c.trim().is_empty());
    if tail.comment == comment {
        return false;
    }
    tail.comment = comment;
    true
}
