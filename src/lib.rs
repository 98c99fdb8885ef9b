//! Antarctica Today social publisher library.
//!
//! Keeps one self-reply thread per social platform, each mirrored in a local
//! CSV ledger, and appends a post to every thread when a new day of melt data
//! is processed.

pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod ledger;
pub mod platforms;
pub mod publisher;
pub mod reconcile;

pub use config::{Config, ConfigError, PlatformSettings};
pub use error::{PublishError, Result};
pub use ledger::{CoveredDate, LedgerStore, PostRecord, ThreadLedger};
pub use platforms::{ImageAttachment, PlatformAdapter, PlatformKind, RemotePost, ReplyTarget};
pub use publisher::{Manifest, PlatformOutcome, PlatformSession, Published, Publisher};
