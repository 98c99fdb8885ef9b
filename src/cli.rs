use std::path::PathBuf;

use clap::{Parser, Subcommand};

use antarctica_today_social::ledger::CoveredDate;
use antarctica_today_social::platforms::PlatformKind;

#[derive(Parser, Debug)]
#[command(name = "anttoday-social")]
#[command(about = "Post daily Antarctic melt updates to the Bluesky and Mastodon threads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish the update described by a pipeline manifest
    Publish {
        /// Path to the manifest JSON (covered date, text, images)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Sync one platform's ledger with its remote thread
    Sync {
        /// Platform to sync (bluesky or mastodon)
        #[arg(short, long)]
        platform: PlatformKind,

        /// Tag the tail post with this covered date (YYYY.MM.DD)
        #[arg(short, long)]
        date: Option<CoveredDate>,

        /// Attach a comment to the tail post
        #[arg(short, long)]
        comment: Option<String>,
    },
}
