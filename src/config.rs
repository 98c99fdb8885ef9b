use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ledger::LedgerStore;
use crate::platforms::{PlatformKind, PostLimits};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("unknown platform '{0}' (expected bluesky or mastodon)")]
    UnknownPlatform(String),
    #[error("{path}: no entry for platform '{platform}'")]
    MissingPlatformEntry { path: PathBuf, platform: String },
    #[error("{path}: more than one entry for platform '{platform}'")]
    DuplicatePlatformEntry { path: PathBuf, platform: String },
    #[error("{path}: missing required key '{key}'")]
    MissingKey { path: PathBuf, key: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Application configuration loaded from environment variables.
///
/// Every path is explicit; nothing is resolved relative to the binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Table describing each platform (limits, username, file names).
    pub platform_data_path: PathBuf,
    /// Directory holding the per-platform credential files.
    pub credentials_dir: PathBuf,
    /// Platforms to post to, in posting order.
    pub platforms: Vec<PlatformKind>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `ANTTODAY_PLATFORMS` names an unknown platform.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(env_or_default("ANTTODAY_DATA_DIR", "./data"));
        Ok(Self {
            platform_data_path: optional_env("ANTTODAY_PLATFORM_DATA")
                .map_or_else(|| data_dir.join("platform_data.csv"), PathBuf::from),
            credentials_dir: PathBuf::from(env_or_default(
                "ANTTODAY_CREDENTIALS_DIR",
                "./credentials",
            )),
            platforms: parse_platform_list(&env_or_default("ANTTODAY_PLATFORMS", "bluesky,mastodon"))?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platforms.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ANTTODAY_PLATFORMS".to_string(),
                message: "at least one platform is required".to_string(),
            });
        }
        for (i, kind) in self.platforms.iter().enumerate() {
            if self.platforms[..i].contains(kind) {
                return Err(ConfigError::InvalidValue {
                    name: "ANTTODAY_PLATFORMS".to_string(),
                    message: format!("{kind} listed twice"),
                });
            }
        }
        if !self.platform_data_path.is_file() {
            return Err(ConfigError::InvalidValue {
                name: "ANTTODAY_PLATFORM_DATA".to_string(),
                message: format!("{} does not exist", self.platform_data_path.display()),
            });
        }
        Ok(())
    }

    /// Read the platform table and resolve the settings of every configured
    /// platform, in posting order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unreadable or a configured platform
    /// has no (or more than one) entry.
    pub fn platform_settings(&self) -> Result<Vec<PlatformSettings>, ConfigError> {
        let rows = read_platform_table(&self.platform_data_path)?;
        let data_dir = self
            .platform_data_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        self.platforms
            .iter()
            .map(|&kind| {
                let mut matching = rows.iter().filter(|r| r.platform_name.trim() == kind.as_str());
                let row = matching.next().ok_or_else(|| ConfigError::MissingPlatformEntry {
                    path: self.platform_data_path.clone(),
                    platform: kind.to_string(),
                })?;
                if matching.next().is_some() {
                    return Err(ConfigError::DuplicatePlatformEntry {
                        path: self.platform_data_path.clone(),
                        platform: kind.to_string(),
                    });
                }
                Ok(PlatformSettings {
                    kind,
                    username: row.username.trim().to_string(),
                    limits: PostLimits {
                        post_limit: row.post_limit,
                        alt_text_limit: row.alt_text_limit,
                    },
                    text_addition: row
                        .text_addition
                        .as_deref()
                        .map(crate::ledger::unescape)
                        .unwrap_or_default(),
                    ledger_path: data_dir.join(row.post_history_file.trim()),
                    credentials_path: self.credentials_dir.join(row.credentials_file.trim()),
                })
            })
            .collect()
    }
}

/// Everything needed to run one platform.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub kind: PlatformKind,
    /// Account that owns the thread; replies by anyone else are ignored.
    pub username: String,
    pub limits: PostLimits,
    /// Appended verbatim to every post on this platform.
    pub text_addition: String,
    pub ledger_path: PathBuf,
    pub credentials_path: PathBuf,
}

impl PlatformSettings {
    #[must_use]
    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::new(self.ledger_path.clone())
    }
}

#[derive(Debug, Deserialize)]
struct PlatformRow {
    platform_name: String,
    #[serde(default)]
    username: String,
    post_limit: usize,
    alt_text_limit: usize,
    #[serde(default)]
    text_addition: Option<String>,
    post_history_file: String,
    credentials_file: String,
}

fn read_platform_table(path: &Path) -> Result<Vec<PlatformRow>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    reader
        .deserialize()
        .collect::<Result<Vec<PlatformRow>, _>>()
        .map_err(|source| ConfigError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_platform_list(raw: &str) -> Result<Vec<PlatformKind>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const PLATFORM_TABLE: &str = "\
# platform settings
platform_name,username,post_limit,alt_text_limit,text_addition,post_history_file,credentials_file
bluesky,icesheet.bsky.social,300,2000,,bluesky_posts.csv,bluesky_credentials.csv
mastodon,icesheet,500,1500,\\n\\n#Antarctica,mastodon_posts.csv,mastodon_credentials.csv
";

    fn write_table(dir: &Path) -> PathBuf {
        let path = dir.join("platform_data.csv");
        std::fs::write(&path, PLATFORM_TABLE).unwrap();
        path
    }

    #[test]
    fn test_parse_platform_list() {
        assert_eq!(
            parse_platform_list(" mastodon , bluesky ").unwrap(),
            vec![PlatformKind::Mastodon, PlatformKind::Bluesky]
        );
        assert!(matches!(
            parse_platform_list("bluesky,threads"),
            Err(ConfigError::UnknownPlatform(p)) if p == "threads"
        ));
    }

    #[test]
    fn test_platform_settings_resolve_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            platform_data_path: write_table(dir.path()),
            credentials_dir: PathBuf::from("/secrets"),
            platforms: vec![PlatformKind::Mastodon, PlatformKind::Bluesky],
        };
        config.validate().unwrap();

        let settings = config.platform_settings().unwrap();
        assert_eq!(settings.len(), 2);

        let mastodon = &settings[0];
        assert_eq!(mastodon.kind, PlatformKind::Mastodon);
        assert_eq!(mastodon.limits.post_limit, 500);
        assert_eq!(mastodon.text_addition, "\n\n#Antarctica");
        assert_eq!(mastodon.ledger_path, dir.path().join("mastodon_posts.csv"));
        assert_eq!(
            mastodon.credentials_path,
            PathBuf::from("/secrets/mastodon_credentials.csv")
        );

        let bluesky = &settings[1];
        assert_eq!(bluesky.username, "icesheet.bsky.social");
        assert_eq!(bluesky.text_addition, "");
    }

    #[test]
    fn test_missing_platform_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("platform_data.csv");
        std::fs::write(
            &path,
            "platform_name,username,post_limit,alt_text_limit,text_addition,post_history_file,credentials_file\n\
             bluesky,me,300,2000,,b.csv,c.csv\n",
        )
        .unwrap();
        let config = Config {
            platform_data_path: path,
            credentials_dir: PathBuf::from("."),
            platforms: vec![PlatformKind::Mastodon],
        };
        assert!(matches!(
            config.platform_settings(),
            Err(ConfigError::MissingPlatformEntry { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            platform_data_path: write_table(dir.path()),
            credentials_dir: PathBuf::from("."),
            platforms: vec![PlatformKind::Bluesky, PlatformKind::Bluesky],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_and_overrides() {
        std::env::remove_var("ANTTODAY_PLATFORM_DATA");
        std::env::remove_var("ANTTODAY_PLATFORMS");
        std::env::set_var("ANTTODAY_DATA_DIR", "/srv/anttoday/data");
        std::env::set_var("ANTTODAY_CREDENTIALS_DIR", "/srv/anttoday/credentials");

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.platform_data_path,
            PathBuf::from("/srv/anttoday/data/platform_data.csv")
        );
        assert_eq!(config.credentials_dir, PathBuf::from("/srv/anttoday/credentials"));
        assert_eq!(
            config.platforms,
            vec![PlatformKind::Bluesky, PlatformKind::Mastodon]
        );

        std::env::set_var("ANTTODAY_PLATFORMS", "mastodon");
        let config = Config::from_env().unwrap();
        assert_eq!(config.platforms, vec![PlatformKind::Mastodon]);

        std::env::remove_var("ANTTODAY_DATA_DIR");
        std::env::remove_var("ANTTODAY_CREDENTIALS_DIR");
        std::env::remove_var("ANTTODAY_PLATFORMS");
    }
}
