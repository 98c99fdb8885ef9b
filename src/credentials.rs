//! Typed credential records.
//!
//! Each platform keeps its secrets in a headerless two-column `key,value`
//! CSV file. The table is read once and mapped onto a struct; a missing key is
//! a configuration error at load time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// Raw key/value pairs read from a credentials file.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl CredentialTable {
    /// Read a credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Csv`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let mut values = HashMap::new();
        for row in reader.records() {
            let row = row.map_err(|source| ConfigError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let Some(key) = row.get(0).filter(|k| !k.is_empty()) else {
                continue;
            };
            values.insert(key.to_string(), row.get(1).unwrap_or_default().to_string());
        }

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Build a table from in-memory pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingKey {
            path: self.path.clone(),
            key: key.to_string(),
        })
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Bluesky app-password login.
#[derive(Clone)]
pub struct BlueskyCredentials {
    pub username: String,
    pub app_password: String,
    /// PDS or entryway base URL.
    pub service: String,
}

impl BlueskyCredentials {
    pub const DEFAULT_SERVICE: &'static str = "https://bsky.social";

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if `username` or `app_password` is
    /// absent.
    pub fn from_table(table: &CredentialTable) -> Result<Self, ConfigError> {
        Ok(Self {
            username: table.required("username")?,
            app_password: table.required("app_password")?,
            service: table
                .optional("service")
                .unwrap_or_else(|| Self::DEFAULT_SERVICE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl std::fmt::Debug for BlueskyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyCredentials")
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .field("service", &self.service)
            .finish()
    }
}

/// Mastodon application credentials.
#[derive(Clone)]
pub struct MastodonCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub api_base_url: String,
}

impl MastodonCredentials {
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKey`] if any of the four keys is absent.
    pub fn from_table(table: &CredentialTable) -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: table.required("client_id")?,
            client_secret: table.required("client_secret")?,
            access_token: table.required("access_token")?,
            api_base_url: table.required("api_base_url")?.trim_end_matches('/').to_string(),
        })
    }
}

impl std::fmt::Debug for MastodonCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}
