//! Uploader configuration.
//!
//! Values come from the environment (a `.env` file is loaded if present) and
//! can be overridden per call with the builder setters or CLI flags.
//!
//! | Variable                      | Default                 |
//! |-------------------------------|-------------------------|
//! | `LESSONLOAD_API_URL`          | `http://localhost:8787` |
//! | `LESSONLOAD_TOKEN`            | none                    |
//! | `LESSONLOAD_COLLECTION`       | none                    |
//! | `LESSONLOAD_CHUNK_SIZE`       | 5 MiB                   |
//! | `LESSONLOAD_PART_CONCURRENCY` | 4                       |

use std::env;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// REST API base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8787";

/// Size of one multipart part.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Largest accepted multipart part size.
pub const MAX_CHUNK_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Parts uploaded in parallel within one document.
pub const DEFAULT_PART_CONCURRENCY: usize = 4;

/// Object storage folder for lesson documents.
pub const DOCUMENT_FOLDER: &str = "documents";

/// Runtime configuration shared by the REST client and both transports.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// REST API base URL, without trailing slash.
    pub api_url: String,
    /// Bearer token sent on every request.
    pub token: Option<String>,
    /// Streaming host collection videos are filed under (usually the academy name).
    pub collection: Option<String>,
    /// Multipart part size in bytes.
    pub chunk_size: u64,
    /// Concurrent part uploads per document.
    pub part_concurrency: usize,
    /// Object storage folder for documents.
    pub document_folder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            collection: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            document_folder: DOCUMENT_FOLDER.to_string(),
        }
    }
}

impl Config {
    /// Create a config pointing at `api_url` with default tuning.
    pub fn new(api_url: &str) -> ConfigResult<Self> {
        Self::default().with_api_url(api_url)
    }

    /// Load configuration from the environment.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("LESSONLOAD_API_URL") {
            config = config.with_api_url(&url)?;
        }
        config.token = lookup("LESSONLOAD_TOKEN").filter(|t| !t.is_empty());
        config.collection = lookup("LESSONLOAD_COLLECTION").filter(|c| !c.is_empty());

        if let Some(size) = parse_value::<u64>(&lookup, "LESSONLOAD_CHUNK_SIZE")? {
            config = config.with_chunk_size(size)?;
        }
        if let Some(n) = parse_value::<usize>(&lookup, "LESSONLOAD_PART_CONCURRENCY")? {
            config = config.with_part_concurrency(n)?;
        }

        Ok(config)
    }

    /// Set the API base URL.
    pub fn with_api_url(mut self, url: &str) -> ConfigResult<Self> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(url.to_string()));
        }
        self.api_url = url.to_string();
        Ok(self)
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the video collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Set the multipart part size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> ConfigResult<Self> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size".into(),
                message: format!("must be between 1 and {} bytes", MAX_CHUNK_SIZE),
            });
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Set how many parts of one document upload in parallel.
    pub fn with_part_concurrency(mut self, part_concurrency: usize) -> ConfigResult<Self> {
        if part_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "part_concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        self.part_concurrency = part_concurrency;
        Ok(self)
    }
}

fn parse_value<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.part_concurrency, 4);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            ("LESSONLOAD_API_URL", "https://api.example.org/"),
            ("LESSONLOAD_TOKEN", "secret"),
            ("LESSONLOAD_COLLECTION", "Academia Norte"),
            ("LESSONLOAD_CHUNK_SIZE", "1048576"),
            ("LESSONLOAD_PART_CONCURRENCY", "2"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://api.example.org");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.collection.as_deref(), Some("Academia Norte"));
        assert_eq!(config.chunk_size, 1_048_576);
        assert_eq!(config.part_concurrency, 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[("LESSONLOAD_CHUNK_SIZE", "big")])).unwrap_err();
        assert!(err.to_string().contains("LESSONLOAD_CHUNK_SIZE"));

        assert!(Config::from_lookup(lookup(&[("LESSONLOAD_PART_CONCURRENCY", "0")])).is_err());
        assert!(Config::default().with_chunk_size(0).is_err());
        assert!(Config::default().with_chunk_size(MAX_CHUNK_SIZE).is_ok());
        assert!(Config::default().with_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
        assert!(Config::default().with_chunk_size(u64::MAX / 2 + 1).is_err());
        assert!(Config::new("ftp://files.example.org").is_err());
    }
}
