/// Configuration management for geo-post-service
///
/// Loads configuration from environment variables with sensible defaults.
/// Secrets (JWT secret, GCS service account) have no defaults and are
/// passed explicitly to the components that need them.
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Radius, DEFAULT_RADIUS_KM};
use crate::services::geo_search::DEFAULT_MAX_RESULTS;
use crate::services::CallTimeouts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub backend: Backend,
    pub elasticsearch: ElasticsearchConfig,
    pub gcs: GcsConfig,
    pub search: SearchConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Which adapters back the blob store and search index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Elasticsearch + Google Cloud Storage
    Remote,
    /// Process-local maps, for development without cloud credentials
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
}

#[derive(Clone, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    pub host: String,
    pub service_account_json: Option<String>,
    pub service_account_json_path: Option<String>,
}

impl std::fmt::Debug for GcsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsConfig")
            .field("bucket", &self.bucket)
            .field("host", &self.host)
            .field(
                "service_account_json",
                &self.service_account_json.as_ref().map(|_| "<redacted>"),
            )
            .field("service_account_json_path", &self.service_account_json_path)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub default_radius: Radius,
    pub max_results: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TimeoutsConfig {
    pub blob_upload_ms: u64,
    pub index_write_ms: u64,
    pub index_query_ms: u64,
}

impl TimeoutsConfig {
    pub fn call_timeouts(&self) -> CallTimeouts {
        CallTimeouts {
            blob_upload: Duration::from_millis(self.blob_upload_ms),
            index_write: Duration::from_millis(self.index_write_ms),
            index_query: Duration::from_millis(self.index_query_ms),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match get("GEO_POST_BACKEND").as_deref() {
            None | Some("remote") => Backend::Remote,
            Some("memory") => Backend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "GEO_POST_BACKEND",
                    reason: format!("expected `remote` or `memory`, got {other:?}"),
                })
            }
        };

        let default_radius_km =
            parse_or(&get, "SEARCH_DEFAULT_RADIUS_KM", DEFAULT_RADIUS_KM)?;
        let default_radius =
            Radius::from_km(default_radius_km).map_err(|err| ConfigError::Invalid {
                name: "SEARCH_DEFAULT_RADIUS_KM",
                reason: err.to_string(),
            })?;

        let timeouts = TimeoutsConfig {
            blob_upload_ms: parse_or(&get, "BLOB_UPLOAD_TIMEOUT_MS", 30_000)?,
            index_write_ms: parse_or(&get, "INDEX_WRITE_TIMEOUT_MS", 5_000)?,
            index_query_ms: parse_or(&get, "INDEX_QUERY_TIMEOUT_MS", 5_000)?,
        };
        for (name, value) in [
            ("BLOB_UPLOAD_TIMEOUT_MS", timeouts.blob_upload_ms),
            ("INDEX_WRITE_TIMEOUT_MS", timeouts.index_write_ms),
            ("INDEX_QUERY_TIMEOUT_MS", timeouts.index_query_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "timeout must be greater than zero".into(),
                });
            }
        }

        let gcs = GcsConfig {
            bucket: get("GCS_BUCKET").unwrap_or_default(),
            host: get("GCS_HOST").unwrap_or_else(|| "storage.googleapis.com".to_string()),
            service_account_json: get("GCS_SERVICE_ACCOUNT_JSON"),
            service_account_json_path: get("GCS_SERVICE_ACCOUNT_JSON_PATH"),
        };
        if backend == Backend::Remote && gcs.bucket.is_empty() {
            return Err(ConfigError::Missing("GCS_BUCKET"));
        }

        Ok(Config {
            app: AppConfig {
                host: get("GEO_POST_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "GEO_POST_PORT", 8080)?,
                env: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
                max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 32 << 20)?,
            },
            cors: CorsConfig {
                allowed_origins: get("CORS_ALLOWED_ORIGINS")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|origin| !origin.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_else(|| vec!["*".to_string()]),
            },
            auth: AuthConfig {
                jwt_secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            },
            backend,
            elasticsearch: ElasticsearchConfig {
                url: get("ELASTICSEARCH_URL")
                    .unwrap_or_else(|| "http://localhost:9200".to_string()),
                index: get("ELASTICSEARCH_INDEX").unwrap_or_else(|| "around".to_string()),
            },
            gcs,
            search: SearchConfig {
                default_radius,
                max_results: parse_or(&get, "SEARCH_MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
            },
            timeouts,
        })
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
        }),
    }
}
