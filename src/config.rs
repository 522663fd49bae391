//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::error::AppError;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 4000,
        }
    }
}

/// Database configuration for the snapshot/connection store.
/// Absent entirely when no DATABASE_URL is configured (in-memory mode).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
}

/// Analysis service endpoints and timeouts.
///
/// Extraction, quality and doc-gen dispatch share one timeout; chat gets a
/// longer one to accommodate slower generative responses.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub chat_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(60),
            chat_timeout: Duration::from_secs(180),
        }
    }
}

/// Background sync scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 6 hours between autonomous sweeps
            interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Chat session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Most-recent-N turns retained per session.
    pub history_cap: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { history_cap: 20 }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub analysis: AnalysisConfig,
    pub sync: SyncConfig,
    pub chat: ChatConfig,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, AppError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env_parsed("HOST").unwrap_or_else(|| ServerConfig::default().host),
            port: env_parsed("PORT").unwrap_or_else(|| ServerConfig::default().port),
        };

        let database = match std::env::var("DATABASE_URL") {
            Ok(database_url) => Some(Self::parse_database_url(&database_url)?),
            Err(_) => None,
        };

        let analysis = AnalysisConfig {
            base_url: std::env::var("ANALYSIS_SERVICE_URL")
                .unwrap_or_else(|_| AnalysisConfig::default().base_url),
            request_timeout: env_parsed("ANALYSIS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or_else(|| AnalysisConfig::default().request_timeout),
            chat_timeout: env_parsed("CHAT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or_else(|| AnalysisConfig::default().chat_timeout),
        };

        let sync = SyncConfig {
            enabled: env_parsed("SYNC_ENABLED").unwrap_or(true),
            interval: env_parsed("SYNC_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or_else(|| SyncConfig::default().interval),
        };

        let chat = ChatConfig {
            history_cap: env_parsed("CHAT_HISTORY_CAP")
                .unwrap_or_else(|| ChatConfig::default().history_cap),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        Ok(Self {
            server,
            database,
            analysis,
            sync,
            chat,
            cors,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, AppError> {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| {
                        AppError::Config("Missing host in DATABASE_URL".to_string())
                    })?
                    .to_string();

                let port = parsed.port().unwrap_or(5432);

                let user = parsed.username().to_string();
                let password = parsed.password().map(|p| p.to_string()).unwrap_or_default();

                let database = parsed.path().trim_start_matches('/').to_string();
                if database.is_empty() {
                    return Err(AppError::Config(
                        "Missing database name in DATABASE_URL".to_string(),
                    ));
                }

                Ok(DatabaseConfig {
                    host,
                    port,
                    user,
                    password,
                    database,
                    max_pool_size: env_parsed("DB_MAX_CONNECTIONS").unwrap_or(10),
                })
            }
            Err(_) => Err(AppError::Config(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
