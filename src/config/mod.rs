use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::types::ProtocolType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub stamp: StampConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub apply_schema_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

/// Numbering and filing rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Organization code embedded in every protocol number (`2025/0001/SOR/E`)
    pub org_code: String,
    /// Tag embedded in stored file names (`0001E_SOR_CAMPANIA_subject.pdf`)
    pub file_tag: String,
    /// Starting values for counters created lazily
    pub counter_seeds: Vec<CounterSeed>,
    pub lock_timeout_ms: u64,
    pub filing_timeout_secs: u64,
}

/// Starting value for a (year, type) counter that does not exist yet.
/// The sequence handed out first is `start + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSeed {
    pub protocol_type: ProtocolType,
    pub year: i32,
    pub start: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageKind {
    Drive,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageKind,
    pub drive_root_folder_id: Option<String>,
    pub drive_access_token: Option<String>,
    pub drive_api_base: String,
    pub drive_upload_base: String,
    pub local_root: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampConfig {
    pub header: String,
    pub font_size: f32,
    pub margin_left: f32,
    pub color: [f32; 3],
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            header: "-- CROCE ROSSA ITALIANA SOR Campania --".to_string(),
            font_size: 8.0,
            margin_left: 40.0,
            color: [0.827, 0.184, 0.184],
        }
    }
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn filing_timeout(&self) -> Duration {
        Duration::from_secs(self.filing_timeout_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            org_code: "SOR".to_string(),
            file_tag: "SOR_CAMPANIA".to_string(),
            // Outgoing 2025 numbering continued from the paper register
            counter_seeds: vec![CounterSeed {
                protocol_type: ProtocolType::Outgoing,
                year: 2025,
                start: 88,
            }],
            lock_timeout_ms: 5_000,
            filing_timeout_secs: 60,
        }
    }
}

/// Parse `TYPE:YEAR:START` entries separated by commas, e.g. `U:2025:88,E:2026:4`
pub fn parse_counter_seeds(raw: &str) -> Result<Vec<CounterSeed>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            if parts.len() != 3 {
                return Err(format!("invalid counter seed '{}', expected TYPE:YEAR:START", entry));
            }
            let protocol_type = parts[0].parse::<ProtocolType>().map_err(|e| e.to_string())?;
            let year = parts[1]
                .parse::<i32>()
                .map_err(|_| format!("invalid year in counter seed '{}'", entry))?;
            let start = parts[2]
                .parse::<i32>()
                .map_err(|_| format!("invalid start in counter seed '{}'", entry))?;
            if start < 0 {
                return Err(format!("negative start in counter seed '{}'", entry));
            }
            Ok(CounterSeed { protocol_type, year, start })
        })
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_APPLY_SCHEMA") {
            self.database.apply_schema_on_start = v.parse().unwrap_or(self.database.apply_schema_on_start);
        }

        // API overrides
        if let Some(v) = env::var("REGISTRY_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Registry overrides
        if let Ok(v) = env::var("REGISTRY_ORG_CODE") {
            self.registry.org_code = v.trim().to_string();
        }
        if let Ok(v) = env::var("REGISTRY_FILE_TAG") {
            self.registry.file_tag = v.trim().to_string();
        }
        if let Ok(v) = env::var("REGISTRY_COUNTER_SEEDS") {
            match parse_counter_seeds(&v) {
                Ok(seeds) => self.registry.counter_seeds = seeds,
                Err(e) => tracing::warn!("Ignoring REGISTRY_COUNTER_SEEDS: {}", e),
            }
        }
        if let Ok(v) = env::var("REGISTRY_LOCK_TIMEOUT_MS") {
            self.registry.lock_timeout_ms = v.parse().unwrap_or(self.registry.lock_timeout_ms);
        }
        if let Ok(v) = env::var("REGISTRY_FILING_TIMEOUT_SECS") {
            self.registry.filing_timeout_secs = v.parse().unwrap_or(self.registry.filing_timeout_secs);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "drive" => self.storage.backend = StorageKind::Drive,
                "local" => self.storage.backend = StorageKind::Local,
                other => tracing::warn!("Ignoring unknown STORAGE_BACKEND '{}'", other),
            }
        }
        if let Ok(v) = env::var("DRIVE_FOLDER_ID") {
            self.storage.drive_root_folder_id = Some(v);
        }
        if let Ok(v) = env::var("DRIVE_ACCESS_TOKEN") {
            self.storage.drive_access_token = Some(v);
        }
        if let Ok(v) = env::var("STORAGE_LOCAL_ROOT") {
            self.storage.local_root = v;
        }
        if let Ok(v) = env::var("STORAGE_REQUEST_TIMEOUT_SECS") {
            self.storage.request_timeout_secs = v.parse().unwrap_or(self.storage.request_timeout_secs);
        }

        // Stamp overrides
        if let Ok(v) = env::var("STAMP_HEADER") {
            self.stamp.header = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                apply_schema_on_start: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 25 * 1024 * 1024, // 25MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
            registry: RegistryConfig::default(),
            storage: StorageConfig {
                backend: StorageKind::Local,
                drive_root_folder_id: None,
                drive_access_token: None,
                drive_api_base: "https://www.googleapis.com/drive/v3".to_string(),
                drive_upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
                local_root: "./data/protocolli".to_string(),
                request_timeout_secs: 30,
            },
            stamp: StampConfig::default(),
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.api.max_request_size_bytes = 15 * 1024 * 1024;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config.security.jwt_secret = String::new();
        config.security.jwt_expiry_hours = 24;
        config.storage.backend = StorageKind::Drive;
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.database.apply_schema_on_start = false;
        config.api.enable_request_logging = false;
        config.api.max_request_size_bytes = 15 * 1024 * 1024;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config.security.jwt_secret = String::new();
        config.security.jwt_expiry_hours = 8;
        config.storage.backend = StorageKind::Drive;
        config
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(matches!(config.storage.backend, StorageKind::Local));
        assert_eq!(config.registry.org_code, "SOR");
        assert!(!config.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(matches!(config.storage.backend, StorageKind::Drive));
        assert!(!config.database.apply_schema_on_start);
        // production must be given a secret explicitly
        assert!(config.security.jwt_secret.is_empty());
    }

    #[test]
    fn default_seeds_carry_outgoing_2025() {
        let registry = RegistryConfig::default();
        assert_eq!(
            registry.counter_seeds,
            vec![CounterSeed { protocol_type: ProtocolType::Outgoing, year: 2025, start: 88 }]
        );
    }

    #[test]
    fn parses_counter_seed_list() {
        let seeds = parse_counter_seeds("U:2025:88, E:2026:4").unwrap();
        assert_eq!(
            seeds,
            vec![
                CounterSeed { protocol_type: ProtocolType::Outgoing, year: 2025, start: 88 },
                CounterSeed { protocol_type: ProtocolType::Incoming, year: 2026, start: 4 },
            ]
        );
        assert!(parse_counter_seeds("").unwrap().is_empty());
        assert!(parse_counter_seeds("U:2025").is_err());
        assert!(parse_counter_seeds("X:2025:1").is_err());
        assert!(parse_counter_seeds("U:2025:-1").is_err());
    }
}
