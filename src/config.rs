//! Configuration management for roxy-fileman
//!
//! Loaded once at startup from config.toml, with environment overrides
//! such as `ROXY_FILEMAN_PORT` or `ROXY_FILEMAN_PROFILES__MEDIA__ROOT`.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::filesystem::FileSystemSettings;
use crate::thumbnail::ThumbnailSettings;
use crate::transfer::TransferSettings;

const ENV_PREFIX: &str = "ROXY_FILEMAN";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    // ═══ LISTENER ═══
    pub bind_address: String,
    pub port: u16,
    /// Requests served at the same time; others wait for a slot
    pub max_connections: usize,
    /// Longest wait on a client for any single read or write
    pub request_timeout_secs: u64,

    // ═══ TRANSFERS ═══
    /// Chunk size for streamed downloads and archives
    pub buffer_size: usize,
    pub archive_pipe_capacity: usize,
    pub max_upload_size_mb: u64,

    // ═══ THUMBNAILS ═══
    pub thumbnail_workers: usize,
    pub thumbnail_cache_entries: usize,
    pub thumbnail_max_source_mb: u64,

    // ═══ PROFILES ═══
    pub default_profile: String,
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    /// Sandbox root on the server file system
    pub root: String,
}

impl AppConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        // Try the packaged path first, then the working directory
        let config_paths = ["roxy-fileman/config", "config"];

        let mut last_error = None;
        for config_path in config_paths {
            match Config::builder()
                .add_source(File::with_name(config_path))
                .add_source(environment())
                .build()
            {
                Ok(settings) => return Self::finish(settings),
                Err(e) => last_error = Some(e),
            }
        }

        Err(config::ConfigError::Message(format!(
            "Failed to load config.toml from any location. Tried: {config_paths:?}. Last error: {last_error:?}"
        )))
    }

    /// Parse configuration from TOML text, still honoring the environment
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .add_source(environment())
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self, config::ConfigError> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.port == 0 {
            return Err(config::ConfigError::Message("port cannot be 0".into()));
        }

        if self.max_connections == 0 {
            return Err(config::ConfigError::Message(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.buffer_size == 0 || self.archive_pipe_capacity == 0 {
            return Err(config::ConfigError::Message(
                "buffer_size and archive_pipe_capacity must be greater than 0".into(),
            ));
        }

        if self.max_upload_size_mb == 0 {
            return Err(config::ConfigError::Message(
                "max_upload_size_mb must be greater than 0".into(),
            ));
        }

        if self.thumbnail_workers == 0 {
            return Err(config::ConfigError::Message(
                "thumbnail_workers must be greater than 0".into(),
            ));
        }

        if self.profiles.is_empty() {
            return Err(config::ConfigError::Message(
                "at least one profile must be configured".into(),
            ));
        }

        if let Some((name, _)) = self.profiles.iter().find(|(_, p)| p.root.trim().is_empty()) {
            return Err(config::ConfigError::Message(format!(
                "profile '{name}' has an empty root"
            )));
        }

        // Profile keys come back lowercased from the config crate
        if !self.profiles.contains_key(&self.default_profile.to_lowercase()) {
            return Err(config::ConfigError::Message(format!(
                "default_profile '{}' is not a configured profile",
                self.default_profile
            )));
        }

        Ok(())
    }

    /// Listener address as `host:port`
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn filesystem_settings(&self) -> FileSystemSettings {
        FileSystemSettings {
            transfer: TransferSettings {
                chunk_size: self.buffer_size,
                archive_pipe_capacity: self.archive_pipe_capacity,
                max_upload_bytes: self.max_upload_bytes(),
            },
            thumbnails: ThumbnailSettings {
                workers: self.thumbnail_workers,
                cache_entries: self.thumbnail_cache_entries,
                max_source_bytes: self.thumbnail_max_source_mb.saturating_mul(1024 * 1024),
            },
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        bind_address = "127.0.0.1"
        port = 8090
        max_connections = 16
        request_timeout_secs = 30
        buffer_size = 65536
        archive_pipe_capacity = 262144
        max_upload_size_mb = 100
        thumbnail_workers = 2
        thumbnail_cache_entries = 64
        thumbnail_max_source_mb = 20
        default_profile = "default"

        [profiles.default]
        root = "./data/default"

        [profiles.media]
        root = "./data/media"
    "#;

    #[test]
    fn parses_sample_configuration() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.listen_address(), "127.0.0.1:8090");
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles["media"].root, "./data/media");

        let settings = config.filesystem_settings();
        assert_eq!(settings.transfer.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(settings.thumbnails.workers, 2);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn huge_size_limits_saturate() {
        let huge = SAMPLE
            .replace("max_upload_size_mb = 100", "max_upload_size_mb = 9223372036854775807")
            .replace("thumbnail_max_source_mb = 20", "thumbnail_max_source_mb = 9223372036854775807");
        let config = AppConfig::from_toml_str(&huge).unwrap();
        assert_eq!(config.max_upload_bytes(), u64::MAX);
        assert_eq!(config.filesystem_settings().thumbnails.max_source_bytes, u64::MAX);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let broken = SAMPLE.replace("request_timeout_secs = 30", "request_timeout_secs = 0");
        let err = AppConfig::from_toml_str(&broken).unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn default_profile_must_exist() {
        let broken = SAMPLE.replace(r#"default_profile = "default""#, r#"default_profile = "other""#);
        let err = AppConfig::from_toml_str(&broken).unwrap_err();
        assert!(err.to_string().contains("default_profile"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let broken = SAMPLE.replace("port = 8090", "port = 0");
        assert!(AppConfig::from_toml_str(&broken).is_err());
    }
}
