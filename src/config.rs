//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! The configuration is loaded once at startup and passed explicitly to the web
//! handler and the grain classifier; nothing reads process-wide settings later.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::storage::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Default upload limit: 10MB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the web server binds to
    pub bind_address: String,
    /// Web server port
    pub port: u16,
    /// Maximum size of a multipart request body in bytes
    pub max_upload_bytes: u64,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allow_privileged_ports: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if IpAddr::from_str(&self.bind_address).is_err() {
            return Err(AppError::Config(format!(
                "Bind address '{}' is not a valid IP address",
                self.bind_address
            )));
        }

        if self.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if self.port < 1024 && !self.allow_privileged_ports {
            return Err(AppError::Config(format!(
                "Server port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.port
            )));
        }

        if self.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "Max upload size cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Media storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory holding uploads and annotated results
    pub root: PathBuf,
    /// Public URL prefix for files in the media root
    pub url_prefix: String,
    /// How long stored files are kept
    pub retention: RetentionPolicy,
    /// Seconds between retention sweeps
    pub sweep_interval_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            url_prefix: "/media/".to_string(),
            retention: RetentionPolicy::KeepForever,
            sweep_interval_secs: 3600,
        }
    }
}

impl MediaConfig {
    /// Validate media configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(AppError::Config("Media root cannot be empty".to_string()));
        }

        let prefix = &self.url_prefix;
        let local = prefix.starts_with('/');
        let remote = prefix.starts_with("http://") || prefix.starts_with("https://");
        if !local && !remote {
            return Err(AppError::Config(format!(
                "Media URL '{}' must start with '/' or an http(s) scheme",
                prefix
            )));
        }

        if !prefix.ends_with('/') {
            return Err(AppError::Config(format!(
                "Media URL '{}' must end with a slash",
                prefix
            )));
        }

        if self.sweep_interval_secs == 0 {
            return Err(AppError::Config(
                "Retention sweep interval cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Path component under which this server serves media, if the prefix is local
    pub fn local_route(&self) -> Option<&str> {
        self.url_prefix
            .starts_with('/')
            .then_some(self.url_prefix.as_str())
    }
}

/// Grain classification parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Contours with an area at or below this are noise
    pub min_contour_area: f64,
    /// A grain is broken when its box width or height is below this
    pub broken_max_side: u32,
    /// Rectangle line thickness in pixels
    pub box_thickness: u32,
    /// JPEG quality of the annotated output
    pub jpeg_quality: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 100.0,
            broken_max_side: 30,
            box_thickness: 2,
            jpeg_quality: 95,
        }
    }
}

impl ClassifierConfig {
    /// Validate classifier configuration
    pub fn validate(&self) -> AppResult<()> {
        if !self.min_contour_area.is_finite() || self.min_contour_area < 0.0 {
            return Err(AppError::Config(format!(
                "Minimum grain area must be a non-negative number, got {}",
                self.min_contour_area
            )));
        }

        if self.broken_max_side == 0 {
            return Err(AppError::Config(
                "Broken grain side threshold cannot be 0".to_string(),
            ));
        }

        if !(1..=10).contains(&self.box_thickness) {
            return Err(AppError::Config(format!(
                "Box thickness must be between 1 and 10 pixels, got {}",
                self.box_thickness
            )));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }

        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Media storage configuration
    pub media: MediaConfig,
    /// Grain classification configuration
    pub classifier: ClassifierConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

/// Read an environment variable, falling back to `default` when unset
fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let server = ServerConfig {
            bind_address: env_or("BIND_ADDRESS", defaults.server.bind_address)?,
            port: env_or("PORT", defaults.server.port)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.server.max_upload_bytes)?,
            allow_privileged_ports: env::var("ALLOW_PRIVILEGED_PORTS")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                == "true",
        };

        let media = MediaConfig {
            root: env_or("MEDIA_ROOT", defaults.media.root)?,
            url_prefix: env_or("MEDIA_URL", defaults.media.url_prefix)?,
            retention: RetentionPolicy::from_secs(env_or("MEDIA_RETENTION_SECS", 0u64)?),
            sweep_interval_secs: env_or(
                "RETENTION_SWEEP_INTERVAL_SECS",
                defaults.media.sweep_interval_secs,
            )?,
        };

        let classifier = ClassifierConfig {
            min_contour_area: env_or("MIN_GRAIN_AREA", defaults.classifier.min_contour_area)?,
            broken_max_side: env_or(
                "BROKEN_GRAIN_MAX_SIDE",
                defaults.classifier.broken_max_side,
            )?,
            box_thickness: env_or("BOX_THICKNESS", defaults.classifier.box_thickness)?,
            jpeg_quality: env_or("JPEG_QUALITY", defaults.classifier.jpeg_quality)?,
        };

        Ok(Self {
            server,
            media,
            classifier,
            observability: ObservabilityConfig::from_env(),
        })
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.media.validate()?;
        self.classifier.validate()?;
        self.observability.validate().map_err(AppError::Config)?;

        if self.observability.enable_metrics_export
            && self.observability.metrics_port == self.server.port
        {
            return Err(AppError::Config(
                "Server port and metrics port cannot be the same".to_string(),
            ));
        }

        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: bind={}:{}, media_root={}, media_url={}, retention={:?}, min_area={}, broken_below={}, metrics_port={}, environment={}",
            self.server.bind_address,
            self.server.port,
            self.media.root.display(),
            self.media.url_prefix,
            self.media.retention,
            self.classifier.min_contour_area,
            self.classifier.broken_max_side,
            self.observability.metrics_port,
            self.observability.environment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.min_contour_area, 100.0);
        assert_eq!(config.classifier.broken_max_side, 30);
        assert_eq!(config.classifier.box_thickness, 2);
        assert_eq!(config.media.url_prefix, "/media/");
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());

        config.port = 80;
        assert!(config.validate().is_err());
        config.allow_privileged_ports = true;
        assert!(config.validate().is_ok());

        config.bind_address = "localhost:80".to_string();
        assert!(config.validate().is_err());
        config.bind_address = "0.0.0.0".to_string();

        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_media_config_validation() {
        let mut config = MediaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.local_route(), Some("/media/"));

        config.url_prefix = "/media".to_string();
        assert!(config.validate().is_err());

        config.url_prefix = "media/".to_string();
        assert!(config.validate().is_err());

        config.url_prefix = "https://cdn.example.com/rice/".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.local_route(), None);

        config.root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_config_validation() {
        let mut config = ClassifierConfig::default();
        assert!(config.validate().is_ok());

        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.jpeg_quality = 101;
        assert!(config.validate().is_err());
        config.jpeg_quality = 95;

        config.box_thickness = 0;
        assert!(config.validate().is_err());
        config.box_thickness = 2;

        config.min_contour_area = f64::NAN;
        assert!(config.validate().is_err());
        config.min_contour_area = 100.0;

        config.broken_max_side = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_clash_is_rejected() {
        let mut config = AppConfig::default();
        config.observability.metrics_port = config.server.port;
        assert!(config.validate().is_err());

        config.observability.enable_metrics_export = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_summary_mentions_retention() {
        let mut config = AppConfig::default();
        config.media.retention = RetentionPolicy::MaxAge(Duration::from_secs(60));
        let summary = config.summary();
        assert!(summary.contains("MaxAge"));
        assert!(summary.contains("/media/"));
    }
}
