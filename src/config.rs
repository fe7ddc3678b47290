// src/config.rs

use std::env;
use std::path::PathBuf;
use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;

use crate::error::AppError;

pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com";
pub const DEFAULT_LOCAL_DATA_PATH: &str = "data.csv.gz";
pub const DEFAULT_CHECKSUM_BLOCK_SIZE: usize = 1 << 20;

/// Remote storage settings as found in the environment.
/// Every field is required before a sync may run; see [`StorageSettings::require`].
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    pub service_account: Option<String>,
    pub bucket: Option<String>,
    pub dataset_object: Option<String>,
    pub checksum_object: Option<String>,
    pub base_url: String,
}

/// Validated remote storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub service_account: String,
    pub bucket: String,
    pub dataset_object: String,
    pub checksum_object: String,
    pub base_url: String,
}

impl StorageSettings {
    /// Fails with `AppError::Configuration` naming the first missing key.
    pub fn require(&self) -> Result<StorageConfig, AppError> {
        fn present(value: &Option<String>, key: &str) -> Result<String, AppError> {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| AppError::Configuration(format!("'{}' is missing", key)))
        }

        Ok(StorageConfig {
            service_account: present(&self.service_account, "GCP_SERVICE_ACCOUNT")?,
            bucket: present(&self.bucket, "GCP_BUCKET")?,
            dataset_object: present(&self.dataset_object, "CSV_OBJECT")?,
            checksum_object: present(&self.checksum_object, "MD5_OBJECT")?,
            base_url: self.base_url.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageSettings,
    pub local_data_path: PathBuf,
    pub checksum_block_size: usize,
    pub http_timeout_secs: u64,
    /// Offset applied to row timestamps for date labels (Asia/Tokyo by default).
    pub display_utc_offset_hours: i32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let storage = StorageSettings {
            service_account: env::var("GCP_SERVICE_ACCOUNT").ok(),
            bucket: env::var("GCP_BUCKET").ok(),
            dataset_object: env::var("CSV_OBJECT").ok(),
            checksum_object: env::var("MD5_OBJECT").ok(),
            base_url: env::var("STORAGE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_STORAGE_BASE_URL.to_string()),
        };

        let local_data_path = env::var("LOCAL_DATA_PATH")
            .unwrap_or_else(|_| DEFAULT_LOCAL_DATA_PATH.to_string())
            .into();

        let checksum_block_size = parse_or("CHECKSUM_BLOCK_SIZE", DEFAULT_CHECKSUM_BLOCK_SIZE);
        let http_timeout_secs = parse_or("HTTP_TIMEOUT_SECS", 30);
        let display_utc_offset_hours = parse_or("DISPLAY_UTC_OFFSET_HOURS", 9);
        let port = parse_or("PORT", 3000);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            storage,
            local_data_path,
            checksum_block_size,
            http_timeout_secs,
            display_utc_offset_hours,
            port,
            rust_log,
        }
    }

    /// Offset used when turning row timestamps into calendar dates.
    /// Out-of-range hours fall back to UTC.
    pub fn display_offset(&self) -> FixedOffset {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> StorageSettings {
        StorageSettings {
            service_account: Some("{}".to_string()),
            bucket: Some("quiz-bucket".to_string()),
            dataset_object: Some("data.csv.gz".to_string()),
            checksum_object: Some("data.csv.gz.md5".to_string()),
            base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
        }
    }

    fn config_with_offset(hours: i32) -> Config {
        Config {
            storage: complete(),
            local_data_path: DEFAULT_LOCAL_DATA_PATH.into(),
            checksum_block_size: DEFAULT_CHECKSUM_BLOCK_SIZE,
            http_timeout_secs: 30,
            display_utc_offset_hours: hours,
            port: 3000,
            rust_log: "info".to_string(),
        }
    }

    #[test]
    fn display_offset_falls_back_to_utc_when_out_of_range() {
        assert_eq!(config_with_offset(9).display_offset().local_minus_utc(), 9 * 3600);
        assert_eq!(config_with_offset(-5).display_offset().local_minus_utc(), -5 * 3600);
        assert_eq!(config_with_offset(30).display_offset().local_minus_utc(), 0);
        assert_eq!(config_with_offset(i32::MAX).display_offset().local_minus_utc(), 0);
    }

    #[test]
    fn require_accepts_complete_settings() {
        let config = complete().require().unwrap();
        assert_eq!(config.bucket, "quiz-bucket");
        assert_eq!(config.checksum_object, "data.csv.gz.md5");
    }

    #[test]
    fn require_names_the_missing_key() {
        let mut settings = complete();
        settings.checksum_object = None;
        match settings.require() {
            Err(AppError::Configuration(msg)) => assert!(msg.contains("MD5_OBJECT")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn require_treats_blank_as_missing() {
        let mut settings = complete();
        settings.bucket = Some("   ".to_string());
        assert!(matches!(settings.require(), Err(AppError::Configuration(_))));
    }
}
