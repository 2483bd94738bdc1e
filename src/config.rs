use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::location::WatchOptions;

const DEFAULT_REMINDER_INACTIVITY_HOURS: i64 = 48;
const DEFAULT_REMINDER_CHECK_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_name: String,
    pub document_root: PathBuf,
    pub user_id: String,
    pub location_high_accuracy: bool,
    pub location_maximum_age_ms: u64,
    pub location_timeout_ms: u64,
    pub reminder_inactivity_hours: i64,
    pub reminder_check_interval_secs: u64,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let data_dir = PathBuf::from(
            env::var("RECORDER_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );
        let db_name = env::var("RECORDER_DB_NAME").unwrap_or_else(|_| "geolocations".to_string());
        let document_root = PathBuf::from(
            env::var("DOCUMENT_ROOT").unwrap_or_else(|_| "./documents".to_string()),
        );
        let user_id = env::var("RECORDER_USER_ID").unwrap_or_else(|_| "local".to_string());

        let location_high_accuracy = env_or("LOCATION_HIGH_ACCURACY", true);
        let location_maximum_age_ms = env_or("LOCATION_MAXIMUM_AGE_MS", 0);
        let location_timeout_ms = env_or("LOCATION_TIMEOUT_MS", 5000);

        let reminder_inactivity_hours =
            env_positive_or("REMINDER_INACTIVITY_HOURS", DEFAULT_REMINDER_INACTIVITY_HOURS);
        let reminder_check_interval_secs =
            env_positive_or("REMINDER_CHECK_INTERVAL_SECS", DEFAULT_REMINDER_CHECK_INTERVAL_SECS);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            data_dir,
            db_name,
            document_root,
            user_id,
            location_high_accuracy,
            location_maximum_age_ms,
            location_timeout_ms,
            reminder_inactivity_hours,
            reminder_check_interval_secs,
            log_level,
        })
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", self.db_name))
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            enable_high_accuracy: self.location_high_accuracy,
            maximum_age_ms: self.location_maximum_age_ms,
            timeout_ms: self.location_timeout_ms,
        }
    }

    pub fn reminder_threshold(&self) -> chrono::Duration {
        let hours = if self.reminder_inactivity_hours > 0 {
            self.reminder_inactivity_hours
        } else {
            DEFAULT_REMINDER_INACTIVITY_HOURS
        };
        chrono::Duration::try_hours(hours)
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_REMINDER_INACTIVITY_HOURS))
    }

    pub fn reminder_check_interval(&self) -> Duration {
        match self.reminder_check_interval_secs {
            0 => Duration::from_secs(DEFAULT_REMINDER_CHECK_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// Zero or negative periods fall back to the default.
fn env_positive_or<T: FromStr + PartialOrd + Default>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_values_fall_back() {
        env::set_var("ROUTE_RECORDER_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("ROUTE_RECORDER_TEST_NUMBER", 42u64), 42);
        env::set_var("ROUTE_RECORDER_TEST_NUMBER", " 7 ");
        assert_eq!(env_or("ROUTE_RECORDER_TEST_NUMBER", 42u64), 7);
        assert!(!env_or("ROUTE_RECORDER_TEST_MISSING_FLAG", false));
    }

    fn test_config() -> AppConfig {
        AppConfig {
            data_dir: PathBuf::from("/tmp/recorder"),
            db_name: "driving".to_string(),
            document_root: PathBuf::from("/tmp/docs"),
            user_id: "u1".to_string(),
            location_high_accuracy: true,
            location_maximum_age_ms: 0,
            location_timeout_ms: 5000,
            reminder_inactivity_hours: 48,
            reminder_check_interval_secs: 3600,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_zero_check_interval_falls_back() {
        env::set_var("ROUTE_RECORDER_TEST_INTERVAL", "0");
        assert_eq!(env_positive_or("ROUTE_RECORDER_TEST_INTERVAL", 3600u64), 3600);
        env::set_var("ROUTE_RECORDER_TEST_INTERVAL", "30");
        assert_eq!(env_positive_or("ROUTE_RECORDER_TEST_INTERVAL", 3600u64), 30);

        let mut config = test_config();
        config.reminder_check_interval_secs = 0;
        assert_eq!(config.reminder_check_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_out_of_range_inactivity_hours_fall_back() {
        env::set_var("ROUTE_RECORDER_TEST_HOURS", "-5");
        assert_eq!(env_positive_or("ROUTE_RECORDER_TEST_HOURS", 48i64), 48);

        let mut config = test_config();
        config.reminder_inactivity_hours = i64::MAX;
        assert_eq!(config.reminder_threshold(), chrono::Duration::hours(48));
        config.reminder_inactivity_hours = 0;
        assert_eq!(config.reminder_threshold(), chrono::Duration::hours(48));
        config.reminder_inactivity_hours = 12;
        assert_eq!(config.reminder_threshold(), chrono::Duration::hours(12));
    }

    #[test]
    fn test_buffer_path_uses_db_name() {
        let config = test_config();
        assert_eq!(config.buffer_path(), PathBuf::from("/tmp/recorder/driving.sqlite"));
        assert_eq!(config.watch_options().timeout_ms, 5000);
    }
}
