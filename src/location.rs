use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::geo_sample::GeoSample;

pub type SampleCallback = Arc<dyn Fn(GeoSample) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 5000,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("geolocation is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    Unsupported,
}

pub trait LocationSource: Send + Sync {
    fn watch(
        &self,
        options: &WatchOptions,
        on_sample: SampleCallback,
    ) -> Result<WatchId, LocationError>;

    /// After this returns the callback registered under `id` is not invoked again.
    fn clear_watch(&self, id: WatchId);
}

/// Location source fed by hand: positions pushed through [`emit`] are
/// delivered synchronously to every active watch. Backs the replay binary.
///
/// [`emit`]: ManualLocationSource::emit
pub struct ManualLocationSource {
    permission: Mutex<Permission>,
    next_id: AtomicU64,
    watchers: Mutex<HashMap<WatchId, SampleCallback>>,
}

impl ManualLocationSource {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
            next_id: AtomicU64::new(1),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = permission;
    }

    pub fn active_watches(&self) -> usize {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn emit(&self, sample: GeoSample) -> usize {
        // Callbacks run outside the lock so they may clear their own watch.
        let callbacks: Vec<SampleCallback> = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in &callbacks {
            callback(sample);
        }
        if callbacks.is_empty() {
            debug!("No active watch, position at {} dropped", sample.timestamp);
        }
        callbacks.len()
    }
}

impl LocationSource for ManualLocationSource {
    fn watch(
        &self,
        options: &WatchOptions,
        on_sample: SampleCallback,
    ) -> Result<WatchId, LocationError> {
        match *self.permission.lock().unwrap_or_else(PoisonError::into_inner) {
            Permission::Granted => {}
            Permission::Denied => return Err(LocationError::PermissionDenied),
            Permission::Unsupported => return Err(LocationError::Unsupported),
        }

        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, on_sample);
        info!(
            "Location watch {} registered (high_accuracy={}, maximum_age={}ms, timeout={}ms)",
            id.0, options.enable_high_accuracy, options.maximum_age_ms, options.timeout_ms
        );
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        if self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
        {
            info!("Location watch {} cleared", id.0);
        }
    }
}

/// Position as reported on the input stream. Coordinates and accuracy may
/// arrive as numbers or numeric strings; an empty speed is treated as unknown.
#[derive(Debug, Deserialize)]
pub struct Position {
    #[serde(deserialize_with = "parse_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub longitude: f64,
    #[serde(deserialize_with = "parse_f64")]
    pub accuracy: f64,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub speed: Option<f64>,
    pub timestamp: i64,
}

impl Position {
    pub fn into_sample(self) -> GeoSample {
        GeoSample {
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp: self.timestamp,
            accuracy: self.accuracy,
            speed: self.speed,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    parse_f64_option(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a number, got an empty value"))
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
