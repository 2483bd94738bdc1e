use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One GPS reading. `timestamp` is epoch milliseconds and doubles as the
/// buffer key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GeoSample {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
    pub accuracy: f64,
    pub speed: Option<f64>, // null when the platform cannot compute it
}

impl GeoSample {
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Inserts `sample` keeping `samples` sorted by timestamp. An existing sample
/// with the same timestamp is replaced.
pub fn upsert_sorted(samples: &mut Vec<GeoSample>, sample: GeoSample) {
    match samples.binary_search_by_key(&sample.timestamp, |s| s.timestamp) {
        Ok(idx) => samples[idx] = sample,
        Err(idx) => samples.insert(idx, sample),
    }
}

#[cfg(test)]
pub(crate) fn sample_at(timestamp: i64) -> GeoSample {
    GeoSample {
        latitude: 46.5 + timestamp as f64 * 1e-6,
        longitude: 6.6,
        timestamp,
        accuracy: 5.0,
        speed: Some(1.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sorted_orders_and_overwrites() {
        let mut samples = Vec::new();
        upsert_sorted(&mut samples, sample_at(2000));
        upsert_sorted(&mut samples, sample_at(0));
        upsert_sorted(&mut samples, sample_at(1000));

        let mut replacement = sample_at(1000);
        replacement.accuracy = 50.0;
        upsert_sorted(&mut samples, replacement);

        let timestamps: Vec<i64> = samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1000, 2000]);
        assert_eq!(samples[1].accuracy, 50.0);
    }

    #[test]
    fn test_null_speed_serializes() {
        let mut sample = sample_at(5);
        sample.speed = None;
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"speed\":null"));
        assert_eq!(sample.serialized_len(), json.len());
    }
}
