use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geo_sample::GeoSample;

pub const MIN_ROUTE_POINTS: usize = 2;

const ROUTE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c5a_8e7f_0d1b_2c3a_4f5e);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub geolocations: Vec<GeoSample>,
}

impl Route {
    /// Builds a route for `session_id`, or `None` when fewer than
    /// `MIN_ROUTE_POINTS` samples remain.
    pub fn from_session(
        session_id: Uuid,
        mut samples: Vec<GeoSample>,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        if samples.len() < MIN_ROUTE_POINTS {
            return None;
        }
        samples.sort_by_key(|s| s.timestamp);
        Some(Self {
            id: route_id_for_session(session_id),
            created_at,
            geolocations: samples,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.geolocations.len() >= MIN_ROUTE_POINTS
            && self
                .geolocations
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
    }
}

pub fn route_id_for_session(session_id: Uuid) -> Uuid {
    Uuid::new_v5(&ROUTE_NAMESPACE, session_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geo_sample::sample_at;

    #[test]
    fn test_single_sample_is_not_a_route() {
        assert!(Route::from_session(Uuid::new_v4(), vec![sample_at(0)], Utc::now()).is_none());
    }

    #[test]
    fn test_route_is_sorted_and_valid() {
        let session = Uuid::new_v4();
        let route = Route::from_session(
            session,
            vec![sample_at(2000), sample_at(0), sample_at(1000)],
            Utc::now(),
        )
        .unwrap();

        let timestamps: Vec<i64> = route.geolocations.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1000, 2000]);
        assert!(route.is_valid());
        assert_eq!(route.id, route_id_for_session(session));
    }

    #[test]
    fn test_route_json_uses_created_at() {
        let route =
            Route::from_session(Uuid::new_v4(), vec![sample_at(0), sample_at(1)], Utc::now())
                .unwrap();
        let json = serde_json::to_value(&route).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["geolocations"].as_array().unwrap().len(), 2);
    }
}
