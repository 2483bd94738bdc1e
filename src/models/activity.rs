use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityKind {
    Workout {
        name: String,
        #[serde(default)]
        duration_minutes: Option<u32>,
    },
    Climbing {
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        grades: Vec<String>,
    },
    Driving {
        #[serde(default)]
        duration_minutes: Option<u32>,
    },
    Swimming {
        #[serde(default)]
        distance_meters: Option<f64>,
    },
    Running {
        #[serde(default)]
        distance_meters: Option<f64>,
    },
}

impl ActivityKind {
    /// Parses the short `type` name used on the command stream into an empty
    /// payload of that kind.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "workout" => Some(Self::Workout {
                name: String::new(),
                duration_minutes: None,
            }),
            "climbing" => Some(Self::Climbing {
                location: None,
                grades: Vec::new(),
            }),
            "driving" => Some(Self::Driving { duration_minutes: None }),
            "swimming" => Some(Self::Swimming { distance_meters: None }),
            "running" => Some(Self::Running { distance_meters: None }),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Workout { .. } => "workout",
            Self::Climbing { .. } => "climbing",
            Self::Driving { .. } => "driving",
            Self::Swimming { .. } => "swimming",
            Self::Running { .. } => "running",
        }
    }

    pub fn has_route(&self) -> bool {
        matches!(
            self,
            Self::Driving { .. } | Self::Swimming { .. } | Self::Running { .. }
        )
    }
}

impl Activity {
    pub fn with_id(id: Uuid, kind: ActivityKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            kind,
        }
    }

    /// Activity owning `route`. The id is derived from the route id so a
    /// retried upload targets the same document.
    pub fn for_route(route_id: Uuid, kind: ActivityKind, created_at: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v5(&route_id, b"activity"), kind, created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRef {
    pub user_id: String,
    pub activity_id: Uuid,
}
