pub const CREATE_GEO_SAMPLES: &str = r#"
CREATE TABLE IF NOT EXISTS geo_samples (
    timestamp INTEGER PRIMARY KEY,
    session_id TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL NOT NULL,
    speed REAL
);
"#;

pub const CREATE_GEO_SAMPLES_SESSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_geo_samples_session ON geo_samples (session_id, timestamp);
"#;

pub const UPSERT_GEO_SAMPLE: &str = r#"
INSERT INTO geo_samples (timestamp, session_id, latitude, longitude, accuracy, speed)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (timestamp) DO UPDATE
SET session_id = excluded.session_id,
    latitude = excluded.latitude,
    longitude = excluded.longitude,
    accuracy = excluded.accuracy,
    speed = excluded.speed;
"#;

pub const SELECT_ALL_SAMPLES: &str = r#"
SELECT latitude, longitude, timestamp, accuracy, speed FROM geo_samples ORDER BY timestamp ASC;
"#;

pub const SELECT_SESSION_SAMPLES: &str = r#"
SELECT latitude, longitude, timestamp, accuracy, speed FROM geo_samples
WHERE session_id = $1
ORDER BY timestamp ASC;
"#;

pub const SELECT_SESSION_IDS: &str = r#"
SELECT session_id FROM geo_samples GROUP BY session_id ORDER BY MIN(timestamp) ASC;
"#;

pub const DELETE_ALL_SAMPLES: &str = r#"
DELETE FROM geo_samples;
"#;

pub const DELETE_SESSION_SAMPLES: &str = r#"
DELETE FROM geo_samples WHERE session_id = $1;
"#;

pub const DELETE_SAMPLES_BETWEEN: &str = r#"
DELETE FROM geo_samples WHERE timestamp >= $1 AND timestamp < $2;
"#;
