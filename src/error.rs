use thiserror::Error;

use crate::location::LocationError;
use crate::session::controller::SessionStatus;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("location unavailable: {0}")]
    Location(#[from] LocationError),
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: &'static str,
    },
    #[error("sample buffer error: {0}")]
    Buffer(#[from] sqlx::Error),
    #[error("route upload failed: {0}")]
    Upload(#[source] anyhow::Error),
}

pub type RecorderResult<T> = Result<T, RecorderError>;
