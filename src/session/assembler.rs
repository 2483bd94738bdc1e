use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::SampleBuffer;
use crate::documents::RouteSink;
use crate::error::{RecorderError, RecorderResult};
use crate::models::activity::ActivityRef;
use crate::models::route::Route;

pub struct RouteAssembler<S: RouteSink + ?Sized> {
    buffer: SampleBuffer,
    sink: Arc<S>,
}

impl<S: RouteSink + ?Sized> RouteAssembler<S> {
    pub fn new(buffer: SampleBuffer, sink: Arc<S>) -> Self {
        Self { buffer, sink }
    }

    /// Builds the route for `session_id`, or `None` when fewer than two
    /// samples were buffered.
    pub async fn assemble(&self, session_id: Uuid) -> RecorderResult<Option<Route>> {
        let samples = self.buffer.samples_for_session(session_id).await?;
        let count = samples.len();
        let route = Route::from_session(session_id, samples, Utc::now());
        if route.is_none() {
            debug!("Session {} has {} samples, no route", session_id, count);
        }
        Ok(route)
    }

    /// Uploads the session's route under `activity`. The buffered samples are
    /// only removed once the upload succeeded, so a failed call can simply be
    /// repeated.
    pub async fn finalize(
        &self,
        activity: &ActivityRef,
        session_id: Uuid,
    ) -> RecorderResult<Option<Route>> {
        let Some(route) = self.assemble(session_id).await? else {
            return Ok(None);
        };
        self.upload(activity, session_id, &route).await?;

        if let Err(e) = self.buffer.delete_session(session_id).await {
            warn!("Route {} uploaded but buffer cleanup failed: {}", route.id, e);
        }
        Ok(Some(route))
    }

    pub async fn upload(
        &self,
        activity: &ActivityRef,
        session_id: Uuid,
        route: &Route,
    ) -> RecorderResult<()> {
        if let Err(e) = self.sink.create_route(activity, route).await {
            warn!(
                "Upload of route {} for session {} failed, samples kept for retry: {}",
                route.id, session_id, e
            );
            return Err(RecorderError::Upload(e));
        }

        info!(
            "Uploaded route {} ({} points) to activity {}",
            route.id,
            route.geolocations.len(),
            activity.activity_id
        );
        Ok(())
    }
}
