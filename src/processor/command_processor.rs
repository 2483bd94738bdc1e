use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::FileDocumentStore;
use crate::location::{ManualLocationSource, Permission, Position};
use crate::models::activity::{Activity, ActivityKind, ActivityRef};
use crate::reminders::InactivityMonitor;
use crate::session::assembler::RouteAssembler;
use crate::session::controller::SessionController;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    Position(Position),
    Finalize {
        #[serde(default)]
        activity_type: Option<String>,
    },
    DeleteDate {
        date: NaiveDate,
    },
    Size,
    List,
    Routes {
        activity_id: Uuid,
    },
    DeleteRoute {
        activity_id: Uuid,
        route_id: Uuid,
    },
    Permission {
        state: Permission,
    },
}

pub struct CommandProcessor {
    pub source: Arc<ManualLocationSource>,
    pub controller: SessionController<ManualLocationSource>,
    pub assembler: RouteAssembler<FileDocumentStore>,
    pub store: Arc<FileDocumentStore>,
    pub monitor: InactivityMonitor,
    pub user_id: String,
}

impl CommandProcessor {
    pub async fn process_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let command: Command = match serde_json::from_str(line) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to parse command: {}", e);
                return;
            }
        };
        if let Err(e) = self.process_command(command).await {
            error!("Command failed: {:#}", e);
        }
    }

    pub async fn process_command(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Start => {
                self.controller.start()?;
                self.monitor.record_activity(Utc::now());
            }
            Command::Pause => self.controller.pause()?,
            Command::Resume => self.controller.resume()?,
            Command::Stop => {
                self.controller.stop().await?;
            }
            Command::Reset => self.controller.reset().await?,
            Command::Position(position) => {
                self.source.emit(position.into_sample());
            }
            Command::Finalize { activity_type } => self.finalize(activity_type.as_deref()).await?,
            Command::DeleteDate { date } => {
                self.controller.buffer().delete_by_date(date).await?;
            }
            Command::Size => {
                let bytes = self.controller.buffer().estimate_size().await?;
                info!("Sample buffer holds {} bytes", bytes);
            }
            Command::List => {
                let samples = self.controller.buffer().get_all().await?;
                info!(
                    "{} buffered samples, status {}, {} in current session, {} active watches, last activity {}",
                    samples.len(),
                    self.controller.status(),
                    self.controller.samples().len(),
                    self.source.active_watches(),
                    self.monitor.last_activity()
                );
                for sample in &samples {
                    info!(
                        "  t={} lat={} lon={} acc={} speed={:?}",
                        sample.timestamp,
                        sample.latitude,
                        sample.longitude,
                        sample.accuracy,
                        sample.speed
                    );
                }
            }
            Command::Routes { activity_id } => {
                let target = self.activity_ref(activity_id);
                let Some(activity) = self.store.get_activity(&target).await? else {
                    warn!("Activity {} not found", activity_id);
                    return Ok(());
                };
                let routes = self.store.list_routes(&target).await?;
                info!(
                    "{} activity {} has {} routes",
                    activity.kind.type_name(),
                    activity_id,
                    routes.len()
                );
                for route in &routes {
                    info!(
                        "  route {} created {} with {} points",
                        route.id,
                        route.created_at,
                        route.geolocations.len()
                    );
                }
            }
            Command::DeleteRoute {
                activity_id,
                route_id,
            } => {
                let target = self.activity_ref(activity_id);
                if !self.store.delete_route(&target, route_id).await? {
                    warn!("Route {} not found under activity {}", route_id, activity_id);
                }
            }
            Command::Permission { state } => {
                info!("Location permission set to {:?}", state);
                self.source.set_permission(state);
            }
        }
        Ok(())
    }

    fn activity_ref(&self, activity_id: Uuid) -> ActivityRef {
        ActivityRef {
            user_id: self.user_id.clone(),
            activity_id,
        }
    }

    /// Uploads a route for every session still in the buffer, each under a
    /// fresh activity of `activity_type` (driving by default). Sessions whose
    /// upload fails stay buffered for the next `finalize`.
    async fn finalize(&mut self, activity_type: Option<&str>) -> anyhow::Result<()> {
        let kind = match activity_type {
            Some(name) => ActivityKind::from_type_name(name)
                .ok_or_else(|| anyhow::anyhow!("unknown activity type '{}'", name))?,
            None => ActivityKind::Driving {
                duration_minutes: None,
            },
        };
        anyhow::ensure!(
            kind.has_route(),
            "'{}' activities have no route",
            kind.type_name()
        );

        let active = self
            .controller
            .status()
            .is_capturing()
            .then(|| self.controller.session_id())
            .flatten();

        for session_id in self.controller.buffer().pending_sessions().await? {
            if Some(session_id) == active {
                info!("Session {} still recording, not finalized", session_id);
                continue;
            }
            let Some(route) = self.assembler.assemble(session_id).await? else {
                info!("Session {} too short for a route, discarding", session_id);
                self.controller.buffer().delete_session(session_id).await?;
                continue;
            };

            let activity = Activity::for_route(route.id, kind.clone(), route.created_at);
            let target = self.activity_ref(activity.id);
            if let Err(e) = self.assembler.upload(&target, session_id, &route).await {
                warn!("Session {} kept for retry: {}", session_id, e);
                continue;
            }
            // Samples stay buffered until the parent activity exists too.
            self.store.create_activity(&self.user_id, &activity).await?;
            if let Err(e) = self.controller.buffer().delete_session(session_id).await {
                warn!("Route {} uploaded but buffer cleanup failed: {}", route.id, e);
            }
            self.monitor.record_activity(activity.created_at);
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if self.controller.status().is_capturing() {
            if let Err(e) = self.controller.stop().await {
                error!("Failed to stop recording on shutdown: {}", e);
            }
        }
        if self.monitor.is_running() {
            self.monitor.stop().await;
        }
    }
}
