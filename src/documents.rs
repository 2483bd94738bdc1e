use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::activity::{Activity, ActivityRef};
use crate::models::route::Route;

pub trait RouteSink: Send + Sync {
    fn create_route<'a>(
        &'a self,
        activity: &'a ActivityRef,
        route: &'a Route,
    ) -> BoxFuture<'a, Result<()>>;
}

/// JSON documents on disk laid out like the hosted collections:
/// `users/{user}/activities/{activity}.json` with routes in
/// `users/{user}/activities/{activity}/routes/{route}.json`.
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn activities_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("users").join(user_id).join("activities")
    }

    fn activity_path(&self, activity: &ActivityRef) -> PathBuf {
        self.activities_dir(&activity.user_id)
            .join(format!("{}.json", activity.activity_id))
    }

    fn routes_dir(&self, activity: &ActivityRef) -> PathBuf {
        self.activities_dir(&activity.user_id)
            .join(activity.activity_id.to_string())
            .join("routes")
    }

    pub async fn create_activity(&self, user_id: &str, activity: &Activity) -> Result<ActivityRef> {
        let target = ActivityRef {
            user_id: user_id.to_string(),
            activity_id: activity.id,
        };
        write_json(&self.activity_path(&target), activity).await?;
        info!(
            "Created {} activity {} for user {}",
            activity.kind.type_name(),
            activity.id,
            user_id
        );
        Ok(target)
    }

    pub async fn get_activity(&self, activity: &ActivityRef) -> Result<Option<Activity>> {
        read_json(&self.activity_path(activity)).await
    }

    pub async fn put_route(&self, activity: &ActivityRef, route: &Route) -> Result<()> {
        anyhow::ensure!(
            route.is_valid(),
            "route {} has {} unordered or missing points",
            route.id,
            route.geolocations.len()
        );
        let path = self.routes_dir(activity).join(format!("{}.json", route.id));
        write_json(&path, route).await?;
        debug!("Wrote route document {}", path.display());
        Ok(())
    }

    pub async fn list_routes(&self, activity: &ActivityRef) -> Result<Vec<Route>> {
        let dir = self.routes_dir(activity);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
        };

        let mut routes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(route) = read_json::<Route>(&path).await? {
                routes.push(route);
            }
        }
        routes.sort_by_key(|r| r.created_at);
        Ok(routes)
    }

    pub async fn delete_route(&self, activity: &ActivityRef, route_id: Uuid) -> Result<bool> {
        let path = self.routes_dir(activity).join(format!("{}.json", route_id));
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted route {} of activity {}", route_id, activity.activity_id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
        }
    }
}

impl RouteSink for FileDocumentStore {
    fn create_route<'a>(
        &'a self,
        activity: &'a ActivityRef,
        route: &'a Route,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.put_route(activity, route))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    // Write-then-rename so readers never see a half-written document.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}
