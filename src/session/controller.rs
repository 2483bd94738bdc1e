use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::SampleBuffer;
use crate::error::{RecorderError, RecorderResult};
use crate::location::{LocationSource, WatchId, WatchOptions};
use crate::models::geo_sample::{upsert_sorted, GeoSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl SessionStatus {
    pub fn is_capturing(self) -> bool {
        matches!(self, SessionStatus::Recording | SessionStatus::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Shared {
    status: SessionStatus,
    session_id: Option<Uuid>,
    samples: Vec<GeoSample>,
    // Taken on stop so a late callback can no longer queue writes.
    writer: Option<mpsc::UnboundedSender<GeoSample>>,
}

struct ActiveWatch {
    id: WatchId,
    writer_task: JoinHandle<()>,
}

/// Owns one GPS recording at a time: the location subscription, the
/// in-memory samples and the writer that mirrors them into the buffer.
pub struct SessionController<L: LocationSource> {
    source: Arc<L>,
    buffer: SampleBuffer,
    options: WatchOptions,
    shared: Arc<Mutex<Shared>>,
    watch: Option<ActiveWatch>,
}

impl<L: LocationSource> SessionController<L> {
    pub fn new(source: Arc<L>, buffer: SampleBuffer, options: WatchOptions) -> Self {
        Self {
            source,
            buffer,
            options,
            shared: Arc::new(Mutex::new(Shared {
                status: SessionStatus::Idle,
                session_id: None,
                samples: Vec::new(),
                writer: None,
            })),
            watch: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.lock().session_id
    }

    pub fn samples(&self) -> Vec<GeoSample> {
        self.lock().samples.clone()
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Opens a new session and subscribes to location updates. Must be called
    /// from within a Tokio runtime.
    pub fn start(&mut self) -> RecorderResult<Uuid> {
        let from = self.status();
        if !matches!(from, SessionStatus::Idle | SessionStatus::Stopped) {
            return Err(RecorderError::InvalidTransition { from, action: "start" });
        }

        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = self.shared.clone();
        let callback = Arc::new(move |sample: GeoSample| on_sample(&shared, sample));

        // Install the writer before subscribing: the source may deliver
        // synchronously from inside `watch`.
        let (previous_id, previous_samples) = {
            let mut shared = self.lock();
            shared.status = SessionStatus::Recording;
            shared.writer = Some(tx);
            (
                shared.session_id.replace(session_id),
                std::mem::take(&mut shared.samples),
            )
        };

        let id = match self.source.watch(&self.options, callback) {
            Ok(id) => id,
            Err(e) => {
                let mut shared = self.lock();
                shared.status = from;
                shared.session_id = previous_id;
                shared.samples = previous_samples;
                shared.writer = None;
                error!("Cannot start recording: {}", e);
                return Err(e.into());
            }
        };

        let writer_task = tokio::spawn(run_writer(self.buffer.clone(), session_id, rx));
        self.watch = Some(ActiveWatch { id, writer_task });

        info!("Recording session {} started", session_id);
        Ok(session_id)
    }

    pub fn pause(&mut self) -> RecorderResult<()> {
        self.transition("pause", SessionStatus::Recording, SessionStatus::Paused)
    }

    pub fn resume(&mut self) -> RecorderResult<()> {
        self.transition("resume", SessionStatus::Paused, SessionStatus::Recording)
    }

    fn transition(
        &mut self,
        action: &'static str,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> RecorderResult<()> {
        let mut shared = self.lock();
        if shared.status != expected {
            return Err(RecorderError::InvalidTransition {
                from: shared.status,
                action,
            });
        }
        shared.status = next;
        info!(
            "Session {} {} -> {}",
            shared.session_id.map(|id| id.to_string()).unwrap_or_default(),
            expected,
            next
        );
        Ok(())
    }

    /// Unsubscribes and waits until every queued sample has been written.
    /// The buffer is left untouched.
    pub async fn stop(&mut self) -> RecorderResult<Uuid> {
        let from = self.status();
        if !from.is_capturing() {
            return Err(RecorderError::InvalidTransition { from, action: "stop" });
        }

        self.teardown().await;

        let mut shared = self.lock();
        shared.status = SessionStatus::Stopped;
        let session_id = shared.session_id.unwrap_or_default();
        info!(
            "Recording session {} stopped with {} samples",
            session_id,
            shared.samples.len()
        );
        Ok(session_id)
    }

    /// Stops any active recording, empties the buffer and returns to idle.
    pub async fn reset(&mut self) -> RecorderResult<()> {
        self.teardown().await;
        {
            let mut shared = self.lock();
            shared.status = SessionStatus::Idle;
            shared.session_id = None;
            shared.samples.clear();
        }
        info!("Recorder reset");
        self.buffer.clear().await?;
        Ok(())
    }

    async fn teardown(&mut self) {
        let Some(watch) = self.watch.take() else {
            return;
        };
        self.source.clear_watch(watch.id);
        // Dropping the last sender lets the writer drain its queue and exit.
        self.lock().writer = None;
        if let Err(e) = watch.writer_task.await {
            error!("Sample writer task failed: {}", e);
        }
    }
}

impl<L: LocationSource> Drop for SessionController<L> {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.source.clear_watch(watch.id);
        }
    }
}

fn on_sample(shared: &Mutex<Shared>, sample: GeoSample) {
    let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
    if shared.status != SessionStatus::Recording {
        debug!("Discarding sample at {} while {}", sample.timestamp, shared.status);
        return;
    }
    let Some(writer) = shared.writer.clone() else {
        debug!("Discarding sample at {} after unsubscribe", sample.timestamp);
        return;
    };

    upsert_sorted(&mut shared.samples, sample);
    if writer.send(sample).is_err() {
        warn!("Sample writer is gone, sample at {} kept in memory only", sample.timestamp);
    }
}

async fn run_writer(
    buffer: SampleBuffer,
    session_id: Uuid,
    mut samples: mpsc::UnboundedReceiver<GeoSample>,
) {
    let mut written = 0usize;
    while let Some(sample) = samples.recv().await {
        match buffer.append(session_id, &sample).await {
            Ok(()) => written += 1,
            Err(e) => warn!(
                "Failed to buffer sample at {} for session {}: {}",
                sample.timestamp, session_id, e
            ),
        }
    }
    debug!("Writer for session {} finished after {} samples", session_id, written);
}
