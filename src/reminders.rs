use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// tokio::time::interval panics on a zero period.
const MIN_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub title: String,
    pub body: String,
    pub last_activity: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, reminder: &'a Reminder) -> BoxFuture<'a, anyhow::Result<()>>;
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, reminder: &'a Reminder) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(
                title = %reminder.title,
                last_activity = %reminder.last_activity,
                "{}",
                reminder.body
            );
            Ok(())
        })
    }
}

struct ActivityClock {
    last_activity: DateTime<Utc>,
    notified: bool,
}

struct Ticker {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Periodically checks how long the user has been inactive and sends one
/// reminder per inactive stretch. The timer lives only between `start` and
/// `stop`.
pub struct InactivityMonitor {
    notifier: Arc<dyn Notifier>,
    threshold: Duration,
    check_interval: std::time::Duration,
    clock: Arc<Mutex<ActivityClock>>,
    ticker: Option<Ticker>,
}

impl InactivityMonitor {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        threshold: Duration,
        check_interval: std::time::Duration,
        last_activity: DateTime<Utc>,
    ) -> Self {
        Self {
            notifier,
            threshold,
            check_interval: check_interval.max(MIN_CHECK_INTERVAL),
            clock: Arc::new(Mutex::new(ActivityClock {
                last_activity,
                notified: false,
            })),
            ticker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Marks the user active at `at` and re-arms the reminder. Older
    /// timestamps are ignored.
    pub fn record_activity(&self, at: DateTime<Utc>) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if at > clock.last_activity {
            clock.last_activity = at;
            clock.notified = false;
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_activity
    }

    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let (cancel, mut cancelled) = oneshot::channel();
        let notifier = self.notifier.clone();
        let clock = self.clock.clone();
        let threshold = self.threshold;
        let mut interval = tokio::time::interval(self.check_interval);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = interval.tick() => {
                        check_inactivity(&clock, notifier.as_ref(), threshold, Utc::now()).await;
                    }
                }
            }
        });
        self.ticker = Some(Ticker { cancel, task });
        info!(
            "Inactivity reminders armed (threshold {}h, every {:?})",
            self.threshold.num_hours(),
            self.check_interval
        );
    }

    pub async fn stop(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };
        let _ = ticker.cancel.send(());
        if let Err(e) = ticker.task.await {
            warn!("Inactivity timer task failed: {}", e);
        }
        info!("Inactivity reminders disarmed");
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.task.abort();
        }
    }
}

/// Sends a reminder when `now` is at least `threshold` past the last
/// activity and none was sent yet. Returns whether one was sent.
async fn check_inactivity(
    clock: &Mutex<ActivityClock>,
    notifier: &dyn Notifier,
    threshold: Duration,
    now: DateTime<Utc>,
) -> bool {
    let last_activity = {
        let clock = clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.notified || now - clock.last_activity < threshold {
            return false;
        }
        clock.last_activity
    };

    let reminder = Reminder {
        title: "Time to move".to_string(),
        body: format!(
            "Nothing logged for {} hours.",
            (now - last_activity).num_hours()
        ),
        last_activity,
    };
    if let Err(e) = notifier.notify(&reminder).await {
        warn!("Failed to deliver inactivity reminder: {}", e);
        return false;
    }

    let mut clock = clock.lock().unwrap_or_else(PoisonError::into_inner);
    // Activity recorded while the notification was in flight re-armed the clock.
    if clock.last_activity == last_activity {
        clock.notified = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        fail: AtomicBool,
        sent: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify<'a>(&'a self, _reminder: &'a Reminder) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    anyhow::bail!("notification permission not granted");
                }
                self.sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn clock_at(last_activity: DateTime<Utc>) -> Mutex<ActivityClock> {
        Mutex::new(ActivityClock {
            last_activity,
            notified: false,
        })
    }

    #[tokio::test]
    async fn test_reminder_sent_once_per_inactive_stretch() {
        let notifier = CountingNotifier::default();
        let start = Utc::now();
        let clock = clock_at(start);
        let threshold = Duration::hours(48);

        assert!(!check_inactivity(&clock, &notifier, threshold, start + Duration::hours(47)).await);
        assert!(check_inactivity(&clock, &notifier, threshold, start + Duration::hours(48)).await);
        assert!(!check_inactivity(&clock, &notifier, threshold, start + Duration::hours(72)).await);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_check() {
        let notifier = CountingNotifier::default();
        notifier.fail.store(true, Ordering::SeqCst);
        let start = Utc::now();
        let clock = clock_at(start);
        let threshold = Duration::hours(1);

        assert!(!check_inactivity(&clock, &notifier, threshold, start + Duration::hours(2)).await);
        notifier.fail.store(false, Ordering::SeqCst);
        assert!(check_inactivity(&clock, &notifier, threshold, start + Duration::hours(3)).await);
    }

    #[tokio::test]
    async fn test_record_activity_rearms() {
        let notifier = Arc::new(CountingNotifier::default());
        let start = Utc::now() - Duration::hours(10);
        let monitor = InactivityMonitor::new(
            notifier.clone(),
            Duration::hours(1),
            std::time::Duration::from_secs(60),
            start,
        );

        let now = Utc::now();
        assert!(check_inactivity(&monitor.clock, notifier.as_ref(), monitor.threshold, now).await);

        monitor.record_activity(start);
        assert!(!check_inactivity(&monitor.clock, notifier.as_ref(), monitor.threshold, now).await);

        monitor.record_activity(now);
        assert_eq!(monitor.last_activity(), now);
        let later = now + Duration::hours(2);
        assert!(check_inactivity(&monitor.clock, notifier.as_ref(), monitor.threshold, later).await);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_stops() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut monitor = InactivityMonitor::new(
            notifier.clone(),
            Duration::hours(1),
            std::time::Duration::from_secs(60),
            Utc::now() - Duration::hours(5),
        );

        monitor.start();
        assert!(monitor.is_running());
        tokio::time::sleep(std::time::Duration::from_secs(150)).await;
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        monitor.stop().await;
        assert!(!monitor.is_running());
        monitor.record_activity(Utc::now() - Duration::hours(3));
        tokio::time::sleep(std::time::Duration::from_secs(300)).await;
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_check_interval_still_ticks() {
        let notifier = Arc::new(CountingNotifier::default());
        let mut monitor = InactivityMonitor::new(
            notifier.clone(),
            Duration::hours(1),
            std::time::Duration::ZERO,
            Utc::now() - Duration::hours(5),
        );

        monitor.start();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
        monitor.stop().await;
    }
}
