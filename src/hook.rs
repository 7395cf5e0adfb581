use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};

use crate::backend::Backend;
use crate::config::Settings;
use crate::event::LogEvent;
use crate::normalize::normalize;
use crate::severity::Severity;
use crate::sink::DeliveryError;
use crate::DIAGNOSTIC_TARGET;

/// Callback invoked with every delivery failure, after the failure has
/// been logged and counted.
pub type FailureObserver = Arc<dyn Fn(&DeliveryError) + Send + Sync>;

/// Dispatches log events to the configured backend.
///
/// Every [`fire`](Hook::fire) spawns one delivery task on the runtime
/// captured at build time, so events can be fired from async and plain
/// threads alike. The caller is never blocked and never sees a delivery
/// error; see [`fire`](Hook::fire) for the failure contract.
///
/// Cheap to clone. All clones share the same backend, wait group and
/// counters.
#[derive(Clone)]
pub struct Hook {
    pub(crate) settings: Arc<Settings>,
    backend: Arc<Backend>,
    wait_group: Arc<WaitGroup>,
    limiter: Option<Arc<Semaphore>>,
    observer: Option<FailureObserver>,
    runtime: tokio::runtime::Handle,
    /// Deliveries spawned (one per fire).
    pub fired_events: Arc<AtomicU64>,
    /// Deliveries that failed and were dropped.
    pub failed_events: Arc<AtomicU64>,
}

impl Hook {
    pub(crate) fn assemble(
        settings: Settings,
        backend: Backend,
        runtime: tokio::runtime::Handle,
        max_in_flight: Option<usize>,
        observer: Option<FailureObserver>,
    ) -> Hook {
        Hook {
            settings: Arc::new(settings),
            backend: Arc::new(backend),
            wait_group: Arc::new(WaitGroup::new()),
            // A cap of zero would park every delivery forever.
            limiter: max_in_flight.map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            observer,
            runtime,
            fired_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Severities this hook claims. The tracing layer consults this
    /// before firing; direct callers may ignore it.
    pub fn levels(&self) -> &[Severity] {
        &self.settings.levels
    }

    /// Whether the hook claims the given severity.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.settings.levels.contains(&severity)
    }

    /// Effective settings of this hook, with defaults applied and log
    /// names fully qualified.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Hands one event to the backend and returns immediately.
    ///
    /// Each call registers with the wait group and spawns one delivery
    /// task. Deliveries are unordered and never retried; a failure is
    /// logged on the diagnostic stream, counted, handed to the failure
    /// observer and dropped. Fire itself does not filter by severity.
    pub fn fire(&self, event: LogEvent) {
        self.fired_events.fetch_add(1, Ordering::Relaxed);
        let guard = self.wait_group.register();
        let hook = self.clone();
        self.runtime.spawn(async move {
            let _guard = guard;
            let _permit = match &hook.limiter {
                Some(limiter) => limiter.acquire().await.ok(),
                None => None,
            };
            hook.deliver(&event).await;
        });
    }

    async fn deliver(&self, event: &LogEvent) {
        let record = normalize(&event.fields);
        if let Err(error) = self.backend.deliver(&self.settings, event, &record).await {
            self.failed_events.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                target: DIAGNOSTIC_TARGET,
                error = %error,
                "cannot deliver log event"
            );
            if let Some(observer) = &self.observer {
                observer(&error);
            }
        }
    }

    /// Resolves once every delivery spawned so far has settled. Call
    /// before shutdown to make sure all events left the process.
    pub async fn wait(&self) {
        self.wait_group.wait().await;
    }

    /// Bounded variant of [`wait`](Hook::wait). Returns `false` when
    /// deliveries were still in flight as the timeout expired; they
    /// keep running in the background.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Number of deliveries currently in flight.
    pub fn in_flight(&self) -> usize {
        self.wait_group.count()
    }
}

/// Counts in-flight deliveries. Register before spawning; the returned
/// guard decrements when dropped, so a panicking delivery still
/// settles.
struct WaitGroup {
    count: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    fn new() -> WaitGroup {
        WaitGroup {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn register(self: &Arc<Self>) -> WaitGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        WaitGuard {
            group: Arc::clone(self),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            // Created before the check so a decrement between the load
            // and the await still wakes us.
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct WaitGuard {
    group: Arc<WaitGroup>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.group.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.group.notify.notify_waiters();
        }
    }
}
