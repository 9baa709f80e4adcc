//! Keeps the rule cache in step with the live services.
//!
//! Three triggers run the same refresh routine:
//!
//! - **periodic**: a fixed delay after the end of the previous cycle
//! - **topology**: discovery change notifications, at most one per
//!   debounce window, extras dropped
//! - **manual**: [`RuleDistributionLoader::reload`], run by the caller
//!
//! The periodic and topology triggers share one worker task, and manual
//! reloads take the same cycle lock, so cycles never overlap. Registry events
//! are debounced by a separate listener as they arrive, so events landing
//! while a cycle runs are judged by their arrival time.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bastion_config::GatewaySettings;
use bastion_core::ServiceRuleSet;
use bastion_telemetry::metrics::{
    record_event_suppressed, record_fetch_failure, record_refresh, set_cached_services,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::cache::RuleCache;
use crate::debounce::Debouncer;
use crate::discovery::{Discovery, TopologyEvent};
use crate::error::{GatewayError, GatewayResult};
use crate::source::RuleSource;

/// At most one event-driven refresh starts per window.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// Maximum concurrent rule fetches within one cycle.
pub const FANOUT_LIMIT: usize = 8;

/// Time allowed for one service to answer.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Loader timing and filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Delay between the end of one periodic cycle and the next.
    pub refresh_interval: Duration,
    /// Delay before the first periodic cycle.
    pub initial_delay: Duration,
    /// Services never fetched, compared case-insensitively.
    pub excluded_services: Vec<String>,
    /// Debounce window for topology events.
    pub debounce_window: Duration,
    /// Maximum concurrent fetches.
    pub fanout_limit: usize,
    /// Per-fetch timeout.
    pub fetch_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from_settings(&GatewaySettings::default())
    }
}

impl LoaderConfig {
    /// Builds the loader configuration from the gateway section.
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            refresh_interval: Duration::from_millis(settings.refresh_interval_ms),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            excluded_services: settings.excluded_service_names.clone(),
            debounce_window: DEBOUNCE_WINDOW,
            fanout_limit: FANOUT_LIMIT,
            fetch_timeout: FETCH_TIMEOUT,
        }
    }

    /// Set the periodic refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the delay before the first periodic refresh.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Replace the excluded service names.
    pub fn with_excluded_services<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_services = names.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `service` is never fetched.
    pub fn is_excluded(&self, service: &str) -> bool {
        self.excluded_services
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(service))
    }
}

/// What started a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    /// The fixed-delay timer.
    Periodic,
    /// A discovery topology change.
    Topology,
    /// An administrative reload.
    Manual,
}

impl RefreshTrigger {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Topology => "topology",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    /// What started the cycle.
    pub trigger: RefreshTrigger,
    /// Distinct services listed by discovery.
    pub discovered: usize,
    /// Services skipped as infrastructure.
    pub excluded: usize,
    /// Services whose cache entry was replaced, sorted.
    pub updated: Vec<String>,
    /// Services whose fetch failed, sorted.
    pub failed: Vec<String>,
    /// Whether discovery itself failed.
    pub discovery_failed: bool,
    /// Wall time of the cycle.
    pub duration: Duration,
    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
}

impl RefreshSummary {
    fn new(trigger: RefreshTrigger) -> Self {
        Self {
            trigger,
            discovered: 0,
            excluded: 0,
            updated: Vec::new(),
            failed: Vec::new(),
            discovery_failed: false,
            duration: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }
}

/// State shared between the loader handle and its worker.
struct Shared {
    discovery: Arc<dyn Discovery>,
    source: Arc<dyn RuleSource>,
    cache: RuleCache,
    config: LoaderConfig,
    debouncer: Debouncer,
    cycle: tokio::sync::Mutex<()>,
    last: RwLock<Option<RefreshSummary>>,
}

impl Shared {
    #[instrument(skip(self, trigger), fields(trigger = %trigger))]
    async fn refresh(&self, trigger: RefreshTrigger) -> RefreshSummary {
        let _cycle = self.cycle.lock().await;
        let started = Instant::now();
        let mut summary = RefreshSummary::new(trigger);

        let names = match self.discovery.service_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "service discovery failed, keeping cached rules");
                summary.discovery_failed = true;
                return self.finish(summary, started);
            }
        };
        if names.is_empty() {
            warn!("discovery listed no services, keeping cached rules");
            return self.finish(summary, started);
        }

        let mut seen = HashSet::with_capacity(names.len());
        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            summary.discovered += 1;
            if self.config.is_excluded(&name) {
                debug!(service = %name, "skipping excluded service");
                summary.excluded += 1;
                continue;
            }
            targets.push(name);
        }

        // Each result is applied as soon as it arrives.
        let mut fetches = stream::iter(targets)
            .map(|service| self.fetch_one(service))
            .buffer_unordered(self.config.fanout_limit.max(1));

        while let Some((service, result)) = fetches.next().await {
            match result {
                Ok(rules) => {
                    if rules.service_name != service {
                        warn!(
                            service = %service,
                            advertised = %rules.service_name,
                            "rule set names another service, caching under the discovery name"
                        );
                    }
                    let total = rules.total_rules();
                    self.cache.replace(&service, rules);
                    info!(service = %service, rules = total, "loaded rule set");
                    summary.updated.push(service);
                }
                Err(e) => {
                    warn!(service = %service, error = %e, "could not load rules, keeping last known set");
                    let kind = e.fetch_failure().map_or("other", |k| k.as_str());
                    record_fetch_failure(&service, kind);
                    summary.failed.push(service);
                }
            }
        }

        self.finish(summary, started)
    }

    #[instrument(skip(self))]
    async fn fetch_one(&self, service: String) -> (String, GatewayResult<ServiceRuleSet>) {
        let limit = self.config.fetch_timeout;
        let result = match timeout(limit, self.source.fetch(&service)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::fetch_timeout(service.as_str(), limit)),
        };
        (service, result)
    }

    fn finish(&self, mut summary: RefreshSummary, started: Instant) -> RefreshSummary {
        summary.updated.sort();
        summary.failed.sort();
        summary.duration = started.elapsed();
        summary.completed_at = Utc::now();

        set_cached_services(self.cache.len());
        record_refresh(summary.trigger.as_str(), summary.updated.len(), summary.duration);
        info!(
            trigger = %summary.trigger,
            discovered = summary.discovered,
            excluded = summary.excluded,
            updated = summary.updated.len(),
            failed = summary.failed.len(),
            cached = self.cache.len(),
            duration_ms = summary.duration.as_millis() as u64,
            "security rules refresh completed"
        );

        *self.last.write() = Some(summary.clone());
        summary
    }

    /// Applies the debounce window to a topology event.
    fn admit(&self, event: &TopologyEvent) -> bool {
        if self.debouncer.try_acquire() {
            info!(event = ?event, "topology changed, refreshing security rules");
            true
        } else {
            debug!(event = ?event, "topology event inside debounce window, dropped");
            record_event_suppressed();
            false
        }
    }
}

/// Handle on a running worker.
struct Worker {
    shutdown: mpsc::Sender<()>,
    wake: mpsc::Sender<()>,
    handle: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
}

/// Mirrors every live service's rule set into a [`RuleCache`].
///
/// ```rust,ignore
/// let loader = RuleDistributionLoader::new(discovery, source, cache.clone(), LoaderConfig::default());
/// loader.start()?;
/// // ...
/// loader.stop().await;
/// ```
pub struct RuleDistributionLoader {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl fmt::Debug for RuleDistributionLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDistributionLoader")
            .field("config", &self.shared.config)
            .field("cached_services", &self.shared.cache.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RuleDistributionLoader {
    /// Creates a stopped loader writing into `cache`.
    pub fn new(
        discovery: Arc<dyn Discovery>,
        source: Arc<dyn RuleSource>,
        cache: RuleCache,
        config: LoaderConfig,
    ) -> Self {
        let debouncer = Debouncer::new(config.debounce_window);
        Self {
            shared: Arc::new(Shared {
                discovery,
                source,
                cache,
                config,
                debouncer,
                cycle: tokio::sync::Mutex::new(()),
                last: RwLock::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// The cache this loader writes.
    pub fn cache(&self) -> &RuleCache {
        &self.shared.cache
    }

    /// The loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    /// Summary of the most recent cycle.
    pub fn last_refresh(&self) -> Option<RefreshSummary> {
        self.shared.last.read().clone()
    }

    /// Whether the worker is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Starts the worker running periodic and topology-driven refreshes.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> GatewayResult<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Err(GatewayError::config("rule loader already running"));
        }

        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let (wake, wake_rx) = mpsc::channel(1);
        let shared = Arc::clone(&self.shared);
        let listener = self
            .shared
            .discovery
            .subscribe()
            .map(|events| tokio::spawn(listen(Arc::clone(&shared), events, wake.clone())));

        info!(
            initial_delay_ms = shared.config.initial_delay.as_millis() as u64,
            refresh_interval_ms = shared.config.refresh_interval.as_millis() as u64,
            "scheduling security rules refresh"
        );
        let handle = tokio::spawn(run_worker(shared, shutdown_rx, wake_rx));

        *slot = Some(Worker {
            shutdown,
            wake,
            handle,
            listener,
        });
        Ok(())
    }

    /// Stops the worker, abandoning any in-flight fetches.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        if let Some(listener) = &worker.listener {
            listener.abort();
        }
        // A full channel means a stop is already queued.
        let _ = worker.shutdown.try_send(());
        if let Err(e) = worker.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "rule loader worker ended abnormally");
            }
        }
        info!("rule loader stopped");
    }

    /// Reports a topology change.
    ///
    /// Returns whether a refresh was scheduled; events inside the debounce
    /// window, or while the loader is stopped, are dropped.
    pub fn notify_topology_changed(&self, event: TopologyEvent) -> bool {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            debug!(event = ?event, "loader not running, ignoring topology event");
            return false;
        };
        if !self.shared.admit(&event) {
            return false;
        }
        // A pending wake already covers this event.
        let _ = worker.wake.try_send(());
        true
    }

    /// Runs one refresh cycle now, waiting for any cycle in progress first.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshSummary {
        self.shared.refresh(trigger).await
    }

    /// Runs a manual refresh, bypassing the debounce window.
    pub async fn reload(&self) -> RefreshSummary {
        info!("manual security rules reload triggered");
        self.refresh(RefreshTrigger::Manual).await
    }
}

impl Drop for RuleDistributionLoader {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            if let Some(listener) = worker.listener {
                listener.abort();
            }
            worker.handle.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, mut shutdown: mpsc::Receiver<()>, mut wake: mpsc::Receiver<()>) {
    let mut next_periodic = Instant::now() + shared.config.initial_delay;

    loop {
        let trigger = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            () = sleep_until(next_periodic) => RefreshTrigger::Periodic,
            Some(()) = wake.recv() => RefreshTrigger::Topology,
        };

        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!(trigger = %trigger, "shutdown during refresh, abandoning in-flight fetches");
                break;
            }
            _ = shared.refresh(trigger) => {}
        }

        if trigger == RefreshTrigger::Periodic {
            next_periodic = Instant::now() + shared.config.refresh_interval;
        }
    }

    debug!("rule loader worker exiting");
}

/// Debounces registry events as they arrive and wakes the worker for the
/// ones admitted.
async fn listen(shared: Arc<Shared>, mut events: broadcast::Receiver<TopologyEvent>, wake: mpsc::Sender<()>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                debug!(missed, "topology receiver lagged");
                TopologyEvent::Heartbeat
            }
            Err(RecvError::Closed) => {
                debug!("topology channel closed");
                return;
            }
        };
        if shared.admit(&event) {
            // A pending wake already covers this event.
            let _ = wake.try_send(());
        }
    }
}
