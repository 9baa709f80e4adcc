//! Rule distribution loader behaviour against in-memory collaborators.
//!
//! Timing tests run on a paused Tokio clock, so fetch timeouts, debounce
//! windows and schedules elapse instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{EndpointRule, ServiceRuleSet};
use bastion_gateway::{
    Discovery, FetchFailure, GatewayError, GatewayResult, LoaderConfig, RefreshTrigger, RuleCache,
    RuleDistributionLoader, RuleSource, StaticDiscovery, TopologyEvent,
};
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

/// How the fake source answers for one service.
#[derive(Clone)]
enum Behavior {
    Serve(ServiceRuleSet),
    Fail,
    Hang,
    Slow(Duration),
}

#[derive(Default)]
struct FakeSource {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeSource {
    fn set(&self, service: &str, behavior: Behavior) {
        self.behaviors.lock().insert(service.to_string(), behavior);
    }

    fn calls(&self, service: &str) -> usize {
        self.calls.lock().get(service).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl RuleSource for FakeSource {
    async fn fetch(&self, service: &str) -> GatewayResult<ServiceRuleSet> {
        *self.calls.lock().entry(service.to_string()).or_default() += 1;
        let behavior = self
            .behaviors
            .lock()
            .get(service)
            .cloned()
            .unwrap_or_else(|| Behavior::Serve(ServiceRuleSet::new(service, "", Vec::new())));

        match behavior {
            Behavior::Serve(rules) => Ok(rules),
            Behavior::Fail => Err(GatewayError::fetch(service, FetchFailure::Status(503), "unavailable")),
            Behavior::Hang => std::future::pending().await,
            Behavior::Slow(delay) => {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                sleep(delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(ServiceRuleSet::new(service, "", Vec::new()))
            }
        }
    }
}

struct FakeDiscovery {
    services: Mutex<Vec<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeDiscovery {
    fn new(services: &[&str]) -> Self {
        Self {
            services: Mutex::new(services.iter().map(|s| s.to_string()).collect()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    async fn service_names(&self) -> GatewayResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::discovery("registry unreachable"));
        }
        Ok(self.services.lock().clone())
    }
}

fn orders_rules() -> ServiceRuleSet {
    ServiceRuleSet::new(
        "orders",
        "",
        vec![
            EndpointRule::secured("", "/orders/{id}", ["GET"], ["ADMIN"]),
            EndpointRule::public("", "/orders", ["POST"]),
        ],
    )
}

/// A config whose periodic trigger never fires during a test.
fn quiet_config() -> LoaderConfig {
    LoaderConfig::default()
        .with_initial_delay(Duration::from_secs(3600))
        .with_refresh_interval(Duration::from_secs(3600))
}

fn loader(
    discovery: &Arc<FakeDiscovery>,
    source: &Arc<FakeSource>,
    config: LoaderConfig,
) -> RuleDistributionLoader {
    RuleDistributionLoader::new(
        Arc::clone(discovery) as Arc<dyn Discovery>,
        Arc::clone(source) as Arc<dyn RuleSource>,
        RuleCache::new(),
        config,
    )
}

/// Infrastructure services and duplicate listings are never fetched.
#[tokio::test]
async fn refresh_skips_excluded_and_duplicate_services() {
    let discovery = Arc::new(FakeDiscovery::new(&[
        "orders",
        "Gateway",
        "orders",
        "billing",
        "sib-registry",
        "SIB-GATEWAY-SERVICE",
    ]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Serve(orders_rules()));
    let loader = loader(&discovery, &source, quiet_config());

    let summary = loader.reload().await;

    assert_eq!(summary.trigger, RefreshTrigger::Manual);
    assert_eq!(summary.discovered, 5);
    assert_eq!(summary.excluded, 3);
    assert_eq!(summary.updated, vec!["billing", "orders"]);
    assert!(summary.failed.is_empty());
    assert_eq!(source.calls("orders"), 1);
    assert_eq!(source.total_calls(), 2);
    assert_eq!(loader.cache().service_names(), vec!["billing", "orders"]);
    assert_eq!(loader.cache().total_rules(), 2);
    assert_eq!(loader.last_refresh(), Some(summary));
}

/// A failing service keeps serving its last good rule set.
#[tokio::test]
async fn failed_fetch_keeps_previous_rules() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders", "billing"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Serve(orders_rules()));
    let loader = loader(&discovery, &source, quiet_config());

    loader.reload().await;
    let before = loader.cache().get("orders").unwrap();

    source.set("orders", Behavior::Fail);
    let summary = loader.reload().await;

    assert_eq!(summary.failed, vec!["orders"]);
    assert_eq!(summary.updated, vec!["billing"]);
    let after = loader.cache().get("orders").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.total_rules(), 2);
}

/// A service that never answers times out without holding up the others.
#[tokio::test(start_paused = true)]
async fn hanging_fetch_times_out() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders", "billing"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Hang);
    let loader = loader(&discovery, &source, quiet_config());

    let started = Instant::now();
    let summary = loader.reload().await;

    assert_eq!(summary.failed, vec!["orders"]);
    assert_eq!(summary.updated, vec!["billing"]);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(loader.cache().get("orders").is_none());
}

/// No more than eight fetches are in flight at once.
#[tokio::test(start_paused = true)]
async fn fetch_fanout_is_bounded() {
    let names: Vec<String> = (0..20).map(|i| format!("svc-{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let discovery = Arc::new(FakeDiscovery::new(&refs));
    let source = Arc::new(FakeSource::default());
    for name in &names {
        source.set(name, Behavior::Slow(Duration::from_millis(100)));
    }
    let loader = loader(&discovery, &source, quiet_config());

    let summary = loader.reload().await;

    assert_eq!(summary.updated.len(), 20);
    assert_eq!(source.peak.load(Ordering::SeqCst), 8);
    assert_eq!(loader.cache().len(), 20);
}

/// Discovery errors and empty listings leave the cache alone.
#[tokio::test]
async fn discovery_problems_keep_cache() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Serve(orders_rules()));
    let loader = loader(&discovery, &source, quiet_config());
    loader.reload().await;

    discovery.failing.store(true, Ordering::SeqCst);
    let summary = loader.reload().await;
    assert!(summary.discovery_failed);
    assert_eq!(loader.cache().service_names(), vec!["orders"]);

    discovery.failing.store(false, Ordering::SeqCst);
    discovery.services.lock().clear();
    let summary = loader.reload().await;
    assert!(!summary.discovery_failed);
    assert_eq!(summary.discovered, 0);
    assert_eq!(loader.cache().service_names(), vec!["orders"]);
    assert_eq!(source.calls("orders"), 1);
}

/// Rules are cached under the discovery name, whatever the body says.
#[tokio::test]
async fn rule_set_cached_under_discovery_name() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders-v2"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders-v2", Behavior::Serve(orders_rules()));
    let loader = loader(&discovery, &source, quiet_config());

    loader.reload().await;

    let entry = loader.cache().get("orders-v2").unwrap();
    assert_eq!(entry.service().as_ref(), "orders-v2");
    assert_eq!(entry.rules().service_name, "orders");
    assert!(loader.cache().get("orders").is_none());
}

/// Only one refresh starts per debounce window.
#[tokio::test(start_paused = true)]
async fn topology_notifications_are_debounced() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    let loader = loader(&discovery, &source, quiet_config());

    assert!(!loader.notify_topology_changed(TopologyEvent::Heartbeat));
    loader.start().unwrap();

    assert!(loader.notify_topology_changed(TopologyEvent::Registered {
        service: "orders".into()
    }));
    assert!(!loader.notify_topology_changed(TopologyEvent::Heartbeat));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(discovery.calls(), 1);
    assert_eq!(loader.last_refresh().unwrap().trigger, RefreshTrigger::Topology);

    sleep(Duration::from_secs(2)).await;
    assert!(!loader.notify_topology_changed(TopologyEvent::Heartbeat));

    sleep(Duration::from_secs(4)).await;
    assert!(loader.notify_topology_changed(TopologyEvent::Heartbeat));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(discovery.calls(), 2);

    loader.stop().await;
}

/// A manual reload runs even inside the debounce window.
#[tokio::test(start_paused = true)]
async fn manual_reload_bypasses_debounce() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    let loader = loader(&discovery, &source, quiet_config());
    loader.start().unwrap();

    assert!(loader.notify_topology_changed(TopologyEvent::Heartbeat));
    sleep(Duration::from_millis(10)).await;
    loader.reload().await;

    assert_eq!(discovery.calls(), 2);
    loader.stop().await;
}

/// Events published by the registry drive refreshes too.
#[tokio::test(start_paused = true)]
async fn registry_events_trigger_refresh() {
    let discovery = Arc::new(StaticDiscovery::new(["orders"]));
    let source = Arc::new(FakeSource::default());
    let loader = RuleDistributionLoader::new(
        Arc::clone(&discovery) as Arc<dyn Discovery>,
        Arc::clone(&source) as Arc<dyn RuleSource>,
        RuleCache::new(),
        quiet_config(),
    );
    loader.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    discovery.register("billing");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(loader.cache().service_names(), vec!["billing", "orders"]);

    discovery.register("payments");
    sleep(Duration::from_millis(10)).await;
    assert!(loader.cache().get("payments").is_none());

    sleep(Duration::from_secs(6)).await;
    discovery.deregister("orders");
    sleep(Duration::from_millis(10)).await;
    assert!(loader.cache().get("payments").is_some());
    // Deregistered services keep their last known rules.
    assert!(loader.cache().get("orders").is_some());

    loader.stop().await;
}

fn registry_loader(
    discovery: &Arc<StaticDiscovery>,
    source: &Arc<FakeSource>,
    config: LoaderConfig,
) -> RuleDistributionLoader {
    RuleDistributionLoader::new(
        Arc::clone(discovery) as Arc<dyn Discovery>,
        Arc::clone(source) as Arc<dyn RuleSource>,
        RuleCache::new(),
        config,
    )
}

/// Registry events that land while a slow cycle runs are debounced by when
/// they arrived, not by when the cycle ends.
#[tokio::test(start_paused = true)]
async fn registry_events_during_refresh_are_debounced() {
    let discovery = Arc::new(StaticDiscovery::new(["orders"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Hang);
    let loader = registry_loader(&discovery, &source, quiet_config());
    loader.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    discovery.register("billing");
    sleep(Duration::from_millis(500)).await;
    assert_eq!(source.calls("orders"), 1);
    discovery.register("payments");

    // The first cycle ends once the orders fetch times out.
    sleep(Duration::from_secs(20)).await;
    assert_eq!(source.calls("orders"), 1);
    assert_eq!(source.calls("payments"), 0);
    assert_eq!(loader.last_refresh().unwrap().failed, vec!["orders"]);

    loader.stop().await;
}

/// Admitted events arriving during a cycle queue one follow-up cycle.
#[tokio::test(start_paused = true)]
async fn registry_events_during_refresh_coalesce() {
    let discovery = Arc::new(StaticDiscovery::new(["orders"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Hang);
    let mut config = quiet_config();
    config.debounce_window = Duration::from_secs(1);
    let loader = registry_loader(&discovery, &source, config);
    loader.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    discovery.register("billing");
    sleep(Duration::from_secs(2)).await;
    discovery.register("payments");
    sleep(Duration::from_millis(1_500)).await;
    discovery.register("shipping");
    assert_eq!(source.calls("orders"), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls("orders"), 2);
    assert_eq!(source.calls("payments"), 1);
    assert_eq!(source.calls("shipping"), 1);

    loader.stop().await;
}

/// The first periodic cycle waits for the initial delay, later ones for the
/// interval.
#[tokio::test(start_paused = true)]
async fn periodic_refresh_follows_schedule() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    let config = LoaderConfig::default()
        .with_initial_delay(Duration::from_secs(1))
        .with_refresh_interval(Duration::from_secs(60));
    let loader = loader(&discovery, &source, config);
    loader.start().unwrap();

    sleep(Duration::from_millis(500)).await;
    assert_eq!(discovery.calls(), 0);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(discovery.calls(), 1);
    assert_eq!(loader.last_refresh().unwrap().trigger, RefreshTrigger::Periodic);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(discovery.calls(), 1);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(discovery.calls(), 2);

    loader.stop().await;
    sleep(Duration::from_secs(120)).await;
    assert_eq!(discovery.calls(), 2);
}

/// Stopping returns promptly even while a fetch hangs.
#[tokio::test(start_paused = true)]
async fn stop_abandons_hanging_fetch() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    source.set("orders", Behavior::Hang);
    let config = quiet_config().with_initial_delay(Duration::ZERO);
    let loader = loader(&discovery, &source, config);
    loader.start().unwrap();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls("orders"), 1);

    let before = Instant::now();
    loader.stop().await;
    assert!(before.elapsed() < Duration::from_secs(1));
    assert!(!loader.is_running());
    assert!(loader.last_refresh().is_none());
    assert!(!loader.notify_topology_changed(TopologyEvent::Heartbeat));
}

/// A loader runs one worker at a time.
#[tokio::test]
async fn start_twice_is_an_error() {
    let discovery = Arc::new(FakeDiscovery::new(&["orders"]));
    let source = Arc::new(FakeSource::default());
    let loader = loader(&discovery, &source, quiet_config());

    loader.start().unwrap();
    assert!(loader.is_running());
    assert!(loader.start().is_err());

    loader.stop().await;
    assert!(!loader.is_running());
    loader.start().unwrap();
    loader.stop().await;
}
