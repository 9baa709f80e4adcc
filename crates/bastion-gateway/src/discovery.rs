//! Discovery registry interface.
//!
//! The gateway only needs the names of live services and, optionally, a
//! stream of topology change notifications.

use async_trait::async_trait;
use bastion_config::DiscoverySettings;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::GatewayResult;

/// A change in the set of live services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// A service instance registered.
    Registered {
        /// Service name.
        service: String,
    },
    /// A service instance went away.
    Deregistered {
        /// Service name.
        service: String,
    },
    /// The registry renewed its view without a specific change.
    Heartbeat,
}

/// Source of live service names.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Lists the names of live services.
    async fn service_names(&self) -> GatewayResult<Vec<String>>;

    /// Subscribes to topology changes, if the registry publishes them.
    fn subscribe(&self) -> Option<broadcast::Receiver<TopologyEvent>> {
        None
    }
}

/// In-memory registry with a fixed, editable service list.
#[derive(Debug)]
pub struct StaticDiscovery {
    services: RwLock<Vec<String>>,
    events: broadcast::Sender<TopologyEvent>,
}

impl StaticDiscovery {
    /// Creates a registry listing `services`.
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (events, _) = broadcast::channel(16);
        Self {
            services: RwLock::new(services.into_iter().map(Into::into).collect()),
            events,
        }
    }

    /// Creates a registry from the `discovery` configuration section.
    pub fn from_settings(settings: &DiscoverySettings) -> Self {
        Self::new(settings.services.iter().map(|s| s.name.clone()))
    }

    /// Adds a service and announces it.
    pub fn register(&self, service: impl Into<String>) {
        let service = service.into();
        {
            let mut services = self.services.write();
            if !services.contains(&service) {
                services.push(service.clone());
            }
        }
        self.publish(TopologyEvent::Registered { service });
    }

    /// Removes a service and announces it.
    pub fn deregister(&self, service: &str) {
        self.services.write().retain(|s| s != service);
        self.publish(TopologyEvent::Deregistered {
            service: service.to_string(),
        });
    }

    fn publish(&self, event: TopologyEvent) {
        // No subscribers is fine.
        if self.events.send(event).is_err() {
            debug!("topology event had no subscribers");
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn service_names(&self) -> GatewayResult<Vec<String>> {
        Ok(self.services.read().clone())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<TopologyEvent>> {
        Some(self.events.subscribe())
    }
}
