// ── Camera services ──
//
// Long-running per-camera services (the alarm monitor and the ffmpeg
// streams) behind one capability trait, plus the per-camera registry
// that starts and stops them.

pub mod alarm;
pub mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use strum::{Display, EnumString};
use tracing::{debug, error, info, warn};

use crate::error::CoreError;

pub use alarm::AlarmService;
pub use stream::StreamService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceType {
    Alarm,
    Stream,
}

/// Lifecycle state of a service, only changed by `start()`/`stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Started,
}

/// Capability set shared by every service.
#[async_trait]
pub trait Service: Send + Sync {
    fn service_type(&self) -> ServiceType;

    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    fn started(&self) -> bool {
        self.state() == ServiceState::Started
    }

    /// Whether the configuration asks for the service at startup.
    fn enabled_in_conf(&self) -> bool;

    async fn start(&self) -> Result<(), CoreError>;

    async fn stop(&self) -> Result<(), CoreError>;
}

type ServiceKey = (ServiceType, String);

/// Registry of one camera's services, keyed by `(type, name)`.
pub struct ServiceManager {
    cam_id: String,
    services: DashMap<ServiceKey, Arc<dyn Service>>,
}

impl ServiceManager {
    pub fn new(cam_id: impl Into<String>) -> Self {
        Self {
            cam_id: cam_id.into(),
            services: DashMap::new(),
        }
    }

    /// Register services. A second service with the same `(type, name)` is rejected.
    pub fn register<I>(&self, services: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = Arc<dyn Service>>,
    {
        for service in services {
            let key = (service.service_type(), service.name().to_owned());
            match self.services.entry(key) {
                Entry::Occupied(e) => {
                    let (ty, name) = e.key();
                    return Err(CoreError::config(format!(
                        "{ty} service '{name}' is already registered for camera {}",
                        self.cam_id
                    )));
                }
                Entry::Vacant(e) => {
                    debug!(cam = %self.cam_id, service = %service.name(), "service registered");
                    e.insert(service);
                }
            }
        }
        Ok(())
    }

    /// Start every service, or only those enabled in config.
    ///
    /// A failing start is logged and does not prevent the others.
    pub async fn start_all(&self, only_conf_enabled: bool) {
        for service in self.get_all() {
            if only_conf_enabled && !service.enabled_in_conf() {
                info!(
                    cam = %self.cam_id,
                    service = %service.name(),
                    "service disabled in config, not starting"
                );
                continue;
            }
            if let Err(e) = service.start().await {
                error!(
                    cam = %self.cam_id,
                    service = %service.name(),
                    error = %e,
                    "failed to start service"
                );
            }
        }
    }

    /// Stop every running service, best effort.
    pub async fn stop_all(&self) {
        for service in self.get_all() {
            if !service.started() {
                continue;
            }
            if let Err(e) = service.stop().await {
                warn!(
                    cam = %self.cam_id,
                    service = %service.name(),
                    error = %e,
                    "failed to stop service"
                );
            }
        }
    }

    pub async fn start(&self, ty: ServiceType, name: &str) -> Result<(), CoreError> {
        self.require(ty, name)?.start().await
    }

    pub async fn stop(&self, ty: ServiceType, name: &str) -> Result<(), CoreError> {
        self.require(ty, name)?.stop().await
    }

    pub fn get(&self, ty: ServiceType, name: &str) -> Option<Arc<dyn Service>> {
        self.services
            .get(&(ty, name.to_owned()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// All services, ordered by type then name.
    pub fn get_all(&self) -> Vec<Arc<dyn Service>> {
        let mut all: Vec<(ServiceKey, Arc<dyn Service>)> = self
            .services
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.into_iter().map(|(_, service)| service).collect()
    }

    pub fn get_count(&self, ty: Option<ServiceType>) -> usize {
        match ty {
            None => self.services.len(),
            Some(ty) => self.services.iter().filter(|e| e.key().0 == ty).count(),
        }
    }

    fn require(&self, ty: ServiceType, name: &str) -> Result<Arc<dyn Service>, CoreError> {
        self.get(ty, name).ok_or_else(|| {
            CoreError::config(format!(
                "{ty} service '{name}' is not configured for camera {}",
                self.cam_id
            ))
        })
    }
}
