//! Named compute platforms and the clients created for them.
//!
//! A [`PlatformRegistry`] owns both the platforms it can resolve and the one client it creates
//! per platform. Executors built from the same registry share a client; separate registries
//! never do.

use std::sync::Arc;

use futures::FutureExt;
use rustc_hash::FxHashMap as HashMap;
use tokio::sync::Mutex;

use super::{Client, HostBuilder, ServiceError, host::HOST_PLATFORM};
use crate::platform::BoxFuture;

pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Connects a new client to the platform.
    fn create_client(&self) -> BoxFuture<'_, Result<Arc<dyn Client>, ServiceError>>;
}

/// The in-process platform that keeps allocations in host memory.
#[derive(Debug, Default, Clone)]
pub struct HostPlatform {
    pub builder: HostBuilder,
}

impl Platform for HostPlatform {
    #[inline]
    fn name(&self) -> &str {
        HOST_PLATFORM
    }

    fn create_client(&self) -> BoxFuture<'_, Result<Arc<dyn Client>, ServiceError>> {
        async move {
            let client = self.builder.clone().build().await;
            Ok(Arc::new(client) as Arc<dyn Client>)
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
    clients: Mutex<HashMap<String, Arc<dyn Client>>>,
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.platforms.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that resolves the host platform.
    pub fn with_host() -> Self {
        Self::new().register(HostPlatform::default())
    }

    /// Registers a platform under its name, replacing any platform of the same name.
    pub fn register(mut self, platform: impl Platform + 'static) -> Self {
        let name = platform.name().to_owned();
        self.platforms.insert(name, Arc::new(platform));
        self
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Platform>, ServiceError> {
        self.platforms
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::Platform(name.to_owned()))
    }

    /// Returns the client of `platform`, connecting it on first use.
    pub async fn get_or_create_client(
        &self,
        platform: &dyn Platform,
    ) -> Result<Arc<dyn Client>, ServiceError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(platform.name()) {
            return Ok(client.clone());
        }

        log::info!("creating client for platform {}", platform.name());
        let client = platform.create_client().await?;
        clients.insert(platform.name().to_owned(), client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, sync::Arc};

    use super::PlatformRegistry;
    use crate::service::ServiceError;

    #[tokio::test]
    async fn test_lookup() -> Result<(), Box<dyn Error>> {
        let registry = PlatformRegistry::with_host();
        let platform = registry.lookup("host")?;
        assert_eq!(platform.name(), "host");

        let err = registry.lookup("tpu").err();
        assert_eq!(err, Some(ServiceError::Platform("tpu".into())));
        Ok(())
    }

    #[tokio::test]
    async fn test_client_reuse() -> Result<(), Box<dyn Error>> {
        let registry = PlatformRegistry::with_host();
        let platform = registry.lookup("host")?;

        let x = registry.get_or_create_client(platform.as_ref()).await?;
        let y = registry.get_or_create_client(platform.as_ref()).await?;
        assert!(Arc::ptr_eq(&x, &y));
        assert_eq!(x.platform(), "host");

        let other = PlatformRegistry::with_host();
        let z = other.get_or_create_client(platform.as_ref()).await?;
        assert!(!Arc::ptr_eq(&x, &z));
        Ok(())
    }
}
