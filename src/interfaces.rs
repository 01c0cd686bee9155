use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    Interface, SwitchTraceError,
    brand::{self, cisco},
    cache::{CacheCategory, CacheKey, ResultCache},
    config::Device,
    ssh::{Connector, Gateway, RunOptions},
};

/// Cached interface status listings, keyed by device host.
pub struct InterfaceLister<C> {
    gateway: Arc<Gateway<C>>,
    cache: Arc<ResultCache<Vec<Interface>>>,
}

impl<C: Connector> InterfaceLister<C> {
    pub fn new(gateway: Arc<Gateway<C>>, cache: Arc<ResultCache<Vec<Interface>>>) -> Self {
        Self { gateway, cache }
    }

    pub async fn list(&self, device: &Device) -> Result<Vec<Interface>, SwitchTraceError> {
        let params = self.gateway.connection_params(device)?;
        let key = CacheKey::new(CacheCategory::Interfaces, [params.host.as_str()]);
        if let Some(interfaces) = self.cache.get(&key) {
            debug!(
                "Using {} cached interfaces for {}",
                interfaces.len(),
                device.display_name()
            );
            return Ok(interfaces);
        }

        let commands = brand::commands_for(&params.family());
        let output = self
            .gateway
            .run_once(
                device,
                &commands.interfaces_status_command(),
                &RunOptions::template(),
            )
            .await?;

        let interfaces = cisco::parse_interfaces_status(&output);
        if interfaces.is_empty() {
            warn!(
                "No interfaces parsed from {}, not caching",
                device.display_name()
            );
        } else {
            info!(
                "Listed {} interfaces on {}",
                interfaces.len(),
                device.display_name()
            );
            self.cache.insert(key, interfaces.clone());
        }
        Ok(interfaces)
    }
}
