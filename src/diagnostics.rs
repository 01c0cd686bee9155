//! Cable (TDR) diagnostics across many interfaces of one switch.
//!
//! Every interface gets its own session and its own task. Tasks wait for a
//! permit from the pool shared by every dispatch, so the number of cable tests
//! in flight never exceeds `max_workers` no matter how many callers there
//! are. Whatever happens to one interface ends up as that interface's result
//! and never affects the others.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    SwitchTraceError, TdrResult,
    brand::{self, cisco::{self, Cisco}},
    cache::{CacheCategory, CacheKey, ResultCache},
    config::Device,
    ssh::{Connector, Gateway, RunOptions, Session, SshError},
};

pub struct TdrDispatcher<C> {
    gateway: Arc<Gateway<C>>,
    cache: Arc<ResultCache<TdrResult>>,
    pool: Arc<Semaphore>,
    settle_delay: Duration,
}

// derive(Clone) would require C: Clone
impl<C> Clone for TdrDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            cache: self.cache.clone(),
            pool: self.pool.clone(),
            settle_delay: self.settle_delay,
        }
    }
}

fn tdr_key(host: &str, interface: &str) -> CacheKey {
    CacheKey::new(CacheCategory::Tdr, [host, interface])
}

/// Trimmed, non-empty, each name once.
fn unique_interfaces(interfaces: &[String]) -> BTreeSet<String> {
    interfaces
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

impl<C: Connector> TdrDispatcher<C> {
    pub fn new(
        gateway: Arc<Gateway<C>>,
        cache: Arc<ResultCache<TdrResult>>,
        pool: Arc<Semaphore>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            cache,
            pool,
            settle_delay,
        }
    }

    /// Runs a cable test on each interface and returns one result per
    /// distinct interface name. Never fails as a whole.
    pub async fn run(
        &self,
        device: &Device,
        interfaces: &[String],
    ) -> BTreeMap<String, TdrResult> {
        let wanted = unique_interfaces(interfaces);
        info!(
            "Running TDR on {} interface(s) of {}",
            wanted.len(),
            device.display_name()
        );

        let mut tasks = JoinSet::new();
        for interface in wanted.iter().cloned() {
            let dispatcher = self.clone();
            let device = device.clone();
            tasks.spawn(async move {
                let result = match dispatcher.pool.clone().acquire_owned().await {
                    Ok(_permit) => dispatcher.run_single(&device, &interface).await,
                    Err(e) => TdrResult::error("", format!("Worker pool unavailable: {e}")),
                };
                (interface, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((interface, result)) => {
                    results.insert(interface, result);
                }
                Err(e) => error!("TDR worker failed: {}", e),
            }
        }

        // a worker that panicked never reported its interface
        for interface in wanted {
            results.entry(interface).or_insert_with_key(|interface| {
                TdrResult::error("", format!("TDR worker for {interface} failed"))
            });
        }

        let failed = results.values().filter(|r| r.is_error()).count();
        if failed > 0 {
            warn!(
                "TDR on {}: {} of {} interface(s) failed",
                device.display_name(),
                failed,
                results.len()
            );
        }
        results
    }

    /// Results already in the cache for `interfaces`; never contacts the
    /// device.
    pub fn cached_results(
        &self,
        device: &Device,
        interfaces: &[String],
    ) -> BTreeMap<String, TdrResult> {
        let Ok(params) = self.gateway.connection_params(device) else {
            return BTreeMap::new();
        };
        unique_interfaces(interfaces)
            .into_iter()
            .filter_map(|interface| {
                self.cache
                    .get(&tdr_key(&params.host, &interface))
                    .map(|result| (interface, result))
            })
            .collect()
    }

    async fn run_single(&self, device: &Device, interface: &str) -> TdrResult {
        match self.diagnose(device, interface).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "TDR on {} {} failed: {}",
                    device.display_name(),
                    interface,
                    e
                );
                TdrResult::error("", e.to_string())
            }
        }
    }

    async fn diagnose(
        &self,
        device: &Device,
        interface: &str,
    ) -> Result<TdrResult, SwitchTraceError> {
        let params = self.gateway.connection_params(device)?;
        let key = tdr_key(&params.host, interface);
        if let Some(result) = self.cache.get(&key) {
            debug!("Using cached TDR result for {} {}", params.host, interface);
            return Ok(result);
        }

        let commands = brand::commands_for(&params.family());
        let mut session = self.gateway.open(device).await?;
        let result = self.cable_test(&mut session, &commands, interface).await;
        session.close().await;

        let result = result?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    async fn cable_test(
        &self,
        session: &mut C::Session,
        commands: &Cisco,
        interface: &str,
    ) -> Result<TdrResult, SshError> {
        let started = session
            .run(
                &commands.tdr_start_command(interface),
                &RunOptions::expect(Cisco::TDR_START_EXPECT),
            )
            .await?;
        if commands.is_unsupported(&started) {
            warn!("Device rejected the TDR command for {}", interface);
            return Ok(TdrResult::error(started, "No valid TDR command on device"));
        }

        tokio::time::sleep(self.settle_delay).await;

        let output = session
            .run(&commands.tdr_show_command(interface), &RunOptions::default())
            .await?;
        Ok(cisco::parse_tdr_output(&output))
    }
}
