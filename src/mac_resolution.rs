//! Tracing a MAC address from a site's central switch to an access switch.
//!
//! The central switch's MAC table gives the port the address was learned on.
//! CDP on that port names the device behind it, which is then matched against
//! the site's access switches: first by management address, then by name.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    MacLookupResult, NeighborResult, NormalizedMac, SwitchTraceError,
    brand::{self, cisco},
    cache::{CacheCategory, CacheKey, ResultCache},
    config::{Device, Inventory, Site},
    ssh::{Connector, Gateway, RunOptions},
};

/// How far a site-wide trace got.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// The central switch doesn't know the address
    NotFound,
    /// The address was found but the neighbor query failed
    NeighborFailed { message: String },
    /// The neighbor is not one of the site's access switches
    Unmapped,
    Mapped { switch: Device },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacTrace {
    pub site: String,
    pub lookup: MacLookupResult,
    pub neighbor: Option<NeighborResult>,
    pub outcome: TraceOutcome,
}

impl MacTrace {
    pub fn mapped_switch(&self) -> Option<&Device> {
        match &self.outcome {
            TraceOutcome::Mapped { switch } => Some(switch),
            _ => None,
        }
    }
}

/// Picks the access switch a neighbor record refers to.
///
/// An exact address match on any switch beats every name match, so a switch
/// renamed in the inventory is still found by its address. Names compare
/// case-insensitively against both the inventory name and the host. Ties go
/// to inventory order.
pub fn map_neighbor_to_inventory<'a>(
    site: &'a Site,
    neighbor: &NeighborResult,
) -> Option<&'a Device> {
    if let Some(address) = neighbor.neighbor_address.as_deref()
        && let Some(switch) = site
            .access_switches
            .iter()
            .find(|sw| sw.host().as_deref() == Some(address))
    {
        return Some(switch);
    }

    let name = neighbor.neighbor_name.as_deref()?.to_lowercase();
    site.access_switches.iter().find(|sw| {
        sw.name
            .as_deref()
            .is_some_and(|n| n.to_lowercase() == name)
            || sw.host().is_some_and(|h| h.to_lowercase() == name)
    })
}

pub struct MacTracer<C> {
    gateway: Arc<Gateway<C>>,
    inventory: Arc<Inventory>,
    cache: Arc<ResultCache<MacLookupResult>>,
}

impl<C: Connector> MacTracer<C> {
    pub fn new(
        gateway: Arc<Gateway<C>>,
        inventory: Arc<Inventory>,
        cache: Arc<ResultCache<MacLookupResult>>,
    ) -> Self {
        Self {
            gateway,
            inventory,
            cache,
        }
    }

    /// Finds `mac` on the site's central switch and follows CDP to the access
    /// switch behind that port.
    ///
    /// Bad input and a failed central lookup are errors. Everything after the
    /// lookup succeeded is reported through [`TraceOutcome`], keeping the
    /// lookup result.
    pub async fn trace(&self, site_name: &str, mac: &str) -> Result<MacTrace, SwitchTraceError> {
        let mac = NormalizedMac::normalize(mac)?;
        let site = self.inventory.site(site_name)?;

        let lookup = self.lookup(site, &site.central_switch, None, mac).await?;
        let Some(interface) = lookup.interface.clone() else {
            info!("{} not found on the central switch of {}", mac, site.name);
            return Ok(MacTrace {
                site: site.name.clone(),
                lookup,
                neighbor: None,
                outcome: TraceOutcome::NotFound,
            });
        };

        let neighbor = match self.neighbor(site, &interface).await {
            Ok(neighbor) => neighbor,
            Err(e) => {
                warn!(
                    "Neighbor lookup on {} {} failed: {}",
                    site.name, interface, e
                );
                return Ok(MacTrace {
                    site: site.name.clone(),
                    lookup,
                    neighbor: None,
                    outcome: TraceOutcome::NeighborFailed {
                        message: e.to_string(),
                    },
                });
            }
        };

        let outcome = match map_neighbor_to_inventory(site, &neighbor) {
            Some(switch) => {
                info!(
                    "{} is behind {} on {}",
                    mac,
                    interface,
                    switch.display_name()
                );
                TraceOutcome::Mapped {
                    switch: switch.clone(),
                }
            }
            None => {
                info!(
                    "{} is behind {}, neighbor {:?} is not in the inventory",
                    mac, interface, neighbor.neighbor_name
                );
                TraceOutcome::Unmapped
            }
        };

        Ok(MacTrace {
            site: site.name.clone(),
            lookup,
            neighbor: Some(neighbor),
            outcome,
        })
    }

    /// Looks `mac` up directly on one access switch.
    pub async fn lookup_on_switch(
        &self,
        site_name: &str,
        switch_name: &str,
        mac: &str,
    ) -> Result<MacLookupResult, SwitchTraceError> {
        let mac = NormalizedMac::normalize(mac)?;
        let (site, device) = self.inventory.access_switch(site_name, switch_name)?;
        let result = self.lookup(site, device, Some(switch_name), mac).await?;
        match &result.interface {
            Some(interface) => info!("{} found on {} {}", mac, switch_name, interface),
            None => info!("{} not found on {}", mac, switch_name),
        }
        Ok(result)
    }

    async fn lookup(
        &self,
        site: &Site,
        device: &Device,
        switch_name: Option<&str>,
        mac: NormalizedMac,
    ) -> Result<MacLookupResult, SwitchTraceError> {
        let params = self.gateway.connection_params(device)?;
        let key = CacheKey::new(
            CacheCategory::Mac,
            [params.host.clone(), mac.to_string()],
        );
        if let Some(mut hit) = self.cache.get(&key) {
            debug!("Using cached MAC lookup for {} on {}", mac, params.host);
            hit.site = site.name.clone();
            hit.switch = switch_name.map(String::from);
            return Ok(hit);
        }

        let commands = brand::commands_for(&params.family());
        let raw = self
            .gateway
            .run_once(device, &commands.mac_lookup_command(&mac), &RunOptions::default())
            .await?;

        let result = MacLookupResult {
            mac,
            interface: cisco::parse_mac_table(&raw, &mac),
            raw,
            site: site.name.clone(),
            switch: switch_name.map(String::from),
        };
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    async fn neighbor(
        &self,
        site: &Site,
        interface: &str,
    ) -> Result<NeighborResult, SwitchTraceError> {
        let central = &site.central_switch;
        let params = self.gateway.connection_params(central)?;
        let commands = brand::commands_for(&params.family());
        let raw = self
            .gateway
            .run_once(
                central,
                &commands.neighbor_detail_command(interface),
                &RunOptions::default(),
            )
            .await?;

        let detail = cisco::parse_neighbor_detail(&raw);
        debug!("CDP on {} {}: {:?}", site.name, interface, detail);
        Ok(NeighborResult {
            local_interface: interface.to_string(),
            neighbor_name: detail.name,
            neighbor_address: detail.address,
            platform: detail.platform,
            remote_interface: detail.remote_interface,
            raw,
            site: site.name.clone(),
        })
    }
}
