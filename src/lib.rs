#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use std::{collections::BTreeMap, fmt::Display, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::info;

use crate::{
    cache::{Cacheable, ResultCache},
    config::{Device, Inventory, Settings, Site},
    diagnostics::TdrDispatcher,
    interfaces::InterfaceLister,
    mac_resolution::{MacTrace, MacTracer},
    ssh::{Connector, Gateway, SshError},
};

pub mod brand;
pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod interfaces;
pub mod mac_resolution;
pub mod ssh;
#[cfg(test)]
mod tests;

/// A MAC address in Cisco dotted notation (`aabb.ccdd.eeff`).
///
/// The only way to build one is [`NormalizedMac::normalize`], so every value
/// is in canonical form and can be used directly in commands and cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedMac(mac_address::MacAddress);

impl NormalizedMac {
    /// Strips every non-hex character and requires exactly 12 hex digits.
    ///
    /// `AA:BB:CC:DD:EE:FF`, `aabb.ccdd.eeff` and `aa-bb-cc-dd-ee-ff` all
    /// normalize to `aabb.ccdd.eeff`.
    pub fn normalize(input: &str) -> Result<Self, SwitchTraceError> {
        let digits: Vec<u8> = input
            .chars()
            .filter_map(|c| c.to_digit(16))
            .map(|d| d as u8)
            .collect();

        if digits.len() != 12 {
            return Err(SwitchTraceError::Validation(format!(
                "Invalid MAC address '{}': expected 12 hex digits, found {}",
                input,
                digits.len()
            )));
        }

        let mut bytes = [0u8; 6];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
            *byte = (pair[0] << 4) | pair[1];
        }
        Ok(Self(mac_address::MacAddress::new(bytes)))
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0.bytes()
    }
}

impl Display for NormalizedMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0.bytes();
        write!(
            f,
            "{:02x}{:02x}.{:02x}{:02x}.{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for NormalizedMac {
    type Err = SwitchTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl Serialize for NormalizedMac {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NormalizedMac {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::normalize(&value).map_err(serde::de::Error::custom)
    }
}

/// One row of an interface status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub description: String,
    pub status: String,
    pub vlan: Option<String>,
    pub duplex: Option<String>,
    pub speed: Option<String>,
    /// Media type, e.g. `10/100/1000BaseTX`
    pub media_type: String,
}

/// An empty listing usually means the command failed, so it is never cached.
impl Cacheable for Vec<Interface> {
    fn is_cacheable(&self) -> bool {
        !self.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacLookupResult {
    pub mac: NormalizedMac,
    /// Interface the MAC was learned on, if the table had an entry
    pub interface: Option<String>,
    pub raw: String,
    pub site: String,
    /// Access switch that was queried; `None` for the site's central switch
    pub switch: Option<String>,
}

/// Misses are not cached so the next request asks the switch again.
impl Cacheable for MacLookupResult {
    fn is_cacheable(&self) -> bool {
        self.interface.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborResult {
    /// Local interface the neighbor was looked up on
    pub local_interface: String,
    pub neighbor_name: Option<String>,
    pub neighbor_address: Option<String>,
    pub platform: Option<String>,
    pub remote_interface: Option<String>,
    pub raw: String,
    pub site: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairId {
    A,
    B,
    C,
    D,
    Unknown,
}

impl From<char> for PairId {
    fn from(value: char) -> Self {
        match value.to_ascii_uppercase() {
            'A' => PairId::A,
            'B' => PairId::B,
            'C' => PairId::C,
            'D' => PairId::D,
            _ => PairId::Unknown,
        }
    }
}

impl Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairId::A => write!(f, "A"),
            PairId::B => write!(f, "B"),
            PairId::C => write!(f, "C"),
            PairId::D => write!(f, "D"),
            PairId::Unknown => write!(f, "?"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Open,
    Short,
    Ok,
    Normal,
    Fault,
    Unsupported,
    /// The device reported that no TDR data exists for the pair
    None,
    Unknown,
}

impl From<&str> for PairStatus {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "open" => PairStatus::Open,
            "short" => PairStatus::Short,
            "ok" => PairStatus::Ok,
            "normal" => PairStatus::Normal,
            "fault" => PairStatus::Fault,
            "not supported" | "unsupported" => PairStatus::Unsupported,
            "no tdr" => PairStatus::None,
            _ => PairStatus::Unknown,
        }
    }
}

impl Display for PairStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairStatus::Open => write!(f, "open"),
            PairStatus::Short => write!(f, "short"),
            PairStatus::Ok => write!(f, "ok"),
            PairStatus::Normal => write!(f, "normal"),
            PairStatus::Fault => write!(f, "fault"),
            PairStatus::Unsupported => write!(f, "unsupported"),
            PairStatus::None => write!(f, "none"),
            PairStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Measurement for one wire pair as printed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdrPair {
    pub pair: PairId,
    pub status: PairStatus,
    /// Length in meters exactly as printed, e.g. `"3"` or `"12.5"`
    pub length_m: Option<String>,
    pub details: String,
}

impl TdrPair {
    pub fn length_meters(&self) -> Option<f64> {
        self.length_m.as_deref().and_then(|l| l.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TdrResult {
    Error { raw: String, message: String },
    Parsed { raw: String, pairs: Vec<TdrPair> },
    NoData { raw: String, note: String },
}

impl TdrResult {
    pub fn error(raw: impl Into<String>, message: impl Into<String>) -> Self {
        TdrResult::Error {
            raw: raw.into(),
            message: message.into(),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            TdrResult::Error { raw, .. }
            | TdrResult::Parsed { raw, .. }
            | TdrResult::NoData { raw, .. } => raw,
        }
    }

    pub fn pairs(&self) -> &[TdrPair] {
        match self {
            TdrResult::Parsed { pairs, .. } => pairs,
            _ => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TdrResult::Error { .. })
    }
}

impl Cacheable for TdrResult {
    fn is_cacheable(&self) -> bool {
        matches!(self, TdrResult::Parsed { pairs, .. } if !pairs.is_empty())
    }
}

#[derive(Debug)]
pub enum SwitchTraceError {
    Connection(SshError),
    Io(std::io::Error),
    Lookup(String),
    Serde(String),
    Validation(String),
}

impl SwitchTraceError {
    /// Connection problems are reported to the user and the next request may
    /// succeed; everything else needs the input or inventory fixed first.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SwitchTraceError::Connection(_))
    }
}

impl PartialEq for SwitchTraceError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl From<SshError> for SwitchTraceError {
    fn from(err: SshError) -> Self {
        SwitchTraceError::Connection(err)
    }
}

impl From<std::io::Error> for SwitchTraceError {
    fn from(err: std::io::Error) -> Self {
        SwitchTraceError::Io(err)
    }
}

impl From<serde_json::Error> for SwitchTraceError {
    fn from(err: serde_json::Error) -> Self {
        SwitchTraceError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for SwitchTraceError {
    fn from(err: serde_yaml::Error) -> Self {
        SwitchTraceError::Serde(err.to_string())
    }
}

impl std::fmt::Display for SwitchTraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchTraceError::Connection(error) => write!(f, "Connection error: {error}"),
            SwitchTraceError::Io(error) => write!(f, "IO error: {error}"),
            SwitchTraceError::Lookup(error) => write!(f, "Not found: {error}"),
            SwitchTraceError::Serde(error) => write!(f, "Serde error: {error}"),
            SwitchTraceError::Validation(error) => write!(f, "Validation error: {error}"),
        }
    }
}

impl std::error::Error for SwitchTraceError {}

/// Entry point for callers: owns the inventory snapshot, the connection
/// gateway, one cache per result category and the shared TDR worker pool.
pub struct SwitchTrace<C: Connector> {
    inventory: Arc<Inventory>,
    lister: InterfaceLister<C>,
    dispatcher: TdrDispatcher<C>,
    tracer: MacTracer<C>,
}

impl<C: Connector> SwitchTrace<C> {
    pub fn new(inventory: Arc<Inventory>, settings: &Settings, connector: C) -> Self {
        let gateway = Arc::new(Gateway::new(
            connector,
            inventory.connection_defaults.clone(),
        ));

        let interfaces_cache = Arc::new(ResultCache::new(
            settings.interfaces_ttl(),
            settings.cache_capacity,
        ));
        let mac_cache = Arc::new(ResultCache::new(settings.mac_ttl(), settings.cache_capacity));
        let tdr_cache = Arc::new(ResultCache::new(settings.tdr_ttl(), settings.cache_capacity));
        let pool = Arc::new(Semaphore::new(settings.max_workers.max(1)));

        info!(
            "Core ready with {} site(s), {} TDR worker(s)",
            inventory.sites.len(),
            settings.max_workers.max(1)
        );

        Self {
            lister: InterfaceLister::new(gateway.clone(), interfaces_cache),
            dispatcher: TdrDispatcher::new(
                gateway.clone(),
                tdr_cache,
                pool,
                settings.tdr_settle_delay(),
            ),
            tracer: MacTracer::new(gateway, inventory.clone(), mac_cache),
            inventory,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn site(&self, site_name: &str) -> Result<&Site, SwitchTraceError> {
        self.inventory.site(site_name)
    }

    /// Finds an access switch by name, returning its site for display.
    pub fn access_switch(
        &self,
        site_name: &str,
        switch_name: &str,
    ) -> Result<(&Site, &Device), SwitchTraceError> {
        self.inventory.access_switch(site_name, switch_name)
    }

    pub async fn list_interfaces(
        &self,
        device: &Device,
    ) -> Result<Vec<Interface>, SwitchTraceError> {
        self.lister.list(device).await
    }

    pub async fn run_tdr(
        &self,
        device: &Device,
        interfaces: &[String],
    ) -> BTreeMap<String, TdrResult> {
        self.dispatcher.run(device, interfaces).await
    }

    pub fn cached_tdr_results(
        &self,
        device: &Device,
        interfaces: &[String],
    ) -> BTreeMap<String, TdrResult> {
        self.dispatcher.cached_results(device, interfaces)
    }

    pub async fn find_mac_on_site(
        &self,
        site_name: &str,
        mac: &str,
    ) -> Result<MacTrace, SwitchTraceError> {
        self.tracer.trace(site_name, mac).await
    }

    pub async fn find_mac_on_switch(
        &self,
        site_name: &str,
        switch_name: &str,
        mac: &str,
    ) -> Result<MacLookupResult, SwitchTraceError> {
        self.tracer.lookup_on_switch(site_name, switch_name, mac).await
    }
}

#[cfg(test)]
pub(crate) fn setup_test_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_test_writer()
                .with_level(true),
        )
        .with(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_normalize_mac_formats() {
        let expected = "aabb.ccdd.eeff";
        for input in [
            "AA:BB:CC:DD:EE:FF",
            "aa-bb-cc-dd-ee-ff",
            "aabb.ccdd.eeff",
            "AABBCCDDEEFF",
            " aa bb cc dd ee ff ",
        ] {
            let mac = NormalizedMac::normalize(input).expect("should normalize");
            assert_eq!(mac.to_string(), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_normalize_mac_rejects_wrong_length() {
        for input in ["", "aabb.ccdd.ee", "aabb.ccdd.eeff.00", "zzzz.zzzz.zzzz"] {
            let err = NormalizedMac::normalize(input).expect_err("should fail");
            assert!(
                matches!(err, SwitchTraceError::Validation(_)),
                "input {input:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_normalize_mac_keeps_leading_zeros() {
        let mac = NormalizedMac::normalize("00:01:0a:00:00:0f").expect("should normalize");
        assert_eq!(mac.to_string(), "0001.0a00.000f");
        assert_eq!(mac.bytes(), [0x00, 0x01, 0x0a, 0x00, 0x00, 0x0f]);
    }

    #[test]
    fn test_normalized_mac_serde() {
        let mac: NormalizedMac =
            serde_json::from_str("\"AA-BB-CC-00-11-22\"").expect("should deserialize");
        assert_eq!(
            serde_json::to_string(&mac).expect("should serialize"),
            "\"aabb.cc00.1122\""
        );
    }

    #[test]
    fn test_pair_status_from_str() {
        assert_eq!(PairStatus::from("Open"), PairStatus::Open);
        assert_eq!(PairStatus::from("NORMAL"), PairStatus::Normal);
        assert_eq!(PairStatus::from("Not Supported"), PairStatus::Unsupported);
        assert_eq!(PairStatus::from("no TDR"), PairStatus::None);
        assert_eq!(PairStatus::from("weird"), PairStatus::Unknown);
    }

    #[test]
    fn test_cacheable_values() {
        assert!(!Vec::<Interface>::new().is_cacheable());
        assert!(!TdrResult::error("", "boom").is_cacheable());
        assert!(
            !TdrResult::NoData {
                raw: String::new(),
                note: "nothing".to_string()
            }
            .is_cacheable()
        );

        let mac = NormalizedMac::normalize("aabb.ccdd.eeff").expect("valid mac");
        let miss = MacLookupResult {
            mac,
            interface: None,
            raw: String::new(),
            site: "lab".to_string(),
            switch: None,
        };
        assert!(!miss.is_cacheable());
        let hit = MacLookupResult {
            interface: Some("Gi1/0/1".to_string()),
            ..miss
        };
        assert!(hit.is_cacheable());
    }

    #[test]
    fn test_error_display_and_recoverable() {
        let err = SwitchTraceError::from(SshError::Timeout);
        assert_eq!(err.to_string(), "Connection error: Operation timed out");
        assert!(err.is_recoverable());
        assert!(!SwitchTraceError::Lookup("site x".to_string()).is_recoverable());
    }

    #[test]
    fn test_tdr_pair_length_meters() {
        let pair = TdrPair {
            pair: PairId::A,
            status: PairStatus::Normal,
            length_m: Some("12.5".to_string()),
            details: String::new(),
        };
        assert_eq!(pair.length_meters(), Some(12.5));
    }
}
