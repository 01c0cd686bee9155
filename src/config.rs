use std::{collections::BTreeMap, collections::HashSet, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::SwitchTraceError;

/// Device family derived from the inventory's `device_type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceFamily {
    CiscoIos,
    CiscoNxos,
    Other(String),
}

impl From<&str> for DeviceFamily {
    fn from(value: &str) -> Self {
        let lowered = value.to_lowercase();
        if lowered.contains("nxos") {
            DeviceFamily::CiscoNxos
        } else if lowered.starts_with("cisco") {
            DeviceFamily::CiscoIos
        } else {
            DeviceFamily::Other(value.to_string())
        }
    }
}

/// A switch as written in the inventory file.
///
/// Only `name` is interpreted here. Every other key is kept verbatim so that
/// the connection gateway can merge it with the site defaults and pick out the
/// fields it knows about; labels and other metadata ride along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Device {
    pub fn new(name: Option<&str>, host: &str, device_type: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("host".to_string(), Value::String(host.to_string()));
        fields.insert(
            "device_type".to_string(),
            Value::String(device_type.to_string()),
        );
        Self {
            name: name.map(String::from),
            fields,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    fn string_field(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Connection host, falling back to the legacy `ip` key.
    pub fn host(&self) -> Option<String> {
        self.string_field("host").or_else(|| self.string_field("ip"))
    }

    pub fn device_type(&self) -> Option<String> {
        self.string_field("device_type")
    }

    pub fn family(&self) -> DeviceFamily {
        self.device_type()
            .map(|t| DeviceFamily::from(t.as_str()))
            .unwrap_or_else(|| DeviceFamily::Other(String::new()))
    }

    /// Name for log lines and cache keys: the inventory name, else the host.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.host())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub central_switch: Device,
    #[serde(default)]
    pub access_switches: Vec<Device>,
}

impl Site {
    pub fn access_switch(&self, name: &str) -> Option<&Device> {
        self.access_switches
            .iter()
            .find(|sw| sw.name.as_deref() == Some(name))
    }
}

/// Runtime knobs. Durations are stored as whole seconds like the rest of the
/// inventory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub interfaces_cache_ttl_seconds: u64,
    pub mac_cache_ttl_seconds: u64,
    pub tdr_cache_ttl_seconds: u64,
    pub cache_capacity: usize,
    pub max_workers: usize,
    /// Wait between starting a cable test and reading its results
    pub tdr_settle_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interfaces_cache_ttl_seconds: 30,
            mac_cache_ttl_seconds: 60,
            tdr_cache_ttl_seconds: 60,
            cache_capacity: 2048,
            max_workers: 8,
            tdr_settle_seconds: 10,
        }
    }
}

impl Settings {
    pub fn interfaces_ttl(&self) -> Duration {
        Duration::from_secs(self.interfaces_cache_ttl_seconds)
    }

    pub fn mac_ttl(&self) -> Duration {
        Duration::from_secs(self.mac_cache_ttl_seconds)
    }

    pub fn tdr_ttl(&self) -> Duration {
        Duration::from_secs(self.tdr_cache_ttl_seconds)
    }

    pub fn tdr_settle_delay(&self) -> Duration {
        Duration::from_secs(self.tdr_settle_seconds)
    }
}

/// The loaded inventory. Built once and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub sites: Vec<Site>,
    /// Overlay applied under every device's own fields when connecting
    #[serde(default, alias = "netmiko_defaults")]
    pub connection_defaults: BTreeMap<String, Value>,
    #[serde(default)]
    pub settings: Settings,
}

impl Inventory {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SwitchTraceError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SwitchTraceError> {
        let inventory: Inventory = serde_yaml::from_str(content)?;
        inventory.validate()?;
        Ok(inventory)
    }

    /// Site names must be unique and every central switch needs a host.
    pub fn validate(&self) -> Result<(), SwitchTraceError> {
        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.name.as_str()) {
                return Err(SwitchTraceError::Validation(format!(
                    "Duplicate site name '{}' in inventory",
                    site.name
                )));
            }
            if site.central_switch.host().is_none() {
                return Err(SwitchTraceError::Validation(format!(
                    "Central switch of site '{}' has no host",
                    site.name
                )));
            }
        }
        Ok(())
    }

    pub fn site(&self, name: &str) -> Result<&Site, SwitchTraceError> {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SwitchTraceError::Lookup(format!("Site '{}' not found", name)))
    }

    pub fn access_switch(
        &self,
        site_name: &str,
        switch_name: &str,
    ) -> Result<(&Site, &Device), SwitchTraceError> {
        let site = self.site(site_name)?;
        let device = site.access_switch(switch_name).ok_or_else(|| {
            SwitchTraceError::Lookup(format!(
                "Switch '{}' not in inventory for site '{}'",
                switch_name, site_name
            ))
        })?;
        Ok((site, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const INVENTORY: &str = r#"
netmiko_defaults:
  username: netops
  password: hunter2
  device_type: cisco_ios
settings:
  max_workers: 4
  tdr_settle_seconds: 5
sites:
  - name: hq
    description: Headquarters
    central_switch:
      host: 10.0.0.1
      device_type: cisco_nxos
    access_switches:
      - name: sw-floor1
        host: 10.0.0.11
        rack: A3
      - name: sw-floor2
        ip: 10.0.0.12
  - name: branch
    central_switch:
      host: 10.1.0.1
"#;

    #[test]
    fn test_inventory_parsing() {
        let inventory = Inventory::from_yaml(INVENTORY).expect("Failed to parse inventory");
        assert_eq!(inventory.sites.len(), 2);
        assert_eq!(
            inventory.connection_defaults.get("username"),
            Some(&Value::String("netops".to_string()))
        );
        assert_eq!(inventory.settings.max_workers, 4);
        assert_eq!(inventory.settings.tdr_settle_delay(), Duration::from_secs(5));
        // unspecified settings keep their defaults
        assert_eq!(inventory.settings.tdr_cache_ttl_seconds, 60);

        let hq = inventory.site("hq").expect("hq exists");
        assert_eq!(hq.description, "Headquarters");
        assert_eq!(hq.central_switch.family(), DeviceFamily::CiscoNxos);
        assert_eq!(hq.access_switches.len(), 2);
        assert_eq!(
            hq.access_switches[0].fields.get("rack"),
            Some(&Value::String("A3".to_string()))
        );
        assert_eq!(hq.access_switches[1].host(), Some("10.0.0.12".to_string()));
    }

    #[test]
    fn test_inventory_lookups() {
        let inventory = Inventory::from_yaml(INVENTORY).expect("Failed to parse inventory");
        let (site, device) = inventory
            .access_switch("hq", "sw-floor2")
            .expect("switch exists");
        assert_eq!(site.name, "hq");
        assert_eq!(device.name.as_deref(), Some("sw-floor2"));

        assert!(matches!(
            inventory.site("nowhere"),
            Err(SwitchTraceError::Lookup(_))
        ));
        assert!(matches!(
            inventory.access_switch("hq", "sw-floor9"),
            Err(SwitchTraceError::Lookup(_))
        ));
        assert!(matches!(
            inventory.access_switch("nowhere", "sw-floor1"),
            Err(SwitchTraceError::Lookup(_))
        ));
    }

    #[test]
    fn test_duplicate_site_rejected() {
        let content = r#"
sites:
  - name: hq
    central_switch: { host: 10.0.0.1 }
  - name: hq
    central_switch: { host: 10.0.0.2 }
"#;
        assert!(matches!(
            Inventory::from_yaml(content),
            Err(SwitchTraceError::Validation(_))
        ));
    }

    #[test]
    fn test_central_without_host_rejected() {
        let content = r#"
sites:
  - name: hq
    central_switch: { device_type: cisco_ios }
"#;
        assert!(matches!(
            Inventory::from_yaml(content),
            Err(SwitchTraceError::Validation(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        writeln!(temp_file, "{}", INVENTORY).expect("Failed to write temp file");
        let inventory = Inventory::load_from_file(temp_file.path()).expect("Failed to load");
        assert_eq!(inventory.sites.len(), 2);

        assert!(matches!(
            Inventory::load_from_file("/nonexistent/inventory.yaml"),
            Err(SwitchTraceError::Io(_))
        ));
    }

    #[test]
    fn test_device_family_from_tag() {
        assert_eq!(DeviceFamily::from("cisco_ios"), DeviceFamily::CiscoIos);
        assert_eq!(DeviceFamily::from("cisco_xe"), DeviceFamily::CiscoIos);
        assert_eq!(DeviceFamily::from("cisco_nxos"), DeviceFamily::CiscoNxos);
        assert_eq!(
            DeviceFamily::from("juniper_junos"),
            DeviceFamily::Other("juniper_junos".to_string())
        );
    }

    #[test]
    fn test_device_display_name() {
        let named = Device::new(Some("sw1"), "10.0.0.1", "cisco_ios");
        assert_eq!(named.display_name(), "sw1");
        let unnamed = Device::new(None, "10.0.0.2", "cisco_ios");
        assert_eq!(unnamed.display_name(), "10.0.0.2");
    }
}
