use super::prelude::*;

/// Cisco IOS / IOS-XE and NX-OS command forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cisco {
    family: DeviceFamily,
}

impl Cisco {
    /// Substrings in the immediate reply to a cable test that mean the
    /// device doesn't know the command.
    pub const UNSUPPORTED_MARKERS: &'static [&'static str] =
        &["Invalid input", "Unknown command", "Command not found"];

    /// The start of a cable test returns to a prompt in either mode.
    pub const TDR_START_EXPECT: &'static str = "#|>";

    pub fn new(family: DeviceFamily) -> Self {
        Self { family }
    }

    pub fn family(&self) -> &DeviceFamily {
        &self.family
    }

    fn is_nxos(&self) -> bool {
        self.family == DeviceFamily::CiscoNxos
    }

    pub fn interfaces_status_command(&self) -> String {
        if self.is_nxos() {
            "show interface status".to_string()
        } else {
            "show interfaces status".to_string()
        }
    }

    pub fn mac_lookup_command(&self, mac: &NormalizedMac) -> String {
        format!("show mac address-table address {mac}")
    }

    pub fn neighbor_detail_command(&self, interface: &str) -> String {
        if self.is_nxos() {
            format!("show cdp neighbors interface {interface} detail")
        } else {
            format!("show cdp neighbors {interface} detail")
        }
    }

    pub fn tdr_start_command(&self, interface: &str) -> String {
        format!("test cable-diagnostics tdr interface {interface}")
    }

    pub fn tdr_show_command(&self, interface: &str) -> String {
        format!("show cable-diagnostics tdr interface {interface}")
    }

    pub fn is_unsupported(&self, output: &str) -> bool {
        Self::UNSUPPORTED_MARKERS
            .iter()
            .any(|marker| output.contains(marker))
    }
}

// The patterns below are literals, so compiling them can't fail at runtime.
#[allow(clippy::expect_used)]
static INTERFACE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z\-]*\d[\w/.:\-]*$").expect("valid interface name regex")
});

#[allow(clippy::expect_used)]
static MAC_TABLE_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Gi|Fa|Te|Tw|Et|Ethernet|Po|Port-channel|Eth)\S*")
        .expect("valid mac table port regex")
});

#[allow(clippy::expect_used)]
static MAC_TABLE_GENERIC_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]+[0-9/]+$").expect("valid generic port regex")
});

#[allow(clippy::expect_used)]
static TDR_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.{0,25}?Pair\s+([A-D])\b[:\-\s]*(.*)$").expect("valid tdr pair regex")
});

#[allow(clippy::expect_used)]
static TDR_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)(?:\s*(?:\+\s*/\s*-|±)\s*\d*(?:\.\d+)?)?\s*(?:meters|meter|m\.|m\b)",
    )
    .expect("valid tdr length regex")
});

#[allow(clippy::expect_used)]
static TDR_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(open|short|ok|normal|fault|not supported|unsupported|no tdr)\b")
        .expect("valid tdr status regex")
});

/// Operational states printed in the Status column, used to split rows when
/// there's no header to take column offsets from.
const STATUS_KEYWORDS: &[&str] = &[
    "connected",
    "notconnect",
    "notconnec",
    "disabled",
    "err-disabled",
    "err-disabl",
    "inactive",
    "monitoring",
    "suspended",
    "sfpabsent",
    "xcvrabsen",
    "nooperme",
    "noopermem",
    "down",
    "up",
];

/// Column offsets from a `Port Name Status Vlan Duplex Speed Type` header.
#[derive(Debug, Clone, Copy)]
struct StatusColumns {
    name: usize,
    status: usize,
}

impl StatusColumns {
    fn from_header(line: &str) -> Option<Self> {
        let trimmed = line.trim_start();
        if !trimmed.starts_with("Port") {
            return None;
        }
        let name = line.find("Name")?;
        let status = line.find("Status")?;
        if !(line.contains("Vlan") && line.contains("Type")) || status <= name {
            return None;
        }
        Some(Self { name, status })
    }
}

fn blank_dashes(value: &str) -> String {
    let value = value.trim();
    if value.chars().all(|c| c == '-') {
        String::new()
    } else {
        value.to_string()
    }
}

/// Builds an interface from the Status column onwards: status, vlan, duplex,
/// speed, then the remaining words as the media type.
fn interface_from_tail(name: &str, description: &str, tail: &[&str]) -> Option<Interface> {
    let (status, rest) = tail.split_first()?;
    if rest.len() < 3 {
        // vlan, duplex and speed are always printed
        return None;
    }
    Some(Interface {
        name: name.to_string(),
        description: blank_dashes(description),
        status: status.to_string(),
        vlan: Some(rest[0].to_string()),
        duplex: Some(rest[1].to_string()),
        speed: Some(rest[2].to_string()),
        media_type: blank_dashes(&rest[3..].join(" ")),
    })
}

fn parse_status_row(line: &str, columns: StatusColumns) -> Option<Interface> {
    let name = line.split_whitespace().next()?;
    if !INTERFACE_NAME.is_match(name) {
        return None;
    }
    let name_end = line.find(name).map(|start| start + name.len())?;

    let description = line
        .get(columns.name.max(name_end)..columns.status)
        .unwrap_or_default();
    let tail: Vec<&str> = line.get(columns.status..)?.split_whitespace().collect();
    interface_from_tail(name, description, &tail)
}

fn parse_status_row_by_keyword(line: &str) -> Option<Interface> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let name = *tokens.first()?;
    if !INTERFACE_NAME.is_match(name) {
        return None;
    }
    let status_at = tokens
        .iter()
        .skip(1)
        .position(|t| STATUS_KEYWORDS.contains(&t.to_lowercase().as_str()))?
        + 1;
    let description = tokens[1..status_at].join(" ");
    interface_from_tail(name, &description, &tokens[status_at..])
}

/// Parses `show interfaces status` (IOS) or `show interface status` (NX-OS).
///
/// Rows are sliced by the header's column offsets so that multi-word
/// descriptions survive; without a header, each row is split on its status
/// word instead. Lines that don't look like an interface row are dropped.
pub fn parse_interfaces_status(output: &str) -> Vec<Interface> {
    let mut columns: Option<StatusColumns> = None;
    let mut interfaces = Vec::new();

    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if let Some(header) = StatusColumns::from_header(line) {
            trace!("Interface status header found: {:?}", header);
            columns = Some(header);
            continue;
        }
        let parsed = match columns {
            Some(columns) => parse_status_row(line, columns),
            None => parse_status_row_by_keyword(line),
        };
        match parsed {
            Some(interface) => interfaces.push(interface),
            None => trace!("Skipping interface status line: {}", line),
        }
    }

    debug!("Parsed {} interfaces from status output", interfaces.len());
    interfaces
}

/// Finds the port a MAC was learned on in `show mac address-table` output.
pub fn parse_mac_table(output: &str, mac: &NormalizedMac) -> Option<String> {
    let needle = mac.to_string();
    output
        .lines()
        .filter(|line| line.to_lowercase().contains(&needle))
        .find_map(|line| {
            line.split_whitespace()
                .rev()
                .find(|token| {
                    MAC_TABLE_PORT.is_match(token) || MAC_TABLE_GENERIC_PORT.is_match(token)
                })
                .map(String::from)
        })
}

/// Fields of interest from `show cdp neighbors ... detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborDetail {
    pub name: Option<String>,
    pub address: Option<String>,
    pub platform: Option<String>,
    pub remote_interface: Option<String>,
}

/// Later entries overwrite earlier ones, so with several neighbors on the
/// port, or an entry listing both entry and management addresses, the last
/// value printed is the one returned.
pub fn parse_neighbor_detail(output: &str) -> NeighborDetail {
    let mut detail = NeighborDetail::default();

    for line in output.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Device ID:") {
            detail.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        }
        if let Some((_, address)) = line.split_once("IP address:") {
            detail.address = Some(address.trim().to_string()).filter(|a| !a.is_empty());
        }
        if let Some(platform) = line.strip_prefix("Platform:") {
            // "Platform: cisco WS-C3850-48P,  Capabilities: Switch IGMP"
            let platform = platform.split(',').next().unwrap_or_default().trim();
            if !platform.is_empty() {
                detail.platform = Some(platform.to_string());
            }
        }
        if let Some((_, port)) = line.split_once("Port ID (outgoing port):") {
            detail.remote_interface = Some(port.trim().to_string()).filter(|p| !p.is_empty());
        }
    }

    detail
}

fn length_token(text: &str) -> Option<String> {
    TDR_LENGTH
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn status_token(text: &str) -> Option<PairStatus> {
    TDR_STATUS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| PairStatus::from(m.as_str()))
}

/// Parses `show cable-diagnostics tdr` output.
///
/// Lines with a `Pair X` marker near the start become one entry each. If
/// there are none, any line carrying a length becomes an entry with an
/// unknown pair. If that finds nothing either, the raw text comes back with a
/// note.
pub fn parse_tdr_output(output: &str) -> TdrResult {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut pairs: Vec<TdrPair> = lines
        .iter()
        .filter_map(|line| TDR_PAIR.captures(line))
        .filter_map(|caps| {
            let pair = caps.get(1)?.as_str().chars().next()?;
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            Some(TdrPair {
                pair: PairId::from(pair),
                status: status_token(rest).unwrap_or(PairStatus::Unknown),
                length_m: length_token(rest),
                details: rest.to_string(),
            })
        })
        .collect();

    if pairs.is_empty() {
        pairs = lines
            .iter()
            .filter_map(|line| {
                length_token(line).map(|length| TdrPair {
                    pair: PairId::Unknown,
                    status: PairStatus::Unknown,
                    length_m: Some(length),
                    details: line.to_string(),
                })
            })
            .collect();
        if !pairs.is_empty() {
            debug!("No pair markers in TDR output, kept {} length lines", pairs.len());
        }
    }

    if pairs.is_empty() {
        warn!("No pair data found in TDR output");
        return TdrResult::NoData {
            raw: output.to_string(),
            note: "No parsed pair data; raw output provided".to_string(),
        };
    }

    TdrResult::Parsed {
        raw: output.to_string(),
        pairs,
    }
}
