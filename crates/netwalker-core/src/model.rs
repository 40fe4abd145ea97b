use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Serial placeholder carried by devices that are only known from a neighbor
/// advertisement. Replaced in place when the device is walked.
pub const UNKNOWN_SERIAL: &str = "unknown";

/// Device families the collector knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Ios,
    IosXe,
    NxOs,
    PanOs,
    Unknown,
}

impl Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ios => write!(f, "ios"),
            Platform::IosXe => write!(f, "ios-xe"),
            Platform::NxOs => write!(f, "nx-os"),
            Platform::PanOs => write!(f, "pan-os"),
            Platform::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "ios-xe" => Ok(Platform::IosXe),
            "nx-os" => Ok(Platform::NxOs),
            "pan-os" => Ok(Platform::PanOs),
            "unknown" => Ok(Platform::Unknown),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Lifecycle state of a device row in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Walked,
    Observed,
    Skipped,
    Failed,
    Boundary,
    Purge,
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Walked => write!(f, "walked"),
            DeviceStatus::Observed => write!(f, "observed"),
            DeviceStatus::Skipped => write!(f, "skipped"),
            DeviceStatus::Failed => write!(f, "failed"),
            DeviceStatus::Boundary => write!(f, "boundary"),
            DeviceStatus::Purge => write!(f, "purge"),
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "walked" => Ok(DeviceStatus::Walked),
            "observed" => Ok(DeviceStatus::Observed),
            "skipped" => Ok(DeviceStatus::Skipped),
            "failed" => Ok(DeviceStatus::Failed),
            "boundary" => Ok(DeviceStatus::Boundary),
            "purge" => Ok(DeviceStatus::Purge),
            _ => Err(format!("Unknown device status: {}", s)),
        }
    }
}

/// Transport over which a session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Ssh,
    Telnet,
}

impl Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Ssh => write!(f, "ssh"),
            Transport::Telnet => write!(f, "telnet"),
        }
    }
}

/// The persisted identity of a walked or observed device.
///
/// `(hostname, serial)` is the unique key; observed-only devices carry
/// [`UNKNOWN_SERIAL`] until a full collection promotes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub hostname: String,
    pub serial: String,
    pub primary_ip: String,
    pub management_ips: BTreeSet<String>,
    pub platform: Platform,
    pub hardware_model: String,
    pub software_version: String,
    pub capabilities: BTreeSet<String>,
    pub status: DeviceStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceIdentity {
    /// A placeholder identity for a device known only from a neighbor entry
    /// or a seed line.
    pub fn observed(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        let ip = ip.into();
        let now = Utc::now();
        let mut management_ips = BTreeSet::new();
        if !ip.is_empty() {
            management_ips.insert(ip.clone());
        }
        Self {
            hostname: hostname.into(),
            serial: UNKNOWN_SERIAL.to_string(),
            primary_ip: ip,
            management_ips,
            platform: Platform::Unknown,
            hardware_model: String::new(),
            software_version: String::new(),
            capabilities: BTreeSet::new(),
            status: DeviceStatus::Observed,
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn has_concrete_serial(&self) -> bool {
        !self.serial.is_empty() && self.serial != UNKNOWN_SERIAL
    }
}

/// One interface row from `show interface[s] status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// `ip/mask`, or empty when the interface carries no address.
    pub ip: String,
    pub status: String,
    pub vlan_membership: String,
}

/// One VLAN row after cross-correlation with the interface status table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanRecord {
    pub vlan_id: u16,
    pub name: String,
    pub port_count: u32,
    pub portchannel_count: u32,
    pub connected_port_count: u32,
}

/// Which protocol advertised a neighbor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborProtocol {
    Cdp,
    Lldp,
}

impl Display for NeighborProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighborProtocol::Cdp => write!(f, "cdp"),
            NeighborProtocol::Lldp => write!(f, "lldp"),
        }
    }
}

/// A directed adjacency from the collected device to a remote peer.
/// The local side is implicit in the owning [`DeviceRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub local_port: String,
    /// Cleaned remote hostname.
    pub remote_hostname: String,
    pub remote_port: String,
    pub remote_ip: String,
    pub remote_platform: String,
    pub remote_capabilities: BTreeSet<String>,
    /// Serial lifted from a `HOST(SERIAL)` device id, when present.
    pub remote_serial: Option<String>,
    pub protocol: NeighborProtocol,
}

/// Everything one collection pass produced for a single device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub interfaces: Vec<Interface>,
    pub vlans: Vec<VlanRecord>,
    pub neighbors: Vec<Neighbor>,
    pub transport: Option<Transport>,
    /// Error kind label when the collection failed.
    pub failure: Option<String>,
}

impl DeviceRecord {
    pub fn failed(identity: DeviceIdentity, kind: &str) -> Self {
        let mut identity = identity;
        identity.status = DeviceStatus::Failed;
        Self {
            identity,
            interfaces: Vec::new(),
            vlans: Vec::new(),
            neighbors: Vec::new(),
            transport: None,
            failure: Some(kind.to_string()),
        }
    }

    pub fn is_walked(&self) -> bool {
        self.failure.is_none()
    }
}

/// A resolved adjacency between two inventory devices, as consumed by the
/// report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacencyEdge {
    pub local_hostname: String,
    pub local_port: String,
    pub remote_hostname: String,
    pub remote_port: String,
}

/// A unit of work owned by the discovery engine between pop and completion.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub hostname_hint: String,
    pub ip: String,
    pub depth: u32,
    /// Hostname of the device that advertised this entry, or `"seed"`.
    pub origin: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for p in [
            Platform::Ios,
            Platform::IosXe,
            Platform::NxOs,
            Platform::PanOs,
            Platform::Unknown,
        ] {
            assert_eq!(p.to_string().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            DeviceStatus::Walked,
            DeviceStatus::Observed,
            DeviceStatus::Skipped,
            DeviceStatus::Failed,
            DeviceStatus::Boundary,
            DeviceStatus::Purge,
        ] {
            assert_eq!(s.to_string().parse::<DeviceStatus>().unwrap(), s);
        }
    }

    #[test]
    fn test_observed_identity_defaults() {
        let d = DeviceIdentity::observed("SW01", "10.1.1.10");
        assert_eq!(d.serial, UNKNOWN_SERIAL);
        assert!(!d.has_concrete_serial());
        assert_eq!(d.status, DeviceStatus::Observed);
        assert!(d.management_ips.contains("10.1.1.10"));
    }

    #[test]
    fn test_failed_record_carries_kind() {
        let rec = DeviceRecord::failed(DeviceIdentity::observed("SW01", "10.1.1.10"), "auth-failed");
        assert_eq!(rec.identity.status, DeviceStatus::Failed);
        assert_eq!(rec.failure.as_deref(), Some("auth-failed"));
        assert!(!rec.is_walked());
    }
}
