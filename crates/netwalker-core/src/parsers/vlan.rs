use crate::model::{Interface, Platform, VlanRecord};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

lazy_static! {
    // VLAN table row. The trailing whitespace before the member list is
    // optional so a VLAN with zero ports still matches.
    static ref VLAN_ROW: Regex = Regex::new(r"^(\d+)\s+(\S+)\s+\S+\s*(.*)$").unwrap();
    // Wrapped member-list continuation lines are indented port tokens
    static ref PORT_TOKEN: Regex = Regex::new(r"^[A-Za-z]{2,4}\d[\w/\.]*$").unwrap();
    // Interface status rows start with a short interface name
    static ref IFACE_ROW: Regex = Regex::new(r"^(?:Gi|Te|Fa|Tw|Fo|Hu|Eth|Po|mgmt)\S*").unwrap();
}

/// Words that appear in the status column of `show interface[s] status`.
const STATUS_WORDS: &[&str] = &[
    "connected",
    "notconnect",
    "notconnec",
    "disabled",
    "err-disabled",
    "inactive",
    "sfpAbsent",
    "noOperMem",
    "suspended",
    "monitoring",
    "xcvrAbsen",
    "down",
    "up",
];

/// A VLAN row before interface-status cross-correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct VlanEntry {
    pub vlan_id: u16,
    pub name: String,
    pub members: Vec<String>,
}

fn is_member_list(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .all(|t| PORT_TOKEN.is_match(t))
}

fn split_members(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Parse `show vlan brief` (IOS) or `show vlan` (NX-OS) into VLAN entries.
///
/// NX-OS appends a `VLAN Type` section after the membership table; parsing
/// stops there. Duplicate VLAN ids keep the first well-formed row.
pub fn parse_vlans(output: &str, platform: Platform) -> Vec<VlanEntry> {
    let mut entries: Vec<VlanEntry> = Vec::new();
    let mut seen: HashSet<u16> = HashSet::new();

    for line in output.lines() {
        if platform == Platform::NxOs && line.starts_with("VLAN Type") {
            break;
        }

        // Wrapped member lists continue the previous row
        if line.starts_with(' ') || line.starts_with('\t') {
            if is_member_list(line) {
                if let Some(last) = entries.last_mut() {
                    last.members.extend(split_members(line.trim()));
                }
            }
            continue;
        }

        let Some(caps) = VLAN_ROW.captures(line) else {
            continue;
        };
        let Ok(vlan_id) = caps[1].parse::<u16>() else {
            continue;
        };
        if !(1..=4094).contains(&vlan_id) {
            debug!(vlan_id, "Ignoring out-of-range VLAN id");
            continue;
        }
        if !seen.insert(vlan_id) {
            warn!(vlan_id, "Duplicate VLAN id in output, keeping first entry");
            continue;
        }
        entries.push(VlanEntry {
            vlan_id,
            name: caps[2].to_string(),
            members: split_members(&caps[3]),
        });
    }

    entries
}

/// Parse `show interface[s] status` into interface rows. The description
/// column may contain spaces, so the status word is located by vocabulary
/// rather than by position.
pub fn parse_interface_status(output: &str) -> Vec<Interface> {
    let mut interfaces = Vec::new();

    for line in output.lines() {
        if !IFACE_ROW.is_match(line) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        let Some(status_idx) = tokens
            .iter()
            .position(|t| STATUS_WORDS.contains(t))
        else {
            continue;
        };
        interfaces.push(Interface {
            name: tokens[0].to_string(),
            ip: String::new(),
            status: tokens[status_idx].to_string(),
            vlan_membership: tokens.get(status_idx + 1).unwrap_or(&"").to_string(),
        });
    }

    interfaces
}

/// Cross-correlate VLAN membership with interface status to produce the
/// persisted VLAN records.
pub fn correlate(entries: &[VlanEntry], interfaces: &[Interface]) -> Vec<VlanRecord> {
    let status_by_name: HashMap<&str, &str> = interfaces
        .iter()
        .map(|i| (i.name.as_str(), i.status.as_str()))
        .collect();

    entries
        .iter()
        .map(|e| {
            let portchannel_count = e.members.iter().filter(|m| m.starts_with("Po")).count() as u32;
            let connected_port_count = e
                .members
                .iter()
                .filter(|m| status_by_name.get(m.as_str()) == Some(&"connected"))
                .count() as u32;
            VlanRecord {
                vlan_id: e.vlan_id,
                name: e.name.clone(),
                port_count: e.members.len() as u32,
                portchannel_count,
                connected_port_count,
            }
        })
        .collect()
}
