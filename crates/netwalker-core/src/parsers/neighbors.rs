use crate::model::{Neighbor, NeighborProtocol};
use crate::parsers::identity::{clean_hostname, split_host_serial};
use crate::patterns::IP_ADDRESS_PATTERN;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// Long-form interface prefixes and their abbreviations. CDP reports the
/// long form while LLDP reports the short one, so adjacency comparison has
/// to go through a canonical spelling. Longer prefixes first: every
/// `*GigabitEthernet` must be tried before plain `GigabitEthernet`, and that
/// before `Ethernet`.
const IFNAME_SHORT_FORMS: &[(&str, &str)] = &[
    ("TwentyFiveGigE", "Twe"),
    ("FortyGigabitEthernet", "Fo"),
    ("HundredGigE", "Hu"),
    ("TenGigabitEthernet", "Te"),
    ("TwoGigabitEthernet", "Tw"),
    ("GigabitEthernet", "Gi"),
    ("FastEthernet", "Fa"),
    ("Port-channel", "Po"),
    ("Ethernet", "Eth"),
];

/// Collapse an interface name to its abbreviated spelling
/// (`GigabitEthernet1/0/49` and `Gi1/0/49` both become `Gi1/0/49`).
/// Names with no known long prefix pass through trimmed.
pub fn canonical_ifname(name: &str) -> String {
    let name = name.trim();
    for (long, short) in IFNAME_SHORT_FORMS {
        let prefix = long.as_bytes();
        if name.len() >= prefix.len() && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return format!("{}{}", short, &name[prefix.len()..]);
        }
    }
    name.to_string()
}

lazy_static! {
    // Entry separator shared by CDP and LLDP detail output
    static ref ENTRY_SEPARATOR: Regex = Regex::new(r"(?m)^-{4,}\s*$").unwrap();

    // CDP detail fields
    static ref CDP_DEVICE_ID: Regex = Regex::new(r"Device ID\s*:\s*(\S+)").unwrap();
    static ref CDP_IP_ADDRESS: Regex = Regex::new(r"IP address:\s*(\S+)").unwrap();
    static ref CDP_IPV4_ADDRESS: Regex = Regex::new(r"IPv4 Address:\s*(\S+)").unwrap();
    static ref CDP_INTERFACE_ADDR: Regex =
        Regex::new(r"Interface address\(es\):[\s\S]*?IPv4 Address:\s*(\S+)").unwrap();
    static ref CDP_PLATFORM: Regex = Regex::new(r"Platform\s*:\s*([^,\n]+)").unwrap();
    static ref CDP_CAPABILITIES: Regex = Regex::new(r"Capabilities\s*:\s*(.+)").unwrap();
    static ref CDP_LOCAL_INTF: Regex = Regex::new(r"Interface\s*:\s*([^,\n]+)").unwrap();
    static ref CDP_REMOTE_PORT: Regex =
        Regex::new(r"Port ID \(outgoing port\)\s*:\s*(\S+)").unwrap();

    // LLDP detail fields
    static ref LLDP_LOCAL_INTF: Regex = Regex::new(r"Local Intf\s*:\s*(\S+)").unwrap();
    static ref LLDP_SYSTEM_NAME: Regex = Regex::new(r"System Name\s*:\s*(\S+)").unwrap();
    static ref LLDP_PORT_ID: Regex = Regex::new(r"Port id\s*:\s*(\S+)").unwrap();
    static ref LLDP_PORT_DESC: Regex = Regex::new(r"Port Description\s*:\s*(.+)").unwrap();
    static ref LLDP_MGMT_ADDR: Regex =
        Regex::new(r"Management Addresses:\s*\n\s*IP:\s*(\S+)").unwrap();
    static ref LLDP_CAPABILITIES: Regex = Regex::new(r"Enabled Capabilities\s*:\s*(.+)").unwrap();
    static ref LLDP_SYSTEM_DESC: Regex = Regex::new(r"System Description:\s*\n\s*([^\n]+)").unwrap();
}

fn capture(pattern: &Regex, entry: &str) -> String {
    pattern
        .captures(entry)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default()
}

/// Address fields sometimes carry placeholder words (`unassigned`, `none`)
/// instead of an address; anything that is not a dotted quad is treated as
/// missing.
fn validated_ip(token: String) -> String {
    if token.is_empty() || IP_ADDRESS_PATTERN.is_match(&token) {
        token
    } else {
        debug!(token = %token, "Discarding non-address token in neighbor entry");
        String::new()
    }
}

/// CDP capability words are already report-ready tokens.
fn cdp_capabilities(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(|t| t.to_string()).collect()
}

/// LLDP advertises single-letter capability codes; map them onto the same
/// token set CDP uses so filtering sees one vocabulary.
fn lldp_capabilities(raw: &str) -> BTreeSet<String> {
    let mut caps = BTreeSet::new();
    for code in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = match code.trim() {
            "R" => "Router",
            "B" => "Bridge",
            "T" => "Phone",
            "S" => "Host",
            "W" => "Host",
            "O" => "Host",
            "" => continue,
            other => {
                debug!("Unrecognized LLDP capability code: {}", other);
                continue;
            }
        };
        caps.insert(token.to_string());
    }
    caps
}

/// Parse `show cdp neighbors detail` output into neighbor edges.
///
/// The local hostname is needed to drop self-referential entries, which show
/// up when a device sees its own advertisement reflected off an unmanaged
/// segment.
pub fn parse_cdp(output: &str, local_hostname: &str) -> Vec<Neighbor> {
    let local = clean_hostname(local_hostname);
    let mut neighbors = Vec::new();

    for entry in ENTRY_SEPARATOR.split(output) {
        let device_id = capture(&CDP_DEVICE_ID, entry);
        if device_id.is_empty() {
            continue;
        }
        let (remote_hostname, remote_serial) = split_host_serial(&device_id);
        if remote_hostname.is_empty() {
            continue;
        }
        if remote_hostname == local {
            debug!("Dropping self-referential CDP entry for {}", remote_hostname);
            continue;
        }

        // Address variants tried in order; newer images use the IPv4 form
        let mut remote_ip = validated_ip(capture(&CDP_IP_ADDRESS, entry));
        if remote_ip.is_empty() {
            remote_ip = validated_ip(capture(&CDP_IPV4_ADDRESS, entry));
        }
        if remote_ip.is_empty() {
            remote_ip = validated_ip(capture(&CDP_INTERFACE_ADDR, entry));
        }

        neighbors.push(Neighbor {
            local_port: capture(&CDP_LOCAL_INTF, entry),
            remote_hostname,
            remote_port: capture(&CDP_REMOTE_PORT, entry),
            remote_ip,
            remote_platform: capture(&CDP_PLATFORM, entry),
            remote_capabilities: cdp_capabilities(&capture(&CDP_CAPABILITIES, entry)),
            remote_serial,
            protocol: NeighborProtocol::Cdp,
        });
    }

    neighbors
}

/// Parse `show lldp neighbors detail` output into neighbor edges.
pub fn parse_lldp(output: &str, local_hostname: &str) -> Vec<Neighbor> {
    let local = clean_hostname(local_hostname);
    let mut neighbors = Vec::new();

    for entry in ENTRY_SEPARATOR.split(output) {
        let system_name = capture(&LLDP_SYSTEM_NAME, entry);
        if system_name.is_empty() {
            continue;
        }
        let (remote_hostname, remote_serial) = split_host_serial(&system_name);
        if remote_hostname.is_empty() {
            continue;
        }
        if remote_hostname == local {
            debug!("Dropping self-referential LLDP entry for {}", remote_hostname);
            continue;
        }

        let mut remote_port = capture(&LLDP_PORT_ID, entry);
        if remote_port.is_empty() {
            remote_port = capture(&LLDP_PORT_DESC, entry);
        }

        neighbors.push(Neighbor {
            local_port: capture(&LLDP_LOCAL_INTF, entry),
            remote_hostname,
            remote_port,
            remote_ip: validated_ip(capture(&LLDP_MGMT_ADDR, entry)),
            remote_platform: capture(&LLDP_SYSTEM_DESC, entry),
            remote_capabilities: lldp_capabilities(&capture(&LLDP_CAPABILITIES, entry)),
            remote_serial,
            protocol: NeighborProtocol::Lldp,
        });
    }

    neighbors
}

/// Merge CDP and LLDP views of the same adjacency. CDP entries win because
/// they carry the platform string and the full capability vocabulary; LLDP
/// only contributes edges CDP did not see. The two protocols spell the
/// local interface differently, so comparison runs on the canonical name.
pub fn merge_neighbors(cdp: Vec<Neighbor>, lldp: Vec<Neighbor>) -> Vec<Neighbor> {
    let mut merged = cdp;
    let seen: BTreeSet<(String, String)> = merged
        .iter()
        .map(|n| (canonical_ifname(&n.local_port), n.remote_hostname.clone()))
        .collect();
    for n in lldp {
        if !seen.contains(&(canonical_ifname(&n.local_port), n.remote_hostname.clone())) {
            merged.push(n);
        }
    }
    merged
}
