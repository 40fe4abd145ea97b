use crate::model::Neighbor;
use ipnetwork::IpNetwork;
use regex::Regex;
use std::net::IpAddr;
use tracing::{debug, warn};

/// A shell-style glob compiled to an anchored, case-insensitive regex.
/// `*` matches any run of characters and `?` exactly one.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let mut pattern = String::from("(?i)^");
        for ch in glob.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        Ok(Self {
            source: glob.to_string(),
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse a comma-separated glob list, dropping patterns that fail to
/// compile with a warning.
pub fn parse_glob_list(raw: &str) -> Vec<GlobPattern> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match GlobPattern::new(s) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(pattern = s, error = %e, "Ignoring invalid exclusion glob");
                None
            }
        })
        .collect()
}

/// Parse a comma-separated CIDR list, dropping invalid entries with a
/// warning.
pub fn parse_subnet_list(raw: &str) -> Vec<IpNetwork> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<IpNetwork>() {
            Ok(net) => Some(net),
            Err(e) => {
                warn!(subnet = s, error = %e, "Ignoring invalid exclusion subnet");
                None
            }
        })
        .collect()
}

/// Why a prospective neighbor was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Platform,
    Capability,
    Hostname,
    Subnet,
}

/// Disposition of a prospective neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admit and queue for collection.
    Queue,
    /// Visible at the depth limit; persist but never walk.
    Boundary,
    /// Excluded by policy; persist as observed, do not queue.
    Skip(SkipReason),
    /// No usable address or already dispositioned; drop silently.
    Drop,
}

/// The admission policy applied to every prospective neighbor.
pub struct NeighborFilter {
    max_depth: u32,
    exclude_platforms: Vec<GlobPattern>,
    exclude_capabilities: Vec<GlobPattern>,
    exclude_hostnames: Vec<GlobPattern>,
    exclude_subnets: Vec<IpNetwork>,
}

impl NeighborFilter {
    pub fn new(
        max_depth: u32,
        exclude_platforms: Vec<GlobPattern>,
        exclude_capabilities: Vec<GlobPattern>,
        exclude_hostnames: Vec<GlobPattern>,
        exclude_subnets: Vec<IpNetwork>,
    ) -> Self {
        Self {
            max_depth,
            exclude_platforms,
            exclude_capabilities,
            exclude_hostnames,
            exclude_subnets,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Evaluate a neighbor advertised by a device at `parent_depth`.
    /// `already_visited` is the engine's atomic check of its visited sets;
    /// it participates here so the decision order matches the policy:
    /// depth, visited/empty-ip, platform, capabilities, hostname, subnet.
    pub fn evaluate(
        &self,
        neighbor: &Neighbor,
        parent_depth: u32,
        already_visited: bool,
    ) -> Admission {
        if parent_depth + 1 > self.max_depth {
            debug!(remote = %neighbor.remote_hostname, "Neighbor beyond max depth, marking boundary");
            return Admission::Boundary;
        }

        if neighbor.remote_ip.is_empty() || already_visited {
            return Admission::Drop;
        }

        if self
            .exclude_platforms
            .iter()
            .any(|p| p.matches(&neighbor.remote_platform))
        {
            debug!(remote = %neighbor.remote_hostname, platform = %neighbor.remote_platform, "Neighbor excluded by platform");
            return Admission::Skip(SkipReason::Platform);
        }

        if neighbor.remote_capabilities.iter().any(|cap| {
            self.exclude_capabilities.iter().any(|p| p.matches(cap))
        }) {
            debug!(remote = %neighbor.remote_hostname, "Neighbor excluded by capability");
            return Admission::Skip(SkipReason::Capability);
        }

        if self
            .exclude_hostnames
            .iter()
            .any(|p| p.matches(&neighbor.remote_hostname))
        {
            debug!(remote = %neighbor.remote_hostname, "Neighbor excluded by hostname");
            return Admission::Skip(SkipReason::Hostname);
        }

        if let Ok(addr) = neighbor.remote_ip.parse::<IpAddr>() {
            if self.exclude_subnets.iter().any(|net| net.contains(addr)) {
                debug!(remote = %neighbor.remote_hostname, ip = %neighbor.remote_ip, "Neighbor excluded by subnet");
                return Admission::Skip(SkipReason::Subnet);
            }
        }

        Admission::Queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NeighborProtocol;
    use std::collections::BTreeSet;

    fn neighbor(hostname: &str, ip: &str, platform: &str, caps: &[&str]) -> Neighbor {
        Neighbor {
            local_port: "Gi1/0/1".to_string(),
            remote_hostname: hostname.to_string(),
            remote_port: "Gi1/0/2".to_string(),
            remote_ip: ip.to_string(),
            remote_platform: platform.to_string(),
            remote_capabilities: caps.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            remote_serial: None,
            protocol: NeighborProtocol::Cdp,
        }
    }

    fn filter(max_depth: u32) -> NeighborFilter {
        NeighborFilter::new(
            max_depth,
            parse_glob_list("*ip phone*"),
            parse_glob_list("*phone*,host"),
            parse_glob_list("LAB-*"),
            parse_subnet_list("192.168.100.0/24"),
        )
    }

    #[test]
    fn test_glob_matching() {
        let glob = GlobPattern::new("*-CORE-*").unwrap();
        assert!(glob.matches("LUMT-CORE-A"));
        assert!(glob.matches("lumt-core-b"));
        assert!(!glob.matches("LUMT-IDF3-SW01"));
        assert_eq!(glob.source(), "*-CORE-*");
    }

    #[test]
    fn test_depth_boundary_checked_first() {
        let f = filter(2);
        // Even an excluded-capability device is boundary at the depth limit
        let n = neighbor("PHONE-1", "10.0.0.5", "Cisco IP Phone", &["Phone"]);
        assert_eq!(f.evaluate(&n, 2, false), Admission::Boundary);
    }

    #[test]
    fn test_empty_ip_and_visited_drop() {
        let f = filter(9);
        let n = neighbor("SW01", "", "cisco WS-C2960X", &["Switch"]);
        assert_eq!(f.evaluate(&n, 0, false), Admission::Drop);
        let n = neighbor("SW01", "10.0.0.2", "cisco WS-C2960X", &["Switch"]);
        assert_eq!(f.evaluate(&n, 0, true), Admission::Drop);
    }

    #[test]
    fn test_platform_exclusion() {
        let f = filter(9);
        let n = neighbor("PHONE-9", "10.0.0.9", "Cisco IP Phone 8841", &[]);
        assert_eq!(f.evaluate(&n, 0, false), Admission::Skip(SkipReason::Platform));
    }

    #[test]
    fn test_capability_exclusion_case_insensitive() {
        let f = filter(9);
        let n = neighbor("SEP-DESK", "10.0.0.7", "unlisted", &["Host", "Phone"]);
        assert_eq!(
            f.evaluate(&n, 0, false),
            Admission::Skip(SkipReason::Capability)
        );
    }

    #[test]
    fn test_hostname_exclusion() {
        let f = filter(9);
        let n = neighbor("LAB-SW9", "10.0.0.8", "cisco WS-C2960X", &["Switch"]);
        assert_eq!(f.evaluate(&n, 0, false), Admission::Skip(SkipReason::Hostname));
    }

    #[test]
    fn test_subnet_exclusion() {
        let f = filter(9);
        let n = neighbor("DMZ-SW1", "192.168.100.14", "cisco WS-C2960X", &["Switch"]);
        assert_eq!(f.evaluate(&n, 0, false), Admission::Skip(SkipReason::Subnet));
    }

    #[test]
    fn test_clean_switch_is_queued() {
        let f = filter(9);
        let n = neighbor("SW01", "10.1.1.10", "cisco WS-C2960X-48FPD-L", &["Switch", "IGMP"]);
        assert_eq!(f.evaluate(&n, 0, false), Admission::Queue);
    }

    #[test]
    fn test_max_depth_zero_walks_only_seeds() {
        let f = filter(0);
        let n = neighbor("SW01", "10.1.1.10", "cisco WS-C2960X", &["Switch"]);
        // Seed is depth 0; its neighbors land beyond the limit
        assert_eq!(f.evaluate(&n, 0, false), Admission::Boundary);
    }
}
