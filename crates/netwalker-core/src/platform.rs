use crate::model::Platform;
use regex::Regex;

lazy_static! {
    // Vendor identification patterns, checked in precedence order
    static ref NXOS_PATTERN: Regex = Regex::new(r"NXOS:|Nexus").unwrap();
    static ref IOS_XE_PATTERN: Regex = Regex::new(r"IOS-XE|IOS XE").unwrap();
    static ref IOS_PATTERN: Regex = Regex::new(r"Cisco IOS").unwrap();
    static ref PAN_OS_PATTERN: Regex = Regex::new(r"sw-version:|PAN-OS").unwrap();
}

/// Classify a device family from its identity output and the observed prompt.
///
/// First match wins. NX-OS images report both `NXOS:` and an IOS-style
/// version banner, so NX-OS must be checked before the IOS families; IOS-XE
/// banners also contain `Cisco IOS` and therefore precede plain IOS.
pub fn detect(version_output: &str, prompt_hint: &str) -> Platform {
    if NXOS_PATTERN.is_match(version_output) {
        return Platform::NxOs;
    }
    if IOS_XE_PATTERN.is_match(version_output) {
        return Platform::IosXe;
    }
    if IOS_PATTERN.is_match(version_output) {
        return Platform::Ios;
    }
    if PAN_OS_PATTERN.is_match(version_output) || prompt_hint.trim_end().ends_with("-FW") {
        return Platform::PanOs;
    }
    Platform::Unknown
}

/// The exact command set run against one device family. Only commands listed
/// here are ever issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPlan {
    pub pager_off: &'static str,
    pub identity: &'static str,
    pub neighbors: &'static [&'static str],
    pub vlan: Option<&'static str>,
    pub interfaces: Option<&'static str>,
}

const CISCO_NEIGHBOR_COMMANDS: &[&str] =
    &["show cdp neighbors detail", "show lldp neighbors detail"];

/// Per-family command dispatch. New platforms are a table addition.
pub fn commands_for(platform: Platform) -> CommandPlan {
    match platform {
        Platform::Ios | Platform::IosXe => CommandPlan {
            pager_off: "terminal length 0",
            identity: "show version",
            neighbors: CISCO_NEIGHBOR_COMMANDS,
            vlan: Some("show vlan brief"),
            interfaces: Some("show interfaces status"),
        },
        Platform::NxOs => CommandPlan {
            pager_off: "terminal length 0",
            identity: "show version",
            neighbors: CISCO_NEIGHBOR_COMMANDS,
            vlan: Some("show vlan"),
            interfaces: Some("show interface status"),
        },
        Platform::PanOs => CommandPlan {
            pager_off: "set cli pager off",
            identity: "show system info",
            neighbors: &[],
            vlan: None,
            interfaces: None,
        },
        Platform::Unknown => CommandPlan {
            pager_off: "terminal length 0",
            identity: "show version",
            neighbors: CISCO_NEIGHBOR_COMMANDS,
            vlan: None,
            interfaces: None,
        },
    }
}
