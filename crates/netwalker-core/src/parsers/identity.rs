use crate::model::Platform;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// Hostnames longer than this are truncated; matches the inventory column
/// width and the label width of the report sheets.
const MAX_HOSTNAME_LEN: usize = 36;

lazy_static! {
    static ref PAREN_SUFFIX: Regex = Regex::new(r"\(([^)]*)\)").unwrap();
    static ref HOSTNAME_JUNK: Regex = Regex::new(r"[^A-Za-z0-9-]").unwrap();

    // Hostname extraction from identity output, in precedence order
    static ref HOST_DEVICE_NAME: Regex = Regex::new(r"Device name:\s*(\S+)").unwrap();
    static ref HOST_PROMPT_LINE: Regex = Regex::new(r"(?m)^(\S+)[#>]\s*$").unwrap();
    static ref HOST_UPTIME_LINE: Regex = Regex::new(r"(?m)^([A-Za-z]\S*)\s+uptime is").unwrap();
    static ref HOST_PANOS: Regex = Regex::new(r"hostname:\s*(\S+)").unwrap();

    // Software version, in precedence order
    static ref VER_NXOS: Regex = Regex::new(r"NXOS:\s+version\s+(\S+)").unwrap();
    static ref VER_SYSTEM: Regex = Regex::new(r"System version:\s+(\S+)").unwrap();
    static ref VER_PANOS: Regex = Regex::new(r"sw-version:\s+(\S+)").unwrap();
    static ref VER_IOS: Regex = Regex::new(r"Version\s+([^\s,]+)").unwrap();

    // Hardware model, in precedence order
    static ref MODEL_NUMBER: Regex = Regex::new(r"Model [Nn]umber\s*:\s*([\w-]+)").unwrap();
    static ref MODEL_NEXUS: Regex = Regex::new(r"cisco\s+Nexus\d*\s+([\w-]+)\s+Chassis").unwrap();
    static ref MODEL_CATALYST: Regex =
        Regex::new(r"cisco\s+(WS-[\w-]+)\s+\([^)]+\)\s+processor").unwrap();
    static ref MODEL_ROUTER: Regex =
        Regex::new(r"cisco\s+([\w-]+/[\w-]+)\s+\([^)]+\)\s+processor").unwrap();
    static ref MODEL_PANOS: Regex = Regex::new(r"model:\s*(\S+)").unwrap();

    // Serial number keys per platform family; key capitalization varies
    // across images
    static ref SERIAL_SYSTEM: Regex =
        Regex::new(r"(?i)System serial number\s*:?\s*(\S+)").unwrap();
    static ref SERIAL_BOARD: Regex = Regex::new(r"(?i)Processor board ID\s+(\S+)").unwrap();
    static ref SERIAL_PANOS: Regex = Regex::new(r"serial:\s*(\S+)").unwrap();
}

/// Tokens that regularly precede `uptime is` or end a pseudo-prompt line in
/// version output but are never hostnames.
const HOSTNAME_DENYLIST: &[&str] = &["kernel", "system", "device", "switch", "router"];

/// Normalize a hostname for display, inventory keys, and neighbor matching.
///
/// FQDNs keep only the first label, a parenthesized serial suffix is
/// removed, anything outside `[A-Za-z0-9-]` is stripped, and the result is
/// truncated to 36 characters. Idempotent.
pub fn clean_hostname(raw: &str) -> String {
    let label = raw.split('.').next().unwrap_or("");
    let without_parens = PAREN_SUFFIX.replace_all(label, "");
    let mut cleaned = HOSTNAME_JUNK.replace_all(&without_parens, "").to_string();
    cleaned.truncate(MAX_HOSTNAME_LEN);
    cleaned
}

/// Split a raw device id of the form `HOST(SERIAL)` into the cleaned
/// hostname and the embedded serial, if any.
pub fn split_host_serial(raw: &str) -> (String, Option<String>) {
    let label = raw.split('.').next().unwrap_or("");
    let serial = PAREN_SUFFIX
        .captures(label)
        .map(|c| c[1].to_string())
        .filter(|s| !s.is_empty());
    (clean_hostname(raw), serial)
}

fn denied(token: &str) -> bool {
    let lower = token.to_lowercase();
    HOSTNAME_DENYLIST.iter().any(|d| lower == *d)
}

/// Pull the device's own hostname out of its identity output.
pub fn extract_hostname(output: &str) -> Option<String> {
    let candidates = [
        &*HOST_DEVICE_NAME,
        &*HOST_PROMPT_LINE,
        &*HOST_UPTIME_LINE,
        &*HOST_PANOS,
    ];
    for pattern in candidates {
        for caps in pattern.captures_iter(output) {
            let token = &caps[1];
            if denied(token) {
                continue;
            }
            let cleaned = clean_hostname(token);
            if !cleaned.is_empty() {
                return Some(cleaned);
            }
        }
    }
    debug!("No hostname found in identity output");
    None
}

/// Software version, by key priority. The generic IOS `Version` fallback is
/// suppressed on lines carrying license text, where the same keyword names a
/// GPL release rather than the running image.
pub fn extract_version(output: &str) -> Option<String> {
    for pattern in [&*VER_NXOS, &*VER_SYSTEM, &*VER_PANOS] {
        if let Some(caps) = pattern.captures(output) {
            return Some(caps[1].to_string());
        }
    }
    for line in output.lines() {
        let lower = line.to_lowercase();
        if lower.contains("gpl") || lower.contains("license") {
            continue;
        }
        if let Some(caps) = VER_IOS.captures(line) {
            return Some(caps[1].to_string());
        }
    }
    debug!("No software version found in identity output");
    None
}

/// Hardware model, by key priority. `Model number:` is authoritative when
/// present; the chassis banners cover platforms that omit it.
pub fn extract_model(output: &str) -> Option<String> {
    for pattern in [
        &*MODEL_NUMBER,
        &*MODEL_NEXUS,
        &*MODEL_CATALYST,
        &*MODEL_ROUTER,
        &*MODEL_PANOS,
    ] {
        if let Some(caps) = pattern.captures(output) {
            return Some(caps[1].to_string());
        }
    }
    debug!("No hardware model found in identity output");
    None
}

/// Serial number by platform-appropriate key.
pub fn extract_serial(output: &str, platform: Platform) -> Option<String> {
    let patterns: &[&Regex] = match platform {
        Platform::PanOs => &[&*SERIAL_PANOS],
        Platform::NxOs => &[&*SERIAL_BOARD, &*SERIAL_SYSTEM],
        _ => &[&*SERIAL_SYSTEM, &*SERIAL_BOARD],
    };
    for pattern in patterns {
        if let Some(caps) = pattern.captures(output) {
            return Some(caps[1].to_string());
        }
    }
    debug!("No serial number found in identity output");
    None
}

/// Capability tags for a walked device, derived from its own identity
/// output. Observed devices carry whatever their neighbor entry advertised;
/// a walk replaces that with this derivation.
pub fn capabilities_for(platform: Platform, model: &str) -> BTreeSet<String> {
    let mut caps = BTreeSet::new();
    match platform {
        Platform::PanOs => {
            caps.insert("Firewall".to_string());
        }
        Platform::NxOs => {
            caps.insert("Switch".to_string());
        }
        Platform::Ios | Platform::IosXe => {
            if model.starts_with("WS-") || model.starts_with("C9") || model.contains("C2960") {
                caps.insert("Switch".to_string());
            } else if model.contains('/') || model.starts_with("ISR") || model.starts_with("ASR") {
                caps.insert("Router".to_string());
            }
        }
        Platform::Unknown => {}
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOS_VERSION: &str = "\
Cisco IOS Software, C2960X Software (C2960X-UNIVERSALK9-M), Version 15.2(4)E10, RELEASE SOFTWARE (fc2)
Technical Support: http://www.cisco.com/techsupport
Copyright (c) 1986-2020 by Cisco Systems, Inc.

LUMT-IDF3-SW01 uptime is 2 years, 31 weeks, 6 days
System returned to ROM by power-on
System serial number            : FOC2027X0KT

Model number                    : WS-C2960X-48FPD-L
Processor board ID FOC2027X0KT
";

    const NXOS_VERSION: &str = "\
Cisco Nexus Operating System (NX-OS) Software
TAC support: http://www.cisco.com/tac
Copyrights to certain works contained herein are owned by other third parties.
The copyrights to certain works are licensed under the GNU General Public License (GPL)
Software
  BIOS: version 07.69
  NXOS: version 9.3(8)
Hardware
  cisco Nexus9000 C93180YC-EX Chassis
  Processor board ID FDO24160ABC

  Device name: LUMT-CORE-A
";

    const PANOS_INFO: &str = "\
hostname: LUMT-EDGE-FW
ip-address: 10.9.0.1
serial: 013201009999
model: PA-3220
sw-version: 10.1.6-h6
";

    #[test]
    fn test_clean_hostname_is_idempotent() {
        for raw in [
            "LUMT-CORE-A(FOX1849GQKY)",
            "sw01.example.com",
            "edge_fw#01",
            "plain-name",
        ] {
            let once = clean_hostname(raw);
            assert_eq!(clean_hostname(&once), once);
        }
    }

    #[test]
    fn test_clean_hostname_strips_fqdn_parens_and_junk() {
        assert_eq!(clean_hostname("LUMT-CORE-A(FOX1849GQKY)"), "LUMT-CORE-A");
        assert_eq!(clean_hostname("sw01.corp.example.com"), "sw01");
        assert_eq!(clean_hostname("edge_fw#01"), "edgefw01");
    }

    #[test]
    fn test_clean_hostname_truncates_to_36() {
        let long = "A".repeat(50);
        assert_eq!(clean_hostname(&long).len(), 36);
    }

    #[test]
    fn test_split_host_serial() {
        let (host, serial) = split_host_serial("LUMT-CORE-A(FOX1849GQKY)");
        assert_eq!(host, "LUMT-CORE-A");
        assert_eq!(serial.as_deref(), Some("FOX1849GQKY"));

        let (host, serial) = split_host_serial("SW01.corp.example.com");
        assert_eq!(host, "SW01");
        assert!(serial.is_none());
    }

    #[test]
    fn test_hostname_from_uptime_line() {
        assert_eq!(extract_hostname(IOS_VERSION).as_deref(), Some("LUMT-IDF3-SW01"));
    }

    #[test]
    fn test_hostname_prefers_device_name() {
        assert_eq!(extract_hostname(NXOS_VERSION).as_deref(), Some("LUMT-CORE-A"));
    }

    #[test]
    fn test_hostname_from_prompt_line() {
        let output = "some banner text\nLUMT-MDF-SW02#\n";
        assert_eq!(extract_hostname(output).as_deref(), Some("LUMT-MDF-SW02"));
    }

    #[test]
    fn test_hostname_denylist_rejected() {
        let output = "Switch uptime is 1 week, 2 days\n";
        assert_eq!(extract_hostname(output), None);
        let output = "Device name: kernel\nrouter#\n";
        assert_eq!(extract_hostname(output), None);
    }

    #[test]
    fn test_hostname_panos() {
        assert_eq!(extract_hostname(PANOS_INFO).as_deref(), Some("LUMT-EDGE-FW"));
    }

    #[test]
    fn test_version_priorities() {
        assert_eq!(extract_version(NXOS_VERSION).as_deref(), Some("9.3(8)"));
        assert_eq!(extract_version(IOS_VERSION).as_deref(), Some("15.2(4)E10"));
        assert_eq!(extract_version(PANOS_INFO).as_deref(), Some("10.1.6-h6"));
    }

    #[test]
    fn test_version_skips_license_lines() {
        let output = "\
The copyrights are licensed under Version 2 of the GPL
Cisco IOS Software, Version 15.0(2)SE11, RELEASE SOFTWARE
";
        assert_eq!(extract_version(output).as_deref(), Some("15.0(2)SE11"));
    }

    #[test]
    fn test_model_priorities() {
        assert_eq!(extract_model(IOS_VERSION).as_deref(), Some("WS-C2960X-48FPD-L"));
        assert_eq!(extract_model(NXOS_VERSION).as_deref(), Some("C93180YC-EX"));
        assert_eq!(extract_model(PANOS_INFO).as_deref(), Some("PA-3220"));
    }

    #[test]
    fn test_model_catalyst_and_isr_banners() {
        let cat4500 = "cisco WS-C4500X-32 (MPC8572) processor (revision 8) with 4194304K bytes";
        assert_eq!(extract_model(cat4500).as_deref(), Some("WS-C4500X-32"));
        let isr = "cisco ISR4451-X/K9 (2RU) processor with 1687137K/6147K bytes of memory.";
        assert_eq!(extract_model(isr).as_deref(), Some("ISR4451-X/K9"));
    }

    #[test]
    fn test_serial_by_platform() {
        assert_eq!(
            extract_serial(IOS_VERSION, Platform::Ios).as_deref(),
            Some("FOC2027X0KT")
        );
        assert_eq!(
            extract_serial(NXOS_VERSION, Platform::NxOs).as_deref(),
            Some("FDO24160ABC")
        );
        assert_eq!(
            extract_serial(PANOS_INFO, Platform::PanOs).as_deref(),
            Some("013201009999")
        );
    }

    #[test]
    fn test_capability_derivation() {
        assert!(capabilities_for(Platform::PanOs, "PA-3220").contains("Firewall"));
        assert!(capabilities_for(Platform::NxOs, "C93180YC-EX").contains("Switch"));
        assert!(capabilities_for(Platform::Ios, "WS-C2960X-48FPD-L").contains("Switch"));
        assert!(capabilities_for(Platform::IosXe, "ISR4451-X/K9").contains("Router"));
        assert!(capabilities_for(Platform::Unknown, "").is_empty());
    }
}
