//! End-to-end parsing checks against captured CLI transcripts: identity
//! extraction, neighbor tables, and VLAN cross-correlation as one flow.

use netwalker_core::model::Platform;
use netwalker_core::parsers::identity::{
    clean_hostname, extract_hostname, extract_model, extract_serial, extract_version,
    split_host_serial,
};
use netwalker_core::parsers::neighbors::{merge_neighbors, parse_cdp, parse_lldp};
use netwalker_core::parsers::vlan::{correlate, parse_interface_status, parse_vlans};
use netwalker_core::platform::{commands_for, detect};

const CATALYST_VERSION: &str = "\
Cisco IOS Software, IOS-XE Software, Catalyst L3 Switch Software (CAT9K_IOSXE), Version 16.12.05b, RELEASE SOFTWARE (fc3)
Technical Support: http://www.cisco.com/techsupport
Copyright (c) 1986-2021 by Cisco Systems, Inc.

This product contains cryptographic features and is subject to United
States and local country laws... A summary of U.S. laws governing Cisco
cryptographic products may be found with the export compliance license.

LUMT-MDF-SW01 uptime is 1 year, 12 weeks, 2 days, 1 hour, 9 minutes
System returned to ROM by Reload Command

cisco C9300-48P (X86) processor with 1392780K/6147K bytes of memory.
Model Number                       : C9300-48P
System Serial Number               : FCW2345L0AB
";

const NEXUS_VERSION: &str = "\
Cisco Nexus Operating System (NX-OS) Software
TAC support: http://www.cisco.com/tac
Documents: http://www.cisco.com/en/US/products/ps9372/tsd_products_support_series_home.html

Software
  BIOS: version 05.47
  NXOS: version 9.3(10)
  NXOS image file is: bootflash:///nxos.9.3.10.bin

Hardware
  cisco Nexus9000 C93180YC-FX Chassis
  Intel(R) Xeon(R) CPU D-1528 @ 1.90GHz with 24632196 kB of memory.
  Processor Board ID FDO25290ABC

  Device name: LUMT-CORE-A
  bootflash:   53298520 kB
";

const CDP_OUTPUT: &str = "\
-------------------------
Device ID: LUMT-CORE-A(FOX1849GQKY)
System Name: LUMT-CORE-A

Interface address(es):
    IPv4 Address: 10.1.1.1
Platform: N9K-C93180YC-FX, Capabilities: Router Switch IGMP Filtering Supports-STP-Dispute
Interface: GigabitEthernet1/0/49, Port ID (outgoing port): Ethernet1/7

-------------------------
Device ID: LUMT-CAM-LOBBY
Entry address(es):
  IP address: 10.1.4.31
Platform: AXIS P3245 Network Camera, Capabilities: Host
Interface: GigabitEthernet1/0/14, Port ID (outgoing port): eth0
";

const LLDP_OUTPUT: &str = "\
Capability codes:
    (R) Router, (B) Bridge, (T) Telephone, (C) DOCSIS Cable Device
    (W) WLAN Access Point, (P) Repeater, (S) Station, (O) Other

------------------------------------------------
Local Intf: Gi1/0/22
Chassis id: 0060.ddcc.aa01
Port id: 0060.ddcc.aa01
Port Description: Conference phone
System Name: SEP0060DDCCAA01

System Description:
Cisco IP Phone 8832

Time remaining: 134 seconds
System Capabilities: B,T
Enabled Capabilities: B,T
Management Addresses:
    IP: 10.1.7.44

Total entries displayed: 1
";

const VLAN_BRIEF: &str = "\
VLAN Name                             Status    Ports
---- -------------------------------- --------- -------------------------------
1    default                          active    Gi1/0/21, Gi1/0/22, Gi1/0/23,
                                                Gi1/0/24
14   CAMERAS                          active    Gi1/0/14
461  FW-RINGCENTRAL                   active
";

const IFACE_STATUS: &str = "\
Port      Name               Status       Vlan       Duplex  Speed Type
Gi1/0/14  lobby camera       connected    14         a-full  a-100 10/100/1000BaseTX
Gi1/0/21                     notconnect   1          auto    auto  10/100/1000BaseTX
Gi1/0/22  conference phone   connected    1          a-full  a-100 10/100/1000BaseTX
Gi1/0/23                     notconnect   1          auto    auto  10/100/1000BaseTX
Gi1/0/24                     disabled     1          auto    auto  10/100/1000BaseTX
Gi1/0/49  uplink to core     connected    trunk      full    a-10G SFP-10GBase-SR
";

#[test]
fn test_identity_pipeline_ios_xe() {
    let platform = detect(CATALYST_VERSION, "LUMT-MDF-SW01");
    assert_eq!(platform, Platform::IosXe);

    assert_eq!(
        extract_hostname(CATALYST_VERSION).as_deref(),
        Some("LUMT-MDF-SW01")
    );
    assert_eq!(
        extract_version(CATALYST_VERSION).as_deref(),
        Some("16.12.05b")
    );
    assert_eq!(extract_model(CATALYST_VERSION).as_deref(), Some("C9300-48P"));
    assert_eq!(
        extract_serial(CATALYST_VERSION, platform).as_deref(),
        Some("FCW2345L0AB")
    );

    let plan = commands_for(platform);
    assert_eq!(plan.vlan, Some("show vlan brief"));
}

#[test]
fn test_identity_pipeline_nxos() {
    let platform = detect(NEXUS_VERSION, "LUMT-CORE-A");
    assert_eq!(platform, Platform::NxOs);

    assert_eq!(extract_hostname(NEXUS_VERSION).as_deref(), Some("LUMT-CORE-A"));
    assert_eq!(extract_version(NEXUS_VERSION).as_deref(), Some("9.3(10)"));
    assert_eq!(extract_model(NEXUS_VERSION).as_deref(), Some("C93180YC-FX"));
    assert_eq!(
        extract_serial(NEXUS_VERSION, platform).as_deref(),
        Some("FDO25290ABC")
    );
}

#[test]
fn test_identity_reparse_is_stable() {
    // Formatting the parsed fields back into a version block and re-parsing
    // yields the same fields
    let hostname = extract_hostname(CATALYST_VERSION).unwrap();
    let version = extract_version(CATALYST_VERSION).unwrap();
    let model = extract_model(CATALYST_VERSION).unwrap();
    let serial = extract_serial(CATALYST_VERSION, Platform::IosXe).unwrap();

    let formatted = format!(
        "Cisco IOS Software, IOS-XE Software, Version {version}, RELEASE SOFTWARE\n\
         {hostname} uptime is 9 weeks\n\
         Model Number                       : {model}\n\
         System Serial Number               : {serial}\n"
    );
    assert_eq!(extract_hostname(&formatted).unwrap(), hostname);
    assert_eq!(extract_version(&formatted).unwrap(), version);
    assert_eq!(extract_model(&formatted).unwrap(), model);
    assert_eq!(extract_serial(&formatted, Platform::IosXe).unwrap(), serial);
}

#[test]
fn test_neighbor_pipeline_with_serial_in_device_id() {
    let cdp = parse_cdp(CDP_OUTPUT, "LUMT-MDF-SW01");
    assert_eq!(cdp.len(), 2);

    let core = &cdp[0];
    assert_eq!(core.remote_hostname, "LUMT-CORE-A");
    assert_eq!(core.remote_serial.as_deref(), Some("FOX1849GQKY"));
    assert_eq!(core.remote_ip, "10.1.1.1");
    assert_eq!(core.remote_port, "Ethernet1/7");
    assert!(core.remote_capabilities.contains("Router"));
    assert!(core.remote_capabilities.contains("Switch"));

    let camera = &cdp[1];
    assert_eq!(camera.remote_hostname, "LUMT-CAM-LOBBY");
    assert!(camera.remote_capabilities.contains("Host"));

    let lldp = parse_lldp(LLDP_OUTPUT, "LUMT-MDF-SW01");
    assert_eq!(lldp.len(), 1);
    assert_eq!(lldp[0].remote_hostname, "SEP0060DDCCAA01");
    assert_eq!(lldp[0].remote_ip, "10.1.7.44");
    assert!(lldp[0].remote_capabilities.contains("Phone"));

    let merged = merge_neighbors(cdp, lldp);
    assert_eq!(merged.len(), 3);
}

#[test]
fn test_vlan_pipeline_with_cross_correlation() {
    let entries = parse_vlans(VLAN_BRIEF, Platform::IosXe);
    let interfaces = parse_interface_status(IFACE_STATUS);
    let records = correlate(&entries, &interfaces);
    assert_eq!(records.len(), 3);

    let default = records.iter().find(|r| r.vlan_id == 1).unwrap();
    assert_eq!(default.port_count, 4);
    // Of Gi1/0/21-24 only the conference phone is connected
    assert_eq!(default.connected_port_count, 1);

    let cameras = records.iter().find(|r| r.vlan_id == 14).unwrap();
    assert_eq!(cameras.port_count, 1);
    assert_eq!(cameras.connected_port_count, 1);

    let empty = records.iter().find(|r| r.vlan_id == 461).unwrap();
    assert_eq!(empty.name, "FW-RINGCENTRAL");
    assert_eq!(empty.port_count, 0);
    assert_eq!(empty.portchannel_count, 0);
    assert_eq!(empty.connected_port_count, 0);
}

#[test]
fn test_hostname_and_serial_splitting_matches_cleaning() {
    let (host, serial) = split_host_serial("LUMT-CORE-A(FOX1849GQKY)");
    assert_eq!(host, "LUMT-CORE-A");
    assert_eq!(serial.as_deref(), Some("FOX1849GQKY"));
    assert_eq!(clean_hostname("LUMT-CORE-A(FOX1849GQKY)"), host);
    // Cleaning is idempotent across the whole pipeline vocabulary
    for raw in ["LUMT-CORE-A(FOX1849GQKY)", "sw01.corp.example.com", "SEP0060DDCCAA01"] {
        let once = clean_hostname(raw);
        assert_eq!(clean_hostname(&once), once);
    }
}
