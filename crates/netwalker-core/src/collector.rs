use crate::connection::{Credentials, DeviceSession, SessionConfig};
use crate::engine::CancelToken;
use crate::error::WalkError;
use crate::model::{
    DeviceIdentity, DeviceRecord, DeviceStatus, Neighbor, Platform, QueueEntry, UNKNOWN_SERIAL,
};
use crate::parsers::identity::{
    capabilities_for, extract_hostname, extract_model, extract_serial, extract_version,
    split_host_serial,
};
use crate::parsers::neighbors::{merge_neighbors, parse_cdp, parse_lldp};
use crate::parsers::vlan::{correlate, parse_interface_status, parse_vlans};
use crate::platform::{commands_for, detect};
use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs the collector needs beyond credentials.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub session: SessionConfig,
    pub vlan_enabled: bool,
    pub vlan_timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            vlan_enabled: true,
            vlan_timeout: Duration::from_secs(60),
        }
    }
}

/// Drives the collection of one device. Implemented over live sessions for
/// discovery and over scripted records in tests.
pub trait Collector: Send + Sync {
    fn collect(&self, entry: &QueueEntry, cancel: &CancelToken) -> DeviceRecord;
}

/// The production collector: one CLI session per queue entry.
pub struct SessionCollector {
    creds: Credentials,
    settings: CollectorSettings,
}

impl SessionCollector {
    pub fn new(creds: Credentials, settings: CollectorSettings) -> Self {
        Self { creds, settings }
    }

    fn walk(
        &self,
        session: &mut DeviceSession,
        entry: &QueueEntry,
        cancel: &CancelToken,
    ) -> Result<DeviceRecord, WalkError> {
        session.prepare()?;

        let (hint_hostname, hint_serial) = split_host_serial(&entry.hostname_hint);

        // The pager must be off before any multi-page output; platform is
        // unknown until the identity command answers, so start with the
        // best-effort plan.
        let mut plan = commands_for(Platform::Unknown);
        let _ = session.run(plan.pager_off, None);

        let mut identity_output = match session.run(plan.identity, None) {
            Ok(output) => output,
            Err(WalkError::CommandTimeout { .. }) => {
                warn!(ip = %entry.ip, "Identity command timed out, continuing with blank identity");
                String::new()
            }
            Err(e) => return Err(e),
        };

        let platform = detect(&identity_output, session.base_prompt());
        plan = commands_for(platform);
        debug!(ip = %entry.ip, %platform, "Detected platform");

        if platform == Platform::PanOs {
            // PAN-OS uses its own pager and identity commands; the probe
            // output above was an error banner
            let _ = session.run(plan.pager_off, None);
            identity_output = session.run(plan.identity, None).unwrap_or_default();
        } else if let Some(secret) = self.creds.enable_password.as_deref() {
            if let Err(e) = session.enable(secret) {
                warn!(ip = %entry.ip, error = %e, "Could not enter privileged mode, continuing in user mode");
            }
        }

        let hostname = extract_hostname(&identity_output).unwrap_or_else(|| hint_hostname.clone());
        let serial = extract_serial(&identity_output, platform)
            .or(hint_serial)
            .unwrap_or_else(|| UNKNOWN_SERIAL.to_string());
        let hardware_model = extract_model(&identity_output).unwrap_or_default();
        let software_version = extract_version(&identity_output).unwrap_or_default();
        let capabilities = capabilities_for(platform, &hardware_model);

        let neighbors = self.collect_neighbors(session, plan.neighbors, &hostname, cancel);

        let mut interfaces = Vec::new();
        if let Some(cmd) = plan.interfaces {
            match session.run(cmd, None) {
                Ok(output) => interfaces = parse_interface_status(&output),
                Err(e) => warn!(ip = %entry.ip, error = %e, "Interface status collection failed"),
            }
        }

        let mut vlans = Vec::new();
        if self.settings.vlan_enabled {
            if let Some(cmd) = plan.vlan {
                match session.run(cmd, Some(self.settings.vlan_timeout)) {
                    Ok(output) => {
                        vlans = correlate(&parse_vlans(&output, platform), &interfaces);
                    }
                    Err(e) => warn!(ip = %entry.ip, error = %e, "VLAN collection failed"),
                }
            }
        }

        let mut management_ips = BTreeSet::new();
        management_ips.insert(entry.ip.clone());
        let now = Utc::now();

        info!(hostname = %hostname, ip = %entry.ip, %platform, neighbors = neighbors.len(), "Device collected");

        Ok(DeviceRecord {
            identity: DeviceIdentity {
                hostname,
                serial,
                primary_ip: entry.ip.clone(),
                management_ips,
                platform,
                hardware_model,
                software_version,
                capabilities,
                status: DeviceStatus::Walked,
                first_seen: now,
                last_seen: now,
            },
            interfaces,
            vlans,
            neighbors,
            transport: Some(session.transport),
            failure: None,
        })
    }

    fn collect_neighbors(
        &self,
        session: &mut DeviceSession,
        commands: &[&str],
        local_hostname: &str,
        cancel: &CancelToken,
    ) -> Vec<Neighbor> {
        let mut cdp = Vec::new();
        let mut lldp = Vec::new();

        for cmd in commands {
            if cancel.is_cancelled() {
                break;
            }
            match session.run(cmd, None) {
                Ok(output) => {
                    if cmd.contains("cdp") {
                        cdp = parse_cdp(&output, local_hostname);
                    } else {
                        lldp = parse_lldp(&output, local_hostname);
                    }
                }
                Err(e) => {
                    warn!(command = %cmd, error = %e, "Neighbor collection command failed");
                }
            }
        }

        merge_neighbors(cdp, lldp)
    }
}

impl Collector for SessionCollector {
    fn collect(&self, entry: &QueueEntry, cancel: &CancelToken) -> DeviceRecord {
        let (hint_hostname, _) = split_host_serial(&entry.hostname_hint);
        let fallback = DeviceIdentity::observed(hint_hostname, &entry.ip);

        let mut session = match DeviceSession::open(&entry.ip, &self.creds, &self.settings.session)
        {
            Ok(session) => session,
            Err(e) => {
                info!(ip = %entry.ip, error = %e, "Session open failed");
                return DeviceRecord::failed(fallback, e.kind_label());
            }
        };

        let result = self.walk(&mut session, entry, cancel);
        session.close();

        match result {
            Ok(record) => record,
            Err(e) => {
                info!(ip = %entry.ip, error = %e, "Collection failed");
                DeviceRecord::failed(fallback, e.kind_label())
            }
        }
    }
}
