use crate::error::StoreError;
use crate::inventory::{Inventory, NeighborEdge};
use crate::model::{DeviceIdentity, DeviceRecord, DeviceStatus, Neighbor, Platform};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_STORE_RETRIES: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(200);

/// Normalizes identities and applies the upsert matrix against the store.
///
/// Identity key is `(hostname, serial)`; observed-only rows hold the serial
/// placeholder and are promoted in place when a walk supplies the real one.
pub struct Reconciler {
    inventory: Arc<dyn Inventory>,
}

impl Reconciler {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &Arc<dyn Inventory> {
        &self.inventory
    }

    /// Persist a full collection result: identity, interfaces, VLANs, and
    /// neighbor edges (creating observed placeholders for unknown remotes).
    /// Returns the device row id and whether this counted as a new device.
    pub async fn persist_record(&self, record: &DeviceRecord) -> Result<(i64, bool), StoreError> {
        let (device_id, is_new) = self.upsert_identity(&record.identity).await?;

        if record.is_walked() {
            self.inventory
                .replace_interfaces(device_id, &record.interfaces)
                .await?;
            self.inventory
                .replace_vlans(device_id, &record.vlans)
                .await?;

            let mut edges = Vec::with_capacity(record.neighbors.len());
            for neighbor in &record.neighbors {
                let dst_id = self.ensure_observed(neighbor).await?;
                edges.push(NeighborEdge {
                    src_port: neighbor.local_port.clone(),
                    dst_device_id: dst_id,
                    dst_port: neighbor.remote_port.clone(),
                });
            }
            self.inventory.replace_neighbors(device_id, &edges).await?;
        }

        Ok((device_id, is_new))
    }

    /// `persist_record` with bounded backoff on transient store errors. The
    /// final error is returned for the engine to buffer (transient) or abort
    /// on (fatal).
    pub async fn persist_with_retry(
        &self,
        record: &DeviceRecord,
    ) -> Result<(i64, bool), StoreError> {
        let mut attempt = 0;
        loop {
            match self.persist_record(record).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < MAX_STORE_RETRIES => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0..100);
                    let backoff = RETRY_BASE * 2u32.pow(attempt) + Duration::from_millis(jitter);
                    warn!(hostname = %record.identity.hostname, attempt, error = %e,
                          "Transient store error, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record a filter disposition for a neighbor that will not be walked.
    /// The device still shows in inventory; a walked row is never
    /// downgraded.
    pub async fn record_disposition(
        &self,
        neighbor: &Neighbor,
        status: DeviceStatus,
    ) -> Result<i64, StoreError> {
        let mut identity = observed_identity(neighbor);
        identity.status = status;
        let (device_id, _) = self.upsert_identity(&identity).await?;
        Ok(device_id)
    }

    /// Ensure a placeholder row exists for a neighbor edge destination.
    async fn ensure_observed(&self, neighbor: &Neighbor) -> Result<i64, StoreError> {
        let identity = observed_identity(neighbor);
        let (device_id, _) = self.upsert_identity(&identity).await?;
        Ok(device_id)
    }

    /// The upsert matrix:
    /// - exact `(hostname, serial)` match: update, not new
    /// - placeholder row and concrete incoming serial: promote, new
    /// - otherwise concrete incoming serial: insert, new
    /// - placeholder incoming onto existing rows: update preferred row
    ///   (walked with concrete serial first), not new
    async fn upsert_identity(&self, incoming: &DeviceIdentity) -> Result<(i64, bool), StoreError> {
        let rows = self.inventory.devices_by_hostname(&incoming.hostname).await?;

        let concrete_serials: BTreeSet<&str> = rows
            .iter()
            .filter(|r| r.identity.has_concrete_serial())
            .map(|r| r.identity.serial.as_str())
            .collect();
        if concrete_serials.len() > 1 {
            warn!(
                hostname = %incoming.hostname,
                serials = ?concrete_serials,
                "Hostname aliases multiple serials; devices are kept distinct"
            );
        }

        if let Some(row) = rows.iter().find(|r| r.identity.serial == incoming.serial) {
            let merged = merge_identity(&row.identity, incoming);
            self.inventory.update_device(row.device_id, &merged).await?;
            return Ok((row.device_id, false));
        }

        if incoming.has_concrete_serial() {
            if let Some(row) = rows.iter().find(|r| !r.identity.has_concrete_serial()) {
                // Promotion: the placeholder becomes the real device
                debug!(hostname = %incoming.hostname, serial = %incoming.serial, "Promoting observed device");
                let mut merged = merge_identity(&row.identity, incoming);
                merged.serial = incoming.serial.clone();
                self.inventory.update_device(row.device_id, &merged).await?;
                return Ok((row.device_id, true));
            }
            let device_id = self.inventory.insert_device(incoming).await?;
            return Ok((device_id, true));
        }

        // Placeholder incoming: attach to the best existing row rather than
        // shadowing it with a second placeholder
        let preferred = rows
            .iter()
            .find(|r| {
                r.identity.status == DeviceStatus::Walked && r.identity.has_concrete_serial()
            })
            .or_else(|| rows.first());
        if let Some(row) = preferred {
            let merged = merge_identity(&row.identity, incoming);
            self.inventory.update_device(row.device_id, &merged).await?;
            return Ok((row.device_id, false));
        }

        let device_id = self.inventory.insert_device(incoming).await?;
        Ok((device_id, true))
    }
}

fn observed_identity(neighbor: &Neighbor) -> DeviceIdentity {
    let mut identity = DeviceIdentity::observed(&neighbor.remote_hostname, &neighbor.remote_ip);
    identity.capabilities = neighbor.remote_capabilities.clone();
    // The advertised platform string is free-form hardware text
    identity.hardware_model = neighbor.remote_platform.clone();
    if let Some(serial) = &neighbor.remote_serial {
        identity.serial = serial.clone();
    }
    identity
}

/// Merge an incoming identity onto an existing row. Walked rows keep their
/// collected fields unless the incoming identity is itself a walk or a
/// failure; management IPs accumulate and `first_seen` is preserved.
fn merge_identity(existing: &DeviceIdentity, incoming: &DeviceIdentity) -> DeviceIdentity {
    let mut merged = if incoming.status == DeviceStatus::Walked {
        incoming.clone()
    } else if existing.status == DeviceStatus::Walked {
        let mut kept = existing.clone();
        // A failed re-walk is still recorded
        if incoming.status == DeviceStatus::Failed {
            kept.status = DeviceStatus::Failed;
        }
        kept
    } else {
        let mut updated = existing.clone();
        updated.status = incoming.status;
        if updated.platform == Platform::Unknown {
            updated.platform = incoming.platform;
        }
        if updated.hardware_model.is_empty() {
            updated.hardware_model = incoming.hardware_model.clone();
        }
        if updated.capabilities.is_empty() {
            updated.capabilities = incoming.capabilities.clone();
        }
        if updated.primary_ip.is_empty() {
            updated.primary_ip = incoming.primary_ip.clone();
        }
        updated
    };

    merged.serial = if incoming.has_concrete_serial() {
        incoming.serial.clone()
    } else {
        existing.serial.clone()
    };
    merged.first_seen = existing.first_seen;
    merged.last_seen = incoming.last_seen;
    merged
        .management_ips
        .extend(existing.management_ips.iter().cloned());
    merged
        .management_ips
        .extend(incoming.management_ips.iter().cloned());
    merged
}
