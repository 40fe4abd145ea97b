pub mod reconciler;
pub mod store;

use crate::error::StoreError;
use crate::model::{AdjacencyEdge, DeviceIdentity, Interface, VlanRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// One device row with its store identifier.
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub device_id: i64,
    pub identity: DeviceIdentity,
}

/// A directed neighbor edge ready for persistence; the destination identity
/// has already been resolved to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEdge {
    pub src_port: String,
    pub dst_device_id: i64,
    pub dst_port: String,
}

/// Storage interface for the inventory. The SQLite adapter is the production
/// implementation; the in-memory one backs `--dry-run` and tests.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Create tables and indexes if they do not exist.
    async fn init_schema(&self) -> Result<(), StoreError>;

    /// All rows sharing a cleaned hostname, in insertion order.
    async fn devices_by_hostname(&self, hostname: &str) -> Result<Vec<DeviceRow>, StoreError>;

    async fn insert_device(&self, identity: &DeviceIdentity) -> Result<i64, StoreError>;

    async fn update_device(
        &self,
        device_id: i64,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError>;

    async fn replace_interfaces(
        &self,
        device_id: i64,
        interfaces: &[Interface],
    ) -> Result<(), StoreError>;

    async fn replace_vlans(&self, device_id: i64, vlans: &[VlanRecord]) -> Result<(), StoreError>;

    async fn replace_neighbors(
        &self,
        device_id: i64,
        edges: &[NeighborEdge],
    ) -> Result<(), StoreError>;

    /// The frozen inventory, for the report writers.
    async fn all_devices(&self) -> Result<Vec<DeviceRow>, StoreError>;

    /// The frozen adjacency graph, for the report writers.
    async fn all_edges(&self) -> Result<Vec<AdjacencyEdge>, StoreError>;

    /// Row counts per table, for `--db-status`.
    async fn table_counts(&self) -> Result<Vec<(String, i64)>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    devices: Vec<DeviceRow>,
    interfaces: HashMap<i64, Vec<Interface>>,
    vlans: HashMap<i64, Vec<VlanRecord>>,
    edges: HashMap<i64, Vec<NeighborEdge>>,
}

/// In-memory inventory used by `--dry-run` and the engine tests. Semantics
/// mirror the SQLite adapter.
#[derive(Default)]
pub struct MemoryInventory {
    state: Mutex<MemoryState>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn init_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn devices_by_hostname(&self, hostname: &str) -> Result<Vec<DeviceRow>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .devices
            .iter()
            .filter(|row| row.identity.hostname == hostname)
            .cloned()
            .collect())
    }

    async fn insert_device(&self, identity: &DeviceIdentity) -> Result<i64, StoreError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let device_id = state.next_id;
        state.devices.push(DeviceRow {
            device_id,
            identity: identity.clone(),
        });
        Ok(device_id)
    }

    async fn update_device(
        &self,
        device_id: i64,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        match state.devices.iter_mut().find(|r| r.device_id == device_id) {
            Some(row) => {
                row.identity = identity.clone();
                Ok(())
            }
            None => Err(StoreError::Query(format!(
                "No device row with id {}",
                device_id
            ))),
        }
    }

    async fn replace_interfaces(
        &self,
        device_id: i64,
        interfaces: &[Interface],
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .interfaces
            .insert(device_id, interfaces.to_vec());
        Ok(())
    }

    async fn replace_vlans(&self, device_id: i64, vlans: &[VlanRecord]) -> Result<(), StoreError> {
        self.state.lock().vlans.insert(device_id, vlans.to_vec());
        Ok(())
    }

    async fn replace_neighbors(
        &self,
        device_id: i64,
        edges: &[NeighborEdge],
    ) -> Result<(), StoreError> {
        self.state.lock().edges.insert(device_id, edges.to_vec());
        Ok(())
    }

    async fn all_devices(&self) -> Result<Vec<DeviceRow>, StoreError> {
        Ok(self.state.lock().devices.clone())
    }

    async fn all_edges(&self) -> Result<Vec<AdjacencyEdge>, StoreError> {
        let state = self.state.lock();
        let hostname_of: HashMap<i64, &str> = state
            .devices
            .iter()
            .map(|r| (r.device_id, r.identity.hostname.as_str()))
            .collect();
        let mut out = Vec::new();
        for (src_id, edges) in &state.edges {
            let Some(local) = hostname_of.get(src_id) else {
                continue;
            };
            for edge in edges {
                let Some(remote) = hostname_of.get(&edge.dst_device_id) else {
                    continue;
                };
                out.push(AdjacencyEdge {
                    local_hostname: local.to_string(),
                    local_port: edge.src_port.clone(),
                    remote_hostname: remote.to_string(),
                    remote_port: edge.dst_port.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn table_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let state = self.state.lock();
        Ok(vec![
            ("devices".to_string(), state.devices.len() as i64),
            (
                "device_interfaces".to_string(),
                state.interfaces.values().map(|v| v.len() as i64).sum(),
            ),
            (
                "device_vlans".to_string(),
                state.vlans.values().map(|v| v.len() as i64).sum(),
            ),
            (
                "neighbors".to_string(),
                state.edges.values().map(|v| v.len() as i64).sum(),
            ),
        ])
    }
}
