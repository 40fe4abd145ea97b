use crate::error::StoreError;
use crate::inventory::{DeviceRow, Inventory, NeighborEdge};
use crate::model::{AdjacencyEdge, DeviceIdentity, Interface, Platform, VlanRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};

/// SQLite-backed inventory store.
pub struct SqliteInventory {
    pool: SqlitePool,
}

impl SqliteInventory {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        info!(database_url = %database_url, "Initializing inventory database");

        let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        if let Some(parent_dir) = Path::new(db_path).parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                std::fs::create_dir_all(parent_dir).map_err(|e| {
                    error!(directory = %parent_dir.display(), error = %e, "Failed to create database directory");
                    StoreError::Schema(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Schema(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(connect_options).await.map_err(|e| {
            error!(database_url = %database_url, error = %e, "Failed to connect to inventory database");
            StoreError::Connection(e)
        })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Newest `last_seen` across the inventory, for `--db-status`.
    pub async fn newest_last_seen(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query("SELECT MAX(last_seen) AS newest FROM devices")
            .fetch_one(&self.pool)
            .await?;
        Ok(row
            .try_get::<Option<DateTime<Utc>>, _>("newest")
            .unwrap_or(None))
    }

    fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<DeviceRow, StoreError> {
        let management_ips: BTreeSet<String> =
            serde_json::from_str(&row.get::<String, _>("management_ips"))?;
        let capabilities: BTreeSet<String> =
            serde_json::from_str(&row.get::<String, _>("capabilities"))?;
        let platform = row
            .get::<String, _>("platform")
            .parse::<Platform>()
            .unwrap_or(Platform::Unknown);
        let status = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;

        Ok(DeviceRow {
            device_id: row.get("device_id"),
            identity: DeviceIdentity {
                hostname: row.get("hostname"),
                serial: row.get("serial"),
                primary_ip: row.get("primary_ip"),
                management_ips,
                platform,
                hardware_model: row.get("hw_model"),
                software_version: row.get("sw_version"),
                capabilities,
                status,
                first_seen: row.get("first_seen"),
                last_seen: row.get("last_seen"),
            },
        })
    }
}

#[async_trait]
impl Inventory for SqliteInventory {
    async fn init_schema(&self) -> Result<(), StoreError> {
        debug!("Creating inventory tables");

        let tables = [
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                device_id INTEGER PRIMARY KEY AUTOINCREMENT,
                hostname TEXT NOT NULL,
                serial TEXT NOT NULL,
                primary_ip TEXT NOT NULL DEFAULT '',
                management_ips TEXT NOT NULL DEFAULT '[]',
                platform TEXT NOT NULL DEFAULT 'unknown',
                hw_model TEXT NOT NULL DEFAULT '',
                sw_version TEXT NOT NULL DEFAULT '',
                capabilities TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'observed',
                first_seen DATETIME NOT NULL,
                last_seen DATETIME NOT NULL,
                UNIQUE (hostname, serial)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS device_interfaces (
                device_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                ip TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                vlan_membership TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (device_id, name),
                FOREIGN KEY (device_id) REFERENCES devices (device_id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vlans (
                vlan_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS device_vlans (
                device_id INTEGER NOT NULL,
                vlan_id INTEGER NOT NULL,
                port_count INTEGER NOT NULL DEFAULT 0,
                pc_count INTEGER NOT NULL DEFAULT 0,
                connected_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (device_id, vlan_id),
                FOREIGN KEY (device_id) REFERENCES devices (device_id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS neighbors (
                src_device_id INTEGER NOT NULL,
                src_port TEXT NOT NULL,
                dst_device_id INTEGER NOT NULL,
                dst_port TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (src_device_id, src_port, dst_device_id),
                FOREIGN KEY (src_device_id) REFERENCES devices (device_id) ON DELETE CASCADE,
                FOREIGN KEY (dst_device_id) REFERENCES devices (device_id) ON DELETE CASCADE
            )
            "#,
        ];

        for sql in tables {
            sqlx::query(sql).execute(&self.pool).await.map_err(|e| {
                error!(error = %e, "Failed to create inventory table");
                StoreError::Schema(format!("Failed to create table: {}", e))
            })?;
        }

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_devices_hostname ON devices(hostname)",
            "CREATE INDEX IF NOT EXISTS idx_devices_status ON devices(status)",
            "CREATE INDEX IF NOT EXISTS idx_neighbors_src ON neighbors(src_device_id)",
            "CREATE INDEX IF NOT EXISTS idx_neighbors_dst ON neighbors(dst_device_id)",
        ];
        for sql in indexes {
            sqlx::query(sql).execute(&self.pool).await.map_err(|e| {
                StoreError::Schema(format!("Failed to create index: {}", e))
            })?;
        }

        debug!("Inventory schema ready");
        Ok(())
    }

    async fn devices_by_hostname(&self, hostname: &str) -> Result<Vec<DeviceRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM devices WHERE hostname = ? ORDER BY device_id")
            .bind(hostname)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_device).collect()
    }

    async fn insert_device(&self, identity: &DeviceIdentity) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices (
                hostname, serial, primary_ip, management_ips, platform,
                hw_model, sw_version, capabilities, status, first_seen, last_seen
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.hostname)
        .bind(&identity.serial)
        .bind(&identity.primary_ip)
        .bind(serde_json::to_string(&identity.management_ips)?)
        .bind(identity.platform.to_string())
        .bind(&identity.hardware_model)
        .bind(&identity.software_version)
        .bind(serde_json::to_string(&identity.capabilities)?)
        .bind(identity.status.to_string())
        .bind(identity.first_seen)
        .bind(identity.last_seen)
        .execute(&self.pool)
        .await?;

        debug!(hostname = %identity.hostname, "Inserted device row");
        Ok(result.last_insert_rowid())
    }

    async fn update_device(
        &self,
        device_id: i64,
        identity: &DeviceIdentity,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE devices SET
                hostname = ?, serial = ?, primary_ip = ?, management_ips = ?,
                platform = ?, hw_model = ?, sw_version = ?, capabilities = ?,
                status = ?, first_seen = ?, last_seen = ?
            WHERE device_id = ?
            "#,
        )
        .bind(&identity.hostname)
        .bind(&identity.serial)
        .bind(&identity.primary_ip)
        .bind(serde_json::to_string(&identity.management_ips)?)
        .bind(identity.platform.to_string())
        .bind(&identity.hardware_model)
        .bind(&identity.software_version)
        .bind(serde_json::to_string(&identity.capabilities)?)
        .bind(identity.status.to_string())
        .bind(identity.first_seen)
        .bind(identity.last_seen)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_interfaces(
        &self,
        device_id: i64,
        interfaces: &[Interface],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM device_interfaces WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        for iface in interfaces {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO device_interfaces (device_id, name, ip, status, vlan_membership)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(device_id)
            .bind(&iface.name)
            .bind(&iface.ip)
            .bind(&iface.status)
            .bind(&iface.vlan_membership)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn replace_vlans(&self, device_id: i64, vlans: &[VlanRecord]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM device_vlans WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        for vlan in vlans {
            sqlx::query("INSERT OR REPLACE INTO vlans (vlan_id, name) VALUES (?, ?)")
                .bind(vlan.vlan_id as i64)
                .bind(&vlan.name)
                .execute(&self.pool)
                .await?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO device_vlans
                    (device_id, vlan_id, port_count, pc_count, connected_count)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(device_id)
            .bind(vlan.vlan_id as i64)
            .bind(vlan.port_count as i64)
            .bind(vlan.portchannel_count as i64)
            .bind(vlan.connected_port_count as i64)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn replace_neighbors(
        &self,
        device_id: i64,
        edges: &[NeighborEdge],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM neighbors WHERE src_device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        for edge in edges {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO neighbors (src_device_id, src_port, dst_device_id, dst_port)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(device_id)
            .bind(&edge.src_port)
            .bind(edge.dst_device_id)
            .bind(&edge.dst_port)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn all_devices(&self) -> Result<Vec<DeviceRow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM devices ORDER BY hostname, device_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_device).collect()
    }

    async fn all_edges(&self) -> Result<Vec<AdjacencyEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT src.hostname AS local_hostname, n.src_port,
                   dst.hostname AS remote_hostname, n.dst_port
            FROM neighbors n
            JOIN devices src ON src.device_id = n.src_device_id
            JOIN devices dst ON dst.device_id = n.dst_device_id
            ORDER BY src.hostname, n.src_port
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AdjacencyEdge {
                local_hostname: row.get("local_hostname"),
                local_port: row.get("src_port"),
                remote_hostname: row.get("remote_hostname"),
                remote_port: row.get("dst_port"),
            })
            .collect())
    }

    async fn table_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let mut counts = Vec::new();
        for table in ["devices", "device_interfaces", "vlans", "device_vlans", "neighbors"] {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
                .fetch_one(&self.pool)
                .await?;
            counts.push((table.to_string(), row.get::<i64, _>("n")));
        }
        Ok(counts)
    }
}
