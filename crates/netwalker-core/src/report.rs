use crate::error::WalkError;
use crate::filter::GlobPattern;
use crate::model::{AdjacencyEdge, DeviceIdentity};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Consumes the frozen inventory and adjacency graph after the engine
/// terminates. Spreadsheet and diagram writers implement this outside the
/// core; the plain-text writer below serves the CLI.
pub trait ReportSink {
    fn write(&mut self, devices: &[DeviceIdentity], edges: &[AdjacencyEdge])
        -> Result<PathBuf, WalkError>;
}

/// Timestamp suffix used in every emitted filename.
pub fn stamped_filename(prefix: &str, ext: &str, now: DateTime<Local>) -> String {
    format!("{}-{}.{}", prefix, now.format("%Y%m%d-%H-%M"), ext)
}

/// Whether a hostname marks a site boundary under the configured pattern
/// (default `*-CORE-*`). Report writers group device sheets by it.
pub fn is_site_boundary(hostname: &str, pattern: &GlobPattern) -> bool {
    pattern.matches(hostname)
}

/// Plain-text inventory report: one line per device, then the adjacency
/// list. Site-boundary devices are flagged with a trailing `*`.
pub struct TextReport {
    directory: PathBuf,
    site_boundary: GlobPattern,
}

impl TextReport {
    pub fn new(directory: impl AsRef<Path>, site_boundary: GlobPattern) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            site_boundary,
        }
    }
}

impl ReportSink for TextReport {
    fn write(
        &mut self,
        devices: &[DeviceIdentity],
        edges: &[AdjacencyEdge],
    ) -> Result<PathBuf, WalkError> {
        let mut body = String::new();
        writeln!(
            body,
            "{:<36} {:<14} {:<8} {:<10} {:<20} {:<16} {}",
            "hostname", "serial", "platform", "status", "model", "version", "primary_ip"
        )
        .ok();
        for device in devices {
            let marker = if is_site_boundary(&device.hostname, &self.site_boundary) {
                "*"
            } else {
                ""
            };
            writeln!(
                body,
                "{:<36} {:<14} {:<8} {:<10} {:<20} {:<16} {}{}",
                device.hostname,
                device.serial,
                device.platform,
                device.status,
                device.hardware_model,
                device.software_version,
                device.primary_ip,
                marker
            )
            .ok();
        }
        writeln!(body).ok();
        writeln!(body, "adjacencies:").ok();
        for edge in edges {
            writeln!(
                body,
                "  {} {} -> {} {}",
                edge.local_hostname, edge.local_port, edge.remote_hostname, edge.remote_port
            )
            .ok();
        }

        let filename = stamped_filename("inventory", "txt", Local::now());
        let path = self.directory.join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(WalkError::IoError)?;
        }
        std::fs::write(&path, body).map_err(WalkError::IoError)?;
        info!(path = %path.display(), devices = devices.len(), edges = edges.len(), "Inventory report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamped_filename_format() {
        let when = Local.with_ymd_and_hms(2026, 8, 1, 9, 5, 0).unwrap();
        assert_eq!(
            stamped_filename("inventory", "txt", when),
            "inventory-20260801-09-05.txt"
        );
    }

    #[test]
    fn test_site_boundary_default_pattern() {
        let pattern = GlobPattern::new("*-CORE-*").unwrap();
        assert!(is_site_boundary("LUMT-CORE-A", &pattern));
        assert!(!is_site_boundary("LUMT-IDF3-SW01", &pattern));
    }

    #[test]
    fn test_text_report_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TextReport::new(dir.path(), GlobPattern::new("*-CORE-*").unwrap());
        let devices = vec![
            DeviceIdentity::observed("LUMT-CORE-A", "10.1.1.1"),
            DeviceIdentity::observed("SW01", "10.1.1.10"),
        ];
        let edges = vec![AdjacencyEdge {
            local_hostname: "LUMT-CORE-A".to_string(),
            local_port: "Eth1/49".to_string(),
            remote_hostname: "SW01".to_string(),
            remote_port: "Gi1/0/52".to_string(),
        }];

        let path = sink.write(&devices, &edges).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("SW01"));
        assert!(contents.contains("10.1.1.1*"));
        assert!(contents.contains("LUMT-CORE-A Eth1/49 -> SW01 Gi1/0/52"));
    }
}
