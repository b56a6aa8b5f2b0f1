use async_trait::async_trait;
use nix::sys::statvfs::statvfs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{Collector, CollectorSettings, MetricSink, ScrapeConfig};
use crate::model::{Descriptor, Labels, ValueKind};

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
}

/// Capacity and inode usage of mounted filesystems.
///
/// Each `statvfs` runs on the blocking pool under its own timeout, so a hung
/// network mount is skipped instead of stalling the scrape.
pub struct FilesystemCollector {
    mounts_path: PathBuf,
    stat_timeout: Duration,
    bytes: Arc<Descriptor>,
    files: Arc<Descriptor>,
}

impl FilesystemCollector {
    pub fn new(const_labels: &Labels, settings: &CollectorSettings) -> anyhow::Result<Arc<dyn Collector>> {
        if settings.stat_timeout_ms == Some(0) {
            anyhow::bail!("stat_timeout_ms must be greater than zero");
        }
        Ok(Arc::new(Self::with_mounts_path(
            const_labels,
            settings.stat_timeout(),
            "/proc/mounts",
        )))
    }

    pub fn with_mounts_path(const_labels: &Labels, stat_timeout: Duration, mounts_path: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: mounts_path.into(),
            stat_timeout,
            bytes: Descriptor::new(
                "node_filesystem_bytes",
                "Filesystem size in bytes by usage.",
                ValueKind::Gauge,
                &["device", "mountpoint", "fstype", "usage"],
                const_labels.clone(),
            ),
            files: Descriptor::new(
                "node_filesystem_files",
                "Filesystem inodes by usage.",
                ValueKind::Gauge,
                &["device", "mountpoint", "fstype", "usage"],
                const_labels.clone(),
            ),
        }
    }
}

#[async_trait]
impl Collector for FilesystemCollector {
    async fn update(&self, config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()> {
        let content = tokio::fs::read_to_string(&self.mounts_path).await?;

        for mount in parse_mounts(&content) {
            if !config.filters.pass("filesystem/fstype", &mount.fstype)
                || !config.filters.pass("filesystem/mountpoint", &mount.mountpoint)
            {
                continue;
            }

            let mountpoint = mount.mountpoint.clone();
            let stat = tokio::time::timeout(
                self.stat_timeout,
                tokio::task::spawn_blocking(move || statvfs(mountpoint.as_str())),
            )
            .await;

            let stat = match stat {
                Ok(Ok(Ok(stat))) => stat,
                Ok(Ok(Err(errno))) => {
                    tracing::warn!(mountpoint = %mount.mountpoint, error = %errno, "statvfs failed, skipping");
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!(mountpoint = %mount.mountpoint, error = %e, "statvfs task failed, skipping");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(
                        mountpoint = %mount.mountpoint,
                        timeout_ms = self.stat_timeout.as_millis() as u64,
                        "statvfs timed out, skipping"
                    );
                    continue;
                }
            };

            let block_size = stat.fragment_size() as f64;
            let labels = |usage: &'static str| {
                [mount.device.as_str(), mount.mountpoint.as_str(), mount.fstype.as_str(), usage]
            };

            out.emit(&self.bytes, stat.blocks() as f64 * block_size, &labels("total")).await?;
            out.emit(&self.bytes, stat.blocks_free() as f64 * block_size, &labels("free")).await?;
            out.emit(&self.bytes, stat.blocks_available() as f64 * block_size, &labels("avail")).await?;
            out.emit(&self.files, stat.files() as f64, &labels("total")).await?;
            out.emit(&self.files, stat.files_free() as f64, &labels("free")).await?;
        }

        Ok(())
    }
}

/// Parse `/proc/mounts`; later duplicates of a mountpoint are dropped.
pub fn parse_mounts(content: &str) -> Vec<MountInfo> {
    let mut mounts: Vec<MountInfo> = Vec::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }

        let mount = MountInfo {
            device: unescape(fields[0]),
            mountpoint: unescape(fields[1]),
            fstype: fields[2].to_string(),
        };
        if mounts.iter().any(|m| m.mountpoint == mount.mountpoint) {
            continue;
        }
        mounts.push(mount);
    }

    mounts
}

// The kernel writes space, tab, newline and backslash as octal escapes.
fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ServiceKind;
    use crate::filter::{FilterSpec, Filters};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/nvme0n1p1 /boot/efi vfat rw,relatime 0 0
/dev/sdb1 /mnt/backup\\040disk xfs rw,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
";

    #[test]
    fn test_parse_mounts() {
        let mounts = parse_mounts(MOUNTS);
        assert_eq!(mounts.len(), 5);
        assert_eq!(
            mounts[2],
            MountInfo {
                device: "/dev/nvme0n1p2".to_string(),
                mountpoint: "/".to_string(),
                fstype: "ext4".to_string(),
            }
        );
        assert_eq!(mounts[4].mountpoint, "/mnt/backup disk");
    }

    #[test]
    fn test_zero_timeout_fails_construction() {
        let settings = CollectorSettings {
            stat_timeout_ms: Some(0),
            tail_poll_interval_ms: None,
        };
        assert!(FilesystemCollector::new(&vec![], &settings).is_err());
    }

    #[tokio::test]
    async fn test_update_respects_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mountpoint = dir.path().to_str().unwrap().to_string();
        let mounts_path = dir.path().join("mounts");
        std::fs::write(
            &mounts_path,
            format!("/dev/test {} testfs rw 0 0\nproc /proc proc rw 0 0\n", mountpoint),
        )
        .unwrap();

        let mut specs = HashMap::new();
        specs.insert(
            "filesystem/fstype".to_string(),
            FilterSpec {
                include: Some("^testfs$".to_string()),
                exclude: None,
            },
        );
        let filters = Arc::new(Filters::with_defaults(&specs).unwrap());
        let config = ScrapeConfig::new("system", ServiceKind::System, filters);

        let collector = FilesystemCollector::with_mounts_path(&vec![], Duration::from_secs(1), &mounts_path);
        let (tx, mut rx) = mpsc::channel(16);
        collector.update(&config, &MetricSink::new(tx)).await.unwrap();

        let mut metrics = Vec::new();
        while let Ok(m) = rx.try_recv() {
            metrics.push(m);
        }
        assert_eq!(metrics.len(), 5);
        assert!(metrics.iter().all(|m| m.label("mountpoint") == Some(mountpoint.as_str())));
        assert!(metrics.iter().all(|m| m.label("fstype") == Some("testfs")));
        let total = metrics
            .iter()
            .find(|m| m.name() == "node_filesystem_bytes" && m.label("usage") == Some("total"))
            .unwrap();
        assert!(total.value() > 0.0);
    }
}
