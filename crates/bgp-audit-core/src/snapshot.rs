//! Raw configuration audit trail.
//!
//! One file per device, `<hostname>_bgp.txt`, replaced on every run.

use std::path::{Path, PathBuf};

use crate::domain::{RawConfig, WriteError};

/// Writes fetched configuration text into a directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for `hostname`.
    pub fn path_for(&self, hostname: &str) -> PathBuf {
        self.dir.join(file_name(hostname))
    }

    /// Persist `config`, replacing any earlier snapshot of the same device.
    ///
    /// Writes to a sibling temp file first so readers never see a torn file.
    pub async fn persist(&self, config: &RawConfig) -> Result<PathBuf, WriteError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WriteError::io(&self.dir, e))?;

        let path = self.path_for(&config.hostname);
        let tmp = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp, config.text.as_bytes())
            .await
            .map_err(|e| WriteError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| WriteError::io(&path, e))?;
        Ok(path)
    }
}

/// Snapshot file name for `hostname`, with path separators replaced.
///
/// Distinct hostnames can share a file name (`core/1` and `core_1`);
/// inventory validation rejects such pairs.
pub fn file_name(hostname: &str) -> String {
    let safe: String = hostname
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    format!("{safe}_bgp.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_sanitises_separators() {
        let store = SnapshotStore::new("/var/lib/bgp-audit");
        assert_eq!(
            store.path_for("edge-1"),
            PathBuf::from("/var/lib/bgp-audit/edge-1_bgp.txt")
        );
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/var/lib/bgp-audit/.._etc_passwd_bgp.txt")
        );
    }

    #[test]
    fn test_file_name_can_collide() {
        assert_eq!(file_name("core/1"), file_name("core_1"));
        assert_ne!(file_name("core-1"), file_name("core_1"));
    }

    #[tokio::test]
    async fn test_persist_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));

        store
            .persist(&RawConfig::new("edge-1", "router bgp 1\n"))
            .await
            .unwrap();
        let path = store
            .persist(&RawConfig::new("edge-1", "router bgp 2\n"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "router bgp 2\n");
        assert!(!path.with_extension("txt.tmp").exists());
    }
}
