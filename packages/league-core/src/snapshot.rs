//! Content-addressed archive of league-season table states.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::TableEntry;
use crate::repository::Repository;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot_not_found: {0}")]
    NotFound(String),
    #[error("validation_error: {0}")]
    Validation(String),
    #[error("database_error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub snapshot_id: String,
    pub league_id: i64,
    pub season_id: i64,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotBody {
    metadata: SnapshotMetadata,
    entries: Vec<TableEntry>,
    checksum: Option<String>,
}

/// A fully materialized, immutable snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub league_id: i64,
    pub season_id: i64,
    pub entries: Vec<TableEntry>,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub checksum: Option<String>,
    pub size_bytes: u64,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreResult {
    pub success: bool,
    pub restored_entries: usize,
    pub errors: Vec<String>,
    /// Set when a pre-restore snapshot was taken (production mode only).
    pub pre_restore_snapshot_id: Option<String>,
}

pub const SNAPSHOT_VERSION: u32 = 1;

pub struct SnapshotStoreConfig {
    pub storage_directory: PathBuf,
    pub max_snapshots: usize,
    pub max_age_days: i64,
    pub compression_enabled: bool,
    pub checksum_enabled: bool,
    /// When true, `Restore` takes a pre-restore snapshot of current state first.
    pub production_mode: bool,
}

impl Default for SnapshotStoreConfig {
    fn default() -> Self {
        Self {
            storage_directory: PathBuf::from("./snapshots"),
            max_snapshots: 50,
            max_age_days: 30,
            compression_enabled: true,
            checksum_enabled: true,
            production_mode: false,
        }
    }
}

pub struct SnapshotStore {
    config: SnapshotStoreConfig,
    repository: Arc<dyn Repository>,
}

impl SnapshotStore {
    pub fn new(config: SnapshotStoreConfig, repository: Arc<dyn Repository>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.storage_directory)?;
        Ok(Self { config, repository })
    }

    fn extension(&self) -> &'static str {
        if self.config.compression_enabled {
            "json.gz"
        } else {
            "json"
        }
    }

    fn path_for(&self, snapshot_id: &str) -> PathBuf {
        self.config
            .storage_directory
            .join(format!("{snapshot_id}.{}", self.extension()))
    }

    pub async fn create(
        &self,
        league_id: i64,
        season_id: i64,
        description: Option<String>,
    ) -> anyhow::Result<String> {
        let entries = self.repository.read_entries(league_id, season_id).await?;
        for entry in &entries {
            if entry.club_name.trim().is_empty() {
                return Err(SnapshotError::Validation(format!(
                    "entry for club {} has an empty club name",
                    entry.club_id
                ))
                .into());
            }
        }

        let snapshot_id = format!(
            "snapshot_{league_id}_{season_id}_{}_{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            rand::thread_rng().gen_range(1000..10000)
        );

        let checksum = if self.config.checksum_enabled {
            Some(format!("sha256:{}", checksum_of(&entries)?))
        } else {
            None
        };

        let body = SnapshotBody {
            metadata: SnapshotMetadata {
                snapshot_id: snapshot_id.clone(),
                league_id,
                season_id,
                created_at: Utc::now(),
                description,
                version: SNAPSHOT_VERSION,
            },
            entries,
            checksum,
        };

        let json = serde_json::to_vec(&body)?;
        let path = self.path_for(&snapshot_id);
        write_body(&path, &json, self.config.compression_enabled)?;

        info!(league_id, season_id, snapshot_id = %snapshot_id, "snapshot created");
        Ok(snapshot_id)
    }

    pub fn get(&self, snapshot_id: &str) -> anyhow::Result<Snapshot> {
        let path = self.path_for(snapshot_id);
        if !path.exists() {
            return Err(SnapshotError::NotFound(snapshot_id.to_string()).into());
        }
        let bytes = read_body(&path, self.config.compression_enabled)?;
        let size_bytes = std::fs::metadata(&path)?.len();
        let body: SnapshotBody = serde_json::from_slice(&bytes)
            .map_err(|e| SnapshotError::Validation(format!("malformed snapshot body: {e}")))?;

        if let Some(checksum) = &body.checksum {
            let expected = format!("sha256:{}", checksum_of(&body.entries)?);
            if checksum != &expected {
                return Err(SnapshotError::Validation(format!(
                    "checksum mismatch for {snapshot_id}"
                ))
                .into());
            }
        }

        Ok(Snapshot {
            snapshot_id: body.metadata.snapshot_id,
            league_id: body.metadata.league_id,
            season_id: body.metadata.season_id,
            entries: body.entries,
            created_at: body.metadata.created_at,
            description: body.metadata.description,
            checksum: body.checksum,
            size_bytes,
            file_path: path,
        })
    }

    pub fn list(&self, league_id: i64, season_id: i64) -> anyhow::Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let prefix = format!("snapshot_{league_id}_{season_id}_");
        for entry in std::fs::read_dir(&self.config.storage_directory)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(id) = file_name.split('.').next() {
                if id.starts_with(&prefix) {
                    snapshots.push(self.get(id)?);
                }
            }
        }
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    pub async fn restore(&self, snapshot_id: &str) -> anyhow::Result<RestoreResult> {
        let snapshot = self.get(snapshot_id)?;
        let mut result = RestoreResult::default();

        if self.config.production_mode {
            match self
                .create(
                    snapshot.league_id,
                    snapshot.season_id,
                    Some(format!("pre-restore of {snapshot_id}")),
                )
                .await
            {
                Ok(pre_id) => result.pre_restore_snapshot_id = Some(pre_id),
                Err(e) => {
                    result.errors.push(e.to_string());
                    return Ok(result);
                }
            }
        }

        let repository = Arc::clone(&self.repository);
        let entries = snapshot.entries.clone();
        let league_id = snapshot.league_id;
        let season_id = snapshot.season_id;

        let outcome = repository
            .in_transaction(move |txn| {
                let entries = entries.clone();
                async move {
                    txn.upsert_entries(league_id, season_id, entries.clone())
                        .await
                        .map_err(|e| SnapshotError::Database(e.to_string()))?;
                    Ok::<usize, SnapshotError>(entries.len())
                }
            })
            .await;

        match outcome {
            Ok(count) => {
                result.success = true;
                result.restored_entries = count;
            }
            Err(e) => {
                result.success = false;
                result.errors.push(e.to_string());
            }
        }

        Ok(result)
    }

    pub fn delete(&self, snapshot_id: &str) -> anyhow::Result<()> {
        let path = self.path_for(snapshot_id);
        if !path.exists() {
            return Err(SnapshotError::NotFound(snapshot_id.to_string()).into());
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    pub fn delete_older_than(&self, max_age_days: i64) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut deleted = 0;
        for entry in std::fs::read_dir(&self.config.storage_directory)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let modified: DateTime<Utc> = metadata.modified()?.into();
            if modified < cutoff {
                std::fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            warn!(deleted, "garbage collected snapshots older than cutoff");
        }
        Ok(deleted)
    }

    /// Evict oldest snapshots beyond `max_snapshots` for a league-season.
    pub fn enforce_count_cap(&self, league_id: i64, season_id: i64) -> anyhow::Result<usize> {
        let mut snapshots = self.list(league_id, season_id)?;
        if snapshots.len() <= self.config.max_snapshots {
            return Ok(0);
        }
        let overflow = snapshots.split_off(self.config.max_snapshots);
        let count = overflow.len();
        for snapshot in overflow {
            self.delete(&snapshot.snapshot_id)?;
        }
        Ok(count)
    }
}

fn checksum_of(entries: &[TableEntry]) -> anyhow::Result<String> {
    let canonical = serde_json::to_vec(entries)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_body(path: &Path, json: &[u8], compress: bool) -> anyhow::Result<()> {
    if compress {
        let file = std::fs::File::create(path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(json)?;
        encoder.finish()?;
    } else {
        std::fs::write(path, json)?;
    }
    Ok(())
}

fn read_body(path: &Path, compressed: bool) -> anyhow::Result<Vec<u8>> {
    if compressed {
        let file = std::fs::File::open(path)?;
        let mut decoder = GzDecoder::new(file);
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use tempfile_shim::TempDir;

    mod tempfile_shim {
        use std::path::PathBuf;

        /// Minimal self-cleaning temp directory, avoiding an extra dev-dependency
        /// for a handful of filesystem-backed tests.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "league-core-{label}-{}",
                    rand::random::<u64>()
                ));
                std::fs::create_dir_all(&path).unwrap();
                Self(path)
            }

            pub fn path(&self) -> PathBuf {
                self.0.clone()
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    fn store(repo: Arc<dyn Repository>, dir: &TempDir, compression: bool, production: bool) -> SnapshotStore {
        SnapshotStore::new(
            SnapshotStoreConfig {
                storage_directory: dir.path(),
                max_snapshots: 3,
                max_age_days: 30,
                compression_enabled: compression,
                checksum_enabled: true,
                production_mode: production,
            },
            repo,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips_entries() {
        let dir = TempDir::new("roundtrip");
        let repo = InMemoryRepository::new();
        repo.upsert_entries(1, 1, vec![TableEntry::zeroed(1, 1, 1, "A")])
            .await
            .unwrap();
        let repo: Arc<dyn Repository> = Arc::new(repo);
        let store = store(repo, &dir, true, false);

        let id = store.create(1, 1, None).await.unwrap();
        let snapshot = store.get(&id).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.league_id, 1);
        assert!(snapshot.checksum.is_some());
    }

    #[tokio::test]
    async fn get_fails_on_missing_snapshot() {
        let dir = TempDir::new("missing");
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let store = store(repo, &dir, false, false);
        let err = store.get("snapshot_9_9_missing").unwrap_err();
        assert!(err.to_string().contains("snapshot_not_found"));
    }

    #[tokio::test]
    async fn restore_replaces_current_entries_and_reports_count() {
        let dir = TempDir::new("restore");
        let repo = InMemoryRepository::new();
        repo.upsert_entries(1, 1, vec![TableEntry::zeroed(1, 1, 1, "A")])
            .await
            .unwrap();
        let repo_dyn: Arc<dyn Repository> = Arc::new(repo.clone());
        let store = store(repo_dyn, &dir, true, false);
        let id = store.create(1, 1, None).await.unwrap();

        repo.upsert_entries(1, 1, vec![TableEntry::zeroed(1, 1, 2, "B")])
            .await
            .unwrap();

        let result = store.restore(&id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.restored_entries, 1);
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let dir = TempDir::new("list");
        let repo = InMemoryRepository::new();
        repo.upsert_entries(1, 1, vec![TableEntry::zeroed(1, 1, 1, "A")])
            .await
            .unwrap();
        let repo_dyn: Arc<dyn Repository> = Arc::new(repo);
        let store = store(repo_dyn, &dir, false, false);

        let first = store.create(1, 1, Some("first".into())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(1, 1, Some("second".into())).await.unwrap();

        let list = store.list(1, 1).unwrap();
        assert_eq!(list[0].snapshot_id, second);
        assert_eq!(list[1].snapshot_id, first);
    }

    #[tokio::test]
    async fn enforce_count_cap_evicts_oldest() {
        let dir = TempDir::new("cap");
        let repo = InMemoryRepository::new();
        repo.upsert_entries(1, 1, vec![TableEntry::zeroed(1, 1, 1, "A")])
            .await
            .unwrap();
        let repo_dyn: Arc<dyn Repository> = Arc::new(repo);
        let store = store(repo_dyn, &dir, false, false);

        for _ in 0..5 {
            store.create(1, 1, None).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let evicted = store.enforce_count_cap(1, 1).unwrap();
        assert_eq!(evicted, 2);
        assert_eq!(store.list(1, 1).unwrap().len(), 3);
    }
}
