//! CapabilityStore の実装（ファイル / メモリ）
//!
//! ファイル形式は `{agent_id: {capability_id: record}}` の JSON ひとつ。
//! 書き込みは FileTaskStore と同じロックファイル + atomic rename。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

use super::file_lock::LockFile;
use super::file_task_store::{DEFAULT_LOCK_TIMEOUT, DEFAULT_STALE_LOCK_AFTER};
use super::fs_atomic::write_atomic;
use crate::domain::{AgentId, CapabilityId, CapabilityRecord, HiveError};
use crate::ports::{CapabilityStore, RawCapabilities};

/// Capabilities persisted in a single JSON file.
#[derive(Debug)]
pub struct FileCapabilityStore {
    path: PathBuf,
    lock_timeout: Duration,
    stale_lock_after: Duration,
    local: Mutex<()>,
}

impl FileCapabilityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
            local: Mutex::new(()),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// A lock file older than this is treated as left behind by a dead process.
    pub fn with_stale_lock_after(mut self, age: Duration) -> Self {
        self.stale_lock_after = age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-modify-write under both locks.
    async fn modify<T, F>(&self, f: F) -> Result<T, HiveError>
    where
        F: FnOnce(&mut RawCapabilities) -> (T, bool) + Send + 'static,
        T: Send + 'static,
    {
        let _local = tokio::time::timeout(self.lock_timeout, self.local.lock())
            .await
            .map_err(|_| HiveError::Busy("capability store is locked".into()))?;
        let path = self.path.clone();
        let timeout = self.lock_timeout;
        let stale_after = self.stale_lock_after;

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let _lock = LockFile::acquire(&lock_path(&path), timeout, stale_after)?;
            let mut all = read_capabilities(&path, true)?;
            let (value, changed) = f(&mut all);
            if changed {
                let json = serde_json::to_vec_pretty(&all)
                    .map_err(|e| HiveError::Store(format!("cannot encode capabilities: {e}")))?;
                write_atomic(&path, &json)?;
            }
            Ok(value)
        })
        .await
        .map_err(|e| HiveError::Store(format!("capability write failed: {e}")))?
    }
}

#[async_trait]
impl CapabilityStore for FileCapabilityStore {
    async fn get_all_capabilities(&self) -> Result<RawCapabilities, HiveError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_capabilities(&path, false))
            .await
            .map_err(|e| HiveError::Store(format!("capability read failed: {e}")))?
    }

    async fn register_capability(
        &self,
        agent_id: &AgentId,
        record: &CapabilityRecord,
    ) -> Result<(), HiveError> {
        let value = serde_json::to_value(record)
            .map_err(|e| HiveError::Store(format!("cannot encode capability: {e}")))?;
        let agent = agent_id.as_str().to_string();
        let capability = record.capability_id.as_str().to_string();
        debug!(agent_id = %agent, capability_id = %capability, "persisting capability");
        self.modify(move |all| {
            all.entry(agent).or_default().insert(capability, value);
            ((), true)
        })
        .await
    }

    async fn unregister_capability(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<bool, HiveError> {
        let agent = agent_id.as_str().to_string();
        let capability = capability_id.as_str().to_string();
        self.modify(move |all| {
            let removed = remove_entry(all, &agent, &capability);
            (removed, removed)
        })
        .await
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn read_capabilities(path: &Path, repair: bool) -> Result<RawCapabilities, HiveError> {
    if !path.exists() {
        return Ok(RawCapabilities::new());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| HiveError::Store(format!("cannot read {}: {e}", path.display())))?;
    if raw.trim().is_empty() {
        return Ok(RawCapabilities::new());
    }
    match serde_json::from_str::<RawCapabilities>(&raw) {
        Ok(all) => Ok(all),
        Err(err) => {
            error!(path = %path.display(), error = %err, "corrupt capability file");
            if repair {
                let aside = path.with_extension(format!(
                    "json.corrupt-{}",
                    Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
                ));
                fs::rename(path, &aside)?;
                warn!(to = %aside.display(), "moved corrupt capability file aside");
            }
            Ok(RawCapabilities::new())
        }
    }
}

fn remove_entry(all: &mut RawCapabilities, agent: &str, capability: &str) -> bool {
    let Some(caps) = all.get_mut(agent) else {
        return false;
    };
    let removed = caps.remove(capability).is_some();
    if caps.is_empty() {
        all.remove(agent);
    }
    removed
}

/// Process-local capability store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryCapabilityStore {
    all: RwLock<RawCapabilities>,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw entries, bypassing validation.
    pub fn with_raw(all: RawCapabilities) -> Self {
        Self {
            all: RwLock::new(all),
        }
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn get_all_capabilities(&self) -> Result<RawCapabilities, HiveError> {
        Ok(self.all.read().await.clone())
    }

    async fn register_capability(
        &self,
        agent_id: &AgentId,
        record: &CapabilityRecord,
    ) -> Result<(), HiveError> {
        let value = serde_json::to_value(record)
            .map_err(|e| HiveError::Store(format!("cannot encode capability: {e}")))?;
        self.all
            .write()
            .await
            .entry(agent_id.as_str().to_string())
            .or_default()
            .insert(record.capability_id.as_str().to_string(), value);
        Ok(())
    }

    async fn unregister_capability(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
    ) -> Result<bool, HiveError> {
        let mut all = self.all.write().await;
        Ok(remove_entry(&mut all, agent_id.as_str(), capability_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(agent: &str, cap: &str) -> CapabilityRecord {
        let now = Utc::now();
        CapabilityRecord {
            agent_id: AgentId::new(agent),
            capability_id: CapabilityId::new(cap),
            capability_name: cap.replace('_', " "),
            description: None,
            registered_at: now,
            last_updated: now,
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capabilities.json");
        let store = FileCapabilityStore::new(&path);
        store
            .register_capability(&AgentId::new("AgentA"), &record("AgentA", "code_review"))
            .await
            .unwrap();

        let reopened = FileCapabilityStore::new(&path);
        let all = reopened.get_all_capabilities().await.unwrap();
        assert!(all["AgentA"].contains_key("code_review"));
        assert!(!lock_path(&path).exists());
    }

    #[tokio::test]
    async fn stale_lock_age_is_configurable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capabilities.json");
        fs::write(lock_path(&path), "12345\n").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let agent = AgentId::new("AgentA");

        let patient = FileCapabilityStore::new(&path).with_lock_timeout(Duration::from_millis(60));
        let err = patient
            .register_capability(&agent, &record("AgentA", "code_review"))
            .await
            .unwrap_err();
        assert!(matches!(err, HiveError::Busy(_)));

        let eager = FileCapabilityStore::new(&path)
            .with_lock_timeout(Duration::from_millis(60))
            .with_stale_lock_after(Duration::from_millis(10));
        eager
            .register_capability(&agent, &record("AgentA", "code_review"))
            .await
            .unwrap();
        assert!(!lock_path(&path).exists());
    }

    #[tokio::test]
    async fn unregister_drops_empty_agents() {
        let store = InMemoryCapabilityStore::new();
        let agent = AgentId::new("AgentA");
        store
            .register_capability(&agent, &record("AgentA", "code_review"))
            .await
            .unwrap();

        let cap = CapabilityId::new("code_review");
        assert!(store.unregister_capability(&agent, &cap).await.unwrap());
        assert!(!store.unregister_capability(&agent, &cap).await.unwrap());
        assert!(store.get_all_capabilities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capabilities.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = FileCapabilityStore::new(&path);
        assert!(store.get_all_capabilities().await.unwrap().is_empty());
        // 読み取りでは退避しない
        assert!(path.exists());
    }
}
