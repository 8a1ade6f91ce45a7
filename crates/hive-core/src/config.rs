//! Config - 設定ファイルと環境変数
//!
//! すべての項目にデフォルトがあり、時間はミリ秒で書きます。
//! `board_dir` だけは必須で、未設定なら `CoordinatorBuilder::build` が失敗します。
//!
//! ```json
//! {
//!   "board_dir": "/var/lib/hive/board",
//!   "dispatch_interval_ms": 1000,
//!   "fallback_routes": { "run_tests": "TestAgent" }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::HiveError;
use crate::impls::FallbackRoutes;

/// Environment variable overriding `board_dir`.
pub const BOARD_DIR_ENV: &str = "HIVE_BOARD_DIR";

/// File name of the capability document when `capability_file` is unset.
pub const DEFAULT_CAPABILITY_FILE: &str = "capabilities.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Directory holding the four queue documents.
    #[serde(default)]
    pub board_dir: Option<PathBuf>,
    #[serde(default)]
    pub capability_file: Option<PathBuf>,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_stale_lock_after_ms")]
    pub stale_lock_after_ms: u64,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_vote_fallback_duration_ms")]
    pub vote_fallback_duration_ms: u64,
    /// action -> agent, consulted after capability lookup.
    #[serde(default)]
    pub fallback_routes: FallbackRoutes,
    #[serde(default = "default_max_repair_tasks")]
    pub max_repair_tasks: usize,
}

fn default_dispatch_interval_ms() -> u64 {
    1_000
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_stale_lock_after_ms() -> u64 {
    30_000
}

fn default_publish_timeout_ms() -> u64 {
    2_000
}

fn default_vote_fallback_duration_ms() -> u64 {
    30_000
}

fn default_max_repair_tasks() -> usize {
    3
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            board_dir: None,
            capability_file: None,
            dispatch_interval_ms: default_dispatch_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            stale_lock_after_ms: default_stale_lock_after_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            vote_fallback_duration_ms: default_vote_fallback_duration_ms(),
            fallback_routes: FallbackRoutes::new(),
            max_repair_tasks: default_max_repair_tasks(),
        }
    }
}

impl HiveConfig {
    pub fn load(path: &Path) -> Result<Self, HiveError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HiveError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| HiveError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Load `path` if given, otherwise start from defaults; then apply the environment.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, HiveError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(BOARD_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.board_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn with_board_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.board_dir = Some(dir.into());
        self
    }

    /// Explicit `capability_file`, else `capabilities.json` inside the board directory.
    pub fn capability_path(&self) -> Option<PathBuf> {
        self.capability_file.clone().or_else(|| {
            self.board_dir
                .as_ref()
                .map(|dir| dir.join(DEFAULT_CAPABILITY_FILE))
        })
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn stale_lock_after(&self) -> Duration {
        Duration::from_millis(self.stale_lock_after_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn vote_fallback_duration(&self) -> Duration {
        Duration::from_millis(self.vote_fallback_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentId;

    #[test]
    fn empty_document_uses_defaults() {
        let config: HiveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HiveConfig::default());
        assert_eq!(config.dispatch_interval(), Duration::from_secs(1));
        assert_eq!(config.max_repair_tasks, 3);
        assert!(config.board_dir.is_none());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.json");
        std::fs::write(
            &path,
            r#"{"board_dir": "/tmp/board", "lock_timeout_ms": 250,
                "fallback_routes": {"run_tests": "TestAgent"}}"#,
        )
        .unwrap();

        let config = HiveConfig::load(&path).unwrap();

        assert_eq!(config.board_dir, Some(PathBuf::from("/tmp/board")));
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(
            config.fallback_routes.get("run_tests"),
            Some(&AgentId::new("TestAgent"))
        );
        assert_eq!(
            config.capability_path(),
            Some(PathBuf::from("/tmp/board/capabilities.json"))
        );
    }

    #[test]
    fn invalid_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HiveConfig::load(&path).unwrap_err();
        assert!(matches!(err, HiveError::Config(_)));

        let missing = HiveConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, HiveError::Config(_)));
    }

    #[test]
    fn environment_overrides_board_dir() {
        let config = HiveConfig::default()
            .with_board_dir("/from/file")
            .with_overrides(|key| (key == BOARD_DIR_ENV).then(|| "/from/env".to_string()));
        assert_eq!(config.board_dir, Some(PathBuf::from("/from/env")));

        let untouched = HiveConfig::default()
            .with_board_dir("/from/file")
            .with_overrides(|_| Some("  ".to_string()));
        assert_eq!(untouched.board_dir, Some(PathBuf::from("/from/file")));
    }
}
