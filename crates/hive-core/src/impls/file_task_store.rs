//! FileTaskStore - キューごとの JSON ドキュメントによる TaskStore
//!
//! # レイアウト
//! ```text
//! <board_dir>/
//!   backlog.json     {"version": 1, "queue": "backlog", "tasks": [...]}
//!   ready.json
//!   working.json
//!   completed.json
//!   .board.lock      プロセス間ロック（保持中のみ存在）
//! ```
//!
//! # 書き込み手順
//! 1. プロセス内 Mutex（タイムアウト付き）
//! 2. ロックファイル（タイムアウト付き、stale lock は破棄）
//! 3. 4 キューを再読込 → 検証 → 適用
//! 4. 変更したキューを一時ファイルへ書いて fsync → rename
//!
//! キュー間移動は「移動先 → 移動元」の順に書きます。途中で落ちても
//! タスクが消えることはなく、両方に残った場合は読込時に後段のキューを採用します。
//!
//! 壊れたドキュメントは ERROR ログを出して `<file>.corrupt-<timestamp>` に退避し、
//! 空のキューとして扱います（上書きで失わない）。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::file_lock::LockFile;
use super::fs_atomic::write_atomic;
use super::queue_docs::QueueDocs;
use crate::domain::{BoardQueue, HiveError, Task, TaskId, TaskStatus};
use crate::ports::{AddOutcome, BoardSnapshot, Mutation, StoreOutcome, TaskStore};

const LOCK_FILE: &str = ".board.lock";
const DOCUMENT_VERSION: u32 = 1;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct QueueDocument {
    #[serde(default)]
    version: u32,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct QueueDocumentRef<'a> {
    version: u32,
    queue: BoardQueue,
    tasks: &'a [Task],
}

/// File-backed board shared by every process pointing at the same directory.
#[derive(Debug)]
pub struct FileTaskStore {
    dir: PathBuf,
    lock_timeout: Duration,
    stale_lock_after: Duration,
    local: Mutex<()>,
}

impl FileTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
            local: Mutex::new(()),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = after;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `f` on a blocking thread while holding both locks.
    async fn locked<T, F>(&self, op: &'static str, f: F) -> Result<T, HiveError>
    where
        F: FnOnce(&Path) -> Result<T, HiveError> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        let _local = tokio::time::timeout(self.lock_timeout, self.local.lock())
            .await
            .map_err(|_| {
                HiveError::Busy(format!(
                    "{op}: timed out after {}ms waiting for the board",
                    self.lock_timeout.as_millis()
                ))
            })?;
        let remaining = self.lock_timeout.saturating_sub(started.elapsed());
        let stale_after = self.stale_lock_after;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&dir)?;
            let _lock = LockFile::acquire(&dir.join(LOCK_FILE), remaining, stale_after)?;
            f(&dir)
        })
        .await
        .map_err(|e| HiveError::Store(format!("{op} failed: {e}")))?
    }

    /// Lock-free read of the current documents.
    async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T, HiveError>
    where
        F: FnOnce(QueueDocs) -> T + Send + 'static,
        T: Send + 'static,
    {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let (docs, _) = load_docs(&dir, false)?;
            Ok(f(docs))
        })
        .await
        .map_err(|e| HiveError::Store(format!("{op} failed: {e}")))?
    }

    async fn mutate(&self, op: &'static str, mutation: Mutation) -> Result<StoreOutcome, HiveError> {
        self.locked(op, move |dir| {
            let (mut docs, repaired) = load_docs(dir, true)?;
            let (outcome, touched) = docs.apply(&mutation)?;
            for queue in &touched {
                write_queue(dir, *queue, docs.queue(*queue))?;
            }
            persist_repairs(dir, &docs, &repaired, &touched)?;
            if let StoreOutcome::Applied(task) = &outcome {
                debug!(
                    task_id = %task.task_id,
                    status = %task.status,
                    queues = ?touched,
                    "{op} persisted"
                );
            }
            Ok(outcome)
        })
        .await
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn add(&self, queue: BoardQueue, task: Task) -> Result<AddOutcome, HiveError> {
        self.locked("add", move |dir| {
            let (mut docs, repaired) = load_docs(dir, true)?;
            let task_id = task.task_id.clone();
            let outcome = docs.add(queue, task);
            let mut touched = Vec::new();
            if outcome == AddOutcome::Added {
                write_queue(dir, queue, docs.queue(queue))?;
                touched.push(queue);
                debug!(task_id = %task_id, queue = %queue, "task added");
            }
            persist_repairs(dir, &docs, &repaired, &touched)?;
            Ok(outcome)
        })
        .await
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<(BoardQueue, Task)>, HiveError> {
        let task_id = task_id.clone();
        self.read("get", move |docs| docs.get(&task_id)).await
    }

    async fn list(
        &self,
        queue: BoardQueue,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, HiveError> {
        self.read("list", move |docs| {
            docs.queue(queue)
                .iter()
                .filter(|task| status.is_none_or(|s| task.status == s))
                .cloned()
                .collect()
        })
        .await
    }

    async fn update(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError> {
        if mutation.to.is_some() {
            return Err(HiveError::Validation(
                "update cannot move a task between queues".into(),
            ));
        }
        self.mutate("update", mutation).await
    }

    async fn move_task(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError> {
        if mutation.to.is_none() {
            return Err(HiveError::Validation("move requires a destination queue".into()));
        }
        self.mutate("move", mutation).await
    }

    async fn snapshot(&self) -> Result<BoardSnapshot, HiveError> {
        self.locked("snapshot", |dir| {
            let (docs, repaired) = load_docs(dir, true)?;
            persist_repairs(dir, &docs, &repaired, &[])?;
            Ok(docs.snapshot())
        })
        .await
    }
}

fn queue_path(dir: &Path, queue: BoardQueue) -> PathBuf {
    dir.join(format!("{}.json", queue.as_str()))
}

/// Load all four queues. With `repair`, corrupt files are moved aside.
///
/// Also returns the queues that lost a duplicate copy during load.
fn load_docs(dir: &Path, repair: bool) -> Result<(QueueDocs, Vec<BoardQueue>), HiveError> {
    let queues = [
        read_queue(dir, BoardQueue::Backlog, repair)?,
        read_queue(dir, BoardQueue::Ready, repair)?,
        read_queue(dir, BoardQueue::Working, repair)?,
        read_queue(dir, BoardQueue::Completed, repair)?,
    ];
    let mut docs = QueueDocs::from_queues(queues);
    let dropped = docs.dedupe();
    let mut repaired: Vec<BoardQueue> = Vec::new();
    for (task_id, queue) in dropped {
        warn!(
            task_id = %task_id,
            queue = %queue,
            "task found in two queues, keeping the later one"
        );
        if !repaired.contains(&queue) {
            repaired.push(queue);
        }
    }
    Ok((docs, repaired))
}

fn read_queue(dir: &Path, queue: BoardQueue, repair: bool) -> Result<Vec<Task>, HiveError> {
    let path = queue_path(dir, queue);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path)
        .map_err(|e| HiveError::Store(format!("cannot read {}: {e}", path.display())))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<QueueDocument>(&raw) {
        Ok(doc) => {
            if doc.version > DOCUMENT_VERSION {
                warn!(
                    path = %path.display(),
                    version = doc.version,
                    "queue document is newer than this build"
                );
            }
            Ok(doc.tasks)
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "corrupt queue document");
            if repair {
                let aside = path.with_extension(format!(
                    "json.corrupt-{}",
                    Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
                ));
                fs::rename(&path, &aside)?;
                warn!(from = %path.display(), to = %aside.display(), "moved corrupt document aside");
            }
            Ok(Vec::new())
        }
    }
}

fn write_queue(dir: &Path, queue: BoardQueue, tasks: &[Task]) -> Result<(), HiveError> {
    let doc = QueueDocumentRef {
        version: DOCUMENT_VERSION,
        queue,
        tasks,
    };
    let json = serde_json::to_vec_pretty(&doc)
        .map_err(|e| HiveError::Store(format!("cannot encode {queue} queue: {e}")))?;

    write_atomic(&queue_path(dir, queue), &json)
}

fn persist_repairs(
    dir: &Path,
    docs: &QueueDocs,
    repaired: &[BoardQueue],
    already_written: &[BoardQueue],
) -> Result<(), HiveError> {
    for queue in repaired {
        if !already_written.contains(queue) {
            write_queue(dir, *queue, docs.queue(*queue))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskPatch};
    use crate::ports::Guard;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn task(id: &str) -> Task {
        Task::from_new(NewTask::new("build"), TaskId::new(id), Utc::now())
    }

    fn claim(id: &str) -> Mutation {
        let mut patch = TaskPatch::status(TaskStatus::Assigned);
        patch.assigned_agent = Some("agent-a".into());
        Mutation {
            task_id: TaskId::new(id),
            guard: Guard::in_queue(BoardQueue::Ready).with_status(TaskStatus::Pending),
            to: Some(BoardQueue::Working),
            patch,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tasks_survive_reopening() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());
        store.add(BoardQueue::Ready, task("T1")).await.unwrap();

        let reopened = FileTaskStore::new(dir.path());
        let (queue, found) = reopened.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Ready);
        assert_eq!(found.action, "build");
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn move_rewrites_both_documents() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());
        store.add(BoardQueue::Ready, task("T1")).await.unwrap();

        let outcome = store.move_task(claim("T1")).await.unwrap();
        assert!(matches!(outcome, StoreOutcome::Applied(_)));

        assert!(store.list(BoardQueue::Ready, None).await.unwrap().is_empty());
        let working = store.list(BoardQueue::Working, None).await.unwrap();
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].status, TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn corrupt_document_is_moved_aside() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ready.json"), "{ not json").unwrap();

        let store = FileTaskStore::new(dir.path());
        store.add(BoardQueue::Backlog, task("T1")).await.unwrap();

        let aside: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert!(store.list(BoardQueue::Ready, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_on_disk_resolves_to_later_queue() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());
        let mut working = task("T1");
        working.status = TaskStatus::Assigned;
        write_queue(dir.path(), BoardQueue::Ready, &[task("T1")]).unwrap();
        write_queue(dir.path(), BoardQueue::Working, &[working]).unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.queue_of("T1"), Some(BoardQueue::Working));
        // snapshot は修復も永続化する
        assert!(store.list(BoardQueue::Ready, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn held_lock_reports_busy() {
        let dir = tempdir().unwrap();
        let store = FileTaskStore::new(dir.path()).with_lock_timeout(Duration::from_millis(50));
        let _held =
            LockFile::acquire(&dir.path().join(LOCK_FILE), Duration::ZERO, Duration::from_secs(60))
                .unwrap();

        let err = store.add(BoardQueue::Backlog, task("T1")).await.unwrap_err();
        assert!(matches!(err, HiveError::Busy(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_handles_claim_once() {
        let dir = tempdir().unwrap();
        FileTaskStore::new(dir.path())
            .add(BoardQueue::Ready, task("T2"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            // 別プロセス相当: ハンドルごとにプロセス内 Mutex が別
            let store = Arc::new(FileTaskStore::new(dir.path()));
            handles.push(tokio::spawn(async move { store.move_task(claim("T2")).await }));
        }

        let mut applied = 0;
        for handle in handles {
            if let StoreOutcome::Applied(_) = handle.await.unwrap().unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }
}
