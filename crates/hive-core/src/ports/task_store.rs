//! TaskStore port - タスクボードの永続化（正本）
//!
//! # 契約
//! - 変更系（add / update / move_task）は「ロック取得 → 再読込 → 検証 → 適用 → 永続化」を
//!   1 回の呼び出しで完結させる
//! - ロックはタイムアウト付き。超過したら `HiveError::Busy`
//! - 永続化は一時ファイル + atomic rename（またはトランザクション）。
//!   書き込み失敗時は直前の状態が残る
//! - 検証結果は `StoreOutcome` で返し、型付きエラーへの変換は TaskBoard が行う

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BoardQueue, HiveError, Task, TaskId, TaskPatch, TaskStatus};
use crate::observability::BoardCounts;

/// Result of `TaskStore::add`.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added,
    /// The id already exists in the given queue.
    Duplicate(BoardQueue),
}

/// Result of a guarded mutation (`update` / `move_task`).
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// The change was applied; carries the task as persisted.
    Applied(Task),
    NotFound,
    /// The task lives in another queue than the one expected.
    WrongQueue { queue: BoardQueue, status: TaskStatus },
    /// The task is in the expected queue but its status was not accepted.
    StatusMismatch(TaskStatus),
}

/// Expected location/status of a task, checked under the store lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub queue: BoardQueue,
    /// Accepted statuses; empty means any.
    pub statuses: Vec<TaskStatus>,
}

impl Guard {
    pub fn in_queue(queue: BoardQueue) -> Self {
        Self {
            queue,
            statuses: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn accepts(&self, status: TaskStatus) -> bool {
        self.statuses.is_empty() || self.statuses.contains(&status)
    }
}

/// One guarded change: optionally move to `to`, merging `patch` at `at`.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub task_id: TaskId,
    pub guard: Guard,
    /// Destination queue; `None` keeps the task where it is.
    pub to: Option<BoardQueue>,
    pub patch: TaskPatch,
    pub at: DateTime<Utc>,
}

/// Consistent view of every task on the board.
#[derive(Debug, Clone, Default)]
pub struct BoardSnapshot {
    entries: BTreeMap<TaskId, (BoardQueue, Task)>,
}

impl BoardSnapshot {
    pub fn new(entries: BTreeMap<TaskId, (BoardQueue, Task)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.entries.get(task_id).map(|(_, task)| task)
    }

    pub fn queue_of(&self, task_id: &str) -> Option<BoardQueue> {
        self.entries.get(task_id).map(|(queue, _)| *queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BoardQueue, &Task)> {
        self.entries.values().map(|(queue, task)| (*queue, task))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> BoardCounts {
        let mut counts = BoardCounts::default();
        for (queue, _) in self.entries.values() {
            counts.record(*queue);
        }
        counts
    }
}

/// TaskStore は 4 つのキュー（backlog / ready / working / completed）の正本
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task into `queue` unless its id exists anywhere.
    async fn add(&self, queue: BoardQueue, task: Task) -> Result<AddOutcome, HiveError>;

    /// Look a task up across all queues.
    async fn get(&self, task_id: &TaskId) -> Result<Option<(BoardQueue, Task)>, HiveError>;

    /// Tasks of one queue in stored order, optionally filtered by status.
    async fn list(
        &self,
        queue: BoardQueue,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, HiveError>;

    /// Apply a guarded in-place update (`mutation.to` must be `None`).
    async fn update(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError>;

    /// Apply a guarded cross-queue move.
    async fn move_task(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError>;

    /// Every task with its queue, read under the store lock.
    async fn snapshot(&self) -> Result<BoardSnapshot, HiveError>;
}
