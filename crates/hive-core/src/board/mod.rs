//! TaskBoard - 4 キュー（backlog / ready / working / completed）のライフサイクル管理
//!
//! # 状態遷移
//! ```text
//! add_to_backlog → [backlog] → promote → [ready] → claim / dispatch → [working] → complete → [completed]
//!                                           └──── dispatch 失敗 ─────────────────────────────→ [completed]
//! ```
//!
//! # 設計原則
//! - 正本は TaskStore。TaskBoard はメモリに状態を持たない
//! - 検証（どのキューにいるべきか、どの status であるべきか）は Guard としてストアに渡し、
//!   ストアのロック内で評価される。だから claim の勝者は必ず 1 人
//! - ストアの StoreOutcome をここで型付きエラーに変換する

pub mod dependency;
pub mod retry;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

pub use self::dependency::DependencyGraph;
pub use self::retry::BusyRetry;

use crate::domain::{
    AgentId, BoardQueue, HiveError, NewTask, Result, Task, TaskId, TaskPatch, TaskStatus,
};
use crate::observability::BoardCounts;
use crate::ports::{AddOutcome, BoardSnapshot, Clock, Guard, IdGenerator, Mutation, StoreOutcome, TaskStore};

/// Authoritative lifecycle manager over a `TaskStore`.
pub struct TaskBoard {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    retry: BusyRetry,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            clock,
            ids,
            retry: BusyRetry::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: BusyRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Insert a new `PENDING` task into the backlog.
    pub async fn add_to_backlog(&self, mut draft: NewTask) -> Result<TaskId> {
        if draft.action.trim().is_empty() {
            return Err(HiveError::Validation("action must not be empty".into()));
        }
        let task_id = match draft.task_id.take() {
            Some(id) if id.is_blank() => {
                return Err(HiveError::Validation("task_id must not be blank".into()));
            }
            Some(id) => id,
            None => self.ids.generate_task_id(),
        };
        if draft.depends_on.contains(&task_id) {
            return Err(HiveError::Validation(format!(
                "task {task_id} cannot depend on itself"
            )));
        }

        let task = Task::from_new(draft, task_id.clone(), self.clock.now());
        match self.store.add(BoardQueue::Backlog, task).await? {
            AddOutcome::Added => {
                info!(task_id = %task_id, "task added to backlog");
                Ok(task_id)
            }
            AddOutcome::Duplicate(queue) => {
                debug!(task_id = %task_id, queue = %queue, "duplicate task id");
                Err(HiveError::DuplicateId(task_id))
            }
        }
    }

    /// backlog → ready.
    pub async fn promote(&self, task_id: &TaskId) -> Result<Task> {
        let mutation = self.mutation(
            task_id,
            Guard::in_queue(BoardQueue::Backlog).with_status(TaskStatus::Pending),
            Some(BoardQueue::Ready),
            TaskPatch::default(),
        );
        let task = match self.store.move_task(mutation).await? {
            StoreOutcome::Applied(task) => task,
            other => return Err(wrong_place(task_id, BoardQueue::Backlog, other)),
        };
        info!(task_id = %task_id, "task promoted to ready");
        Ok(task)
    }

    /// ready → working as `ASSIGNED` to `agent_id`.
    ///
    /// Exactly one concurrent caller wins; the rest see `AlreadyClaimed`.
    pub async fn claim(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Task> {
        if agent_id.is_blank() {
            return Err(HiveError::Validation("agent_id must not be blank".into()));
        }
        let now = self.clock.now();
        let mut patch = TaskPatch::status(TaskStatus::Assigned);
        patch.assigned_agent = Some(agent_id.clone());
        patch.started_at = Some(now);

        let mutation = self.mutation(
            task_id,
            Guard::in_queue(BoardQueue::Ready).with_status(TaskStatus::Pending),
            Some(BoardQueue::Working),
            patch,
        );
        match self.store.move_task(mutation).await? {
            StoreOutcome::Applied(task) => {
                info!(task_id = %task_id, agent_id = %agent_id, "task claimed");
                Ok(task)
            }
            StoreOutcome::NotFound => Err(HiveError::task_not_found(task_id)),
            StoreOutcome::WrongQueue {
                queue: BoardQueue::Backlog,
                ..
            } => Err(HiveError::WrongQueue {
                task_id: task_id.clone(),
                expected: BoardQueue::Ready,
                actual: BoardQueue::Backlog,
            }),
            StoreOutcome::WrongQueue { queue, status } => {
                debug!(task_id = %task_id, agent_id = %agent_id, %queue, "claim lost");
                Err(HiveError::AlreadyClaimed {
                    task_id: task_id.clone(),
                    status,
                    queue,
                })
            }
            StoreOutcome::StatusMismatch(status) => Err(HiveError::AlreadyClaimed {
                task_id: task_id.clone(),
                status,
                queue: BoardQueue::Ready,
            }),
        }
    }

    /// `claim` retried with backoff while the board is busy.
    pub async fn claim_with_retry(&self, task_id: &TaskId, agent_id: &AgentId) -> Result<Task> {
        self.with_busy_retry(|| self.claim(task_id, agent_id)).await
    }

    /// Run any board operation under this board's busy-retry policy.
    pub async fn with_busy_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.run(op).await
    }

    /// Merge `patch` into a task in working.
    ///
    /// The status may only move among working statuses; lifecycle
    /// timestamps are owned by the board and ignored here.
    pub async fn update_working(&self, task_id: &TaskId, mut patch: TaskPatch) -> Result<Task> {
        if let Some(status) = patch.status
            && !status.is_working()
        {
            return Err(HiveError::Validation(format!(
                "status {status} is not a working status; use complete"
            )));
        }
        patch.started_at = None;
        patch.completed_at = None;

        let mutation = self.mutation(task_id, Guard::in_queue(BoardQueue::Working), None, patch);
        match self.store.update(mutation).await? {
            StoreOutcome::Applied(task) => {
                debug!(task_id = %task_id, status = %task.status, "working task updated");
                Ok(task)
            }
            _ => Err(not_in_working(task_id)),
        }
    }

    /// working → completed with a terminal status (default `COMPLETED`).
    pub async fn complete(&self, task_id: &TaskId, mut final_fields: TaskPatch) -> Result<Task> {
        let status = final_fields.status.unwrap_or(TaskStatus::Completed);
        if !status.is_terminal() {
            return Err(HiveError::Validation(format!(
                "status {status} is not a terminal status"
            )));
        }
        final_fields.status = Some(status);
        final_fields.started_at = None;
        final_fields.completed_at = Some(self.clock.now());

        let mutation = self.mutation(
            task_id,
            Guard::in_queue(BoardQueue::Working),
            Some(BoardQueue::Completed),
            final_fields,
        );
        match self.store.move_task(mutation).await? {
            StoreOutcome::Applied(task) => {
                info!(task_id = %task_id, status = %task.status, "task completed");
                Ok(task)
            }
            _ => Err(not_in_working(task_id)),
        }
    }

    /// ready → working as `DISPATCHED` after a successful publish.
    pub async fn mark_dispatched(
        &self,
        task_id: &TaskId,
        agent_id: &AgentId,
        retry_count: u32,
    ) -> Result<Task> {
        let mut patch = TaskPatch::status(TaskStatus::Dispatched);
        patch.assigned_agent = Some(agent_id.clone());
        patch.retry_count = Some(retry_count);
        patch.started_at = Some(self.clock.now());
        self.leave_ready(task_id, BoardQueue::Working, patch).await
    }

    /// ready → completed as `DISPATCH_FAILED`.
    pub async fn mark_dispatch_failed(
        &self,
        task_id: &TaskId,
        reason: &str,
        retry_count: u32,
    ) -> Result<Task> {
        let mut patch = TaskPatch::status(TaskStatus::DispatchFailed).with_error(reason);
        patch.retry_count = Some(retry_count);
        patch.completed_at = Some(self.clock.now());
        self.leave_ready(task_id, BoardQueue::Completed, patch).await
    }

    async fn leave_ready(&self, task_id: &TaskId, to: BoardQueue, patch: TaskPatch) -> Result<Task> {
        let mutation = self.mutation(
            task_id,
            Guard::in_queue(BoardQueue::Ready).with_status(TaskStatus::Pending),
            Some(to),
            patch,
        );
        match self.store.move_task(mutation).await? {
            StoreOutcome::Applied(task) => Ok(task),
            StoreOutcome::WrongQueue { queue, status } if queue != BoardQueue::Backlog => {
                Err(HiveError::AlreadyClaimed {
                    task_id: task_id.clone(),
                    status,
                    queue,
                })
            }
            StoreOutcome::StatusMismatch(status) => Err(HiveError::AlreadyClaimed {
                task_id: task_id.clone(),
                status,
                queue: BoardQueue::Ready,
            }),
            other => Err(wrong_place(task_id, BoardQueue::Ready, other)),
        }
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<Option<(BoardQueue, Task)>> {
        self.store.get(task_id).await
    }

    pub async fn list(&self, queue: BoardQueue, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        self.store.list(queue, status).await
    }

    /// Every task with its queue, read as one consistent view.
    pub async fn snapshot(&self) -> Result<BoardSnapshot> {
        self.store.snapshot().await
    }

    pub async fn counts(&self) -> Result<BoardCounts> {
        Ok(self.store.snapshot().await?.counts())
    }

    fn mutation(
        &self,
        task_id: &TaskId,
        guard: Guard,
        to: Option<BoardQueue>,
        patch: TaskPatch,
    ) -> Mutation {
        Mutation {
            task_id: task_id.clone(),
            guard,
            to,
            patch,
            at: self.clock.now(),
        }
    }
}

fn wrong_place(task_id: &TaskId, expected: BoardQueue, outcome: StoreOutcome) -> HiveError {
    match outcome {
        StoreOutcome::NotFound => HiveError::task_not_found(task_id),
        StoreOutcome::WrongQueue { queue, .. } => HiveError::WrongQueue {
            task_id: task_id.clone(),
            expected,
            actual: queue,
        },
        StoreOutcome::StatusMismatch(status) => HiveError::Validation(format!(
            "task {task_id} has status {status} in the {expected} queue"
        )),
        StoreOutcome::Applied(_) => HiveError::Store("mutation applied unexpectedly".into()),
    }
}

fn not_in_working(task_id: &TaskId) -> HiveError {
    HiveError::NotFound {
        entity: "working task",
        id: task_id.to_string(),
    }
}
