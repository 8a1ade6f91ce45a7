//! Dispatcher - ready キューのタスクをエージェントへ送る
//!
//! # 1 サイクルの流れ
//! 1. ボード全体のスナップショットを 1 回だけ取る
//! 2. ready かつ PENDING のタスクを priority 昇順（同値は task_id 順）に並べる
//! 3. 依存先がスナップショットに無い / COMPLETED でないタスクは見送る
//! 4. 送信先を DispatchStrategy で解決 → バスへ publish
//! 5. 成功: ready → working（DISPATCHED）、失敗: ready → completed（DISPATCH_FAILED）
//!    記録は Busy の間リトライし、送信済みなのに記録できなかったタスクは再送しない
//!
//! 1 件の失敗でサイクルは止めません。結果は `CycleReport` に集計します。
//!
//! TASK_RESPONSE の処理（`handle_response`）もここにあります。

pub mod runner;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use self::runner::DispatchLoop;

use crate::board::{DependencyGraph, TaskBoard};
use crate::domain::{
    AgentId, BoardQueue, BusMessage, DispatchEnvelope, HiveError, ResponseStatus, Result, Task, TaskId,
    TaskPatch, TaskResponse, TaskStatus,
};
use crate::ports::{
    BoardSnapshot, DispatchStrategy, MessageBus, RepairPlanner, publish_with_timeout,
};

const SENDER: &str = "dispatcher";

/// What one dispatch cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub dispatched: Vec<TaskId>,
    /// Moved to completed as `DISPATCH_FAILED`.
    pub failed: Vec<TaskId>,
    /// Left in ready because a dependency is not completed.
    pub blocked: Vec<TaskId>,
    /// Claimed by someone else between snapshot and move.
    pub conflicts: Vec<TaskId>,
    /// Board errors; the task stays where it was.
    pub errors: Vec<TaskId>,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.dispatched.is_empty()
            && self.failed.is_empty()
            && self.conflicts.is_empty()
            && self.errors.is_empty()
    }
}

/// Result of handling one `TASK_RESPONSE`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Completed { task: Task, repairs: Vec<TaskId> },
    /// Status could not be mapped; nothing was applied.
    UnknownStatus(String),
    /// Payload or task state did not allow applying the response.
    Dropped(String),
}

pub struct Dispatcher {
    board: Arc<TaskBoard>,
    strategy: Arc<dyn DispatchStrategy>,
    bus: Arc<dyn MessageBus>,
    repair: Arc<dyn RepairPlanner>,
    publish_timeout: Duration,
    max_repair_tasks: usize,
    reported_cycles: Mutex<BTreeSet<Vec<TaskId>>>,
    /// Published commands whose move to working has not been persisted yet.
    unrecorded: Mutex<BTreeMap<TaskId, AgentId>>,
}

impl Dispatcher {
    pub fn new(
        board: Arc<TaskBoard>,
        strategy: Arc<dyn DispatchStrategy>,
        bus: Arc<dyn MessageBus>,
        repair: Arc<dyn RepairPlanner>,
    ) -> Self {
        Self {
            board,
            strategy,
            bus,
            repair,
            publish_timeout: Duration::from_secs(2),
            max_repair_tasks: 3,
            reported_cycles: Mutex::new(BTreeSet::new()),
            unrecorded: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_max_repair_tasks(mut self, max: usize) -> Self {
        self.max_repair_tasks = max;
        self
    }

    pub fn board(&self) -> &Arc<TaskBoard> {
        &self.board
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Run one dispatch cycle. Only a failed snapshot is an error.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let snapshot = self.board.snapshot().await?;
        self.report_dependency_cycles(&snapshot).await;
        self.unrecorded.lock().await.retain(|task_id, _| {
            snapshot
                .get(task_id.as_str())
                .is_some_and(|t| t.status == TaskStatus::Pending)
        });

        let mut candidates: Vec<&Task> = snapshot
            .iter()
            .filter(|(queue, task)| *queue == BoardQueue::Ready && task.status == TaskStatus::Pending)
            .map(|(_, task)| task)
            .collect();
        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });

        let mut report = CycleReport::default();
        for task in candidates {
            if let Some(dep) = unmet_dependency(task, &snapshot) {
                debug!(task_id = %task.task_id, depends_on = %dep, "dependency not completed");
                report.blocked.push(task.task_id.clone());
                continue;
            }
            self.dispatch_one(task, &mut report).await;
        }

        if !report.is_idle() {
            info!(
                dispatched = report.dispatched.len(),
                failed = report.failed.len(),
                blocked = report.blocked.len(),
                conflicts = report.conflicts.len(),
                errors = report.errors.len(),
                "dispatch cycle finished"
            );
        }
        Ok(report)
    }

    async fn dispatch_one(&self, task: &Task, report: &mut CycleReport) {
        let task_id = &task.task_id;
        let attempts = task.retry_count + 1;

        // 送信済みで記録だけ失敗したタスクは再送せず、記録だけやり直す
        let sent_to = self.unrecorded.lock().await.get(task_id).cloned();
        if let Some(agent_id) = sent_to {
            let moved = self
                .record(Landed::Dispatched, || {
                    self.board.mark_dispatched(task_id, &agent_id, attempts)
                })
                .await;
            if !matches!(&moved, Err(err) if !err.is_conflict()) {
                self.unrecorded.lock().await.remove(task_id);
            }
            Self::tally(task_id, moved, report);
            return;
        }

        let moved = match self.strategy.resolve_recipient(task).await {
            None => {
                let reason = format!("no agent available for action {}", task.action);
                warn!(task_id = %task_id, action = %task.action, "no recipient, dispatch failed");
                self.record(Landed::Failed, || {
                    self.board.mark_dispatch_failed(task_id, &reason, attempts)
                })
                .await
            }
            Some(recipient) => {
                let message = DispatchEnvelope::from_task(task)
                    .into_message(&recipient.agent_id)
                    .from_sender(SENDER);
                match publish_with_timeout(self.bus.as_ref(), message, self.publish_timeout).await {
                    Ok(()) => {
                        info!(
                            task_id = %task_id,
                            agent_id = %recipient.agent_id,
                            source = %recipient.source,
                            attempts,
                            "task dispatched"
                        );
                        let moved = self
                            .record(Landed::Dispatched, || {
                                self.board.mark_dispatched(task_id, &recipient.agent_id, attempts)
                            })
                            .await;
                        if matches!(&moved, Err(err) if !err.is_conflict()) {
                            error!(
                                task_id = %task_id,
                                agent_id = %recipient.agent_id,
                                "command sent but not recorded, holding the task back from resend"
                            );
                            self.unrecorded
                                .lock()
                                .await
                                .insert(task_id.clone(), recipient.agent_id.clone());
                        }
                        moved
                    }
                    Err(err) => {
                        let failure = HiveError::DispatchFailure(err.to_string()).to_string();
                        warn!(task_id = %task_id, error = %failure, "publish failed");
                        self.record(Landed::Failed, || {
                            self.board.mark_dispatch_failed(task_id, &failure, attempts)
                        })
                        .await
                    }
                }
            }
        };
        Self::tally(task_id, moved, report);
    }

    /// Persist a dispatch result, retrying while the board is busy.
    async fn record<F, Fut>(&self, landed: Landed, op: F) -> Result<Landed>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Task>>,
    {
        self.board.with_busy_retry(op).await.map(|_| landed)
    }

    fn tally(task_id: &TaskId, moved: Result<Landed>, report: &mut CycleReport) {
        match moved {
            Ok(Landed::Dispatched) => report.dispatched.push(task_id.clone()),
            Ok(Landed::Failed) => report.failed.push(task_id.clone()),
            Err(err) if err.is_conflict() => {
                warn!(task_id = %task_id, error = %err, "task changed during dispatch");
                report.conflicts.push(task_id.clone());
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "could not record dispatch result");
                report.errors.push(task_id.clone());
            }
        }
    }

    async fn report_dependency_cycles(&self, snapshot: &BoardSnapshot) {
        let waiting = snapshot
            .iter()
            .filter(|(queue, _)| matches!(queue, BoardQueue::Backlog | BoardQueue::Ready))
            .map(|(_, task)| task);
        let cycles = DependencyGraph::from_tasks(waiting).detect_cycles();
        let mut reported = self.reported_cycles.lock().await;
        let mut current = BTreeSet::new();
        for cycle in cycles {
            let mut key = cycle.clone();
            key.sort();
            key.dedup();
            if !reported.contains(&key) {
                let path: Vec<&str> = cycle.iter().map(TaskId::as_str).collect();
                warn!(cycle = %path.join(" -> "), "dependency cycle, tasks will never dispatch");
            }
            current.insert(key);
        }
        // 解消したサイクルは忘れる（再発すれば再度警告）
        *reported = current;
    }

    /// Apply a `TASK_RESPONSE` message. Never fails; problems are logged.
    pub async fn handle_response(&self, message: &BusMessage) -> ResponseOutcome {
        let response = match TaskResponse::from_message(message) {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "dropping malformed task response");
                return ResponseOutcome::Dropped(err.to_string());
            }
        };

        let status = response.normalized_status();
        let Some(final_status) = status.task_status() else {
            warn!(
                task_id = %response.task_id,
                sender = %response.sender,
                status = %response.status,
                "unknown response status, task left as is"
            );
            return ResponseOutcome::UnknownStatus(response.status.clone());
        };

        let mut patch = TaskPatch::status(final_status);
        if status.is_failure() {
            patch.error_details = response.error_details();
        } else {
            patch.result_summary = response.summary();
        }

        let task = match self.board.complete(&response.task_id, patch).await {
            Ok(task) => task,
            Err(err) => {
                warn!(
                    task_id = %response.task_id,
                    sender = %response.sender,
                    error = %err,
                    "could not apply task response"
                );
                return ResponseOutcome::Dropped(err.to_string());
            }
        };
        info!(task_id = %task.task_id, status = %task.status, sender = %response.sender, "task response applied");

        let repairs = if status.is_failure() {
            self.plan_repairs(&task, &response, &status).await
        } else {
            Vec::new()
        };
        ResponseOutcome::Completed { task, repairs }
    }

    async fn plan_repairs(
        &self,
        failed: &Task,
        response: &TaskResponse,
        status: &ResponseStatus,
    ) -> Vec<TaskId> {
        if self.max_repair_tasks == 0 {
            return Vec::new();
        }
        let drafts = self
            .repair
            .plan_repairs(failed, response, self.max_repair_tasks)
            .await;

        let mut added = Vec::new();
        for draft in drafts.into_iter().take(self.max_repair_tasks) {
            match self
                .board
                .add_to_backlog(draft.repairing(failed.task_id.clone()))
                .await
            {
                Ok(task_id) => added.push(task_id),
                Err(err) => {
                    warn!(task_id = %failed.task_id, error = %err, "repair task rejected");
                }
            }
        }
        if !added.is_empty() {
            info!(task_id = %failed.task_id, %status, repairs = added.len(), "repair tasks queued");
        }
        added
    }
}

enum Landed {
    Dispatched,
    Failed,
}

/// First dependency of `task` that is missing or not `COMPLETED`.
fn unmet_dependency<'a>(task: &'a Task, snapshot: &BoardSnapshot) -> Option<&'a TaskId> {
    task.depends_on.iter().find(|dep| {
        snapshot
            .get(dep.as_str())
            .is_none_or(|t| t.status != TaskStatus::Completed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, NewTask, event_types};
    use crate::impls::{InMemoryBus, InMemoryTaskStore};
    use crate::ports::{FixedClock, NoopRepairPlanner, Recipient, RecipientSource, UlidGenerator};
    use crate::ports::{AddOutcome, Mutation, StoreOutcome, TaskStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Routes everything except `paint` to AgentA.
    struct StaticRoute;

    #[async_trait]
    impl DispatchStrategy for StaticRoute {
        async fn resolve_recipient(&self, task: &Task) -> Option<Recipient> {
            (task.action != "paint").then(|| Recipient {
                agent_id: AgentId::new("AgentA"),
                source: RecipientSource::Fallback,
            })
        }
    }

    struct FixOnce;

    #[async_trait]
    impl RepairPlanner for FixOnce {
        async fn plan_repairs(&self, failed: &Task, _: &TaskResponse, budget: usize) -> Vec<NewTask> {
            (0..budget + 2)
                .map(|n| NewTask::new(format!("fix_{}", failed.action)).with_id(format!("R{n}")))
                .collect()
        }
    }

    /// Answers `Busy` to the next `busy_moves` moves into working.
    struct BusyStore {
        inner: InMemoryTaskStore,
        busy_moves: AtomicUsize,
    }

    impl BusyStore {
        fn new(busy_moves: usize) -> Self {
            Self {
                inner: InMemoryTaskStore::new(),
                busy_moves: AtomicUsize::new(busy_moves),
            }
        }
    }

    #[async_trait]
    impl TaskStore for BusyStore {
        async fn add(&self, queue: BoardQueue, task: Task) -> Result<AddOutcome> {
            self.inner.add(queue, task).await
        }

        async fn get(&self, task_id: &TaskId) -> Result<Option<(BoardQueue, Task)>> {
            self.inner.get(task_id).await
        }

        async fn list(&self, queue: BoardQueue, status: Option<TaskStatus>) -> Result<Vec<Task>> {
            self.inner.list(queue, status).await
        }

        async fn update(&self, mutation: Mutation) -> Result<StoreOutcome> {
            self.inner.update(mutation).await
        }

        async fn move_task(&self, mutation: Mutation) -> Result<StoreOutcome> {
            let busy = mutation.to == Some(BoardQueue::Working)
                && self
                    .busy_moves
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if busy {
                return Err(HiveError::Busy("board.lock held".into()));
            }
            self.inner.move_task(mutation).await
        }

        async fn snapshot(&self) -> Result<BoardSnapshot> {
            self.inner.snapshot().await
        }
    }

    fn setup(repair: Arc<dyn RepairPlanner>) -> (Dispatcher, Arc<TaskBoard>, Arc<InMemoryBus>) {
        setup_on(Arc::new(InMemoryTaskStore::new()), repair)
    }

    fn setup_on(
        store: Arc<dyn TaskStore>,
        repair: Arc<dyn RepairPlanner>,
    ) -> (Dispatcher, Arc<TaskBoard>, Arc<InMemoryBus>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        let board = Arc::new(TaskBoard::new(store, clock, ids));
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Dispatcher::new(board.clone(), Arc::new(StaticRoute), bus.clone(), repair)
            .with_max_repair_tasks(2);
        (dispatcher, board, bus)
    }

    async fn ready(board: &TaskBoard, draft: NewTask) -> TaskId {
        let task_id = board.add_to_backlog(draft).await.unwrap();
        board.promote(&task_id).await.unwrap();
        task_id
    }

    fn response(task_id: &str, status: &str, payload: serde_json::Value) -> BusMessage {
        BusMessage::new(
            event_types::TASK_RESPONSE,
            json!({"task_id": task_id, "status": status, "payload": payload}),
        )
        .from_sender("AgentA")
    }

    #[tokio::test]
    async fn dispatches_in_priority_order() {
        let (dispatcher, board, bus) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T-low").with_priority(20)).await;
        ready(&board, NewTask::new("build").with_id("T-high").with_priority(1)).await;

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, vec![TaskId::new("T-high"), TaskId::new("T-low")]);

        let sent = bus.published_of("build").await;
        assert_eq!(sent[0].task_id, Some(TaskId::new("T-high")));
        assert_eq!(sent[0].recipient.as_deref(), Some("AgentA"));

        let (queue, task) = board.get(&TaskId::new("T-high")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Working);
        assert_eq!(task.status, TaskStatus::Dispatched);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn unroutable_task_fails_without_publishing() {
        let (dispatcher, board, bus) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("paint").with_id("T1")).await;

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.failed, vec![TaskId::new("T1")]);
        assert!(bus.published().await.is_empty());

        let (queue, task) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Completed);
        assert_eq!(task.status, TaskStatus::DispatchFailed);
        assert!(task.error_details.unwrap().contains("paint"));
    }

    #[tokio::test]
    async fn publish_failure_marks_dispatch_failed() {
        let (dispatcher, board, bus) = setup(Arc::new(NoopRepairPlanner));
        bus.reject("build").await;
        ready(&board, NewTask::new("build").with_id("T1")).await;

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.failed, vec![TaskId::new("T1")]);
        let (_, task) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DispatchFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_board_after_publish_is_retried_not_resent() {
        let (dispatcher, board, bus) =
            setup_on(Arc::new(BusyStore::new(1)), Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T1")).await;

        let first = dispatcher.run_cycle().await.unwrap();
        assert_eq!(first.dispatched, vec![TaskId::new("T1")]);
        let second = dispatcher.run_cycle().await.unwrap();
        assert!(second.is_idle());

        assert_eq!(bus.published_of("build").await.len(), 1);
        let (queue, task) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Working);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecorded_dispatch_is_recorded_without_resending() {
        // 5 回の試行すべてが Busy
        let (dispatcher, board, bus) =
            setup_on(Arc::new(BusyStore::new(5)), Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T1")).await;

        let first = dispatcher.run_cycle().await.unwrap();
        assert_eq!(first.errors, vec![TaskId::new("T1")]);
        let (queue, _) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Ready);

        let second = dispatcher.run_cycle().await.unwrap();
        assert_eq!(second.dispatched, vec![TaskId::new("T1")]);
        assert_eq!(bus.published_of("build").await.len(), 1);

        let (queue, task) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(queue, BoardQueue::Working);
        assert_eq!(task.status, TaskStatus::Dispatched);
        assert_eq!(task.assigned_agent, Some(AgentId::new("AgentA")));
        assert_eq!(task.retry_count, 1);
        assert!(dispatcher.unrecorded.lock().await.is_empty());
    }

    #[tokio::test]
    async fn resolved_cycles_are_forgotten() {
        let (dispatcher, board, _) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("A").depends_on("B")).await;
        ready(&board, NewTask::new("build").with_id("B").depends_on("A")).await;

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.blocked.len(), 2);
        assert_eq!(dispatcher.reported_cycles.lock().await.len(), 1);

        board.claim(&TaskId::new("A"), &AgentId::new("AgentA")).await.unwrap();
        dispatcher.run_cycle().await.unwrap();
        assert!(dispatcher.reported_cycles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_dependency_blocks_dispatch() {
        let (dispatcher, board, bus) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T1").depends_on("ghost")).await;

        let report = dispatcher.run_cycle().await.unwrap();
        assert_eq!(report.blocked, vec![TaskId::new("T1")]);
        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn backlog_tasks_are_never_dispatched() {
        let (dispatcher, board, _) = setup(Arc::new(NoopRepairPlanner));
        board
            .add_to_backlog(NewTask::new("build").with_id("T1"))
            .await
            .unwrap();

        let report = dispatcher.run_cycle().await.unwrap();
        assert!(report.is_idle());
        assert!(report.blocked.is_empty());
    }

    #[tokio::test]
    async fn completed_response_finishes_the_task() {
        let (dispatcher, board, _) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T1")).await;
        dispatcher.run_cycle().await.unwrap();

        let outcome = dispatcher
            .handle_response(&response("T1", "success", json!({"summary": "built"})))
            .await;
        let ResponseOutcome::Completed { task, repairs } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_summary.as_deref(), Some("built"));
        assert!(repairs.is_empty());
    }

    #[tokio::test]
    async fn unknown_status_is_not_applied() {
        let (dispatcher, board, _) = setup(Arc::new(NoopRepairPlanner));
        ready(&board, NewTask::new("build").with_id("T1")).await;
        dispatcher.run_cycle().await.unwrap();

        let outcome = dispatcher
            .handle_response(&response("T1", "in progress", json!(null)))
            .await;
        assert_eq!(outcome, ResponseOutcome::UnknownStatus("in progress".into()));
        let (_, task) = board.get(&TaskId::new("T1")).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Dispatched);
    }

    #[tokio::test]
    async fn failures_queue_bounded_repairs() {
        let (dispatcher, board, _) = setup(Arc::new(FixOnce));
        ready(&board, NewTask::new("build").with_id("T1")).await;
        dispatcher.run_cycle().await.unwrap();

        let outcome = dispatcher
            .handle_response(&response("T1", "FAILED", json!({"error": "linker"})))
            .await;
        let ResponseOutcome::Completed { task, repairs } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_details.as_deref(), Some("linker"));
        assert_eq!(repairs.len(), 2);

        let backlog = board.list(BoardQueue::Backlog, None).await.unwrap();
        assert_eq!(backlog.len(), 2);
        assert!(backlog.iter().all(|t| t.repair_of == Some(TaskId::new("T1"))));
    }

    #[tokio::test]
    async fn malformed_response_is_dropped() {
        let (dispatcher, _, _) = setup(Arc::new(NoopRepairPlanner));
        let outcome = dispatcher
            .handle_response(&BusMessage::new(event_types::TASK_RESPONSE, json!([1, 2])))
            .await;
        assert!(matches!(outcome, ResponseOutcome::Dropped(_)));
    }
}
