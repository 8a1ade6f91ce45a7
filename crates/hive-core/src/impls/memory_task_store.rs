//! InMemoryTaskStore - テスト・単一プロセス用の TaskStore
//!
//! ロックは tokio の Mutex ひとつ。取得にはファイル実装と同じくタイムアウトがあり、
//! 超過すると `HiveError::Busy` を返します。

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::file_task_store::DEFAULT_LOCK_TIMEOUT;
use super::queue_docs::QueueDocs;
use crate::domain::{BoardQueue, HiveError, Task, TaskId, TaskStatus};
use crate::ports::{AddOutcome, BoardSnapshot, Mutation, StoreOutcome, TaskStore};

#[derive(Debug)]
pub struct InMemoryTaskStore {
    docs: Mutex<QueueDocs>,
    lock_timeout: Duration,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(QueueDocs::default()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    async fn lock(&self) -> Result<MutexGuard<'_, QueueDocs>, HiveError> {
        tokio::time::timeout(self.lock_timeout, self.docs.lock())
            .await
            .map_err(|_| {
                HiveError::Busy(format!(
                    "timed out after {}ms waiting for the board",
                    self.lock_timeout.as_millis()
                ))
            })
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn add(&self, queue: BoardQueue, task: Task) -> Result<AddOutcome, HiveError> {
        Ok(self.lock().await?.add(queue, task))
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<(BoardQueue, Task)>, HiveError> {
        Ok(self.lock().await?.get(task_id))
    }

    async fn list(
        &self,
        queue: BoardQueue,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, HiveError> {
        let docs = self.lock().await?;
        Ok(docs
            .queue(queue)
            .iter()
            .filter(|task| status.is_none_or(|s| task.status == s))
            .cloned()
            .collect())
    }

    async fn update(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError> {
        if mutation.to.is_some() {
            return Err(HiveError::Validation(
                "update cannot move a task between queues".into(),
            ));
        }
        let (outcome, _) = self.lock().await?.apply(&mutation)?;
        Ok(outcome)
    }

    async fn move_task(&self, mutation: Mutation) -> Result<StoreOutcome, HiveError> {
        if mutation.to.is_none() {
            return Err(HiveError::Validation("move requires a destination queue".into()));
        }
        let (outcome, _) = self.lock().await?.apply(&mutation)?;
        Ok(outcome)
    }

    async fn snapshot(&self) -> Result<BoardSnapshot, HiveError> {
        Ok(self.lock().await?.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::Utc;

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = InMemoryTaskStore::new();
        let mut failed = Task::from_new(NewTask::new("a"), TaskId::new("T1"), Utc::now());
        failed.status = TaskStatus::Failed;
        let mut done = Task::from_new(NewTask::new("b"), TaskId::new("T2"), Utc::now());
        done.status = TaskStatus::Completed;
        store.add(BoardQueue::Completed, failed).await.unwrap();
        store.add(BoardQueue::Completed, done).await.unwrap();

        let only_failed = store
            .list(BoardQueue::Completed, Some(TaskStatus::Failed))
            .await
            .unwrap();
        assert_eq!(only_failed.len(), 1);
        assert_eq!(only_failed[0].task_id.as_str(), "T1");
    }

    #[tokio::test]
    async fn update_refuses_destination() {
        let store = InMemoryTaskStore::new();
        let mutation = Mutation {
            task_id: TaskId::new("T1"),
            guard: crate::ports::Guard::in_queue(BoardQueue::Backlog),
            to: Some(BoardQueue::Ready),
            patch: Default::default(),
            at: Utc::now(),
        };
        assert!(matches!(
            store.update(mutation).await,
            Err(HiveError::Validation(_))
        ));
    }
}
