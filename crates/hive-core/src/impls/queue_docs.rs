//! QueueDocs - 4 つのキューの中身と、検証付きの変更ロジック
//!
//! ファイル実装とメモリ実装の両方がロックを取ったうえでこの型を操作します。
//! ここにはロックも I/O もありません（純粋なデータ操作のみ）。

use std::collections::BTreeMap;

use crate::domain::{BoardQueue, HiveError, Task, TaskId};
use crate::ports::{AddOutcome, BoardSnapshot, Mutation, StoreOutcome};

#[derive(Debug, Clone, Default)]
pub(crate) struct QueueDocs {
    queues: [Vec<Task>; 4],
}

impl QueueDocs {
    pub(crate) fn from_queues(queues: [Vec<Task>; 4]) -> Self {
        Self { queues }
    }

    pub(crate) fn queue(&self, queue: BoardQueue) -> &[Task] {
        &self.queues[queue.index()]
    }

    fn locate(&self, task_id: &TaskId) -> Option<(BoardQueue, usize)> {
        // 後段のキューから探す（重複時は進んだ方が正）
        BoardQueue::ALL.iter().rev().find_map(|queue| {
            self.queues[queue.index()]
                .iter()
                .position(|task| &task.task_id == task_id)
                .map(|pos| (*queue, pos))
        })
    }

    pub(crate) fn get(&self, task_id: &TaskId) -> Option<(BoardQueue, Task)> {
        self.locate(task_id)
            .map(|(queue, pos)| (queue, self.queues[queue.index()][pos].clone()))
    }

    pub(crate) fn add(&mut self, queue: BoardQueue, task: Task) -> AddOutcome {
        if let Some((existing, _)) = self.locate(&task.task_id) {
            return AddOutcome::Duplicate(existing);
        }
        self.queues[queue.index()].push(task);
        AddOutcome::Added
    }

    /// Apply a guarded mutation.
    ///
    /// Returns the outcome and the queues whose contents changed, destination
    /// first so that a writer persisting them in order never loses the task.
    pub(crate) fn apply(
        &mut self,
        mutation: &Mutation,
    ) -> Result<(StoreOutcome, Vec<BoardQueue>), HiveError> {
        let Some((queue, pos)) = self.locate(&mutation.task_id) else {
            return Ok((StoreOutcome::NotFound, Vec::new()));
        };
        let current = self.queues[queue.index()][pos].status;
        if queue != mutation.guard.queue {
            return Ok((
                StoreOutcome::WrongQueue {
                    queue,
                    status: current,
                },
                Vec::new(),
            ));
        }
        if !mutation.guard.accepts(current) {
            return Ok((StoreOutcome::StatusMismatch(current), Vec::new()));
        }

        let destination = mutation.to.unwrap_or(queue);
        let mut task = self.queues[queue.index()][pos].clone();
        task.apply(&mutation.patch, mutation.at);
        if !destination.admits(task.status) {
            return Err(HiveError::Validation(format!(
                "status {} is not allowed in the {} queue",
                task.status, destination
            )));
        }

        if destination == queue {
            self.queues[queue.index()][pos] = task.clone();
            return Ok((StoreOutcome::Applied(task), vec![queue]));
        }

        self.queues[queue.index()].remove(pos);
        self.queues[destination.index()].push(task.clone());
        Ok((StoreOutcome::Applied(task), vec![destination, queue]))
    }

    /// Drop copies of ids that appear in more than one queue, keeping the
    /// later-stage copy. Returns the queues that changed.
    pub(crate) fn dedupe(&mut self) -> Vec<(TaskId, BoardQueue)> {
        let mut seen: BTreeMap<TaskId, BoardQueue> = BTreeMap::new();
        let mut dropped = Vec::new();
        for queue in BoardQueue::ALL.iter().rev() {
            self.queues[queue.index()].retain(|task| {
                if seen.contains_key(&task.task_id) {
                    dropped.push((task.task_id.clone(), *queue));
                    false
                } else {
                    seen.insert(task.task_id.clone(), *queue);
                    true
                }
            });
        }
        dropped
    }

    pub(crate) fn snapshot(&self) -> BoardSnapshot {
        let mut entries = BTreeMap::new();
        for queue in BoardQueue::ALL {
            for task in &self.queues[queue.index()] {
                entries
                    .entry(task.task_id.clone())
                    .and_modify(|entry: &mut (BoardQueue, Task)| {
                        if queue > entry.0 {
                            *entry = (queue, task.clone());
                        }
                    })
                    .or_insert_with(|| (queue, task.clone()));
            }
        }
        BoardSnapshot::new(entries)
    }
}
