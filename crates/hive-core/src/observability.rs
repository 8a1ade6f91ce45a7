//! Observability - ボードの集計ビュー

use serde::{Deserialize, Serialize};

use crate::domain::BoardQueue;

/// Number of tasks per board queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCounts {
    pub backlog: usize,
    pub ready: usize,
    pub working: usize,
    pub completed: usize,
}

impl BoardCounts {
    pub fn record(&mut self, queue: BoardQueue) {
        match queue {
            BoardQueue::Backlog => self.backlog += 1,
            BoardQueue::Ready => self.ready += 1,
            BoardQueue::Working => self.working += 1,
            BoardQueue::Completed => self.completed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.backlog + self.ready + self.working + self.completed
    }
}
