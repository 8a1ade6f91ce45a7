//! State - タスクの状態とボード上のキュー
//!
//! # キューと状態の対応（不変条件）
//! - backlog / ready: `Pending` のみ
//! - working: `Assigned` / `Active` / `Dispatched`
//! - completed: 終端状態（`Completed` / `Failed` / `Error` / `DispatchFailed`）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// TaskStatus はタスクの状態を表現
///
/// JSON 上は SCREAMING_SNAKE_CASE（`PENDING`, `DISPATCH_FAILED` など）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// 作成済み・未着手（backlog / ready）
    Pending,
    /// claim によりエージェントに割り当て済み
    Assigned,
    /// エージェントが作業中
    Active,
    /// Dispatcher がコマンドを送信済み（応答待ち）
    Dispatched,
    /// 送信先が解決できない / publish 失敗
    DispatchFailed,
    Completed,
    Failed,
    Error,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 8] = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::Active,
        TaskStatus::Dispatched,
        TaskStatus::DispatchFailed,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Error,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Error
                | TaskStatus::DispatchFailed
        )
    }

    /// Is this a status a task may hold while in the working queue?
    pub fn is_working(self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned | TaskStatus::Active | TaskStatus::Dispatched
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Assigned => "ASSIGNED",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Dispatched => "DISPATCHED",
            TaskStatus::DispatchFailed => "DISPATCH_FAILED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    /// 大文字小文字・`-` / `_` の違いは無視する（CLI 入力向け）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

/// BoardQueue はボード上のライフサイクル段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardQueue {
    Backlog,
    Ready,
    Working,
    Completed,
}

impl BoardQueue {
    /// ライフサイクル順（後ろほど進んだ段階）
    pub const ALL: [BoardQueue; 4] = [
        BoardQueue::Backlog,
        BoardQueue::Ready,
        BoardQueue::Working,
        BoardQueue::Completed,
    ];

    /// このキューに置いてよい状態か
    pub fn admits(self, status: TaskStatus) -> bool {
        match self {
            BoardQueue::Backlog | BoardQueue::Ready => status == TaskStatus::Pending,
            BoardQueue::Working => status.is_working(),
            BoardQueue::Completed => status.is_terminal(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoardQueue::Backlog => "backlog",
            BoardQueue::Ready => "ready",
            BoardQueue::Working => "working",
            BoardQueue::Completed => "completed",
        }
    }

    pub fn index(self) -> usize {
        match self {
            BoardQueue::Backlog => 0,
            BoardQueue::Ready => 1,
            BoardQueue::Working => 2,
            BoardQueue::Completed => 3,
        }
    }
}

impl fmt::Display for BoardQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardQueue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        BoardQueue::ALL
            .into_iter()
            .find(|queue| queue.as_str() == normalized)
            .ok_or_else(|| format!("unknown board queue: {s}"))
    }
}
