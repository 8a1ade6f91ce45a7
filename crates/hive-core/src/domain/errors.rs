//! Errors - エラー型と分類
//!
//! TaskBoard / CapabilityRegistry は型付きエラーを呼び出し元へ返します。
//! Dispatcher と VotingCoordinator はエラーを外へ伝播させず、ログとタスク状態に落とします。

use thiserror::Error;

use super::ids::{TaskId, VoteId};
use super::state::{BoardQueue, TaskStatus};

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（バックオフ付きリトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: 永続化ストアの I/O 障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// HiveError はドメインエラー
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("task already exists: {0}")]
    DuplicateId(TaskId),

    #[error("task {task_id} is in the {actual} queue, expected {expected}")]
    WrongQueue {
        task_id: TaskId,
        expected: BoardQueue,
        actual: BoardQueue,
    },

    #[error("task {task_id} already claimed ({status} in {queue})")]
    AlreadyClaimed {
        task_id: TaskId,
        status: TaskStatus,
        queue: BoardQueue,
    },

    #[error("store busy: {0}")]
    Busy(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("dispatch failure: {0}")]
    DispatchFailure(String),

    #[error("vote session already active: {active_vote_id}")]
    SessionActive { active_vote_id: VoteId },

    #[error("config error: {0}")]
    Config(String),
}

impl HiveError {
    pub fn task_not_found(task_id: &TaskId) -> Self {
        HiveError::NotFound {
            entity: "task",
            id: task_id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HiveError::Busy(_) => ErrorKind::Transient,
            HiveError::Store(_) => ErrorKind::Infrastructure,
            _ => ErrorKind::Permanent,
        }
    }

    /// 別プロセスとの claim 競合に負けた（＝ロストした）ことを表すか
    pub fn is_conflict(&self) -> bool {
        matches!(self, HiveError::AlreadyClaimed { .. })
    }
}

impl From<std::io::Error> for HiveError {
    fn from(e: std::io::Error) -> Self {
        HiveError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_transient() {
        assert_eq!(HiveError::Busy("lock".into()).kind(), ErrorKind::Transient);
        assert_eq!(
            HiveError::Store("disk".into()).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            HiveError::task_not_found(&TaskId::new("T9")).kind(),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn messages_name_the_task() {
        let err = HiveError::AlreadyClaimed {
            task_id: TaskId::new("T2"),
            status: TaskStatus::Assigned,
            queue: BoardQueue::Working,
        };
        let msg = err.to_string();
        assert!(msg.contains("T2"));
        assert!(msg.contains("ASSIGNED"));
        assert!(err.is_conflict());
    }
}
