//! RepairPlanner port - 失敗したタスクの修復タスク生成
//!
//! 修復タスクの中身を決めるロジックはコアの外（LLM など）にあります。
//! コアは件数の上限を守り、返ってきたタスクを backlog に積むだけです。

use async_trait::async_trait;

use crate::domain::{NewTask, Task, TaskResponse};

/// RepairPlanner は FAILED / ERROR 応答から修復タスクを提案
#[async_trait]
pub trait RepairPlanner: Send + Sync {
    /// Propose at most `budget` follow-up tasks for `failed`.
    async fn plan_repairs(
        &self,
        failed: &Task,
        response: &TaskResponse,
        budget: usize,
    ) -> Vec<NewTask>;
}

/// 何も生成しない（デフォルト）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRepairPlanner;

#[async_trait]
impl RepairPlanner for NoopRepairPlanner {
    async fn plan_repairs(
        &self,
        _failed: &Task,
        _response: &TaskResponse,
        _budget: usize,
    ) -> Vec<NewTask> {
        Vec::new()
    }
}
