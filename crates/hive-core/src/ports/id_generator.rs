//! IdGenerator port - ID 生成の抽象化
//!
//! プロデューサーが ID を指定しなかったタスクや、修復タスクの ID を発行します。
//! 投票 ID は発起者が持ち込むので、ここでは扱いません。

use crate::domain::ids::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は複数プロセスが同じボードに書いても衝突しない ID を発行
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// `task-<ULID>` を発行する。時刻部分は `Clock` から取るので、
/// 生成順に並び、FixedClock で固定できる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }
}
