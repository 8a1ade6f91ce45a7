//! Domain model (IDs, tasks, capabilities, votes, bus messages, errors).
//!
//! このモジュールはストアやバスの実装を前提にしません。
//! 「何を記録し、何をやり取りするか」の形だけを定義します。

pub mod capability;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod response;
pub mod state;
pub mod task;
pub mod vote;

pub use self::capability::{Capability, CapabilityRecord, CapabilityRegistration};
pub use self::envelope::DispatchEnvelope;
pub use self::errors::{ErrorKind, HiveError, Result};
pub use self::events::{BusMessage, DomainEvent, event_types};
pub use self::ids::{AgentId, CapabilityId, TaskId, VoteId};
pub use self::response::{ResponseStatus, TaskResponse};
pub use self::state::{BoardQueue, TaskStatus};
pub use self::task::{DEFAULT_PRIORITY, NewTask, Task, TaskPatch};
pub use self::vote::{AgentVote, QuestionTally, VoteInitiated, VoteResult, VoteSession};
