//! Domain model (IDs, tasks, resources, messages, states, errors).

pub mod duration_ms;
pub mod errors;
pub mod ids;
pub mod message;
pub mod recovery;
pub mod resource;
pub mod state;
pub mod task;

pub use self::errors::{ErrorKind, KernelError};
pub use self::ids::{AgentId, MissionId, TaskId};
pub use self::message::{Message, MessageBody};
pub use self::recovery::RecoveryStrategy;
pub use self::resource::{Resource, ResourceLease, ResourceRequest};
pub use self::state::{AgentAction, AgentState, GovernorState, ScreenSnapshot, TaskState};
pub use self::task::{
    AgentRole, AtomicTask, DataMap, DataRequirement, DataType, TaskEdge, TaskGroup, TaskNode,
    TaskResult,
};
