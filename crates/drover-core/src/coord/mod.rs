//! Coordination primitives shared by every running task.

pub mod bus;
pub mod graph;
pub mod resource;

pub use self::bus::{Mailbox, MessageBus};
pub use self::graph::{GraphSnapshot, TaskGraph};
pub use self::resource::ResourceManager;
