//! ResourcePolicy port - タスクに必要なリソースの決定

use crate::domain::{AtomicTask, Resource};

/// Maps a task to the resources it must hold while running.
pub trait ResourcePolicy: Send + Sync {
    fn required_resources(&self, task: &AtomicTask) -> Vec<Resource>;
}
