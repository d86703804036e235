use serde::{Deserialize, Serialize};

/// Current execution state of a load task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Task is queued, waiting for a worker.
    Pending,
    /// Task is currently executing on a worker thread.
    Running,
    /// Task finished normally (its result may still be discarded as stale).
    Completed,
    /// Task was cancelled before or during execution.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` if the task is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Returns `true` if the task is still active (pending or running).
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}
