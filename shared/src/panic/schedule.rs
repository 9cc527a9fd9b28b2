use std::future::Future;

use tokio::task::JoinHandle;
use tracing::trace;

/// A timer callback owned by the state machine. Dropping it aborts the task.
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        trace!(task = name, "scheduled");
        Self {
            name,
            handle: tokio::spawn(task),
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            trace!(task = self.name, "cancelled");
            self.handle.abort();
        }
    }
}
