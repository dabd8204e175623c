use std::borrow::Cow;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A named background stage.
#[derive(Debug)]
pub struct TaskHandle {
    name: Cow<'static, str>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(name: impl Into<Cow<'static, str>>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owns the pipeline's stages; aborting happens on `shutdown` or drop.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: Vec<TaskHandle>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        trace!(task = task.name(), "task registered");
        self.tasks.push(task);
    }

    pub fn spawn<F>(&mut self, name: impl Into<Cow<'static, str>>, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.push(TaskHandle::new(name, tokio::spawn(fut)));
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(TaskHandle::name).collect()
    }

    /// Abort every stage and wait for it to unwind.
    pub async fn shutdown(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            let TaskHandle { name, handle } = task;
            handle.abort();
            match handle.await {
                Ok(()) => debug!(task = %name, "task completed before abort"),
                Err(err) if err.is_cancelled() => debug!(task = %name, "task aborted"),
                Err(err) => debug!(task = %name, ?err, "task exited with error"),
            }
        }
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.handle.abort();
        }
    }
}
