use std::future::Future;
use std::pin::Pin;

/// A detached unit of work.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs detached tasks the caller does not wait for.
pub trait Spawner: Send + Sync {
    fn spawn(&self, task: Task);
}

/// [`Spawner`] handing tasks to the ambient tokio runtime.
///
/// Must be used from within a runtime context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, task: Task) {
        tokio::spawn(task);
    }
}
