use tokio::task::JoinHandle;

/// Tracks the background tasks of one session so teardown can reap them.
pub struct TaskManager {
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawns a task and tracks its handle.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(future));
    }

    /// Aborts every tracked task that has not finished on its own.
    pub fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
