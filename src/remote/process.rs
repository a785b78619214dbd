//! Remote execution exposed as a local asynchronous process
//!
//! An `exec` request can be bound to a [`RemoteProcess`] instead of the
//! built-in decoder. The caller keeps the matching [`RemoteProcessHandle`] and
//! sees output/termination events as if it had spawned a local child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::queue::UserCallback;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(String),
    Terminated,
}

enum ProcessSink {
    Events(mpsc::UnboundedSender<ProcessEvent>),
    /// Aggregate everything and hand it over once, on completion
    Callback {
        callback: Option<UserCallback>,
        output: String,
    },
}

/// Engine-side half, owned by the pending command
pub struct RemoteProcess {
    /// Shared with the handle
    id: Uuid,
    /// Cleared on completion or when the session drops the command
    alive: Arc<AtomicBool>,
    sink: ProcessSink,
}

/// Caller-side half
#[derive(Debug)]
pub struct RemoteProcessHandle {
    id: Uuid,
    alive: Arc<AtomicBool>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl RemoteProcess {
    pub fn with_events() -> (Self, RemoteProcessHandle) {
        let id = Uuid::new_v4();
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                alive: alive.clone(),
                sink: ProcessSink::Events(tx),
            },
            RemoteProcessHandle {
                id,
                alive,
                events: rx,
            },
        )
    }

    pub fn with_callback(callback: UserCallback) -> Self {
        Self {
            id: Uuid::new_v4(),
            alive: Arc::new(AtomicBool::new(true)),
            sink: ProcessSink::Callback {
                callback: Some(callback),
                output: String::new(),
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_using_callback(&self) -> bool {
        matches!(self.sink, ProcessSink::Callback { .. })
    }

    pub(crate) fn deliver(&mut self, chunk: &str, is_completed: bool) {
        match &mut self.sink {
            ProcessSink::Events(tx) => {
                // same as the exec decoder: empty chunks carry nothing
                if !chunk.is_empty() {
                    let _ = tx.send(ProcessEvent::Output(chunk.to_string()));
                }
                if is_completed {
                    self.alive.store(false, Ordering::Release);
                    let _ = tx.send(ProcessEvent::Terminated);
                }
            }
            ProcessSink::Callback { callback, output } => {
                output.push_str(chunk);
                if is_completed {
                    self.alive.store(false, Ordering::Release);
                    if let Some(callback) = callback.take() {
                        callback(std::mem::take(output));
                    }
                }
            }
        }
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("id", &self.id)
            .field("callback", &self.is_using_callback())
            .finish()
    }
}

impl RemoteProcessHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// False once the command completed or the session dropped it
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Next event; `None` when the session discarded the command
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProcessEvent> {
        self.events.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_process() {
        let (mut process, mut handle) = RemoteProcess::with_events();
        assert_eq!(process.id(), handle.id());
        assert!(!process.is_using_callback());

        process.deliver("building...\n", false);
        assert!(handle.is_alive());
        process.deliver("done\n", true);
        assert!(!handle.is_alive());

        assert_eq!(
            handle.try_recv(),
            Some(ProcessEvent::Output("building...\n".to_string()))
        );
        assert_eq!(
            handle.try_recv(),
            Some(ProcessEvent::Output("done\n".to_string()))
        );
        assert_eq!(handle.try_recv(), Some(ProcessEvent::Terminated));
    }

    #[test]
    fn test_callback_process_aggregates() {
        let result = Arc::new(Mutex::new(Vec::new()));
        let sink = result.clone();
        let mut process =
            RemoteProcess::with_callback(Box::new(move |out: String| sink.lock().push(out)));
        assert!(process.is_using_callback());

        process.deliver("a\n", false);
        process.deliver("b\n", false);
        assert!(result.lock().is_empty());

        process.deliver("c\n", true);
        assert_eq!(*result.lock(), vec!["a\nb\nc\n".to_string()]);
    }

    #[test]
    fn test_empty_completion_only_terminates() {
        let (mut process, mut handle) = RemoteProcess::with_events();
        process.deliver("", false);
        process.deliver("", true);

        assert_eq!(handle.try_recv(), Some(ProcessEvent::Terminated));
        assert_eq!(handle.try_recv(), None);
    }

    #[tokio::test]
    async fn test_dropped_process_closes_handle() {
        let (process, mut handle) = RemoteProcess::with_events();
        drop(process);
        assert!(!handle.is_alive());
        assert_eq!(handle.recv().await, None);
    }
}
