//! Byte-stream transport to the remote process
//!
//! The engine never talks to `ssh` directly. It asks a [`ProcessSpawner`] for a
//! [`Transport`] and receives asynchronous output through the [`EventSink`] it
//! handed over at spawn time.

mod locator;
mod scp;
mod ssh;

#[cfg(test)]
pub(crate) mod mock;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::target::Target;
use crate::Result;

pub use locator::PathLocator;
pub use scp::ScpUploader;
pub use ssh::{SshSpawner, SshTransport};

/// Asynchronous notification from a running transport.
///
/// `generation` identifies the transport that produced the event; the engine
/// drops events from transports it has already released.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Output { generation: u64, data: Bytes },
    Terminated { generation: u64 },
}

impl TransportEvent {
    pub fn generation(&self) -> u64 {
        match self {
            TransportEvent::Output { generation, .. } => *generation,
            TransportEvent::Terminated { generation } => *generation,
        }
    }
}

/// Where a transport posts its asynchronous output
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Post a chunk of output. Returns false once the engine is gone.
    pub fn output(&self, data: Bytes) -> bool {
        self.tx
            .send(TransportEvent::Output {
                generation: self.generation,
                data,
            })
            .is_ok()
    }

    pub fn terminated(&self) {
        let _ = self.tx.send(TransportEvent::Terminated {
            generation: self.generation,
        });
    }
}

/// A spawned remote process seen as a byte stream
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes to the process stdin
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Direct read, only meaningful while async reads are suspended.
    /// `None` means the process is gone.
    async fn read(&mut self) -> Option<Bytes>;

    fn is_alive(&mut self) -> bool;

    /// Route output to [`Transport::read`] instead of the event sink
    fn suspend_async_reads(&mut self);

    fn resume_async_reads(&mut self);

    async fn terminate(&mut self);
}

/// Creates transports from a command-line vector
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, argv: &[String], sink: EventSink) -> Result<Box<dyn Transport>>;
}

/// Finds local executables (the ssh client, for instance)
pub trait ExecutableLocator: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Copies the remote entry-point script to the target
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str, target: &Target) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);

        assert!(sink.output(Bytes::from_static(b"hello\n")));
        sink.terminated();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation(), 7);
        assert_eq!(
            first,
            TransportEvent::Output {
                generation: 7,
                data: Bytes::from_static(b"hello\n")
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Terminated { generation: 7 }
        );
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);
        assert!(!sink.output(Bytes::from_static(b"x")));
    }
}
