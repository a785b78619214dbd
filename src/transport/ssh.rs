//! ssh-backed transport
//!
//! Spawns the full ssh command line with piped stdio. A reader task forwards
//! stdout either to the engine's event sink or, while async reads are
//! suspended, to a direct channel drained by [`Transport::read`].

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{EventSink, ProcessSpawner, Transport};
use crate::{Error, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Spawns [`SshTransport`]s with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SshSpawner;

impl ProcessSpawner for SshSpawner {
    fn spawn(&self, argv: &[String], sink: EventSink) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SshTransport::spawn(argv, sink)?))
    }
}

/// A running ssh child process
pub struct SshTransport {
    /// The ssh process itself
    child: Child,
    /// Taken on terminate so the remote side sees EOF
    stdin: Option<ChildStdin>,
    /// Flags shared with the stdout reader task
    reader_state: Arc<ReaderState>,
    /// Where termination is posted when the reader exits while suspended
    sink: EventSink,
    /// Output received while async reads are suspended
    direct_rx: mpsc::UnboundedReceiver<Bytes>,
    /// Stdout reader task
    reader: JoinHandle<()>,
}

/// Coordination between the reader task and the suspend/resume calls
#[derive(Debug, Default)]
struct ReaderState {
    /// Output goes to the direct channel instead of the sink
    suspended: AtomicBool,
    /// Stdout reached EOF or failed
    exited: AtomicBool,
    /// `Terminated` was already posted to the sink
    reported: AtomicBool,
}

impl ReaderState {
    /// Post `Terminated` once, provided the reader exited and async reads are on
    fn report_if_exited(&self, sink: &EventSink) {
        if self.exited.load(Ordering::SeqCst)
            && !self.suspended.load(Ordering::SeqCst)
            && !self.reported.swap(true, Ordering::SeqCst)
        {
            sink.terminated();
        }
    }
}

impl SshTransport {
    pub fn spawn(argv: &[String], sink: EventSink) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Spawn("empty command line".to_string()))?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("Failed to capture stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("remote stderr: {}", line);
                }
            });
        }

        let reader_state = Arc::new(ReaderState::default());
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(
            stdout,
            sink.clone(),
            reader_state.clone(),
            direct_tx,
        ));

        Ok(Self {
            child,
            stdin: Some(stdin),
            reader_state,
            sink,
            direct_rx,
            reader,
        })
    }
}

async fn read_loop(
    mut stdout: ChildStdout,
    sink: EventSink,
    state: Arc<ReaderState>,
    direct_tx: mpsc::UnboundedSender<Bytes>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Remote stdout closed (EOF)");
                break;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if state.suspended.load(Ordering::SeqCst) {
                    let _ = direct_tx.send(chunk);
                } else if !sink.output(chunk) {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Error reading from remote stdout: {}", e);
                break;
            }
        }
    }

    // while suspended, the direct channel closing tells the reader of `read()`;
    // the sink hears about it on resume
    state.exited.store(true, Ordering::SeqCst);
    drop(direct_tx);
    state.report_if_exited(&sink);
}

#[async_trait]
impl Transport for SshTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Transport("stdin already closed".to_string()))?;

        stdin
            .write_all(data)
            .await
            .map_err(|e| Error::Transport(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("Failed to flush stdin: {}", e)))?;
        Ok(())
    }

    async fn read(&mut self) -> Option<Bytes> {
        self.direct_rx.recv().await
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn suspend_async_reads(&mut self) {
        self.reader_state.suspended.store(true, Ordering::SeqCst);
        // stale output from an earlier suspension
        while self.direct_rx.try_recv().is_ok() {}
    }

    fn resume_async_reads(&mut self) {
        self.reader_state.suspended.store(false, Ordering::SeqCst);
        self.reader_state.report_if_exited(&self.sink);
    }

    async fn terminate(&mut self) {
        // closing stdin lets the remote script exit on its own
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                tracing::warn!("Remote process did not exit gracefully, killing...");
                self.child.kill().await.ok();
            }
            status = self.child.wait() => {
                tracing::info!("Remote process exited with status: {:?}", status);
            }
        }
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        // kill_on_drop(true) takes care of the child
        self.reader.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;

    fn argv(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_goes_to_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(3, tx);
        let script = argv("read line; echo \"got $line\"");
        let mut transport = SshTransport::spawn(&script, sink).unwrap();

        transport.write(b"ping\n").await.unwrap();

        let mut output = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                TransportEvent::Output { generation, data } => {
                    assert_eq!(generation, 3);
                    output.extend_from_slice(&data);
                }
                TransportEvent::Terminated { generation } => {
                    assert_eq!(generation, 3);
                    break;
                }
            }
        }
        assert_eq!(output, b"got ping\n");
    }

    #[tokio::test]
    async fn test_suspended_output_goes_to_read() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        let script = argv("read line; echo \"$line\"");
        let mut transport = SshTransport::spawn(&script, sink).unwrap();

        transport.suspend_async_reads();
        transport.write(b"direct\n").await.unwrap();

        let mut output = Vec::new();
        while let Some(chunk) = transport.read().await {
            output.extend_from_slice(&chunk);
        }
        assert_eq!(output, b"direct\n");
        // no termination event while suspended
        assert!(rx.try_recv().is_err());

        // the exit that happened while suspended is reported on resume, once
        transport.resume_async_reads();
        assert_eq!(rx.try_recv(), Ok(TransportEvent::Terminated { generation: 1 }));
        transport.suspend_async_reads();
        transport.resume_async_reads();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_spawn_empty_argv() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = SshSpawner.spawn(&[], EventSink::new(1, tx));
        assert!(matches!(result, Err(Error::Spawn(_))));
    }
}
