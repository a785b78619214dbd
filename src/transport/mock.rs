//! In-memory transport for engine tests

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{EventSink, ExecutableLocator, ProcessSpawner, Transport};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub written: Vec<u8>,
    pub alive: bool,
    pub suspended: bool,
    pub terminated: bool,
    /// Chunks returned by direct reads; empty means the process is gone
    pub direct: VecDeque<Bytes>,
}

impl MockState {
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(Error::Transport("mock transport is dead".to_string()));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    async fn read(&mut self) -> Option<Bytes> {
        self.state.lock().direct.pop_front()
    }

    fn is_alive(&mut self) -> bool {
        self.state.lock().alive
    }

    fn suspend_async_reads(&mut self) {
        self.state.lock().suspended = true;
    }

    fn resume_async_reads(&mut self) {
        self.state.lock().suspended = false;
    }

    async fn terminate(&mut self) {
        let mut state = self.state.lock();
        state.alive = false;
        state.terminated = true;
    }
}

pub(crate) struct MockSpawn {
    pub argv: Vec<String>,
    pub state: Arc<Mutex<MockState>>,
    pub sink: EventSink,
}

/// Records every spawn; each spawned transport starts alive
#[derive(Default)]
pub(crate) struct MockSpawner {
    pub spawns: Mutex<Vec<MockSpawn>>,
    pub fail: Mutex<bool>,
}

impl MockSpawner {
    pub fn count(&self) -> usize {
        self.spawns.lock().len()
    }

    pub fn last_state(&self) -> Arc<Mutex<MockState>> {
        self.spawns
            .lock()
            .last()
            .map(|s| s.state.clone())
            .expect("nothing spawned")
    }

    pub fn last_sink(&self) -> EventSink {
        self.spawns
            .lock()
            .last()
            .map(|s| s.sink.clone())
            .expect("nothing spawned")
    }

    pub fn last_argv(&self) -> Vec<String> {
        self.spawns
            .lock()
            .last()
            .map(|s| s.argv.clone())
            .expect("nothing spawned")
    }
}

impl ProcessSpawner for MockSpawner {
    fn spawn(&self, argv: &[String], sink: EventSink) -> Result<Box<dyn Transport>> {
        if *self.fail.lock() {
            return Err(Error::Spawn("mock spawn failure".to_string()));
        }
        let state = Arc::new(Mutex::new(MockState {
            alive: true,
            ..Default::default()
        }));
        self.spawns.lock().push(MockSpawn {
            argv: argv.to_vec(),
            state: state.clone(),
            sink,
        });
        Ok(Box::new(MockTransport { state }))
    }
}

/// Locator answering every lookup with the same path
pub(crate) struct FixedLocator(pub Option<PathBuf>);

impl FixedLocator {
    pub fn ssh() -> Self {
        Self(Some(PathBuf::from("/usr/bin/ssh")))
    }
}

impl ExecutableLocator for FixedLocator {
    fn locate(&self, _program: &str) -> Option<PathBuf> {
        self.0.clone()
    }
}
