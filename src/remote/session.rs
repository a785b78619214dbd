//! Remote session engine
//!
//! Owns the transport to the remote `codelite-remote` script, pipelines
//! requests onto its stdin, and routes framed output to the pending command at
//! the head of the queue. When the transport dies unexpectedly the session is
//! respawned with the last launch parameters and a [`RemoteEvent::Restarted`]
//! notification is published.
//!
//! All methods take `&mut self`: the session is meant to be driven by a single
//! owner (see [`crate::remote::service`]), which also feeds it the transport
//! events returned by [`RemoteSession::next_transport_event`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::decode::Decoder;
use super::events::RemoteEvent;
use super::framer::Framer;
use super::process::{RemoteProcess, RemoteProcessHandle};
use super::queue::{CommandQueue, Continuation, PendingCommand};
use super::request::{join_command_line, ReplaceParams, Request, SearchParams};
use crate::config::RemoteConfig;
use crate::target::{AccountStore, Target, TargetResolver};
use crate::transport::{
    EventSink, ExecutableLocator, PathLocator, ProcessSpawner, ScpUploader, SshSpawner,
    Transport, TransportEvent, Uploader,
};
use crate::{Error, Result};

/// Token asking the remote script to exit
const EXIT_COMMAND: &[u8] = b"exit\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running,
    Restarting,
    Stopped,
}

/// Parameters of the last successful `start`, reused on restart
#[derive(Debug, Clone)]
struct LaunchSpec {
    target: Target,
    script_path: String,
    context: String,
}

/// Configures the collaborators a [`RemoteSession`] depends on
pub struct SessionBuilder {
    /// Launch settings
    config: RemoteConfig,
    /// Creates the transport (ssh by default)
    spawner: Arc<dyn ProcessSpawner>,
    /// Finds the ssh executable
    locator: Arc<dyn ExecutableLocator>,
    /// Account lookup for `start_by_name`
    resolver: Arc<dyn TargetResolver>,
    /// Stages the remote script; `None` disables staging
    uploader: Option<Arc<dyn Uploader>>,
}

impl SessionBuilder {
    pub fn new(config: RemoteConfig) -> Self {
        let uploader =
            ScpUploader::new(config.scp_program.clone(), config.strict_host_key_checking);
        Self {
            config,
            spawner: Arc::new(SshSpawner),
            locator: Arc::new(PathLocator),
            resolver: Arc::new(AccountStore::default()),
            uploader: Some(Arc::new(uploader)),
        }
    }

    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn locator(mut self, locator: Arc<dyn ExecutableLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Never stage the remote script, even when `local_script` is configured
    pub fn without_upload(mut self) -> Self {
        self.uploader = None;
        self
    }

    /// Build the session and the receiver for its notifications
    pub fn build(self) -> (RemoteSession, mpsc::UnboundedReceiver<RemoteEvent>) {
        let (notifier, events) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        let session = RemoteSession {
            config: self.config,
            spawner: self.spawner,
            locator: self.locator,
            resolver: self.resolver,
            uploader: self.uploader,
            transport: None,
            generation: 0,
            transport_tx,
            transport_rx,
            framer: Framer::new(),
            queue: CommandQueue::new(),
            decoder: Decoder::new(notifier),
            state: SessionState::NotStarted,
            going_down: false,
            launch: None,
        };
        (session, events)
    }
}

/// Client side of the codelite-remote protocol
pub struct RemoteSession {
    /// Launch settings
    config: RemoteConfig,
    /// Creates transports on start and restart
    spawner: Arc<dyn ProcessSpawner>,
    /// Finds the ssh executable
    locator: Arc<dyn ExecutableLocator>,
    /// Account lookup for `start_by_name`
    resolver: Arc<dyn TargetResolver>,
    /// Stages the remote script before launch
    uploader: Option<Arc<dyn Uploader>>,

    /// The running remote process, if any
    transport: Option<Box<dyn Transport>>,
    /// Incremented on every spawn; tags transport events
    generation: u64,
    /// Handed to every transport through its [`EventSink`]
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    /// Output and termination events from all transports
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,

    /// Receive buffer
    framer: Framer,
    /// Commands awaiting their terminator, in send order
    queue: CommandQueue,
    /// Built-in decoders and the notification channel
    decoder: Decoder,

    state: SessionState,
    /// Set by `stop()` so the resulting termination does not trigger a restart
    going_down: bool,
    /// Last successful `start` parameters
    launch: Option<LaunchSpec>,
}

impl RemoteSession {
    pub fn builder(config: RemoteConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }

    /// Number of commands still waiting for their terminator
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    // ---------------------------------------------------------------------
    // lifecycle
    // ---------------------------------------------------------------------

    /// Resolve `account` and start the session on it
    pub async fn start_by_name(&mut self, account: &str, script_path: &str, context: &str) -> bool {
        match self.resolver.resolve(account) {
            Ok(target) => self.start(target, script_path, context).await,
            Err(e) => {
                tracing::warn!("Failed to load ssh account {}: {}", account, e);
                false
            }
        }
    }

    /// Stage the remote script (when configured) and spawn it over ssh.
    ///
    /// A no-op when the session is already running. Returns whether a
    /// session is running afterwards.
    pub async fn start(&mut self, target: Target, script_path: &str, context: &str) -> bool {
        if self.transport.is_some() {
            tracing::debug!("Remote session already running");
            return true;
        }

        if let Some((uploader, local)) = self.staging() {
            tracing::debug!("Uploading codelite-remote file: {:?} -> {}", local, script_path);
            if let Err(e) = uploader.upload(&local, script_path, &target).await {
                tracing::error!("Failed to upload file: {}. {}", script_path, e);
                return false;
            }
        }

        self.going_down = false;
        self.launch = Some(LaunchSpec {
            target,
            script_path: script_path.to_string(),
            context: context.to_string(),
        });

        match self.start_if_not_running() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to start remote session: {}", e);
                false
            }
        }
    }

    /// Uploader and local script, when the script should be staged before launch
    fn staging(&self) -> Option<(Arc<dyn Uploader>, PathBuf)> {
        if !self.config.upload {
            return None;
        }
        let uploader = self.uploader.clone()?;
        let local = self.config.local_script.clone()?;
        Some((uploader, local))
    }

    fn start_if_not_running(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }

        let launch = self
            .launch
            .as_ref()
            .ok_or_else(|| Error::Other("session was never started".to_string()))?;

        let ssh = self.locator.locate(&self.config.ssh_program).ok_or_else(|| {
            Error::ExecutorNotFound(format!(
                "Could not locate {} executable in your PATH",
                self.config.ssh_program
            ))
        })?;

        let argv = self.command_line(&ssh, launch);
        tracing::debug!("Starting codelite-remote: {:?}", argv);

        self.generation += 1;
        let sink = EventSink::new(self.generation, self.transport_tx.clone());
        let transport = self.spawner.spawn(&argv, sink)?;

        tracing::info!("Remote session started on {}", launch.target.name);
        self.transport = Some(transport);
        self.state = SessionState::Running;
        Ok(())
    }

    fn command_line(&self, ssh: &Path, launch: &LaunchSpec) -> Vec<String> {
        let host_key_checking = if self.config.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };

        let mut argv = vec![
            ssh.to_string_lossy().into_owned(),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.config.server_alive_interval),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", host_key_checking),
        ];

        if let Some(key) = launch.target.identity_file() {
            argv.push("-i".to_string());
            argv.push(key.to_string_lossy().into_owned());
        }

        argv.push(launch.target.destination());
        argv.push("-p".to_string());
        argv.push(launch.target.port.to_string());
        argv.push(format!(
            "{} {} --context {}",
            self.config.interpreter, launch.script_path, launch.context
        ));
        argv
    }

    /// Ask the remote script to exit and drop every pending command unnotified
    pub async fn stop(&mut self) {
        self.going_down = true;
        if let Some(mut transport) = self.transport.take() {
            if transport.is_alive() {
                if let Err(e) = transport.write(EXIT_COMMAND).await {
                    tracing::debug!("Failed to send exit command: {}", e);
                }
            }
            transport.terminate().await;
        }
        self.cleanup();
        self.state = SessionState::Stopped;
        tracing::info!("Remote session stopped");
    }

    fn cleanup(&mut self) {
        self.queue.clear();
        self.transport = None;
        self.framer.clear();
        self.decoder.reset_counters();
    }

    /// Handle the death of the current transport.
    ///
    /// Unless `stop()` caused it, the process is respawned with the last
    /// launch parameters and a restart notification is published.
    pub fn on_transport_terminated(&mut self) {
        self.cleanup();
        if !self.going_down {
            self.state = SessionState::Restarting;
            tracing::warn!("Remote process terminated unexpectedly, restarting");
            if let Err(e) = self.start_if_not_running() {
                tracing::error!("Failed to restart remote session: {}", e);
                self.state = SessionState::Stopped;
            }
            self.decoder.emit(RemoteEvent::Restarted);
        } else {
            self.state = SessionState::Stopped;
        }
        self.going_down = false;
    }

    // ---------------------------------------------------------------------
    // inbound
    // ---------------------------------------------------------------------

    /// Wait for the next event from any transport this session spawned
    pub async fn next_transport_event(&mut self) -> Option<TransportEvent> {
        self.transport_rx.recv().await
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.transport.is_none() || event.generation() != self.generation {
            tracing::trace!("Ignoring event from released transport: {:?}", event);
            return;
        }
        match event {
            TransportEvent::Output { data, .. } => self.on_bytes_received(&data),
            TransportEvent::Terminated { .. } => self.on_transport_terminated(),
        }
    }

    /// Buffer `chunk` and dispatch every frame it completes
    pub fn on_bytes_received(&mut self, chunk: &[u8]) {
        self.framer.push(chunk);

        while let Some(frame) = self.framer.next_frame() {
            if !self.queue.dispatch(&frame, &mut self.decoder) {
                tracing::debug!(
                    "Read: [{}]. But there are no completion callback",
                    frame.body
                );
                continue;
            }
            if frame.complete {
                self.decoder.reset_counters();
            }
        }
    }

    // ---------------------------------------------------------------------
    // outbound
    // ---------------------------------------------------------------------

    fn live_transport(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        let transport = self.transport.as_deref_mut()?;
        if transport.is_alive() {
            Some(transport)
        } else {
            None
        }
    }

    /// Write `request` and queue `continuation` for its response.
    ///
    /// Returns false, without side effects, when no live transport exists.
    pub async fn send(&mut self, request: &Request, continuation: Continuation) -> bool {
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode '{}' request: {}", request.command_name(), e);
                return false;
            }
        };

        let Some(transport) = self.live_transport() else {
            tracing::debug!(
                "Ignoring '{}' request: session is not running",
                request.command_name()
            );
            return false;
        };

        if let Err(e) = transport.write(line.as_bytes()).await {
            tracing::warn!("Failed to send '{}' request: {}", request.command_name(), e);
            return false;
        }
        tracing::trace!("Sent: {}", line.trim_end());

        self.queue.push(PendingCommand::new(continuation));
        true
    }

    async fn send_internal(&mut self, request: Request) -> bool {
        let kind = request.response_kind();
        self.send(&request, Continuation::Internal(kind)).await
    }

    pub async fn list_files(
        &mut self,
        root_dir: &str,
        extensions: &str,
        exclude_extensions: &str,
        exclude_patterns: &str,
    ) -> bool {
        self.send_internal(Request::list_files(
            root_dir,
            extensions,
            exclude_extensions,
            exclude_patterns,
        ))
        .await
    }

    pub async fn search(&mut self, params: &SearchParams) -> bool {
        self.send_internal(Request::find(params)).await
    }

    pub async fn replace(&mut self, params: &ReplaceParams) -> bool {
        self.send_internal(Request::replace(params)).await
    }

    pub async fn locate(&mut self, path: &str, name: &str, ext: &str, versions: &[String]) -> bool {
        self.send_internal(Request::locate(path, name, ext, versions))
            .await
    }

    pub async fn find_path(&mut self, path: &str) -> bool {
        self.send_internal(Request::find_path(path)).await
    }

    pub async fn list_lsps(&mut self) -> bool {
        self.send_internal(Request::ListLsps).await
    }

    pub async fn exec(&mut self, cmd: &str, wd: &str, env: &[(String, String)]) -> bool {
        self.send_internal(Request::exec(cmd, wd, env)).await
    }

    /// Like [`exec`](Self::exec), joining `args` into one command string
    pub async fn exec_args(&mut self, args: &[String], wd: &str, env: &[(String, String)]) -> bool {
        let cmd = join_command_line(args);
        if cmd.is_empty() {
            return false;
        }
        self.exec(&cmd, wd, env).await
    }

    /// Run `cmd` and hand its whole output to `callback` once it completes
    pub async fn exec_with_callback(
        &mut self,
        cmd: &str,
        callback: impl FnOnce(String) + Send + 'static,
        wd: &str,
        env: &[(String, String)],
    ) -> bool {
        self.send(&Request::exec(cmd, wd, env), Continuation::callback(callback))
            .await
    }

    pub async fn exec_with_callback_args(
        &mut self,
        args: &[String],
        callback: impl FnOnce(String) + Send + 'static,
        wd: &str,
        env: &[(String, String)],
    ) -> bool {
        let cmd = join_command_line(args);
        if cmd.is_empty() {
            return false;
        }
        self.exec_with_callback(&cmd, callback, wd, env).await
    }

    /// Run `cmd` remotely and expose it as a local asynchronous process
    pub async fn create_async_process(
        &mut self,
        cmd: &str,
        wd: &str,
        env: &[(String, String)],
    ) -> Option<RemoteProcessHandle> {
        let (process, handle) = RemoteProcess::with_events();
        self.send(&Request::exec(cmd, wd, env), Continuation::Process(process))
            .await
            .then_some(handle)
    }

    /// Callback flavour of [`create_async_process`](Self::create_async_process)
    pub async fn create_async_process_cb(
        &mut self,
        cmd: &str,
        callback: impl FnOnce(String) + Send + 'static,
        wd: &str,
        env: &[(String, String)],
    ) -> bool {
        let process = RemoteProcess::with_callback(Box::new(callback));
        self.send(&Request::exec(cmd, wd, env), Continuation::Process(process))
            .await
    }

    /// Write a raw line to the remote process, appending `\n` when missing
    pub async fn write(&mut self, line: &str) -> bool {
        let Some(transport) = self.live_transport() else {
            return false;
        };

        let mut data = line.to_string();
        if !data.ends_with('\n') {
            data.push('\n');
        }
        match transport.write(data.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write to remote process: {}", e);
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // synchronous bridge
    // ---------------------------------------------------------------------

    /// Run one `exec` and wait for its complete output, bypassing the queue.
    ///
    /// Requires an empty queue. Async delivery is suspended for the duration;
    /// if the transport dies before the terminator arrives the usual restart
    /// handling runs and an error is returned.
    pub async fn exec_sync(
        &mut self,
        cmd: &str,
        wd: &str,
        env: &[(String, String)],
    ) -> Result<String> {
        if !self.queue.is_empty() {
            tracing::warn!(
                "unable to run exec_sync() for command: {}. async queue is not empty",
                cmd
            );
            return Err(Error::SyncBridge("async queue is not empty".to_string()));
        }

        let line = Request::exec(cmd, wd, env).to_line()?;

        let alive = self.transport.as_deref_mut().is_some_and(|t| t.is_alive());
        let Some(transport) = self.transport.as_deref_mut().filter(|_| alive) else {
            tracing::warn!("unable to run exec_sync() for command: {}. no process", cmd);
            return Err(Error::SessionNotRunning);
        };

        transport.suspend_async_reads();
        if let Err(e) = transport.write(line.as_bytes()).await {
            transport.resume_async_reads();
            return Err(e);
        }

        self.framer.clear();
        let mut buffer = Framer::new();
        while let Some(chunk) = transport.read().await {
            buffer.push(&chunk);
            if let Some(output) = buffer.take_complete() {
                tracing::trace!("exec_sync({}): {}", cmd, output);
                if !buffer.is_empty() {
                    tracing::debug!("Discarding {} bytes after sync response", buffer.len());
                }
                transport.resume_async_reads();
                return Ok(output);
            }
        }

        // process terminated
        self.on_transport_terminated();
        Err(Error::SyncBridge(format!(
            "remote process terminated while running: {}",
            cmd
        )))
    }
}
