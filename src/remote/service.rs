//! Session actor
//!
//! A [`RemoteSession`] needs `&mut` access for every operation and must also
//! consume its transport events. [`spawn`] moves it into a task that does both,
//! and hands out a cloneable [`SessionHandle`] that talks to it over a channel.

use tokio::sync::{mpsc, oneshot};

use super::process::{RemoteProcess, RemoteProcessHandle};
use super::queue::Continuation;
use super::request::{join_command_line, ReplaceParams, Request, SearchParams};
use super::session::{RemoteSession, SessionState};
use crate::target::Target;
use crate::{Error, Result};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Messages accepted by the session task
pub enum SessionCommand {
    Start {
        target: Target,
        script_path: String,
        context: String,
        reply: oneshot::Sender<bool>,
    },
    StartByName {
        account: String,
        script_path: String,
        context: String,
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Send {
        request: Request,
        continuation: Continuation,
        reply: oneshot::Sender<bool>,
    },
    Write {
        line: String,
        reply: oneshot::Sender<bool>,
    },
    ExecSync {
        cmd: String,
        wd: String,
        env: Vec<(String, String)>,
        reply: oneshot::Sender<Result<String>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
}

/// Move `session` into its own task.
///
/// The task stops the session and exits once every handle is dropped.
pub fn spawn(mut session: RemoteSession) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel::<SessionCommand>(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(command) => run_command(&mut session, command).await,
                        None => {
                            tracing::debug!("All session handles dropped");
                            session.stop().await;
                            break;
                        }
                    }
                }
                Some(event) = session.next_transport_event() => {
                    session.handle_transport_event(event);
                }
            }
        }
    });

    SessionHandle { tx }
}

async fn run_command(session: &mut RemoteSession, command: SessionCommand) {
    // a dropped reply receiver only means the caller stopped waiting
    match command {
        SessionCommand::Start {
            target,
            script_path,
            context,
            reply,
        } => {
            let _ = reply.send(session.start(target, &script_path, &context).await);
        }
        SessionCommand::StartByName {
            account,
            script_path,
            context,
            reply,
        } => {
            let started = session
                .start_by_name(&account, &script_path, &context)
                .await;
            let _ = reply.send(started);
        }
        SessionCommand::Stop { reply } => {
            session.stop().await;
            let _ = reply.send(());
        }
        SessionCommand::Send {
            request,
            continuation,
            reply,
        } => {
            let _ = reply.send(session.send(&request, continuation).await);
        }
        SessionCommand::Write { line, reply } => {
            let _ = reply.send(session.write(&line).await);
        }
        SessionCommand::ExecSync {
            cmd,
            wd,
            env,
            reply,
        } => {
            let _ = reply.send(session.exec_sync(&cmd, &wd, &env).await);
        }
        SessionCommand::State { reply } => {
            let _ = reply.send(session.state());
        }
    }
}

/// Cloneable front end of a spawned session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(make(reply)).await.is_err() {
            tracing::debug!("Session task is gone");
            return None;
        }
        rx.await.ok()
    }

    pub async fn start(&self, target: Target, script_path: &str, context: &str) -> bool {
        self.call(|reply| SessionCommand::Start {
            target,
            script_path: script_path.to_string(),
            context: context.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn start_by_name(&self, account: &str, script_path: &str, context: &str) -> bool {
        self.call(|reply| SessionCommand::StartByName {
            account: account.to_string(),
            script_path: script_path.to_string(),
            context: context.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn stop(&self) {
        let _ = self.call(|reply| SessionCommand::Stop { reply }).await;
    }

    pub async fn state(&self) -> Option<SessionState> {
        self.call(|reply| SessionCommand::State { reply }).await
    }

    pub async fn send(&self, request: Request, continuation: Continuation) -> bool {
        self.call(|reply| SessionCommand::Send {
            request,
            continuation,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    async fn send_internal(&self, request: Request) -> bool {
        let kind = request.response_kind();
        self.send(request, Continuation::Internal(kind)).await
    }

    pub async fn list_files(
        &self,
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

    pub async fn search(&self, params: &SearchParams) -> bool {
        self.send_internal(Request::find(params)).await
    }

    pub async fn replace(&self, params: &ReplaceParams) -> bool {
        self.send_internal(Request::replace(params)).await
    }

    pub async fn locate(&self, path: &str, name: &str, ext: &str, versions: &[String]) -> bool {
        self.send_internal(Request::locate(path, name, ext, versions))
            .await
    }

    pub async fn find_path(&self, path: &str) -> bool {
        self.send_internal(Request::find_path(path)).await
    }

    pub async fn list_lsps(&self) -> bool {
        self.send_internal(Request::ListLsps).await
    }

    pub async fn exec(&self, cmd: &str, wd: &str, env: &[(String, String)]) -> bool {
        self.send_internal(Request::exec(cmd, wd, env)).await
    }

    /// Like [`exec`](Self::exec), joining `args` into one command string
    pub async fn exec_args(&self, args: &[String], wd: &str, env: &[(String, String)]) -> bool {
        let cmd = join_command_line(args);
        if cmd.is_empty() {
            return false;
        }
        self.exec(&cmd, wd, env).await
    }

    pub async fn exec_with_callback(
        &self,
        cmd: &str,
        callback: impl FnOnce(String) + Send + 'static,
        wd: &str,
        env: &[(String, String)],
    ) -> bool {
        self.send(Request::exec(cmd, wd, env), Continuation::callback(callback))
            .await
    }

    pub async fn exec_with_callback_args(
        &self,
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

    pub async fn create_async_process(
        &self,
        cmd: &str,
        wd: &str,
        env: &[(String, String)],
    ) -> Option<RemoteProcessHandle> {
        let (process, handle) = RemoteProcess::with_events();
        self.send(Request::exec(cmd, wd, env), Continuation::Process(process))
            .await
            .then_some(handle)
    }

    /// Callback flavour of [`create_async_process`](Self::create_async_process)
    pub async fn create_async_process_cb(
        &self,
        cmd: &str,
        callback: impl FnOnce(String) + Send + 'static,
        wd: &str,
        env: &[(String, String)],
    ) -> bool {
        let process = RemoteProcess::with_callback(Box::new(callback));
        self.send(Request::exec(cmd, wd, env), Continuation::Process(process))
            .await
    }

    pub async fn write(&self, line: &str) -> bool {
        self.call(|reply| SessionCommand::Write {
            line: line.to_string(),
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn exec_sync(&self, cmd: &str, wd: &str, env: &[(String, String)]) -> Result<String> {
        self.call(|reply| SessionCommand::ExecSync {
            cmd: cmd.to_string(),
            wd: wd.to_string(),
            env: env.to_vec(),
            reply,
        })
        .await
        .unwrap_or(Err(Error::SessionNotRunning))
    }
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionCommand::Start { .. } => "Start",
            SessionCommand::StartByName { .. } => "StartByName",
            SessionCommand::Stop { .. } => "Stop",
            SessionCommand::Send { .. } => "Send",
            SessionCommand::Write { .. } => "Write",
            SessionCommand::ExecSync { .. } => "ExecSync",
            SessionCommand::State { .. } => "State",
        };
        f.write_str(name)
    }
}
