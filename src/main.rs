//! Command line front end for the codelite-remote client

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use codelite_remote_client::config::{read_config, read_config_from_path};
use codelite_remote_client::remote::{service, RemoteEvent, RemoteSession, SearchParams};
use codelite_remote_client::target::AccountStore;
use codelite_remote_client::{Error, Result};

/// Run codelite-remote requests against an ssh account
#[derive(Parser, Debug)]
#[command(name = "codelite-remote-client")]
#[command(version)]
struct Cli {
    /// Account name from accounts.toml
    #[arg(short, long)]
    account: String,

    /// Path of the codelite-remote script on the remote host
    #[arg(long, default_value = "~/.codelite/codelite-remote")]
    script: String,

    /// Context passed to the remote script
    #[arg(long, default_value = "default")]
    context: String,

    /// Alternative config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List files under a directory
    Ls {
        root: String,
        #[arg(long, default_value = "")]
        ext: String,
        #[arg(long, default_value = "")]
        exclude_ext: String,
        #[arg(long, default_value = "")]
        exclude: String,
    },
    /// Find in files
    Find {
        root: String,
        what: String,
        #[arg(long, default_value = "")]
        ext: String,
        #[arg(long, default_value = "")]
        exclude: String,
        #[arg(short, long)]
        icase: bool,
        #[arg(short, long)]
        whole_word: bool,
    },
    /// List language servers available on the remote host
    Lsps,
    /// Run a command, streaming its output
    Exec {
        #[arg(long, default_value = ".")]
        wd: String,
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },
    /// Run a command and print its whole output once it finishes
    Run {
        #[arg(long, default_value = ".")]
        wd: String,
        cmd: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codelite_remote_client=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => read_config_from_path(path)?,
        None => read_config()?,
    };
    let accounts = AccountStore::load()?;

    let (session, events) = RemoteSession::builder(config)
        .resolver(Arc::new(accounts))
        .build();
    let handle = service::spawn(session);

    if !handle
        .start_by_name(&cli.account, &cli.script, &cli.context)
        .await
    {
        return Err(Error::Other(format!(
            "failed to start codelite-remote on '{}'",
            cli.account
        )));
    }

    let sent = match cli.command {
        Commands::Ls {
            root,
            ext,
            exclude_ext,
            exclude,
        } => handle.list_files(&root, &ext, &exclude_ext, &exclude).await,
        Commands::Find {
            root,
            what,
            ext,
            exclude,
            icase,
            whole_word,
        } => {
            let params = SearchParams {
                root_dir: root,
                extensions: ext,
                exclude_patterns: exclude,
                find_what: what,
                whole_word,
                icase,
            };
            handle.search(&params).await
        }
        Commands::Lsps => handle.list_lsps().await,
        Commands::Exec { wd, cmd } => {
            let cmd = codelite_remote_client::remote::request::join_command_line(&cmd);
            handle.exec(&cmd, &wd, &[]).await
        }
        Commands::Run { wd, cmd } => {
            let output = handle.exec_sync(&cmd, &wd, &[]).await?;
            print!("{}", output);
            handle.stop().await;
            return Ok(());
        }
    };

    if !sent {
        handle.stop().await;
        return Err(Error::SessionNotRunning);
    }

    let result = print_events(events).await;
    handle.stop().await;
    result
}

/// Print every event as a JSON line until the request completes
async fn print_events(mut events: mpsc::UnboundedReceiver<RemoteEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
        if event == RemoteEvent::Restarted {
            return Err(Error::Transport(
                "remote process terminated before the request completed".to_string(),
            ));
        }
        println!("{}", serde_json::to_string(&event)?);
        if event.is_done() {
            return Ok(());
        }
    }
    Ok(())
}
