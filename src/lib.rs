//! codelite-remote client
//!
//! Drives a `codelite-remote` helper script running on a remote host over ssh.
//! Requests (file listing, find/replace in files, LSP discovery, command
//! execution) are written as JSON lines; responses stream back as text framed
//! by a terminator line and are decoded into [`remote::RemoteEvent`]s.
//!
//! The usual entry point is [`remote::RemoteSession::builder`], followed by
//! [`remote::service::spawn`] to run the session on its own task.

pub mod config;
pub mod remote;
pub mod target;
pub mod transport;

mod error;

pub use error::{Error, Result};
