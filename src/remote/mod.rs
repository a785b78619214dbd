//! codelite-remote protocol engine

pub mod decode;
pub mod events;
pub mod framer;
pub mod process;
pub mod queue;
pub mod request;
pub mod service;
pub mod session;

pub use decode::ResponseKind;
pub use events::{FileMatch, MatchLocation, RemoteEvent, ScanCounters};
pub use process::{ProcessEvent, RemoteProcess, RemoteProcessHandle};
pub use queue::{Continuation, UserCallback};
pub use request::{ReplaceParams, Request, SearchParams};
pub use service::{SessionCommand, SessionHandle};
pub use session::{RemoteSession, SessionBuilder, SessionState};
