//! Notifications produced by the session
//!
//! Decoded command output is published on an unbounded channel instead of a
//! host event loop, so any front end can consume it.

use serde::Serialize;

/// A single matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchLocation {
    pub line: u64,
    pub pattern: String,
}

/// All matches reported for one file within a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub file: String,
    pub locations: Vec<MatchLocation>,
}

/// Per-cycle scan totals, reset after every completed command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounters {
    pub matches_found: u64,
    pub files_scanned: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RemoteEvent {
    /// The remote process died and a new one was spawned
    Restarted,
    ListFiles { files: Vec<String> },
    ListFilesDone,
    FindResults { matches: Vec<FileMatch> },
    FindDone { counters: ScanCounters },
    ReplaceResults { files: Vec<String> },
    ReplaceDone,
    Locate { path: String },
    LocateDone,
    FindPath { path: String },
    FindPathDone,
    ListLsps { output: String },
    ListLspsDone,
    ExecOutput { output: String },
    ExecDone,
}

impl RemoteEvent {
    /// True for the event that closes a command's response
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            RemoteEvent::ListFilesDone
                | RemoteEvent::FindDone { .. }
                | RemoteEvent::ReplaceDone
                | RemoteEvent::LocateDone
                | RemoteEvent::FindPathDone
                | RemoteEvent::ListLspsDone
                | RemoteEvent::ExecDone
        )
    }
}
