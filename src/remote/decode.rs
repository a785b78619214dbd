//! Built-in response decoders
//!
//! Each request kind has a decoder that turns raw frame bodies into typed
//! [`RemoteEvent`]s. Partial frames emit progress events; the completing frame
//! additionally emits the matching "done" event.

use std::collections::HashSet;

use tokio::sync::mpsc;

use super::events::{FileMatch, MatchLocation, RemoteEvent, ScanCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    ListFiles,
    Find,
    Replace,
    Locate,
    FindPath,
    ListLsps,
    Exec,
}

/// Publishes decoded events and tracks per-command scan counters
#[derive(Debug)]
pub struct Decoder {
    /// Outbound notification channel
    notifier: mpsc::UnboundedSender<RemoteEvent>,
    /// Totals for the current command cycle
    counters: ScanCounters,
    /// Files already counted in `counters.files_scanned` this cycle
    seen_files: HashSet<String>,
}

impl Decoder {
    pub fn new(notifier: mpsc::UnboundedSender<RemoteEvent>) -> Self {
        Self {
            notifier,
            counters: ScanCounters::default(),
            seen_files: HashSet::new(),
        }
    }

    pub fn counters(&self) -> ScanCounters {
        self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = ScanCounters::default();
        self.seen_files.clear();
    }

    pub fn emit(&self, event: RemoteEvent) {
        if self.notifier.send(event).is_err() {
            tracing::trace!("No listener for remote events");
        }
    }

    pub fn decode(&mut self, kind: ResponseKind, output: &str, is_completed: bool) {
        match kind {
            ResponseKind::ListFiles => self.on_list_files(output, is_completed),
            ResponseKind::Find => self.on_find(output, is_completed),
            ResponseKind::Replace => self.on_replace(output, is_completed),
            ResponseKind::Locate => self.on_locate(output, is_completed),
            ResponseKind::FindPath => self.on_find_path(output, is_completed),
            ResponseKind::ListLsps => self.on_list_lsps(output, is_completed),
            ResponseKind::Exec => self.on_exec(output, is_completed),
        }
    }

    fn on_list_files(&mut self, output: &str, is_completed: bool) {
        tracing::trace!("ls output: [{}]", output);
        self.emit(RemoteEvent::ListFiles {
            files: split_lines(output),
        });
        if is_completed {
            self.emit(RemoteEvent::ListFilesDone);
        }
    }

    fn on_find(&mut self, output: &str, is_completed: bool) {
        let matches = self.parse_matches(output);
        if !matches.is_empty() {
            self.emit(RemoteEvent::FindResults { matches });
        }
        if is_completed {
            self.emit(RemoteEvent::FindDone {
                counters: self.counters,
            });
        }
    }

    fn on_replace(&mut self, output: &str, is_completed: bool) {
        let files = split_lines(output);
        if !files.is_empty() {
            self.emit(RemoteEvent::ReplaceResults { files });
        }
        // an empty completing chunk still ends the cycle
        if is_completed {
            self.emit(RemoteEvent::ReplaceDone);
        }
    }

    fn on_locate(&mut self, output: &str, is_completed: bool) {
        tracing::trace!("locate output: [{}]", output);
        self.emit(RemoteEvent::Locate {
            path: output.trim().to_string(),
        });
        if is_completed {
            self.emit(RemoteEvent::LocateDone);
        }
    }

    fn on_find_path(&mut self, output: &str, is_completed: bool) {
        tracing::trace!("find_path output: [{}]", output);
        self.emit(RemoteEvent::FindPath {
            path: output.trim().to_string(),
        });
        if is_completed {
            self.emit(RemoteEvent::FindPathDone);
        }
    }

    fn on_list_lsps(&mut self, output: &str, is_completed: bool) {
        self.emit(RemoteEvent::ListLsps {
            output: output.to_string(),
        });
        if is_completed {
            self.emit(RemoteEvent::ListLspsDone);
        }
    }

    fn on_exec(&mut self, output: &str, is_completed: bool) {
        if !output.is_empty() {
            self.emit(RemoteEvent::ExecOutput {
                output: output.to_string(),
            });
        }
        if is_completed {
            self.emit(RemoteEvent::ExecDone);
        }
    }

    /// Group `file:line:text` lines by file, merging consecutive lines of the same file
    fn parse_matches(&mut self, output: &str) -> Vec<FileMatch> {
        let mut matches: Vec<FileMatch> = Vec::new();
        for line in output.split(['\r', '\n']).filter(|l| !l.is_empty()) {
            let Some((file, line_number, pattern)) = split_match_line(line) else {
                tracing::trace!("Skipping malformed match line: {}", line);
                continue;
            };

            let location = MatchLocation {
                line: line_number,
                pattern: pattern.to_string(),
            };
            match matches.last_mut() {
                Some(current) if current.file == file => current.locations.push(location),
                _ => matches.push(FileMatch {
                    file: file.to_string(),
                    locations: vec![location],
                }),
            }
            if !self.seen_files.contains(file) {
                self.seen_files.insert(file.to_string());
                self.counters.files_scanned += 1;
            }
            self.counters.matches_found += 1;
        }
        matches
    }
}

fn split_lines(output: &str) -> Vec<String> {
    output
        .split(['\r', '\n'])
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_match_line(line: &str) -> Option<(&str, u64, &str)> {
    let (file, rest) = line.split_once(':').unwrap_or((line, ""));
    let (number, pattern) = rest.split_once(':').unwrap_or((rest, ""));
    let number = number.trim().parse().ok()?;
    Some((file, number, pattern))
}
