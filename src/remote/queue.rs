//! Pending commands and their continuations
//!
//! The remote side answers strictly in request order, so completions are
//! matched FIFO: every frame goes to the head of the queue, and the head is
//! popped when its completing frame arrives.

use std::collections::VecDeque;

use super::decode::{Decoder, ResponseKind};
use super::framer::Frame;
use super::process::RemoteProcess;

/// Receives the whole aggregated output of a command, once
pub type UserCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Where a command's output is delivered
pub enum Continuation {
    /// Built-in decoder publishing [`RemoteEvent`](super::events::RemoteEvent)s
    Internal(ResponseKind),
    /// Aggregates every frame and fires once on completion
    Callback(Option<UserCallback>),
    /// Process adapter created by `create_async_process*`
    Process(RemoteProcess),
}

impl Continuation {
    pub fn callback(callback: impl FnOnce(String) + Send + 'static) -> Self {
        Continuation::Callback(Some(Box::new(callback)))
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Continuation::Internal(kind) => f.debug_tuple("Internal").field(kind).finish(),
            Continuation::Callback(_) => f.write_str("Callback"),
            Continuation::Process(process) => f.debug_tuple("Process").field(process).finish(),
        }
    }
}

/// An outstanding request awaiting its terminating frame
#[derive(Debug)]
pub struct PendingCommand {
    /// Receives the frames of this command's response
    continuation: Continuation,
    /// Frames seen so far, for callback continuations
    aggregated_output: String,
}

impl PendingCommand {
    pub fn new(continuation: Continuation) -> Self {
        Self {
            continuation,
            aggregated_output: String::new(),
        }
    }

    pub fn deliver(&mut self, frame: &Frame, decoder: &mut Decoder) {
        match &mut self.continuation {
            Continuation::Internal(kind) => decoder.decode(*kind, &frame.body, frame.complete),
            Continuation::Callback(callback) => {
                self.aggregated_output.push_str(&frame.body);
                if frame.complete {
                    if let Some(callback) = callback.take() {
                        callback(std::mem::take(&mut self.aggregated_output));
                    }
                }
            }
            Continuation::Process(process) => process.deliver(&frame.body, frame.complete),
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    /// Head is the command the next frame belongs to
    pending: VecDeque<PendingCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: PendingCommand) {
        self.pending.push_back(command);
    }

    /// Route a frame to the head command, popping it on completion.
    ///
    /// Returns false when the queue is empty and the frame was not consumed.
    pub fn dispatch(&mut self, frame: &Frame, decoder: &mut Decoder) -> bool {
        let Some(head) = self.pending.front_mut() else {
            return false;
        };
        head.deliver(frame, decoder);
        if frame.complete {
            self.pending.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending command without notifying it
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("Discarding {} pending commands", self.pending.len());
        }
        self.pending.clear();
    }
}
