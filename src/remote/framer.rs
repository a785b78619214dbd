//! Receive buffer and frame extraction
//!
//! The remote side streams progress line by line and closes every response
//! with [`MSG_TERMINATOR`]. Extraction works on the accumulated buffer, not on
//! the chunks as they arrived, so a terminator split across two reads is still
//! found once both halves are buffered.

use bytes::BytesMut;

/// End-of-response marker written by the remote script
pub const MSG_TERMINATOR: &[u8] = b">>codelite-remote-msg-end<<\n";

/// One unit of remote output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub body: String,
    /// True when this frame closes the current request/response cycle
    pub complete: bool,
}

/// Accumulates raw bytes and cuts them into frames
#[derive(Debug, Default)]
pub struct Framer {
    buffer: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract exactly one frame, or `None` when no progress can be made.
    ///
    /// - terminator present: everything before it is a complete frame
    /// - otherwise, up to and including the last `\n` is a partial frame
    pub fn next_frame(&mut self) -> Option<Frame> {
        if let Some(body) = self.take_complete() {
            return Some(Frame {
                body,
                complete: true,
            });
        }

        let last_lf = self.buffer.iter().rposition(|&b| b == b'\n')?;
        let chunk = self.buffer.split_to(last_lf + 1);
        Some(Frame {
            body: String::from_utf8_lossy(&chunk).into_owned(),
            complete: false,
        })
    }

    /// Extract the body before the terminator, ignoring partial lines
    pub fn take_complete(&mut self) -> Option<String> {
        let at = find_terminator(&self.buffer)?;
        let body = self.buffer.split_to(at);
        let _ = self.buffer.split_to(MSG_TERMINATOR.len());
        Some(String::from_utf8_lossy(&body).into_owned())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MSG_TERMINATOR.len())
        .position(|window| window == MSG_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const END: &str = ">>codelite-remote-msg-end<<\n";

    fn drain(framer: &mut Framer) -> Vec<Frame> {
        std::iter::from_fn(|| framer.next_frame()).collect()
    }

    /// Concatenated bodies of each completed cycle
    fn cycles(frames: &[Frame]) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        for frame in frames {
            current.push_str(&frame.body);
            if frame.complete {
                out.push(std::mem::take(&mut current));
            }
        }
        out
    }

    #[test]
    fn test_complete_frame() {
        let mut framer = Framer::new();
        framer.push(format!("hi\n{END}").as_bytes());

        let frames = drain(&mut framer);
        assert_eq!(
            frames,
            vec![Frame {
                body: "hi\n".to_string(),
                complete: true
            }]
        );
        assert!(framer.is_empty());
    }

    #[test]
    fn test_partial_frame_takes_up_to_last_newline() {
        let mut framer = Framer::new();
        framer.push(b"a.cpp\nb.cpp\nc.c");

        let frame = framer.next_frame().unwrap();
        assert_eq!(frame.body, "a.cpp\nb.cpp\n");
        assert!(!frame.complete);
        assert_eq!(framer.len(), 3);
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_no_newline_no_frame() {
        let mut framer = Framer::new();
        framer.push(b"no newline yet");
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.len(), 14);
    }

    #[test]
    fn test_terminator_wins_over_newlines() {
        let mut framer = Framer::new();
        framer.push(format!("line1\nline2\n{END}line3\n").as_bytes());

        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body, "line1\nline2\n");
        assert!(frames[0].complete);
        assert_eq!(frames[1].body, "line3\n");
        assert!(!frames[1].complete);
    }

    #[test]
    fn test_two_responses_in_one_chunk() {
        let mut framer = Framer::new();
        framer.push(format!("<ls-results>\n{END}<find-results>\n{END}").as_bytes());

        let frames = drain(&mut framer);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.complete));
        assert_eq!(frames[0].body, "<ls-results>\n");
        assert_eq!(frames[1].body, "<find-results>\n");
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut framer = Framer::new();
        framer.push(b"output\n>>codelite-remo");

        let first = drain(&mut framer);
        assert_eq!(
            first,
            vec![Frame {
                body: "output\n".to_string(),
                complete: false
            }]
        );

        framer.push(b"te-msg-end<<\n");
        let second = drain(&mut framer);
        assert_eq!(
            second,
            vec![Frame {
                body: String::new(),
                complete: true
            }]
        );
        assert!(framer.is_empty());
    }

    #[test]
    fn test_chunking_does_not_change_cycles() {
        let stream = format!("a\nb\nc\n{END}x:1:foo\ny:2:bar\n{END}{END}tail\n");
        let bytes = stream.as_bytes();

        let mut whole = Framer::new();
        whole.push(bytes);
        let reference = drain(&mut whole);

        for chunk_size in 1..=bytes.len() {
            let mut framer = Framer::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                framer.push(chunk);
                frames.extend(drain(&mut framer));
            }

            assert_eq!(cycles(&frames), cycles(&reference), "chunk size {}", chunk_size);
            assert_eq!(
                frames.iter().filter(|f| f.complete).count(),
                3,
                "chunk size {}",
                chunk_size
            );
            let all: String = frames.iter().map(|f| f.body.as_str()).collect();
            assert_eq!(all, stream.replace(END, ""), "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_take_complete_ignores_partial_lines() {
        let mut framer = Framer::new();
        framer.push(b"progress\n");
        assert!(framer.take_complete().is_none());
        assert_eq!(framer.len(), 9);

        framer.push(format!("done\n{END}").as_bytes());
        assert_eq!(framer.take_complete().unwrap(), "progress\ndone\n");
    }

    #[test]
    fn test_clear() {
        let mut framer = Framer::new();
        framer.push(b"stale");
        framer.clear();
        assert!(framer.is_empty());
    }
}
