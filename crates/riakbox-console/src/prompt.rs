//! Prompt detection over raw console output.
//!
//! The Erlang shell prints `(<node>)<n>> ` without a trailing newline once
//! it is ready for input. Boot logs, progress reports and echoed input may
//! precede the prompt in the same chunk, so detection works on an
//! accumulated buffer rather than on lines.

use crate::error::Result;
use regex::Regex;

/// Output emitted by the Erlang VM when it fails to boot.
pub const CRASH_MARKER: &str = "Kernel pid terminated";

/// Buffered output is capped at this many bytes.
const MAX_BUFFERED: usize = 64 * 1024;

/// Bytes retained from the tail when the cap is exceeded.
const RETAINED_TAIL: usize = 4 * 1024;

/// Outcome of scanning buffered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// A prompt ends at this byte offset.
    Prompt { end: usize },
    /// The VM died; carries the offending line.
    Crashed(String),
    /// Neither seen yet.
    Pending,
}

/// Matches the ready prompt of one specific node.
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    node: String,
    pattern: Regex,
}

impl PromptMatcher {
    /// Build a matcher for `(<node>)<digits>>`.
    pub fn new(node: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"\({}\)\d+>", regex::escape(node)))?;
        Ok(Self {
            node: node.to_string(),
            pattern,
        })
    }

    /// The node name this matcher waits for.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Scan `text` for a prompt, then for the crash marker.
    pub fn scan(&self, text: &str) -> Scan {
        if let Some(m) = self.pattern.find(text) {
            return Scan::Prompt { end: m.end() };
        }
        match text.find(CRASH_MARKER) {
            Some(start) => {
                let line = text[start..].lines().next().unwrap_or(CRASH_MARKER);
                Scan::Crashed(line.trim().to_string())
            }
            None => Scan::Pending,
        }
    }
}

/// Accumulates console output between prompts.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw output chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.text.push_str(&String::from_utf8_lossy(chunk));
        if self.text.len() > MAX_BUFFERED {
            let mut cut = self.text.len() - RETAINED_TAIL;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    /// Drop everything up to `end`.
    pub fn consume(&mut self, end: usize) {
        let end = end.min(self.text.len());
        self.text.drain(..end);
    }

    /// Buffered text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_own_node_after_noise() {
        let matcher = PromptMatcher::new("foo@bar").unwrap();
        let out = "Erlang R14B02 (erts-5.8.3)\n** booting **\n...(foo@bar)42> ";
        match matcher.scan(out) {
            Scan::Prompt { end } => assert_eq!(
                &out[..end],
                "Erlang R14B02 (erts-5.8.3)\n** booting **\n...(foo@bar)42>"
            ),
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    #[test]
    fn test_ignores_other_node() {
        let matcher = PromptMatcher::new("foo@bar").unwrap();
        assert_eq!(matcher.scan("(other@node)1> "), Scan::Pending);
    }

    #[test]
    fn test_node_name_is_literal() {
        // Dots in the node name must not act as wildcards.
        let matcher = PromptMatcher::new("riak@127.0.0.1").unwrap();
        assert_eq!(matcher.scan("(riak@127x0x0x1)1> "), Scan::Pending);
        assert!(matches!(matcher.scan("(riak@127.0.0.1)1> "), Scan::Prompt { .. }));
    }

    #[test]
    fn test_requires_digits() {
        let matcher = PromptMatcher::new("n@h").unwrap();
        assert_eq!(matcher.scan("(n@h)> "), Scan::Pending);
        assert_eq!(matcher.scan("(n@h)1"), Scan::Pending);
    }

    #[test]
    fn test_crash_marker() {
        let matcher = PromptMatcher::new("n@h").unwrap();
        let out = "booting\nKernel pid terminated (application_controller) ({bad})\nmore";
        assert_eq!(
            matcher.scan(out),
            Scan::Crashed("Kernel pid terminated (application_controller) ({bad})".into())
        );
    }

    #[test]
    fn test_buffer_consume() {
        let mut buffer = OutputBuffer::new();
        buffer.push(b"noise (n@h)1> tail");
        let matcher = PromptMatcher::new("n@h").unwrap();
        let Scan::Prompt { end } = matcher.scan(buffer.as_str()) else {
            panic!("expected prompt");
        };
        buffer.consume(end);
        assert_eq!(buffer.as_str(), " tail");
        assert_eq!(matcher.scan(buffer.as_str()), Scan::Pending);
    }

    #[test]
    fn test_buffer_cap_keeps_tail() {
        let mut buffer = OutputBuffer::new();
        buffer.push(&vec![b'x'; MAX_BUFFERED]);
        buffer.push(b"(n@h)");
        assert!(buffer.len() <= RETAINED_TAIL);
        assert!(buffer.as_str().ends_with("(n@h)"));
        buffer.push(b"7> ");
        let matcher = PromptMatcher::new("n@h").unwrap();
        assert!(matches!(matcher.scan(buffer.as_str()), Scan::Prompt { .. }));
    }
}
