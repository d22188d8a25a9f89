//! Line-buffered capture of streamed Composer output.

use std::fmt;

/// The backspace control byte Composer uses to redraw progress output.
pub(crate) const BACKSPACE: char = '\u{0008}';

/// Which stream of the external tool a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Stdout => write!(f, "stdout"),
            OutputChannel::Stderr => write!(f, "stderr"),
        }
    }
}

/// Collects streamed text fragments into whole lines.
///
/// Composer does not reliably announce line boundaries: multi-line text can
/// arrive in a single write, and progress redraws use backspace characters
/// instead of newlines. A fragment therefore finishes the current line when
/// the caller says so, or when the fragment carries an embedded newline or
/// backspace.
///
/// Fragments are stored verbatim. Concatenating all flushed lines plus the
/// trailing partial reconstructs the written text exactly, so nothing is ever
/// lost to the flush heuristic.
///
/// A sink holds the output of one command invocation; transports create a
/// fresh one per call.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    lines: Vec<String>,
    current: String,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the in-progress line. The line is flushed when
    /// `terminates_line` is set, or when the fragment contains a line
    /// separator or a backspace control byte.
    pub fn write(&mut self, fragment: &str, terminates_line: bool) {
        self.current.push_str(fragment);

        let terminates_line =
            terminates_line || fragment.contains('\n') || fragment.contains(BACKSPACE);

        if !terminates_line {
            return;
        }

        self.lines.push(std::mem::take(&mut self.current));
    }

    /// Append a raw byte chunk as read from a process stream. Invalid UTF-8
    /// is replaced, never dropped, so a decoding problem can at worst fail to
    /// auto-split a line.
    pub fn write_bytes(&mut self, chunk: &[u8]) {
        self.write(&String::from_utf8_lossy(chunk), false);
    }

    /// All flushed lines in arrival order. The current unflushed partial line
    /// is not included.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The in-progress line that has not hit a flush condition yet.
    pub fn partial(&self) -> &str {
        &self.current
    }

    /// Flush the in-progress line, if any. Called at end-of-stream.
    pub fn flush(&mut self) {
        if !self.current.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
    }

    /// Drop all flushed lines. Used between two logically distinct command
    /// runs sharing one sink instance.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Consume the sink, returning the flushed lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_buffers_until_line_end() {
        let mut output = CapturedOutput::new();

        output.write("hello", false);
        assert!(output.lines().is_empty());
        assert_eq!(output.partial(), "hello");

        output.write(" world", true);
        assert_eq!(output.lines(), ["hello world"]);
        assert_eq!(output.partial(), "");
    }

    #[test]
    fn test_embedded_newline_flushes() {
        let mut output = CapturedOutput::new();

        output.write("two\nlines in one write", false);
        assert_eq!(output.lines().len(), 1);
        assert_eq!(output.lines()[0], "two\nlines in one write");
    }

    #[test]
    fn test_backspace_flushes() {
        let mut output = CapturedOutput::new();

        output.write("progress\u{0008}redraw", false);
        assert_eq!(output.lines().len(), 1);

        output.write("next", true);
        assert_eq!(output.lines().len(), 2);
    }

    #[test]
    fn test_clear_resets_lines() {
        let mut output = CapturedOutput::new();
        output.write("one", true);
        output.write("two", true);
        assert_eq!(output.lines().len(), 2);

        output.clear();
        assert!(output.lines().is_empty());
    }

    #[test]
    fn test_no_characters_are_lost() {
        let fragments = ["Loading ", "composer ", "repos\nReading", " composer.json", ""];
        let mut output = CapturedOutput::new();
        for fragment in fragments {
            output.write(fragment, false);
        }

        let reconstructed = format!("{}{}", output.lines().concat(), output.partial());
        assert_eq!(reconstructed, fragments.concat());
    }

    #[test]
    fn test_flush_pushes_trailing_partial() {
        let mut output = CapturedOutput::new();
        output.write("tail without newline", false);
        output.flush();
        assert_eq!(output.lines(), ["tail without newline"]);

        // A second flush with nothing pending adds no empty line.
        output.flush();
        assert_eq!(output.lines().len(), 1);
    }

    #[test]
    fn test_write_bytes_replaces_invalid_utf8() {
        let mut output = CapturedOutput::new();
        output.write_bytes(b"ok \xff\xfe bytes\n");
        assert_eq!(output.lines().len(), 1);
        assert!(output.lines()[0].starts_with("ok "));
        assert!(output.lines()[0].ends_with(" bytes\n"));
    }
}
