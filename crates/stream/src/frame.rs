use snafu::Snafu;

/// Longest line accepted before the peer is considered broken.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug, Snafu)]
#[snafu(display("line of {line_len} bytes exceeds the {max_len} byte limit on `{stage}`"))]
pub struct LineTooLong {
    stage: &'static str,
    max_len: usize,
    line_len: usize,
}

/// Splits an arriving chunk sequence into complete newline-terminated lines.
///
/// The buffer holds raw bytes, so a chunk boundary inside a multi-byte UTF-8 sequence
/// never corrupts text: a line is only decoded once its terminator has arrived.
#[derive(Debug)]
pub struct FrameSplitter {
    buffer: Vec<u8>,
    max_line_len: usize,
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_len,
        }
    }

    /// Appends `chunk` and returns every line it completed, in order.
    ///
    /// The trailing partial line (possibly empty) stays buffered. Empty chunks are no-ops.
    /// A line longer than the limit, complete or not, empties the buffer and fails.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineTooLong> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|byte| *byte == b'\n') else {
            self.check_len(self.buffer.len())?;
            return Ok(Vec::new());
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        // `complete` ends with '\n', so the final split element is always empty.
        let mut raw_lines = complete.split(|byte| *byte == b'\n').collect::<Vec<_>>();
        raw_lines.pop();

        let longest = raw_lines.iter().map(|line| line.len()).max().unwrap_or(0);
        self.check_len(longest.max(self.buffer.len()))?;

        Ok(raw_lines.into_iter().map(decode_line).collect())
    }

    /// Drains whatever partial line is left at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }

        let remaining = std::mem::take(&mut self.buffer);
        Some(decode_line(&remaining))
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn check_len(&mut self, line_len: usize) -> Result<(), LineTooLong> {
        if line_len <= self.max_line_len {
            return Ok(());
        }

        self.buffer = Vec::new();
        LineTooLongSnafu {
            stage: "frame-feed",
            max_len: self.max_line_len,
            line_len,
        }
        .fail()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_partial_line_until_terminator_arrives() {
        let mut splitter = FrameSplitter::new();

        assert!(splitter.feed(b"data: hel").unwrap().is_empty());
        assert_eq!(splitter.pending_len(), 9);
        assert_eq!(splitter.feed(b"lo\ndata: wor").unwrap(), vec!["data: hello"]);
        assert_eq!(splitter.feed(b"ld\n").unwrap(), vec!["data: world"]);
        assert_eq!(splitter.pending_len(), 0);
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn chunk_ending_exactly_on_newline_leaves_empty_buffer() {
        let mut splitter = FrameSplitter::new();

        assert_eq!(splitter.feed(b"a\n\nb\n").unwrap(), vec!["a", "", "b"]);
        assert_eq!(splitter.pending_len(), 0);
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut splitter = FrameSplitter::new();
        splitter.feed(b"partial").unwrap();

        assert!(splitter.feed(b"").unwrap().is_empty());
        assert_eq!(splitter.pending_len(), 7);
    }

    #[test]
    fn strips_carriage_return_from_crlf_framing() {
        let mut splitter = FrameSplitter::new();

        assert_eq!(splitter.feed(b"data: x\r\n\r\n").unwrap(), vec!["data: x", ""]);
    }

    #[test]
    fn flush_returns_unterminated_tail() {
        let mut splitter = FrameSplitter::new();
        splitter.feed(b"line\ndata: {\"messageType\":\"complete\"}").unwrap();

        assert_eq!(
            splitter.flush().as_deref(),
            Some("data: {\"messageType\":\"complete\"}")
        );
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn multibyte_character_split_across_chunks_decodes_intact() {
        let text = "data: Привет\n".as_bytes();
        // Cut inside the two-byte encoding of 'П'.
        let cut = "data: ".len() + 1;
        let mut splitter = FrameSplitter::new();

        assert!(splitter.feed(&text[..cut]).unwrap().is_empty());
        assert_eq!(splitter.feed(&text[cut..]).unwrap(), vec!["data: Привет"]);
    }

    #[test]
    fn line_without_terminator_over_limit_fails_and_frees_buffer() {
        let mut splitter = FrameSplitter::with_max_line_len(8);

        assert!(splitter.feed(b"data: ab").unwrap().is_empty());
        let error = splitter.feed(b"c").expect_err("nine bytes without newline");

        assert_eq!(
            error.to_string(),
            "line of 9 bytes exceeds the 8 byte limit on `frame-feed`"
        );
        assert_eq!(splitter.pending_len(), 0);
    }

    #[test]
    fn complete_line_over_limit_fails() {
        let mut splitter = FrameSplitter::with_max_line_len(8);

        assert_eq!(splitter.feed(b"short\n").unwrap(), vec!["short"]);
        assert!(splitter.feed(b"far too long\nok").is_err());
    }
}
