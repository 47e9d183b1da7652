//! Splitting process output into lines.
//!
//! Progress meters redraw themselves with a bare `\r`, so either byte ends a
//! line. The split is on the first delimiter byte, never on a `\r\n` pair:
//! `"a\r\nb"` is the line `"a\r"`, the line `"\n"`, and a pending `"b"`.

/// Line-buffering state for one stream.
#[derive(Debug, Clone, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

fn is_delimiter(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line they complete, delimiter
    /// included. The unterminated tail stays buffered.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| is_delimiter(b)) {
            let (head, tail) = rest.split_at(pos + 1);
            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(head);
            lines.push(line);
            rest = tail;
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Bytes received since the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
