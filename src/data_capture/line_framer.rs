//! Reassembly of newline-delimited lines from arbitrarily chunked child output.

/// Accumulates raw chunks and yields complete lines.
///
/// Lines are split on `\n`, an optional preceding `\r` is stripped, and lines that are blank
/// after trimming are dropped. An unterminated tail stays buffered until a later chunk completes
/// it. Bytes that are not valid UTF-8 are decoded lossily once the line is complete, so a
/// multi-byte character split across chunks is still decoded correctly.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .filter(|line| !line.trim().is_empty())
            .collect()
    }

    /// Bytes of the incomplete line currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
