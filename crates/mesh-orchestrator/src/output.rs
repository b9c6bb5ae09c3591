//! Per-host attributed output

use std::io::{self, Write};

/// Line-buffered writer that labels each line with its host.
///
/// Only the representative host's sink writes anything; the others accept
/// and drop every byte. A partial line is held until its newline arrives or
/// [`finish`](Self::finish) is called.
pub struct AttributedSink<W: Write> {
    prefix: String,
    dest: W,
    representative: bool,
    pending: Vec<u8>,
}

impl<W: Write> AttributedSink<W> {
    pub fn new(prefix: impl Into<String>, dest: W, representative: bool) -> Self {
        Self {
            prefix: prefix.into(),
            dest,
            representative,
            pending: Vec::new(),
        }
    }

    /// Write out a held partial line, terminated with a newline
    pub fn finish(&mut self) -> io::Result<()> {
        if self.representative && !self.pending.is_empty() {
            let mut line = std::mem::take(&mut self.pending);
            line.push(b'\n');
            self.emit(&line)?;
        }
        self.dest.flush()
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        // One write per line so concurrent writers interleave whole lines
        let mut out = Vec::with_capacity(self.prefix.len() + line.len());
        out.extend_from_slice(self.prefix.as_bytes());
        out.extend_from_slice(line);
        self.dest.write_all(&out)
    }
}

impl<W: Write> Write for AttributedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.representative {
            return Ok(buf.len());
        }
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_representative_is_shown() {
        let mut dest = Vec::new();
        {
            let mut alpha = AttributedSink::new("[alpha] ", &mut dest, true);
            assert_eq!(alpha.write(b"line1\nline2\n").unwrap(), 12);
        }
        let mut beta = AttributedSink::new("[beta] ", Vec::new(), false);
        assert_eq!(beta.write(b"line1\nline2\n").unwrap(), 12);
        beta.finish().unwrap();

        assert_eq!(dest, b"[alpha] line1\n[alpha] line2\n");
        assert!(beta.into_inner().is_empty());
    }

    #[test]
    fn test_partial_lines_are_joined() {
        let mut sink = AttributedSink::new("[h] ", Vec::new(), true);
        sink.write_all(b"ep").unwrap();
        sink.write_all(b"och 1\nepo").unwrap();
        sink.write_all(b"ch 2\n").unwrap();
        assert_eq!(sink.into_inner(), b"[h] epoch 1\n[h] epoch 2\n");
    }

    #[test]
    fn test_finish_flushes_trailing_fragment() {
        let mut sink = AttributedSink::new("[h] ", Vec::new(), true);
        sink.write_all(b"done\nno newline").unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.into_inner(), b"[h] done\n[h] no newline\n");
    }

    #[test]
    fn test_empty_lines_keep_prefix() {
        let mut sink = AttributedSink::new("[h] ", Vec::new(), true);
        sink.write_all(b"\n\n").unwrap();
        assert_eq!(sink.into_inner(), b"[h] \n[h] \n");
    }
}
