use std::io::{self, Write};

use murmur_stream::{RenderSink, SinkHandle};

/// Mirrors a [`RenderSink`] onto a terminal.
///
/// The body only ever grows while a stream is open, so a byte cursor into
/// `accumulated_text` is enough to print each new piece exactly once.
pub struct TerminalPrinter<O, E> {
    out: O,
    err: E,
    printed: usize,
    last_status: Option<String>,
}

impl TerminalPrinter<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> TerminalPrinter<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            printed: 0,
            last_status: None,
        }
    }

    pub fn render(&mut self, sink: &RenderSink) -> io::Result<()> {
        if sink.status_visible && self.last_status.as_deref() != Some(sink.status_text.as_str()) {
            writeln!(self.err, "[{}]", sink.status_text)?;
            self.err.flush()?;
            self.last_status = Some(sink.status_text.clone());
        }

        let body = sink.accumulated_text.as_str();
        if body.len() < self.printed {
            self.printed = 0;
        }
        if let Some(suffix) = body.get(self.printed..).filter(|suffix| !suffix.is_empty()) {
            self.out.write_all(suffix.as_bytes())?;
            self.out.flush()?;
            self.printed = body.len();
        }
        Ok(())
    }

    /// Ends the body line if anything was printed.
    pub fn finish(mut self) -> io::Result<(O, E)> {
        if self.printed > 0 {
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok((self.out, self.err))
    }
}

/// Prints every visible change of `sink` until its renderer goes away.
pub async fn follow<O: Write, E: Write>(
    mut sink: SinkHandle,
    mut printer: TerminalPrinter<O, E>,
) -> io::Result<(O, E)> {
    loop {
        let snapshot = sink.read_and_mark_seen(RenderSink::clone);
        printer.render(&snapshot)?;
        if !sink.changed().await {
            break;
        }
    }
    printer.render(&sink.snapshot())?;
    printer.finish()
}
