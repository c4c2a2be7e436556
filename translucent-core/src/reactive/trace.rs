//! Diagnostic Trace
//!
//! Every registration, read, write, invalidation and cache event is reported
//! twice: as a `tracing` event (nested inside a span per logical block), and,
//! when a sink has been attached with [`Context::start_log`], as an indented
//! line of text. The text form nests two spaces per open block, so a trace
//! reads like a call tree.
//!
//! [`Context::start_log`]: super::Context::start_log

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;

/// Renders cell values for the text trace.
pub type Formatter = Arc<dyn Fn(&Json) -> String + Send + Sync>;

fn compact(value: &Json) -> String {
    value.to_string()
}

struct Sink {
    writer: Option<Box<dyn Write + Send>>,
    indent: usize,
}

pub(crate) struct Trace {
    sink: Mutex<Sink>,
    formatter: RwLock<Formatter>,
}

impl Trace {
    pub(crate) fn new() -> Self {
        Self {
            sink: Mutex::new(Sink {
                writer: None,
                indent: 0,
            }),
            formatter: RwLock::new(Arc::new(compact)),
        }
    }

    pub(crate) fn start(&self, writer: Box<dyn Write + Send>) {
        self.sink.lock().writer = Some(writer);
    }

    pub(crate) fn stop(&self) {
        self.sink.lock().writer = None;
    }

    pub(crate) fn set_formatter(&self, formatter: Formatter) {
        *self.formatter.write() = formatter;
    }

    /// Wrap a value so it is rendered with the current formatter.
    pub(crate) fn show<'a>(&self, value: &'a Json) -> Shown<'a> {
        Shown {
            value,
            formatter: Arc::clone(&self.formatter.read()),
        }
    }

    pub(crate) fn log(&self, args: fmt::Arguments<'_>) {
        tracing::trace!(target: "translucent_core", "{}", args);

        let mut sink = self.sink.lock();
        let indent = sink.indent * 2;
        if let Some(writer) = sink.writer.as_mut() {
            // The trace is diagnostic only; a failing sink must not break the graph.
            let _ = writeln!(writer, "{:indent$}{}", "", args, indent = indent);
        }
    }

    /// Log a line and open a nested block until the guard is dropped.
    pub(crate) fn block(&self, args: fmt::Arguments<'_>) -> TraceBlock<'_> {
        self.log(args);
        let span = tracing::trace_span!(target: "translucent_core", "block", op = %args).entered();
        self.sink.lock().indent += 1;
        TraceBlock {
            trace: self,
            _span: span,
        }
    }
}

/// Guard for an open trace block.
pub(crate) struct TraceBlock<'a> {
    trace: &'a Trace,
    _span: tracing::span::EnteredSpan,
}

impl Drop for TraceBlock<'_> {
    fn drop(&mut self) {
        let mut sink = self.trace.sink.lock();
        sink.indent = sink.indent.saturating_sub(1);
    }
}

/// A value rendered through the trace formatter.
pub(crate) struct Shown<'a> {
    value: &'a Json,
    formatter: Formatter,
}

impl fmt::Display for Shown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&(self.formatter)(self.value))
    }
}
