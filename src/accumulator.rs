//! Sink boundary: collectors hand finished metrics and cycle errors to an
//! [`Accumulator`], which owns buffering and transport.

use crate::metric::{FieldValue, Metric};
use std::io::Write;
use std::sync::Mutex;

/// Error type accepted by [`Accumulator::add_error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Receives finished metrics.
///
/// Webhook handlers call into the same accumulator from many requests at
/// once, so implementations must tolerate concurrent writes.
pub trait Accumulator: Send + Sync {
    fn add_metric(&self, metric: Metric);

    /// Record an error for the current collection cycle.
    fn add_error(&self, err: BoxError);
}

/// Writes each metric as one InfluxDB line-protocol line.
pub struct LineProtocolWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineProtocolWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> Accumulator for LineProtocolWriter<W> {
    fn add_metric(&self, metric: Metric) {
        let line = to_line_protocol(&metric);
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::warn!(error = %e, metric = %metric.name, "failed to write metric");
        }
    }

    fn add_error(&self, err: BoxError) {
        tracing::error!(error = %err, "collection error");
    }
}

/// Render a metric as `name[,tag=v...] field=v[,field=v...] <unix-nanos>`.
///
/// Tags and fields are sorted by key. Tags with empty values are dropped
/// since line protocol cannot represent them.
pub fn to_line_protocol(metric: &Metric) -> String {
    let mut line = escape(&metric.name, &[',', ' ']);

    let mut tags: Vec<_> = metric.tags.iter().filter(|(_, v)| !v.is_empty()).collect();
    tags.sort_by(|a, b| a.0.cmp(b.0));
    for (k, v) in tags {
        line.push(',');
        line.push_str(&escape(k, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(v, &[',', '=', ' ']));
    }

    let mut fields: Vec<_> = metric.fields.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (i, (k, v)) in fields.into_iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        line.push_str(&escape(k, &[',', '=', ' ']));
        line.push('=');
        match v {
            FieldValue::Int(n) => {
                line.push_str(&n.to_string());
                line.push('i');
            }
            FieldValue::Str(s) => {
                line.push('"');
                line.push_str(&escape(s, &['"']));
                line.push('"');
            }
        }
    }

    if let Some(nanos) = metric.timestamp.timestamp_nanos_opt() {
        line.push(' ');
        line.push_str(&nanos.to_string());
    }
    line
}

/// Backslash-escape `special` characters. Line breaks are written as `\n`
/// and `\r` everywhere, so a value can never end the line early.
fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c == '\\' || special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// In-memory sink for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAccumulator {
    pub metrics: Mutex<Vec<Metric>>,
    pub errors: Mutex<Vec<BoxError>>,
}

#[cfg(test)]
impl MemoryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

#[cfg(test)]
impl Accumulator for MemoryAccumulator {
    fn add_metric(&self, metric: Metric) {
        self.metrics.lock().unwrap().push(metric);
    }

    fn add_error(&self, err: BoxError) {
        self.errors.lock().unwrap().push(err);
    }
}
