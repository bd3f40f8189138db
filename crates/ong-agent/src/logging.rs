//! Tracing subscriber setup.
//!
//! Every formatted line passes through [`RedactingWriter`], which masks
//! configured secret values before the line reaches the output.

use crate::config::LoggingConfig;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Replacement for masked values.
pub const REDACTED: &str = "[REDACTED]";

/// Values shorter than this are not masked.
const MIN_SECRET_LEN: usize = 4;

/// Installs the global subscriber. Must be called once, before any job runs.
pub fn init_tracing(config: &LoggingConfig, secrets: Vec<String>) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = RedactingMakeWriter::new(io::stdout, secrets);

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    }
}

/// Wraps another [`MakeWriter`] so that every writer it hands out redacts.
#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    secrets: Arc<[String]>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, secrets: Vec<String>) -> Self {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .filter(|s| s.len() >= MIN_SECRET_LEN)
            .flat_map(|s| {
                // JSON output carries the escaped form of the value.
                let escaped = json_escaped(&s);
                std::iter::once(s).chain(escaped)
            })
            .collect();
        // Longest first so a secret containing another is masked whole.
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets.dedup();
        Self {
            inner,
            secrets: secrets.into(),
        }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), Arc::clone(&self.secrets))
    }
}

/// Buffers one formatted event and writes it, masked, on flush or drop.
pub struct RedactingWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    secrets: Arc<[String]>,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, secrets: Arc<[String]>) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            secrets,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buf);
        let masked = redact(&text, &self.secrets);
        self.buf.clear();
        self.inner.write_all(masked.as_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.emit();
    }
}

/// The value as it appears inside a JSON string, if that differs from the raw value.
fn json_escaped(secret: &str) -> Option<String> {
    let quoted = serde_json::to_string(secret).ok()?;
    let inner = quoted.get(1..quoted.len() - 1)?;
    (inner != secret).then(|| inner.to_string())
}

/// Replaces every occurrence of each secret in `text`.
pub fn redact(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        if out.contains(secret.as_str()) {
            out = out.replace(secret.as_str(), REDACTED);
        }
    }
    out
}
