//! Record delivery.

use std::io::{Cursor, Write};

use hookwatch_protocol::{InvocationRecord, RecordFormat, WatchConfig};
use log::{info, warn};
use serde::ser::{SerializeMap, Serializer as _};

/// Log target every record is written under.
pub const RECORD_TARGET: &str = "hookwatch::record";

/// Upper bound on a rendered JSON record.
pub const JSON_RECORD_CAPACITY: usize = 256;

/// Receives one record per intercepted call, synchronously, on the calling
/// thread. Implementations must not block.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: &InvocationRecord);
}

/// Forwards records to the `log` facade at info level.
#[derive(Debug, Clone)]
pub struct LogSink {
    format: RecordFormat,
    label: String,
}

impl LogSink {
    pub fn new(format: RecordFormat, label: impl Into<String>) -> Self {
        Self {
            format,
            label: label.into(),
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.format, config.argument.label.clone())
    }
}

impl RecordSink for LogSink {
    fn emit(&self, record: &InvocationRecord) {
        match self.format {
            RecordFormat::Text => info!(target: RECORD_TARGET, "{}", record.line(&self.label)),
            RecordFormat::Json => {
                let mut buf = [0u8; JSON_RECORD_CAPACITY];
                match render_json(record, &self.label, &mut buf) {
                    Some(json) => info!(target: RECORD_TARGET, "{}", json),
                    None => warn!(target: RECORD_TARGET, "record too large for JSON: {}", record),
                }
            }
        }
    }
}

/// Render `record` as a compact JSON object into `buf`, naming the argument
/// field `label`. `None` if it does not fit.
pub fn render_json<'b>(record: &InvocationRecord, label: &str, buf: &'b mut [u8]) -> Option<&'b str> {
    let mut cursor = Cursor::new(&mut buf[..]);
    write_json(record, label, &mut cursor).ok()?;
    let len = cursor.position() as usize;
    core::str::from_utf8(&buf[..len]).ok()
}

fn write_json<W: Write>(record: &InvocationRecord, label: &str, out: W) -> Result<(), serde_json::Error> {
    let mut ser = serde_json::Serializer::new(out);
    let mut map = (&mut ser).serialize_map(Some(5))?;
    map.serialize_entry("pid", &record.pid)?;
    map.serialize_entry("comm", &record.comm)?;
    map.serialize_entry("ns", &record.ns)?;
    map.serialize_entry(label, &record.arg)?;
    map.serialize_entry("cpu", &record.cpu)?;
    map.end()
}
