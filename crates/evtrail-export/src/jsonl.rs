//! JSONL file sink

use crate::ExportResult;
use evtrail_core::{Level, LogPayload, Sink};
use parking_lot::Mutex;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// JSONL sink configuration
#[derive(Debug, Clone)]
pub struct JsonlSinkConfig {
    /// Output file path
    pub path: PathBuf,

    /// Whether to append to existing file
    pub append: bool,

    /// Flush after each write
    pub flush_each: bool,
}

impl Default for JsonlSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("evtrail.jsonl"),
            append: true,
            flush_each: true,
        }
    }
}

/// Writes one JSON object per record: `{level, message, ...payload}`
pub struct JsonlSink {
    config: JsonlSinkConfig,
    writer: Mutex<BufWriter<File>>,
    records_written: AtomicU64,
    write_errors: AtomicU64,
}

impl JsonlSink {
    /// Open (or create) the output file
    pub fn open(config: JsonlSinkConfig) -> ExportResult<Self> {
        let file = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.path)?
        } else {
            File::create(&config.path)?
        };
        info!("JSONL sink writing to: {:?}", config.path);

        Ok(Self {
            config,
            writer: Mutex::new(BufWriter::new(file)),
            records_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        })
    }

    pub fn flush(&self) -> ExportResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        if self.config.flush_each {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Sink for JsonlSink {
    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        let mut record = json!({ "level": level, "message": message });
        if let (Some(obj), serde_json::Value::Object(body)) =
            (record.as_object_mut(), payload.to_json())
        {
            obj.extend(body);
        }

        match self.write_line(&record.to_string()) {
            Ok(()) => {
                self.records_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!("JSONL sink failed to write {}: {}", payload.event_key, e);
            }
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.get_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evtrail_core::{context, fields, LogHandle};
    use std::sync::Arc;

    #[test]
    fn test_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = Arc::new(
            JsonlSink::open(JsonlSinkConfig {
                path: path.clone(),
                append: false,
                flush_each: true,
            })
            .unwrap(),
        );

        let mut log = LogHandle::builder(Arc::clone(&sink))
            .base_metadata(context! { "service" => "billing" })
            .build()
            .unwrap();
        log.log(Level::Info, "first", fields! { "n" => 1 });
        log.log(Level::Error, "second", fields! { "n" => 2 });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[0]["event_key"], "log");
        assert_eq!(lines[1]["message"], "second");
        assert_eq!(lines[1]["fields"]["n"], 2);
        assert_eq!(lines[1]["metadata"]["service"], "billing");
        assert_eq!(lines[1]["fork_id"], "0");
        assert_eq!(sink.records_written(), 2);
    }
}
