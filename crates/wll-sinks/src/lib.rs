use anyhow::Result;
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use wll_core::{format_timestamp, Record, RecordSink};

pub const RECORDS_FILE: &str = "records.jsonl";

/// Appends each record as one JSON line
pub struct FsSink {
    file: PathBuf,
}

impl FsSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        Ok(Self {
            file: dir.join(RECORDS_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }
}

#[async_trait::async_trait]
impl RecordSink for FsSink {
    async fn emit(&mut self, record: &Record) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)?;
        let line = serde_json::to_string(record)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(())
    }
}

/// Logs a one-line summary of each record
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait::async_trait]
impl RecordSink for LogSink {
    async fn emit(&mut self, record: &Record) -> Result<()> {
        let fields: Vec<String> = record
            .observations
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => format!("{k}=None"),
            })
            .collect();
        info!(
            "Record {}: {}",
            format_timestamp(record.date_time),
            fields.join(", ")
        );
        Ok(())
    }
}
