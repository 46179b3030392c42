//! CSV log writer

use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File name and header row of one log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSchema {
    pub file_name: &'static str,
    pub columns: &'static [&'static str],
}

impl LogSchema {
    pub fn header(&self) -> String {
        self.columns.join(",")
    }
}

/// A row that can be written to a log with a given schema
pub trait LogRecord: Send + Sync {
    fn fields(&self) -> Vec<String>;
}

/// Append-only CSV file, created with its header on first write
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    schema: LogSchema,
    /// Serializes appends so the header is written exactly once
    write_lock: Mutex<()>,
}

impl CsvLog {
    pub fn new(dir: impl AsRef<Path>, schema: LogSchema) -> Self {
        Self {
            path: dir.as_ref().join(schema.file_name),
            schema,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the directory and header if needed
    pub async fn append(&self, record: &dyn LogRecord) -> Result<()> {
        let fields = record.fields();
        if fields.len() != self.schema.columns.len() {
            warn!(
                "Row for {} has {} fields, expected {}",
                self.schema.file_name,
                fields.len(),
                self.schema.columns.len()
            );
        }

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let needs_header = !fs::try_exists(&self.path).await.unwrap_or(false);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buf = String::new();
        if needs_header {
            buf.push_str(&self.schema.header());
            buf.push('\n');
        }
        buf.push_str(&encode_row(&fields));
        buf.push('\n');

        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        debug!("Appended row to {}", self.path.display());
        Ok(())
    }

    /// Append one row, logging and discarding any IO failure
    pub async fn record(&self, record: &dyn LogRecord) {
        if let Err(e) = self.append(record).await {
            warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}

/// Join fields with commas, quoting any that need it
pub fn encode_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
