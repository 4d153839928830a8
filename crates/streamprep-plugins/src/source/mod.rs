//! Line-oriented sources.
//!
//! Both sources spawn a reader task on `start` and feed one record per input
//! line into the pipeline buffer until the input ends or `stop` is called.

mod file;
mod stdin;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use streamprep_sdk::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

pub use file::FileSource;
pub use stdin::StdinSource;

pub const STDIN: &str = "stdin";
pub const FILE: &str = "file";

const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1_000;

/// How an input line becomes a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFormat {
    /// The line is stored under the `message` key.
    #[default]
    Plain,
    /// The line is parsed as a JSON value; lines that fail to parse are
    /// skipped.
    Json,
}

impl LineFormat {
    fn to_record(self, line: &str, pipeline: &str) -> Option<Record> {
        match self {
            Self::Plain => Some(Record::from_message(line)),
            Self::Json => match serde_json::from_str(line) {
                Ok(value) => Some(Record::new(value)),
                Err(e) => {
                    tracing::warn!(pipeline = %pipeline, error = %e, "Skipping malformed JSON line");
                    None
                }
            },
        }
    }
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

/// Read `reader` to the end, writing one record per non-empty line.
///
/// A full buffer is retried until it frees up or `cancel` fires. Returns the
/// number of records written.
pub(crate) async fn pump_lines<R>(
    reader: R,
    buffer: Arc<dyn Buffer>,
    format: LineFormat,
    write_timeout: Duration,
    cancel: CancellationToken,
    pipeline: String,
) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut written = 0;
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(pipeline = %pipeline, error = %e, "Failed to read input line");
                    break;
                }
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(record) = format.to_record(&line, &pipeline) else {
            continue;
        };
        if !write_with_retry(&*buffer, record, write_timeout, &cancel, &pipeline).await {
            break;
        }
        written += 1;
    }
    tracing::info!(pipeline = %pipeline, records = written, "Source input finished");
    written
}

async fn write_with_retry(
    buffer: &dyn Buffer,
    record: Record,
    timeout: Duration,
    cancel: &CancellationToken,
    pipeline: &str,
) -> bool {
    loop {
        match buffer.write(record.clone(), timeout).await {
            Ok(()) => return true,
            Err(BufferError::Timeout(_)) if !cancel.is_cancelled() => {
                tracing::debug!(pipeline = %pipeline, "Buffer full, retrying write");
            }
            Err(e) => {
                tracing::warn!(pipeline = %pipeline, error = %e, "Dropping record");
                return false;
            }
        }
    }
}
