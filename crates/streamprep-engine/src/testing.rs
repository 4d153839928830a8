//! Test doubles shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use streamprep_sdk::{Buffer, Prepper, Sink, Source};
use streamprep_types::Record;

pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn log(events: &EventLog, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

pub(crate) fn numbered(count: u64) -> Vec<Record> {
    (0..count).map(|n| Record::new(json!({ "n": n }))).collect()
}

pub(crate) fn numbers(records: &[Record]) -> Vec<u64> {
    records
        .iter()
        .map(|r| r.data()["n"].as_u64().unwrap())
        .collect()
}

/// Writes a fixed set of records into the buffer when started.
pub(crate) struct StaticSource {
    records: Vec<Record>,
    events: EventLog,
    fail_start: bool,
    fail_stop: bool,
}

impl StaticSource {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            events: event_log(),
            fail_start: false,
            fail_stop: false,
        }
    }

    pub(crate) fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_events(mut self, events: EventLog, fail_stop: bool) -> Self {
        self.events = events;
        self.fail_stop = fail_stop;
        self
    }
}

#[async_trait]
impl Source for StaticSource {
    async fn start(&self, buffer: Arc<dyn Buffer>) -> Result<()> {
        if self.fail_start {
            bail!("port already bound");
        }
        for record in &self.records {
            buffer.write(record.clone(), Duration::from_secs(1)).await?;
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        log(&self.events, "source.stop");
        if self.fail_stop {
            bail!("source refused to stop");
        }
        Ok(())
    }
}

/// Records every batch it receives.
#[derive(Default)]
pub(crate) struct CollectingSink {
    batches: Mutex<Vec<Vec<Record>>>,
    label: String,
    events: Option<EventLog>,
}

impl CollectingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn logged(label: &str, events: EventLog) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            events: Some(events),
            ..Self::default()
        })
    }

    pub(crate) fn records(&self) -> Vec<Record> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub(crate) fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    /// Poll until at least `count` records arrived or `within` elapsed.
    pub(crate) async fn wait_for(&self, count: usize, within: Duration) -> Vec<Record> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let records = self.records();
            if records.len() >= count || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn output(&self, records: &[Record]) -> Result<()> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(events) = &self.events {
            log(events, format!("{}.shutdown", self.label));
        }
        Ok(())
    }
}

/// Fails every output and every shutdown.
pub(crate) struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn output(&self, _records: &[Record]) -> Result<()> {
        bail!("downstream unavailable")
    }

    async fn shutdown(&self) -> Result<()> {
        bail!("close failed")
    }
}

/// Blocks forever inside `output` once entered.
#[derive(Default)]
pub(crate) struct StuckSink {
    pub(crate) entered: AtomicBool,
}

#[async_trait]
impl Sink for StuckSink {
    async fn output(&self, _records: &[Record]) -> Result<()> {
        self.entered.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(())
    }
}

/// Accepts every batch but never finishes `shutdown`.
pub(crate) struct HangingShutdownSink;

#[async_trait]
impl Sink for HangingShutdownSink {
    async fn output(&self, _records: &[Record]) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(())
    }
}

/// Logs its lifecycle hooks; optionally fails `shutdown`.
pub(crate) struct LoggingPrepper {
    label: String,
    events: EventLog,
    fail_shutdown: bool,
}

impl LoggingPrepper {
    pub(crate) fn new(label: &str, events: EventLog, fail_shutdown: bool) -> Self {
        Self {
            label: label.to_string(),
            events,
            fail_shutdown,
        }
    }
}

impl Prepper for LoggingPrepper {
    fn execute(&self, records: &[Record]) -> Result<Vec<Record>> {
        Ok(records.to_vec())
    }

    fn prepare_for_shutdown(&self) {
        log(&self.events, format!("{}.prepare", self.label));
    }

    fn shutdown(&self) -> Result<()> {
        log(&self.events, format!("{}.shutdown", self.label));
        if self.fail_shutdown {
            bail!("{} shutdown failed", self.label);
        }
        Ok(())
    }
}

/// Holds every record back until shutdown is prepared, then flushes them.
#[derive(Default)]
pub(crate) struct HoldingPrepper {
    held: Mutex<Vec<Record>>,
    flushing: AtomicBool,
    pub(crate) executions: AtomicUsize,
}

impl Prepper for HoldingPrepper {
    fn execute(&self, records: &[Record]) -> Result<Vec<Record>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().unwrap();
        held.extend_from_slice(records);
        if self.flushing.load(Ordering::SeqCst) {
            Ok(std::mem::take(&mut *held))
        } else {
            Ok(Vec::new())
        }
    }

    fn prepare_for_shutdown(&self) {
        self.flushing.store(true, Ordering::SeqCst);
    }

    fn is_ready_for_shutdown(&self) -> bool {
        self.held.lock().unwrap().is_empty()
    }
}
