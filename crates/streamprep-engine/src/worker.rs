//! Per-worker read → transform → publish loop.
//!
//! ```text
//! RUNNING --stop requested--> DRAINING --empty read, preppers ready--> STOPPED
//! ```
//!
//! Stop is cooperative: it is observed between batches, never mid-batch. A
//! draining worker keeps reading until the buffer yields nothing, so records
//! already accepted by the buffer are still delivered.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use streamprep_sdk::Prepper;
use streamprep_types::Record;

use crate::pipeline::Pipeline;
use crate::pool::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

pub(crate) struct ProcessWorker {
    pipeline: Pipeline,
    id: usize,
    state: WorkerState,
}

impl ProcessWorker {
    pub(crate) fn new(pipeline: Pipeline, id: usize) -> Self {
        Self {
            pipeline,
            id,
            state: WorkerState::Running,
        }
    }

    pub(crate) async fn run(mut self) -> WorkerState {
        tracing::debug!(pipeline = %self.pipeline.name(), worker = self.id, "Process worker started");
        while self.state != WorkerState::Stopped {
            self.observe_stop();
            let batch = self
                .pipeline
                .buffer()
                .read(self.pipeline.read_batch_timeout())
                .await;

            if batch.is_empty() {
                if self.state == WorkerState::Draining {
                    if self.preppers_ready() {
                        self.state = WorkerState::Stopped;
                        continue;
                    }
                    // Give stateful preppers a chance to flush.
                    self.process(batch).await;
                }
                continue;
            }
            self.process(batch).await;
        }
        tracing::info!(pipeline = %self.pipeline.name(), worker = self.id, "Process worker stopped");
        self.state
    }

    fn observe_stop(&mut self) {
        if self.state == WorkerState::Running && self.pipeline.is_stop_requested() {
            tracing::debug!(pipeline = %self.pipeline.name(), worker = self.id, "Process worker draining");
            self.state = WorkerState::Draining;
        }
    }

    fn preppers_ready(&self) -> bool {
        self.pipeline
            .preppers()
            .iter()
            .all(|prepper| prepper.is_ready_for_shutdown())
    }

    /// Transform one batch and wait for every sink to take it before
    /// returning, so each worker has at most one batch in flight.
    async fn process(&self, batch: Vec<Record>) {
        let name = self.pipeline.name();
        let preppers = self.pipeline.preppers().to_vec();
        let records = transform_batch(name.to_string(), preppers, batch).await;
        if records.is_empty() {
            return;
        }

        let handles = self.pipeline.publish_to_sinks(records);
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    pipeline = %name,
                    worker = self.id,
                    sink = index,
                    error = format!("{e:#}"),
                    "Sink failed to output batch"
                ),
                Err(e) => tracing::error!(
                    pipeline = %name,
                    worker = self.id,
                    sink = index,
                    error = %e,
                    "Sink task did not complete"
                ),
            }
        }
    }
}

/// Run the prepper chain on the blocking pool. Preppers are synchronous and
/// may be slow, so they must not hold an executor thread.
pub(crate) async fn transform_batch(
    pipeline: String,
    preppers: Vec<Arc<dyn Prepper>>,
    batch: Vec<Record>,
) -> Vec<Record> {
    if preppers.is_empty() {
        return batch;
    }
    let batch_size = batch.len();
    let chain = tokio::task::spawn_blocking({
        let pipeline = pipeline.clone();
        move || run_prepper_chain(&pipeline, &preppers, batch)
    });
    match chain.await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(
                pipeline = %pipeline,
                dropped = batch_size,
                error = %e,
                "Prepper chain did not complete, dropping batch"
            );
            Vec::new()
        }
    }
}

/// Apply `preppers` in order, each stage's output feeding the next.
pub(crate) fn run_prepper_chain(
    pipeline: &str,
    preppers: &[Arc<dyn Prepper>],
    batch: Vec<Record>,
) -> Vec<Record> {
    preppers
        .iter()
        .enumerate()
        .fold(batch, |records, (index, prepper)| {
            apply_prepper(pipeline, index, prepper.as_ref(), records)
        })
}

/// Run one prepper. If the whole batch fails, replay it one record at a time
/// and drop only the records that still fail.
fn apply_prepper(
    pipeline: &str,
    index: usize,
    prepper: &dyn Prepper,
    records: Vec<Record>,
) -> Vec<Record> {
    let err = match guarded_execute(prepper, &records) {
        Ok(output) => return output,
        Err(err) => err,
    };

    if records.len() <= 1 {
        tracing::warn!(
            pipeline = %pipeline,
            prepper = index,
            dropped = records.len(),
            error = format!("{err:#}"),
            "Prepper failed, dropping record"
        );
        return Vec::new();
    }

    tracing::warn!(
        pipeline = %pipeline,
        prepper = index,
        batch_size = records.len(),
        error = format!("{err:#}"),
        "Prepper failed on batch, isolating failing records"
    );
    records
        .iter()
        .flat_map(|record| {
            guarded_execute(prepper, std::slice::from_ref(record)).unwrap_or_else(|err| {
                tracing::warn!(
                    pipeline = %pipeline,
                    prepper = index,
                    error = format!("{err:#}"),
                    "Dropping record rejected by prepper"
                );
                Vec::new()
            })
        })
        .collect()
}

fn guarded_execute(prepper: &dyn Prepper, records: &[Record]) -> anyhow::Result<Vec<Record>> {
    catch_unwind(AssertUnwindSafe(|| prepper.execute(records)))
        .unwrap_or_else(|payload| Err(anyhow!("prepper panicked: {}", panic_message(payload))))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use serde_json::{json, Value};

    struct AddField(&'static str);

    impl Prepper for AddField {
        fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
            Ok(records
                .iter()
                .map(|r| {
                    r.map_data(|data| {
                        let mut data = data.clone();
                        let trail = data["trail"].as_str().unwrap_or_default().to_string();
                        data["trail"] = Value::String(format!("{trail}{}", self.0));
                        data
                    })
                })
                .collect())
        }
    }

    /// Rejects any batch containing a record with `"bad": true`.
    struct RejectBad {
        panic: bool,
    }

    impl Prepper for RejectBad {
        fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
            if records.iter().any(|r| r.data()["bad"] == json!(true)) {
                if self.panic {
                    panic!("bad record");
                }
                anyhow::bail!("bad record");
            }
            Ok(records.to_vec())
        }
    }

    struct Duplicate;

    impl Prepper for Duplicate {
        fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
            Ok(records.iter().flat_map(|r| [r.clone(), r.clone()]).collect())
        }
    }

    struct Sleepy(Duration);

    impl Prepper for Sleepy {
        fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>> {
            std::thread::sleep(self.0);
            Ok(records.to_vec())
        }
    }

    fn batch(values: &[Value]) -> Vec<Record> {
        values.iter().cloned().map(Record::new).collect()
    }

    #[test]
    fn test_chain_applies_preppers_in_declared_order() {
        let preppers: Vec<Arc<dyn Prepper>> = vec![Arc::new(AddField("1")), Arc::new(AddField("2"))];
        let out = run_prepper_chain("p", &preppers, batch(&[json!({}), json!({})]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.data()["trail"] == json!("12")));
    }

    #[test]
    fn test_chain_may_resize_batch() {
        let preppers: Vec<Arc<dyn Prepper>> = vec![Arc::new(Duplicate), Arc::new(AddField("x"))];
        let out = run_prepper_chain("p", &preppers, batch(&[json!({"id": 1})]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_empty_chain_passes_batch_through() {
        let input = batch(&[json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(run_prepper_chain("p", &[], input.clone()), input);
    }

    #[test]
    fn test_failing_record_dropped_rest_of_batch_continues() {
        let preppers: Vec<Arc<dyn Prepper>> =
            vec![Arc::new(RejectBad { panic: false }), Arc::new(AddField("ok"))];
        let input = batch(&[json!({"id": 1}), json!({"id": 2, "bad": true}), json!({"id": 3})]);
        let out = run_prepper_chain("p", &preppers, input);

        let ids: Vec<_> = out.iter().map(|r| r.data()["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
        assert!(out.iter().all(|r| r.data()["trail"] == json!("ok")));
    }

    #[test]
    fn test_panicking_prepper_is_contained() {
        let preppers: Vec<Arc<dyn Prepper>> = vec![Arc::new(RejectBad { panic: true })];
        let input = batch(&[json!({"bad": true}), json!({"id": 9})]);
        let out = run_prepper_chain("p", &preppers, input);
        assert_eq!(out, batch(&[json!({"id": 9})]));
    }

    #[test]
    fn test_single_failing_record_is_dropped() {
        let preppers: Vec<Arc<dyn Prepper>> = vec![Arc::new(RejectBad { panic: false })];
        let out = run_prepper_chain("p", &preppers, batch(&[json!({"bad": true})]));
        assert!(out.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_prepper_does_not_stall_runtime() {
        let preppers: Vec<Arc<dyn Prepper>> = vec![Arc::new(Sleepy(Duration::from_millis(600)))];
        let chain = tokio::spawn(transform_batch(
            "p".to_string(),
            preppers,
            batch(&[json!({"id": 1})]),
        ));

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(started.elapsed() < Duration::from_millis(300), "{:?}", started.elapsed());

        let out = chain.await.unwrap();
        assert_eq!(out, batch(&[json!({"id": 1})]));
    }

    #[tokio::test]
    async fn test_transform_batch_contains_panics() {
        let preppers: Vec<Arc<dyn Prepper>> =
            vec![Arc::new(RejectBad { panic: true }), Arc::new(AddField("!"))];
        let input = batch(&[json!({"id": 1}), json!({"bad": true})]);
        let out = transform_batch("p".to_string(), preppers, input).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data()["trail"], json!("!"));
    }
}
