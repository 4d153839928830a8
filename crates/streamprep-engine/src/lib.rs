//! Pipeline execution and graph construction for streamprep.
//!
//! A [`Pipeline`] moves records from its source through a bounded buffer, an
//! ordered prepper chain and out to every sink, using a fixed pool of workers.
//! The [`GraphBuilder`] turns a set of named definitions into pipelines, wiring
//! `pipeline`-typed sinks and sources together through shared connectors.

pub mod buffer;
pub mod builder;
pub mod config;
pub mod connector;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub(crate) mod pool;
pub mod registry;
pub(crate) mod worker;

#[cfg(test)]
mod testing;

pub use buffer::BlockingBuffer;
pub use builder::{GraphBuild, GraphBuilder};
pub use config::types::{PipelineDefinition, PipelinesConfig};
pub use connector::PipelineConnector;
pub use error::{PipelineError, TaskError};
pub use pipeline::{Pipeline, SinkHandle, DEFAULT_SHUTDOWN_TIMEOUT};
pub use pool::TaskHandle;
pub use registry::{PluginRegistry, PluginRole};
pub use worker::WorkerState;
