//! Pipeline error model.
//!
//! Every variant names the pipeline it belongs to. None of them is fatal to the
//! graph: the builder omits the failing pipeline and carries on, and callers
//! decide what to do after inspecting the result.

/// Categorized, per-pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A required field is missing or out of range, or the pipeline graph is
    /// inconsistent (dangling edge, cycle).
    #[error("invalid configuration for pipeline [{pipeline}]: {reason}")]
    Configuration { pipeline: String, reason: String },

    /// A plugin (or an upstream dependency) could not be instantiated.
    #[error("failed to construct pipeline [{pipeline}]: {source:#}")]
    Construction {
        pipeline: String,
        #[source]
        source: anyhow::Error,
    },

    /// The source failed to start; the pipeline never began processing.
    #[error("pipeline [{pipeline}] failed to start its source: {source:#}")]
    SourceStart {
        pipeline: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn configuration(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }

    pub fn construction(pipeline: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Construction {
            pipeline: pipeline.into(),
            source,
        }
    }

    /// Name of the pipeline this error belongs to.
    pub fn pipeline(&self) -> &str {
        match self {
            Self::Configuration { pipeline, .. }
            | Self::Construction { pipeline, .. }
            | Self::SourceStart { pipeline, .. } => pipeline,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Outcome of a pool task that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The pool was force-cancelled before the task finished.
    #[error("task cancelled by pool shutdown")]
    Cancelled,

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}
