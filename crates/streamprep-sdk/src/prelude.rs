//! Convenience re-exports for plugin authors.
//!
//! ```ignore
//! use streamprep_sdk::prelude::*;
//! ```

// Capability traits
pub use crate::component::{Buffer, Prepper, Sink, Source};

// Model types
pub use streamprep_types::{BufferError, PluginSetting, Record, RecordMetadata};

pub use async_trait::async_trait;
