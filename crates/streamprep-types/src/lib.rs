//! Shared streamprep record, plugin-setting and error model types.
//!
//! This crate is dependency-boundary-safe for both the engine and plugin authors.

pub mod error;
pub mod record;
pub mod setting;

pub use error::{BufferError, SettingError};
pub use record::{Record, RecordMetadata};
pub use setting::PluginSetting;
