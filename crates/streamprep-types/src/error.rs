//! Error types shared between the engine and plugins.

use std::time::Duration;

/// Failure modes of a [`Buffer`](https://docs.rs/streamprep-sdk) hand-off.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// No capacity became available before the write deadline.
    ///
    /// This is the backpressure signal a source is expected to react to.
    #[error("timed out after {0:?} waiting for buffer capacity")]
    Timeout(Duration),

    /// The buffer no longer accepts records.
    #[error("buffer is closed")]
    Closed,
}

/// A plugin setting could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingError {
    /// The setting mapping did not contain exactly one plugin type-name.
    #[error("plugin setting must name exactly one plugin type, found {0}")]
    PluginCount(usize),

    /// The settings body under the type-name was not a mapping.
    #[error("settings for plugin '{0}' must be a mapping")]
    SettingsNotMapping(String),

    /// The setting was neither a type-name string nor a mapping.
    #[error("plugin setting must be a string or a single-key mapping")]
    Shape,
}
