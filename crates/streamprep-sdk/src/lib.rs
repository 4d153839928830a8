//! Capability contracts driven by the streamprep engine.
//!
//! Plugins implement one of [`Source`], [`Prepper`], [`Sink`] or [`Buffer`]
//! and are handed to the engine as `Arc<dyn _>` trait objects.

pub mod component;
pub mod prelude;

pub use component::{Buffer, Prepper, Sink, Source};
