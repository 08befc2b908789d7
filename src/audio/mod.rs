//! Audio output for the live synthesizer.
//!
//! This module connects the synthesis engine to the output device:
//! - [`bridge`] renders engine blocks into the negotiated sample layout
//! - [`output`] drives the bridge from rodio's pull callback

pub mod bridge;
pub mod output;

pub use bridge::{AudioFormat, RenderBridge};
pub use output::{AudioOutputError, AudioStream, RodioStream, SynthSource};
