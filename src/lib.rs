//! livesynth - play SoundFont instruments live from MIDI input devices.
//!
//! This library provides the core of the live synthesizer: the instrument
//! catalog, the engine handle shared between the audio and MIDI threads, the
//! render bridge feeding the output device, the MIDI input dispatcher and the
//! session that starts and stops them in order.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod midi;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogLoadError, InstrumentBank, Preset};
pub use config::{AudioConfig, Cli};
pub use engine::{ControlMessage, EngineHandle, SynthEngine};
pub use session::{
    Audition, Backend, LiveBackend, Session, SessionError, SessionEvent, SessionState,
};
