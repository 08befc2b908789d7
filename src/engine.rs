//! Synthesis engine seam.
//!
//! The engine itself is rustysynth. This module defines the control messages
//! the rest of the crate speaks, the [`SynthEngine`] trait the session talks
//! to, and [`EngineHandle`], the one shared handle that both the audio
//! callback and the MIDI callbacks hold.
//!
//! # Locking
//!
//! The handle wraps the engine in a mutex that is held for exactly one
//! control message or one render call. The audio thread can therefore only
//! ever wait for a single message to be applied, never for a whole burst.

use crate::catalog::{InstrumentBank, Preset};
use rustysynth::{Synthesizer, SynthesizerSettings};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Number of MIDI channels the initial preset is broadcast to.
pub const MIDI_CHANNELS: u8 = 16;

/// MIDI status nibble for control change messages.
const CONTROL_CHANGE: u8 = 0xB0;
/// MIDI status nibble for program change messages.
const PROGRAM_CHANGE: u8 = 0xC0;
/// MIDI status nibble for note on messages.
const NOTE_ON: u8 = 0x90;
/// MIDI status nibble for note off messages.
const NOTE_OFF: u8 = 0x80;

/// Controller number for bank select (coarse).
const BANK_SELECT_MSB: u8 = 0;
/// Controller number for bank select (fine).
const BANK_SELECT_LSB: u8 = 32;

/// A normalized instruction to the synthesis engine.
///
/// All numeric payloads are 7-bit MIDI values and `channel` is 0-15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessage {
    /// Bank select, coarse (CC 0).
    BankSelectMsb { channel: u8, value: u8 },
    /// Bank select, fine (CC 32).
    BankSelectLsb { channel: u8, value: u8 },
    /// Selects the instrument for a channel.
    ProgramChange { channel: u8, program: u8 },
    /// Starts a note. Velocity is always non-zero.
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Releases a note.
    NoteOff { channel: u8, key: u8 },
    /// Any other controller (volume, pan, sustain, ...).
    ControllerChange { channel: u8, controller: u8, value: u8 },
}

impl ControlMessage {
    /// Returns the MIDI channel this message targets.
    pub fn channel(&self) -> u8 {
        match *self {
            ControlMessage::BankSelectMsb { channel, .. }
            | ControlMessage::BankSelectLsb { channel, .. }
            | ControlMessage::ProgramChange { channel, .. }
            | ControlMessage::NoteOn { channel, .. }
            | ControlMessage::NoteOff { channel, .. }
            | ControlMessage::ControllerChange { channel, .. } => channel,
        }
    }

    /// Encodes the message as `(command, data1, data2)`, where `command` is the
    /// status nibble without the channel. This is the layout rustysynth's
    /// `process_midi_message` expects.
    pub fn to_midi(&self) -> (u8, u8, u8) {
        match *self {
            ControlMessage::BankSelectMsb { value, .. } => (CONTROL_CHANGE, BANK_SELECT_MSB, value),
            ControlMessage::BankSelectLsb { value, .. } => (CONTROL_CHANGE, BANK_SELECT_LSB, value),
            ControlMessage::ProgramChange { program, .. } => (PROGRAM_CHANGE, program, 0),
            ControlMessage::NoteOn { key, velocity, .. } => (NOTE_ON, key, velocity),
            ControlMessage::NoteOff { key, .. } => (NOTE_OFF, key, 0),
            ControlMessage::ControllerChange {
                controller, value, ..
            } => (CONTROL_CHANGE, controller, value),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ControlMessage::BankSelectMsb { channel, value } => {
                write!(f, "bank select MSB {} on channel {}", value, channel)
            }
            ControlMessage::BankSelectLsb { channel, value } => {
                write!(f, "bank select LSB {} on channel {}", value, channel)
            }
            ControlMessage::ProgramChange { channel, program } => {
                write!(f, "program change {} on channel {}", program, channel)
            }
            ControlMessage::NoteOn {
                channel,
                key,
                velocity,
            } => write!(f, "note on {} ({}) on channel {}", key, velocity, channel),
            ControlMessage::NoteOff { channel, key } => {
                write!(f, "note off {} on channel {}", key, channel)
            }
            ControlMessage::ControllerChange {
                channel,
                controller,
                value,
            } => write!(
                f,
                "controller {} = {} on channel {}",
                controller, value, channel
            ),
        }
    }
}

/// Builds the messages that put every channel on the given preset.
///
/// For each of the 16 channels this yields bank select MSB (the preset bank),
/// bank select LSB (0) and a program change, in that order.
pub fn initial_preset_messages(preset: &Preset) -> impl Iterator<Item = ControlMessage> + '_ {
    (0..MIDI_CHANNELS).flat_map(move |channel| {
        [
            ControlMessage::BankSelectMsb {
                channel,
                value: preset.bank,
            },
            ControlMessage::BankSelectLsb { channel, value: 0 },
            ControlMessage::ProgramChange {
                channel,
                program: preset.program,
            },
        ]
    })
}

/// A synthesizer that can be driven by control messages and rendered in blocks.
///
/// `render` must not block on I/O and must finish in time proportional to the
/// block length.
pub trait SynthEngine: Send {
    /// Applies one control message.
    fn process(&mut self, message: ControlMessage);

    /// Renders `left.len()` frames of the current sound. Both slices have the
    /// same length.
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);
}

impl SynthEngine for Synthesizer {
    fn process(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::NoteOn {
                channel,
                key,
                velocity,
            } => self.note_on(channel as i32, key as i32, velocity as i32),
            ControlMessage::NoteOff { channel, key } => self.note_off(channel as i32, key as i32),
            other => {
                let (command, data1, data2) = other.to_midi();
                self.process_midi_message(
                    other.channel() as i32,
                    command as i32,
                    data1 as i32,
                    data2 as i32,
                );
            }
        }
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        Synthesizer::render(self, left, right);
    }
}

/// Creates the production engine for a loaded instrument bank.
///
/// # Errors
///
/// Returns [`EngineError::Create`] if rustysynth rejects the settings or bank.
pub fn create_synthesizer(
    bank: &InstrumentBank,
    sample_rate: u32,
) -> Result<Synthesizer, EngineError> {
    let settings = SynthesizerSettings::new(sample_rate as i32);
    Synthesizer::new(bank.soundfont(), &settings)
        .map_err(|e| EngineError::Create(format!("{:?}", e)))
}

/// Errors from creating or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The synthesizer could not be constructed.
    #[error("failed to create synthesizer: {0}")]
    Create(String),
    /// A thread panicked while holding the engine lock.
    #[error("engine lock poisoned, dropped {0}")]
    Poisoned(ControlMessage),
}

/// Errors from rendering audio.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// A thread panicked while holding the engine lock.
    #[error("engine lock poisoned during render")]
    Poisoned,
    /// The output buffer does not hold whole stereo frames.
    #[error("output buffer of {0} samples is not a whole number of stereo frames")]
    Misaligned(usize),
}

/// Shared handle to the one synthesis engine of a session.
///
/// Cloning the handle shares the engine. Both the render bridge and every
/// dispatcher are given a clone at construction.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<Mutex<Box<dyn SynthEngine>>>,
}

impl EngineHandle {
    /// Wraps an engine for sharing.
    pub fn new<E: SynthEngine + 'static>(engine: E) -> Self {
        Self::from_boxed(Box::new(engine))
    }

    /// Wraps an already boxed engine.
    pub fn from_boxed(engine: Box<dyn SynthEngine>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Applies a single control message, holding the lock only for that
    /// message.
    pub fn send(&self, message: ControlMessage) -> Result<(), EngineError> {
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| EngineError::Poisoned(message))?;
        engine.process(message);
        Ok(())
    }

    /// Renders one block into the given channel buffers.
    pub fn render(&self, left: &mut [f32], right: &mut [f32]) -> Result<(), RenderError> {
        let mut engine = self.engine.lock().map_err(|_| RenderError::Poisoned)?;
        engine.render(left, right);
        Ok(())
    }

    /// Returns the number of live handles to the engine.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.engine)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("holders", &self.holders())
            .finish()
    }
}
