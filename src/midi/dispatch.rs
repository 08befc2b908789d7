//! Translation of live MIDI input into engine control messages.

use crate::engine::{ControlMessage, EngineHandle};
use midly::live::LiveEvent;
use midly::MidiMessage;
use tracing::{debug, info, warn};

/// Translates one live MIDI event into at most one control message.
///
/// A note on with velocity 0 is a note off. Events other than notes,
/// program changes and controller changes yield `None`.
pub fn translate(event: &LiveEvent) -> Option<ControlMessage> {
    let LiveEvent::Midi { channel, message } = event else {
        return None;
    };
    let channel = channel.as_int();

    match *message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => Some(ControlMessage::NoteOn {
            channel,
            key: key.as_int(),
            velocity: vel.as_int(),
        }),
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            Some(ControlMessage::NoteOff {
                channel,
                key: key.as_int(),
            })
        }
        MidiMessage::ProgramChange { program } => Some(ControlMessage::ProgramChange {
            channel,
            program: program.as_int(),
        }),
        MidiMessage::Controller { controller, value } => Some(ControlMessage::ControllerChange {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        _ => None,
    }
}

/// Forwards events from one input device to the engine.
///
/// Every event is forwarded as soon as it arrives, on the caller's thread,
/// so per-device ordering is the order of `dispatch` calls.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: EngineHandle,
    device: String,
}

impl Dispatcher {
    pub fn new(engine: EngineHandle, device: impl Into<String>) -> Self {
        Self {
            engine,
            device: device.into(),
        }
    }

    /// Name of the device this dispatcher serves.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Parses raw MIDI bytes and forwards the resulting message, if any.
    ///
    /// Returns the message that was delivered to the engine.
    pub fn dispatch(&self, raw: &[u8]) -> Option<ControlMessage> {
        match LiveEvent::parse(raw) {
            Ok(event) => self.dispatch_event(&event),
            Err(e) => {
                debug!(device = self.device, err = %e, "Ignoring unparseable MIDI input.");
                None
            }
        }
    }

    /// Forwards an already parsed event.
    pub fn dispatch_event(&self, event: &LiveEvent) -> Option<ControlMessage> {
        let Some(message) = translate(event) else {
            debug!(device = self.device, event = ?event, "Ignoring MIDI event.");
            return None;
        };

        match message {
            ControlMessage::ProgramChange { channel, program } => {
                info!(device = self.device, channel, program, "Program changed.")
            }
            ControlMessage::ControllerChange {
                channel,
                controller,
                value,
            } => info!(
                device = self.device,
                channel, controller, value, "Control change."
            ),
            _ => debug!(device = self.device, %message, "Forwarding MIDI event."),
        }

        if let Err(e) = self.engine.send(message) {
            warn!(device = self.device, err = %e, "Engine rejected MIDI event.");
            return None;
        }
        Some(message)
    }
}
