//! Live MIDI input.
//!
//! Every available input device gets a [`DeviceSession`] whose callback
//! translates raw events into [`ControlMessage`](crate::engine::ControlMessage)s
//! and forwards them straight to the engine. There is no queue in between.

mod device;
mod dispatch;

pub use device::{
    list_input_ports, DeviceOpenError, DeviceSession, InputConnection, InputPort, MidirPort,
};
pub use dispatch::{translate, Dispatcher};
