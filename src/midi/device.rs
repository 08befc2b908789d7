//! MIDI input devices and their subscriptions.

use super::dispatch::Dispatcher;
use crate::engine::EngineHandle;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use std::fmt;
use thiserror::Error;
use tracing::{info, span, Level};

/// Client name registered with the OS MIDI layer.
const CLIENT_NAME: &str = "livesynth input";

/// Errors from enumerating or opening MIDI inputs.
#[derive(Debug, Error)]
pub enum DeviceOpenError {
    /// The OS MIDI layer could not be initialized.
    #[error("failed to initialize MIDI input: {0}")]
    Init(#[from] midir::InitError),
    /// The port name could not be read.
    #[error("failed to read MIDI port info: {0}")]
    PortInfo(#[from] midir::PortInfoError),
    /// The port refused the connection.
    #[error("failed to connect to MIDI input {device}: {reason}")]
    Connect { device: String, reason: String },
}

/// An input port that can be subscribed to.
pub trait InputPort: fmt::Display {
    /// Returns the name of the device.
    fn name(&self) -> &str;

    /// Subscribes to the port. Every event received is handed to `dispatcher`
    /// on the port's callback thread until the returned connection is closed.
    fn connect(
        self: Box<Self>,
        dispatcher: Dispatcher,
    ) -> Result<Box<dyn InputConnection>, DeviceOpenError>;
}

/// A live subscription to an input port.
pub trait InputConnection {
    /// Unsubscribes. No events are dispatched once this returns.
    fn close(self: Box<Self>);
}

/// One active subscription to a MIDI input device.
pub struct DeviceSession {
    name: String,
    connection: Box<dyn InputConnection>,
}

impl DeviceSession {
    /// Subscribes to `port`, forwarding its events to `engine`.
    pub fn start(
        port: Box<dyn InputPort>,
        engine: EngineHandle,
    ) -> Result<Self, DeviceOpenError> {
        let name = port.name().to_string();
        let span = span!(Level::INFO, "start device session", device = name);
        let _enter = span.enter();

        let connection = port.connect(Dispatcher::new(engine, name.clone()))?;
        info!("Listening for MIDI input.");
        Ok(Self { name, connection })
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the subscription. Returns once no more events can reach the
    /// engine from this device.
    pub fn stop(self) {
        self.connection.close();
        info!(device = self.name, "Stopped listening for MIDI input.");
    }
}

/// A midir input port.
pub struct MidirPort {
    name: String,
    port: MidiInputPort,
}

impl fmt::Display for MidirPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl InputPort for MidirPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(
        self: Box<Self>,
        dispatcher: Dispatcher,
    ) -> Result<Box<dyn InputConnection>, DeviceOpenError> {
        let input = MidiInput::new(CLIENT_NAME)?;
        let connection = input
            .connect(
                &self.port,
                &self.name,
                move |_timestamp, raw, _| {
                    dispatcher.dispatch(raw);
                },
                (),
            )
            .map_err(|e| DeviceOpenError::Connect {
                device: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirConnection(connection)))
    }
}

struct MidirConnection(MidiInputConnection<()>);

impl InputConnection for MidirConnection {
    fn close(self: Box<Self>) {
        // Closing joins the callback thread, so no event is in flight after this.
        let (_input, _) = self.0.close();
    }
}

/// Lists every MIDI input port known to the OS, in enumeration order.
pub fn list_input_ports() -> Result<Vec<Box<dyn InputPort>>, DeviceOpenError> {
    let input = MidiInput::new(CLIENT_NAME)?;
    let mut ports: Vec<Box<dyn InputPort>> = Vec::new();
    for port in input.ports() {
        let name = input.port_name(&port)?;
        ports.push(Box::new(MidirPort { name, port }));
    }
    Ok(ports)
}
