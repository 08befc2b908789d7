//! livesynth - play SoundFont instruments live from MIDI input devices.
//!
//! Loads a SoundFont, asks which instrument to start with, then renders
//! whatever is played on any connected MIDI input until ENTER is pressed.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- FluidR3_GM.sf2                  # Prompt for bank and program
//! cargo run -- FluidR3_GM.sf2 -b 0 -p 24       # Start on bank 0, program 24
//! RUST_LOG=debug cargo run -- FluidR3_GM.sf2   # Log every MIDI event
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use livesynth::prompt::prompt_midi_value;
use livesynth::{Audition, Cli, LiveBackend, Session, SessionEvent};
use std::io;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Main entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut session = Session::new(LiveBackend::new(&cli.soundfont), cli.audio_config());

    let catalog = session.load_catalog().with_context(|| {
        format!("Failed to load SoundFont: {}", cli.soundfont.display())
    })?;
    println!("Instruments in SoundFont:");
    for preset in catalog.presets() {
        println!("{}", preset);
    }

    let (bank, program) = {
        let mut input = io::stdin().lock();
        let mut output = io::stdout();
        let bank = match cli.bank {
            Some(bank) => bank,
            None => prompt_midi_value(&mut input, &mut output, "Bank")?,
        };
        let program = match cli.program {
            Some(program) => program,
            None => prompt_midi_value(&mut input, &mut output, "Program")?,
        };
        (bank, program)
    };

    let initial = session
        .prepare_engine(bank, program)
        .context("Failed to initialize synthesizer")?;
    if initial.fallback {
        println!(
            "No preset at Bank {}, Program {}. Reverting to default.",
            bank, program
        );
    }
    println!("Using {}", initial.preset);

    let audition = if cli.no_test_note {
        None
    } else {
        println!("Playing test note (Middle C)...");
        Some(Audition::default())
    };
    let report = session.start(audition).context("Failed to start audio")?;

    println!("MIDI Input Devices:");
    if report.started.is_empty() {
        println!("  (none)");
    }
    for (index, name) in report.started.iter().enumerate() {
        println!("[{}] {}", index, name);
    }
    for (name, e) in &report.failed {
        eprintln!("Warning: could not open {}: {}", name, e);
    }

    println!("Press ENTER to exit...");
    let stop = session.stop_handle();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        stop.stop();
    });

    let event = session.wait();
    session.shutdown();

    match event {
        SessionEvent::StopRequested => Ok(()),
        SessionEvent::AudioFault(e) => Err(anyhow!(e).context("Audio output failed")),
    }
}
