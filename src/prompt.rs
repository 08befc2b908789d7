//! Console prompts for the initial instrument selection.

use std::io::{self, BufRead, Write};

/// Parses a 7-bit MIDI value (0-127). Surrounding whitespace is ignored.
pub fn parse_midi_value(input: &str) -> Option<u8> {
    input.trim().parse::<u8>().ok().filter(|v| *v <= 127)
}

/// Asks for a value between 0 and 127.
///
/// Invalid or out of range input falls back to 0 with a warning written to
/// `output`. End of input is treated the same way.
///
/// # Arguments
///
/// * `input` - Where answers are read from
/// * `output` - Where the prompt and warnings are written
/// * `label` - What is being asked for, e.g. "Bank"
pub fn prompt_midi_value<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
) -> io::Result<u8> {
    write!(output, "Enter {} number (0-127): ", label)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    match parse_midi_value(&line) {
        Some(value) => Ok(value),
        None => {
            writeln!(
                output,
                "Invalid {} number, defaulting to 0.",
                label.to_lowercase()
            )?;
            Ok(0)
        }
    }
}
