use anyhow::{anyhow, Result};
use fantasia_domain::SessionClock;
use midir::{Ignore, MidiInput, MidiInputConnection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::input::InputSender;

const NOTE_ON: u8 = 0x90;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MidiDevice {
    pub name: String,
}

pub struct MidiManager;

impl MidiManager {
    pub fn list_inputs() -> Result<Vec<MidiDevice>> {
        let input = MidiInput::new("fantasia")?;
        Ok(input
            .ports()
            .iter()
            .map(|port| MidiDevice {
                name: input.port_name(port).unwrap_or_else(|_| "Unknown".into()),
            })
            .collect())
    }
}

/// Note number of a note-on message. Note-on with zero velocity is a release.
pub fn decode_note_on(message: &[u8]) -> Option<u8> {
    match message {
        [status, note, velocity, ..] if status & 0xF0 == NOTE_ON && *velocity > 0 => Some(*note),
        _ => None,
    }
}

/// Keeps a MIDI port open and forwards pressed notes into the engine's input queue.
pub struct MidiBridge {
    _connection: MidiInputConnection<()>,
    port: String,
}

impl MidiBridge {
    pub fn connect(port_name: &str, mut sender: InputSender, clock: SessionClock) -> Result<Self> {
        let mut input = MidiInput::new("fantasia-input")?;
        input.ignore(Ignore::All);
        let ports = input.ports();
        let port = ports
            .iter()
            .find(|port| input.port_name(port).map_or(false, |name| name == port_name))
            .cloned()
            .ok_or_else(|| anyhow!("midi port not found: {port_name}"))?;
        let connection = input
            .connect(
                &port,
                "fantasia-input",
                move |_stamp, message, _| {
                    if let Some(note) = decode_note_on(message) {
                        sender.push_note(note as i32, clock.elapsed_ms());
                    }
                },
                (),
            )
            .map_err(|err| anyhow!("midi connect error: {err}"))?;
        info!(port = port_name, "midi input connected");
        Ok(Self {
            _connection: connection,
            port: port_name.to_string(),
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_inputs_does_not_panic() {
        // MIDI input availability varies by environment; just ensure no panic.
        let _ = MidiManager::list_inputs();
    }

    #[test]
    fn decodes_note_on_only() {
        assert_eq!(decode_note_on(&[0x90, 60, 100]), Some(60));
        assert_eq!(decode_note_on(&[0x93, 67, 1]), Some(67));
        assert_eq!(decode_note_on(&[0x90, 60, 0]), None);
        assert_eq!(decode_note_on(&[0x80, 60, 64]), None);
        assert_eq!(decode_note_on(&[0x90, 60]), None);
    }
}
