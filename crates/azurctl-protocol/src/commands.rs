//! Commands that can be sent to the receiver.
//!
//! Every command is a line of the form `#<group>,<number>,<data>\r`
//! where `data` may be empty. The receiver answers commands in group G
//! with a status line in group G+5 carrying the same number; commands
//! the device does not report back (tone steps and the like) produce no
//! reply at all unless they are rejected.

use crate::codec::LineCodec;
use crate::properties::{AttrKey, AudioSource, DynamicRange};

/// Commands understood by the receiver's control port.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set main zone power (`#1,01`).
    SetPower(bool),
    /// Step the volume up one dB (`#1,02`).
    VolumeUp,
    /// Step the volume down one dB (`#1,03`).
    VolumeDown,
    /// Step bass up (`#1,04`).
    BassUp,
    /// Step bass down (`#1,05`).
    BassDown,
    /// Step treble up (`#1,06`).
    TrebleUp,
    /// Step treble down (`#1,07`).
    TrebleDown,
    /// Set the LFE channel trim in dB (`#1,10`).
    SetLfeTrim(i8),
    /// Set mute (`#1,11`).
    SetMute(bool),
    /// Set dynamic range compression mode (`#1,12`).
    SetDynamicRange(DynamicRange),
    /// Step lip sync delay up (`#1,20`).
    LipSyncUp,
    /// Step lip sync delay down (`#1,21`).
    LipSyncDown,
    /// Select an input by number (`#2,01`).
    SelectInput(u8),
    /// Set the audio source for the active input (`#2,04`).
    SetAudioSource(AudioSource),
    /// Ask for the main software version (`#5,01`).
    QuerySoftwareVersion,
    /// Ask for the control protocol version (`#5,02`).
    QueryProtocolVersion,
}

/// Discriminant of a [`Command`], used for per-kind dispatch queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Power set.
    SetPower,
    /// Volume up-step.
    VolumeUp,
    /// Volume down-step.
    VolumeDown,
    /// Bass up-step.
    BassUp,
    /// Bass down-step.
    BassDown,
    /// Treble up-step.
    TrebleUp,
    /// Treble down-step.
    TrebleDown,
    /// LFE trim set.
    SetLfeTrim,
    /// Mute set.
    SetMute,
    /// Dynamic range set.
    SetDynamicRange,
    /// Lip sync up-step.
    LipSyncUp,
    /// Lip sync down-step.
    LipSyncDown,
    /// Input select.
    SelectInput,
    /// Audio source set.
    SetAudioSource,
    /// Software version query.
    QuerySoftwareVersion,
    /// Protocol version query.
    QueryProtocolVersion,
}

impl Command {
    /// Get the kind discriminant for this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetPower(_) => CommandKind::SetPower,
            Command::VolumeUp => CommandKind::VolumeUp,
            Command::VolumeDown => CommandKind::VolumeDown,
            Command::BassUp => CommandKind::BassUp,
            Command::BassDown => CommandKind::BassDown,
            Command::TrebleUp => CommandKind::TrebleUp,
            Command::TrebleDown => CommandKind::TrebleDown,
            Command::SetLfeTrim(_) => CommandKind::SetLfeTrim,
            Command::SetMute(_) => CommandKind::SetMute,
            Command::SetDynamicRange(_) => CommandKind::SetDynamicRange,
            Command::LipSyncUp => CommandKind::LipSyncUp,
            Command::LipSyncDown => CommandKind::LipSyncDown,
            Command::SelectInput(_) => CommandKind::SelectInput,
            Command::SetAudioSource(_) => CommandKind::SetAudioSource,
            Command::QuerySoftwareVersion => CommandKind::QuerySoftwareVersion,
            Command::QueryProtocolVersion => CommandKind::QueryProtocolVersion,
        }
    }

    /// Get the command's group/number pair.
    pub fn wire(&self) -> (u8, u8) {
        match self {
            Command::SetPower(_) => (1, 1),
            Command::VolumeUp => (1, 2),
            Command::VolumeDown => (1, 3),
            Command::BassUp => (1, 4),
            Command::BassDown => (1, 5),
            Command::TrebleUp => (1, 6),
            Command::TrebleDown => (1, 7),
            Command::SetLfeTrim(_) => (1, 10),
            Command::SetMute(_) => (1, 11),
            Command::SetDynamicRange(_) => (1, 12),
            Command::LipSyncUp => (1, 20),
            Command::LipSyncDown => (1, 21),
            Command::SelectInput(_) => (2, 1),
            Command::SetAudioSource(_) => (2, 4),
            Command::QuerySoftwareVersion => (5, 1),
            Command::QueryProtocolVersion => (5, 2),
        }
    }

    /// Get the data token, empty for commands that take none.
    pub fn data(&self) -> String {
        match self {
            Command::SetPower(on) => (if *on { "1" } else { "0" }).to_string(),
            Command::SetMute(on) => (if *on { "01" } else { "00" }).to_string(),
            Command::SetDynamicRange(mode) => mode.wire().to_string(),
            Command::SetLfeTrim(db) => db.to_string(),
            Command::SelectInput(number) => format!("{:02}", number),
            Command::SetAudioSource(source) => source.wire().to_string(),
            _ => String::new(),
        }
    }

    /// Get the status attribute that acknowledges this command, if the
    /// device reports one.
    pub fn expected_reply(&self) -> Option<AttrKey> {
        match self.kind() {
            CommandKind::SetPower
            | CommandKind::VolumeUp
            | CommandKind::VolumeDown
            | CommandKind::SetMute
            | CommandKind::SelectInput
            | CommandKind::SetAudioSource
            | CommandKind::QuerySoftwareVersion
            | CommandKind::QueryProtocolVersion => {
                let (group, number) = self.wire();
                Some(AttrKey::new(group + 5, number))
            }
            // Tone, trim, dynamic range and lip sync changes are not
            // echoed by the device.
            _ => None,
        }
    }

    /// Get the command line without the terminator.
    pub fn to_command_string(&self) -> String {
        let (group, number) = self.wire();
        format!("#{},{:02},{}", group, number, self.data())
    }

    /// Encode the command as bytes to send, including the terminator.
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(&self.to_command_string())
    }
}
