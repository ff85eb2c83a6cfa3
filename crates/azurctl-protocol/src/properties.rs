//! Receiver properties and typed values.
//!
//! The receiver reports state as attribute lines keyed by a group/number
//! pair (`#6,01,1`). This module maps those wire keys to named properties
//! through a table so new attributes can be added without touching the
//! parser, and defines the value coercion schema for each property.

use serde::{Deserialize, Serialize};

// ============================================================================
// Wire Attribute Keys
// ============================================================================

/// A group/number pair identifying an attribute on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrKey {
    /// Attribute group.
    pub group: u8,
    /// Attribute number within the group.
    pub number: u8,
}

impl AttrKey {
    /// Create a new attribute key.
    pub const fn new(group: u8, number: u8) -> Self {
        AttrKey { group, number }
    }
}

impl std::fmt::Display for AttrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{},{:02}", self.group, self.number)
    }
}

// ============================================================================
// Properties
// ============================================================================

/// A named receiver property tracked by the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// Main zone power (`#6,01`).
    Power,
    /// Mute state (`#6,11`).
    Mute,
    /// Volume as attenuation in dB (`#6,02` / `#6,03`).
    Volume,
    /// Currently selected input (`#7,01`).
    SelectedInput,
    /// Audio source for the active input (`#7,04`).
    AudioSource,
    /// Undocumented attribute the device reports alongside source changes (`#7,05`).
    Mystery,
    /// Main software version (`#10,01`).
    SoftwareVersion,
    /// Control protocol version (`#10,02`).
    ProtocolVersion,
}

impl Property {
    /// Get the property name used in logs and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Power => "power",
            Property::Mute => "mute",
            Property::Volume => "volume",
            Property::SelectedInput => "selected_input",
            Property::AudioSource => "audio_source",
            Property::Mystery => "mystery",
            Property::SoftwareVersion => "software_version",
            Property::ProtocolVersion => "protocol_version",
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value coercion schema for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSchema {
    /// Single-digit boolean: `"0"` / `"1"`.
    OnOff,
    /// Zero-padded boolean: `"00"` / `"01"`.
    OnOffPadded,
    /// Attenuation in dB, -90..=0.
    Attenuation,
    /// Input number, 1..=99.
    Input,
    /// Audio source code: `"00"` / `"01"` / `"02"`.
    Source,
    /// Free-form text (versions and the like).
    Text,
}

impl ValueSchema {
    /// Coerce a raw value token per this schema.
    ///
    /// Returns `None` when the token is outside the schema's domain, in
    /// which case the line must not become a state update.
    pub fn coerce(&self, raw: &str) -> Option<PropertyValue> {
        match self {
            ValueSchema::OnOff => match raw {
                "0" => Some(PropertyValue::Bool(false)),
                "1" => Some(PropertyValue::Bool(true)),
                _ => None,
            },
            ValueSchema::OnOffPadded => match raw {
                "00" => Some(PropertyValue::Bool(false)),
                "01" => Some(PropertyValue::Bool(true)),
                _ => None,
            },
            ValueSchema::Attenuation => {
                let db: i64 = raw.parse().ok()?;
                if (-90..=0).contains(&db) {
                    Some(PropertyValue::Integer(db))
                } else {
                    None
                }
            }
            ValueSchema::Input => {
                let number: i64 = raw.parse().ok()?;
                if (1..=99).contains(&number) {
                    Some(PropertyValue::Integer(number))
                } else {
                    None
                }
            }
            ValueSchema::Source => AudioSource::from_wire(raw)
                .map(|source| PropertyValue::String(source.name().to_string())),
            ValueSchema::Text => Some(PropertyValue::String(raw.to_string())),
        }
    }
}

/// One row of the attribute table.
#[derive(Debug, Clone, Copy)]
pub struct AttrEntry {
    /// Wire key the device reports.
    pub key: AttrKey,
    /// Property the key maps to.
    pub property: Property,
    /// Coercion schema for the value token.
    pub schema: ValueSchema,
}

/// Attribute table driving the message parser.
///
/// Volume appears twice: the device echoes attenuation under `#6,02`
/// after an up-step and `#6,03` after a down-step.
pub const ATTR_TABLE: &[AttrEntry] = &[
    AttrEntry {
        key: AttrKey::new(6, 1),
        property: Property::Power,
        schema: ValueSchema::OnOff,
    },
    AttrEntry {
        key: AttrKey::new(6, 2),
        property: Property::Volume,
        schema: ValueSchema::Attenuation,
    },
    AttrEntry {
        key: AttrKey::new(6, 3),
        property: Property::Volume,
        schema: ValueSchema::Attenuation,
    },
    AttrEntry {
        key: AttrKey::new(6, 11),
        property: Property::Mute,
        schema: ValueSchema::OnOffPadded,
    },
    AttrEntry {
        key: AttrKey::new(7, 1),
        property: Property::SelectedInput,
        schema: ValueSchema::Input,
    },
    AttrEntry {
        key: AttrKey::new(7, 4),
        property: Property::AudioSource,
        schema: ValueSchema::Source,
    },
    AttrEntry {
        key: AttrKey::new(7, 5),
        property: Property::Mystery,
        schema: ValueSchema::Text,
    },
    AttrEntry {
        key: AttrKey::new(10, 1),
        property: Property::SoftwareVersion,
        schema: ValueSchema::Text,
    },
    AttrEntry {
        key: AttrKey::new(10, 2),
        property: Property::ProtocolVersion,
        schema: ValueSchema::Text,
    },
];

/// Look up the table entry for a wire key.
pub fn attr_entry(key: AttrKey) -> Option<&'static AttrEntry> {
    ATTR_TABLE.iter().find(|entry| entry.key == key)
}

// ============================================================================
// Property Values
// ============================================================================

/// The type of value a property can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value (i64).
    Integer(i64),
    /// String value.
    String(String),
    /// Never observed.
    Null,
}

impl PropertyValue {
    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to i64 if possible.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to string slice if possible.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Check if the value is the never-observed sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Integer(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
            PropertyValue::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

// ============================================================================
// Input and Source Enums
// ============================================================================

/// Selectable inputs on the Azur 551R.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// BD/DVD player input.
    BdDvd,
    /// Video 1.
    Video1,
    /// Video 2.
    Video2,
    /// CD/AUX.
    CdAux,
    /// Tape/MD/CDR.
    TapeMdCdr,
    /// Tuner.
    Tuner,
    /// Video 3.
    Video3,
    /// Direct In (analog passthrough).
    DirectIn,
    /// TV ARC.
    TvArc,
}

/// All inputs in selection order.
pub const ALL_INPUTS: &[InputSource] = &[
    InputSource::BdDvd,
    InputSource::Video1,
    InputSource::Video2,
    InputSource::CdAux,
    InputSource::TapeMdCdr,
    InputSource::Tuner,
    InputSource::Video3,
    InputSource::DirectIn,
    InputSource::TvArc,
];

impl InputSource {
    /// Get the input number sent on the wire (1-based).
    pub fn number(&self) -> u8 {
        match self {
            InputSource::BdDvd => 1,
            InputSource::Video1 => 2,
            InputSource::Video2 => 3,
            InputSource::CdAux => 4,
            InputSource::TapeMdCdr => 5,
            InputSource::Tuner => 6,
            InputSource::Video3 => 7,
            InputSource::DirectIn => 8,
            InputSource::TvArc => 9,
        }
    }

    /// Get the front-panel name of the input.
    pub fn name(&self) -> &'static str {
        match self {
            InputSource::BdDvd => "BD/DVD",
            InputSource::Video1 => "Video 1",
            InputSource::Video2 => "Video 2",
            InputSource::CdAux => "CD/AUX",
            InputSource::TapeMdCdr => "Tape/MD/CDR",
            InputSource::Tuner => "Tuner",
            InputSource::Video3 => "Video 3",
            InputSource::DirectIn => "Direct In",
            InputSource::TvArc => "TV ARC",
        }
    }

    /// Look up an input by its wire number.
    pub fn from_number(number: u8) -> Option<InputSource> {
        ALL_INPUTS.iter().copied().find(|i| i.number() == number)
    }

    /// Look up an input by its front-panel name (case-insensitive).
    pub fn from_name(name: &str) -> Option<InputSource> {
        ALL_INPUTS
            .iter()
            .copied()
            .find(|i| i.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio source for the active input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSource {
    /// Analog audio.
    Analog,
    /// Digital (S/PDIF) audio.
    Digital,
    /// HDMI audio.
    Hdmi,
}

impl AudioSource {
    /// Get the two-digit wire code.
    pub fn wire(&self) -> &'static str {
        match self {
            AudioSource::Analog => "00",
            AudioSource::Digital => "01",
            AudioSource::Hdmi => "02",
        }
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            AudioSource::Analog => "Analog",
            AudioSource::Digital => "Digital",
            AudioSource::Hdmi => "HDMI",
        }
    }

    /// Parse a two-digit wire code.
    pub fn from_wire(code: &str) -> Option<AudioSource> {
        match code {
            "00" => Some(AudioSource::Analog),
            "01" => Some(AudioSource::Digital),
            "02" => Some(AudioSource::Hdmi),
            _ => None,
        }
    }

    /// Look up a source by its display name (case-insensitive).
    pub fn from_name(name: &str) -> Option<AudioSource> {
        [AudioSource::Analog, AudioSource::Digital, AudioSource::Hdmi]
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

/// Dynamic range compression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicRange {
    /// Device decides per stream.
    Auto,
    /// Compression off.
    Off,
    /// Compression on.
    On,
}

impl DynamicRange {
    /// Get the two-digit wire code.
    pub fn wire(&self) -> &'static str {
        match self {
            DynamicRange::Auto => "00",
            DynamicRange::Off => "01",
            DynamicRange::On => "02",
        }
    }
}

// ============================================================================
// Volume Conversions
// ============================================================================

// The device tracks volume as an attenuation level from -90dB (silent)
// to 0dB. Downstream apps usually want a 0-100 scale, so both views are
// provided with the same rounding on either path.

/// Convert a native attenuation value (-90..=0 dB) to a volume (0..=100).
pub fn attenuation_to_volume(db: i64) -> u8 {
    let db = db.clamp(-90, 0);
    (((90 + db) as f64 / 90.0) * 100.0).round() as u8
}

/// Convert a volume (0..=100) to a native attenuation value (-90..=0 dB).
pub fn volume_to_attenuation(volume: u8) -> i64 {
    let volume = volume.min(100) as f64;
    ((volume / 100.0) * 90.0).round() as i64 - 90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_table_lookup() {
        let entry = attr_entry(AttrKey::new(6, 1)).expect("power attr should exist");
        assert_eq!(entry.property, Property::Power);

        // Both volume echoes map to the same property.
        assert_eq!(
            attr_entry(AttrKey::new(6, 2)).unwrap().property,
            Property::Volume
        );
        assert_eq!(
            attr_entry(AttrKey::new(6, 3)).unwrap().property,
            Property::Volume
        );

        assert!(attr_entry(AttrKey::new(6, 99)).is_none());
    }

    #[test]
    fn test_schema_on_off() {
        assert_eq!(
            ValueSchema::OnOff.coerce("1"),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(
            ValueSchema::OnOff.coerce("0"),
            Some(PropertyValue::Bool(false))
        );
        assert_eq!(ValueSchema::OnOff.coerce("01"), None);
        assert_eq!(ValueSchema::OnOff.coerce("2"), None);
    }

    #[test]
    fn test_schema_attenuation_domain() {
        assert_eq!(
            ValueSchema::Attenuation.coerce("-45"),
            Some(PropertyValue::Integer(-45))
        );
        assert_eq!(
            ValueSchema::Attenuation.coerce("0"),
            Some(PropertyValue::Integer(0))
        );
        assert_eq!(ValueSchema::Attenuation.coerce("-91"), None);
        assert_eq!(ValueSchema::Attenuation.coerce("5"), None);
        assert_eq!(ValueSchema::Attenuation.coerce("loud"), None);
    }

    #[test]
    fn test_schema_source() {
        assert_eq!(
            ValueSchema::Source.coerce("02"),
            Some(PropertyValue::String("HDMI".to_string()))
        );
        assert_eq!(ValueSchema::Source.coerce("03"), None);
    }

    #[test]
    fn test_input_lookup() {
        assert_eq!(InputSource::from_number(4), Some(InputSource::CdAux));
        assert_eq!(InputSource::from_number(10), None);
        assert_eq!(InputSource::from_name("tuner"), Some(InputSource::Tuner));
        assert_eq!(InputSource::from_name("Minidisc"), None);
        assert_eq!(InputSource::TvArc.number(), 9);
    }

    #[test]
    fn test_volume_conversion_edges() {
        assert_eq!(attenuation_to_volume(-90), 0);
        assert_eq!(attenuation_to_volume(0), 100);
        assert_eq!(attenuation_to_volume(-45), 50);

        assert_eq!(volume_to_attenuation(0), -90);
        assert_eq!(volume_to_attenuation(100), 0);
        assert_eq!(volume_to_attenuation(50), -45);

        // Out-of-domain inputs clamp rather than wrap.
        assert_eq!(attenuation_to_volume(-120), 0);
        assert_eq!(volume_to_attenuation(150), 0);
    }
}
