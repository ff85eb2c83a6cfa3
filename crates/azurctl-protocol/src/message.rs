//! Incoming message parsing.
//!
//! Each decoded line is interpreted as exactly one [`Message`]. Lines
//! the parser does not recognize, and status lines whose value falls
//! outside the property's domain, come back as [`Message::Unknown`];
//! a bad line never fails the session.

use crate::properties::{attr_entry, AttrKey, Property, PropertyValue};

/// Why the receiver rejected a command (group 11 lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Command group unknown (`#11,01`).
    UnknownGroup,
    /// Command number within the group unknown (`#11,02`).
    UnknownNumber,
    /// Command data invalid (`#11,03`).
    InvalidData,
}

impl RejectReason {
    /// Parse a rejection reason from the group-11 attribute number.
    pub fn from_code(code: u8) -> Option<RejectReason> {
        match code {
            1 => Some(RejectReason::UnknownGroup),
            2 => Some(RejectReason::UnknownNumber),
            3 => Some(RejectReason::InvalidData),
            _ => None,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownGroup => write!(f, "command group unknown"),
            RejectReason::UnknownNumber => write!(f, "command number in group unknown"),
            RejectReason::InvalidData => write!(f, "command data error"),
        }
    }
}

/// One parsed line from the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A status line carrying a property value.
    Status {
        /// The wire attribute the line arrived under.
        key: AttrKey,
        /// The property the attribute maps to.
        property: Property,
        /// The coerced value.
        value: PropertyValue,
    },

    /// A command rejection line.
    Rejected(RejectReason),

    /// A line the parser does not recognize.
    Unknown(String),
}

impl Message {
    /// Interpret one decoded line.
    pub fn parse(line: &str) -> Message {
        let text = line.trim();

        let Some(body) = text.strip_prefix('#') else {
            return Message::Unknown(text.to_string());
        };

        let mut parts = body.splitn(3, ',');
        let (Some(group_str), Some(number_str)) = (parts.next(), parts.next()) else {
            return Message::Unknown(text.to_string());
        };
        let (Ok(group), Ok(number)) = (group_str.parse::<u8>(), number_str.parse::<u8>()) else {
            return Message::Unknown(text.to_string());
        };

        if group == 11 {
            return match RejectReason::from_code(number) {
                Some(reason) => Message::Rejected(reason),
                None => Message::Unknown(text.to_string()),
            };
        }

        let key = AttrKey::new(group, number);
        let Some(entry) = attr_entry(key) else {
            return Message::Unknown(text.to_string());
        };

        let raw_value = parts.next().unwrap_or("");
        match entry.schema.coerce(raw_value) {
            Some(value) => Message::Status {
                key,
                property: entry.property,
                value,
            },
            // Out-of-domain value: dropping the line beats recording a
            // wrong state.
            None => {
                log::debug!(
                    "value {:?} out of domain for {} ({})",
                    raw_value,
                    entry.property,
                    key
                );
                Message::Unknown(text.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_power_status() {
        let msg = Message::parse("#6,01,1");
        assert_eq!(
            msg,
            Message::Status {
                key: AttrKey::new(6, 1),
                property: Property::Power,
                value: PropertyValue::Bool(true),
            }
        );
    }

    #[test]
    fn test_parse_mute_padded() {
        let msg = Message::parse("#6,11,00");
        assert_eq!(
            msg,
            Message::Status {
                key: AttrKey::new(6, 11),
                property: Property::Mute,
                value: PropertyValue::Bool(false),
            }
        );
    }

    #[test]
    fn test_parse_volume_both_echoes() {
        for line in ["#6,02,-45", "#6,03,-45"] {
            match Message::parse(line) {
                Message::Status {
                    property, value, ..
                } => {
                    assert_eq!(property, Property::Volume);
                    assert_eq!(value, PropertyValue::Integer(-45));
                }
                other => panic!("expected status for {}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            Message::parse("#11,01"),
            Message::Rejected(RejectReason::UnknownGroup)
        );
        assert_eq!(
            Message::parse("#11,02,"),
            Message::Rejected(RejectReason::UnknownNumber)
        );
        assert_eq!(
            Message::parse("#11,03"),
            Message::Rejected(RejectReason::InvalidData)
        );
        assert!(matches!(Message::parse("#11,09"), Message::Unknown(_)));
    }

    #[test]
    fn test_parse_version_with_commas() {
        // The value token keeps any commas the device sends.
        let msg = Message::parse("#10,01,v2.0,beta");
        assert_eq!(
            msg,
            Message::Status {
                key: AttrKey::new(10, 1),
                property: Property::SoftwareVersion,
                value: PropertyValue::String("v2.0,beta".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_out_of_domain_value() {
        // Attenuation above 0dB is not a thing; no stale update.
        assert!(matches!(Message::parse("#6,02,15"), Message::Unknown(_)));
        // Power value outside 0/1.
        assert!(matches!(Message::parse("#6,01,7"), Message::Unknown(_)));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(Message::parse("hello"), Message::Unknown(_)));
        assert!(matches!(Message::parse("#"), Message::Unknown(_)));
        assert!(matches!(Message::parse("#x,y,z"), Message::Unknown(_)));
        assert!(matches!(Message::parse("#99,01,1"), Message::Unknown(_)));
    }
}
