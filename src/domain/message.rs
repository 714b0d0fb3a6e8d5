//! Scroll Wheel wire messages
//!
//! The peripheral pushes short ASCII notifications over the UART TX
//! characteristic:
//!
//! ```text
//! SCR:<signed integer>   high-resolution wheel delta
//! BAT:<integer 0-100>    battery percentage
//! ```
//!
//! Anything else is accepted and logged, never rejected.

use std::fmt;

pub const MOTION_PREFIX: &str = "SCR:";
pub const BATTERY_PREFIX: &str = "BAT:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    Motion,
    Battery,
    Unknown,
}

/// One decoded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub tag: MessageTag,
    pub raw_text: String,
    pub parsed_value: Option<i32>,
}

impl InboundMessage {
    /// Decode a raw notification payload.
    ///
    /// Never fails: a known prefix whose remainder is not an integer is
    /// downgraded to [`MessageTag::Unknown`].
    pub fn decode(payload: &[u8]) -> Self {
        let raw_text = String::from_utf8_lossy(payload).trim().to_string();

        let tagged = [
            (MOTION_PREFIX, MessageTag::Motion),
            (BATTERY_PREFIX, MessageTag::Battery),
        ]
        .into_iter()
        .find_map(|(prefix, tag)| {
            let rest = raw_text.strip_prefix(prefix)?;
            rest.trim().parse::<i32>().ok().map(|value| (tag, value))
        });

        match tagged {
            Some((tag, value)) => Self {
                tag,
                raw_text,
                parsed_value: Some(value),
            },
            None => Self {
                tag: MessageTag::Unknown,
                raw_text,
                parsed_value: None,
            },
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text)
    }
}

/// A line of operator text bound for the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub text: String,
}

impl OutboundCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_motion() {
        for delta in [0, 1, -1, 120, -360, i32::MAX, i32::MIN] {
            let msg = InboundMessage::decode(format!("SCR:{}", delta).as_bytes());
            assert_eq!(msg.tag, MessageTag::Motion);
            assert_eq!(msg.parsed_value, Some(delta));
        }
    }

    #[test]
    fn test_decode_trims_payload() {
        let msg = InboundMessage::decode(b"  SCR:-7\r\n");
        assert_eq!(msg.tag, MessageTag::Motion);
        assert_eq!(msg.parsed_value, Some(-7));
        assert_eq!(msg.raw_text, "SCR:-7");

        let msg = InboundMessage::decode(b"SCR: 15");
        assert_eq!(msg.parsed_value, Some(15));
    }

    #[test]
    fn test_decode_battery() {
        let msg = InboundMessage::decode(b"BAT:87");
        assert_eq!(msg.tag, MessageTag::Battery);
        assert_eq!(msg.parsed_value, Some(87));
    }

    #[test]
    fn test_bad_integer_downgrades_to_unknown() {
        for payload in ["SCR:", "SCR:abc", "BAT:full", "SCR:1.5", "SCR:99999999999"] {
            let msg = InboundMessage::decode(payload.as_bytes());
            assert_eq!(msg.tag, MessageTag::Unknown, "payload {payload}");
            assert_eq!(msg.parsed_value, None);
            assert_eq!(msg.raw_text, payload);
        }
    }

    #[test]
    fn test_unknown_prefix_kept_verbatim() {
        let msg = InboundMessage::decode(b"HELLO:1");
        assert_eq!(msg.tag, MessageTag::Unknown);
        assert_eq!(msg.raw_text, "HELLO:1");
        // Prefix match is case-sensitive
        assert_eq!(InboundMessage::decode(b"scr:5").tag, MessageTag::Unknown);
    }

    #[test]
    fn test_invalid_utf8_does_not_panic() {
        let msg = InboundMessage::decode(&[0xff, 0xfe, b'S']);
        assert_eq!(msg.tag, MessageTag::Unknown);
    }
}
