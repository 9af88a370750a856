/*!
 # Wire codec for the H613 command protocol

 Every command and notification is a fixed 20-byte frame. The first byte is
 the command family (`0x33` for commands, `0xAA` for status), the second the
 command id, and the last byte is the XOR of the 19 bytes before it.

 Nothing in here performs I/O or validation: callers hand in values that are
 already in range and get bytes back.
*/

use std::fmt;

use crate::colors::Rgb;
use crate::{Error, Result};

/// Length of every frame on the wire
pub const FRAME_LEN: usize = 20;

/// Command family for writes that change the device state
pub const FAMILY_SET: u8 = 0x33;
/// Command family for status queries and their notification replies
pub const FAMILY_STATUS: u8 = 0xaa;

const ID_POWER: u8 = 0x01;
const ID_BRIGHTNESS: u8 = 0x04;
const ID_COLOR: u8 = 0x05;

const COLOR_MODE_MANUAL: u8 = 0x02;
const COLOR_MODE_QUERY: u8 = 0x01;

/// Vendor bytes that follow R, G, B in a set-color frame.
const COLOR_TRAILER: [u8; 4] = [0x00, 0xff, 0xae, 0x54];

/// Fixed power-on command
pub const TURN_ON: Frame = Frame::seal(&[FAMILY_SET, ID_POWER, 0x01]);
/// Fixed power-off command
pub const TURN_OFF: Frame = Frame::seal(&[FAMILY_SET, ID_POWER, 0x00]);
/// Power status request
pub const QUERY_POWER: Frame = Frame::seal(&[FAMILY_STATUS, ID_POWER]);
/// Color status request
pub const QUERY_RGB: Frame = Frame::seal(&[FAMILY_STATUS, ID_COLOR, COLOR_MODE_QUERY]);
/// Brightness status request
pub const QUERY_BRIGHTNESS: Frame = Frame::seal(&[FAMILY_STATUS, ID_BRIGHTNESS]);

/// XOR of every byte in `bytes`, seeded with zero
pub const fn checksum(bytes: &[u8]) -> u8 {
    let mut acc = 0u8;
    let mut i = 0;
    while i < bytes.len() {
        acc ^= bytes[i];
        i += 1;
    }
    acc
}

/// A single 20-byte protocol frame
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Builds a frame from its leading bytes, zero-fills the rest and
    /// appends the checksum.
    ///
    /// Panics if `head` does not leave room for the checksum byte.
    pub const fn seal(head: &[u8]) -> Frame {
        assert!(head.len() < FRAME_LEN, "frame head too long");

        let mut bytes = [0u8; FRAME_LEN];
        let mut i = 0;
        while i < head.len() {
            bytes[i] = head[i];
            i += 1;
        }
        // Zero filler does not change the XOR, so the head alone is enough
        bytes[FRAME_LEN - 1] = checksum(head);
        Frame(bytes)
    }

    /// Parses a 40-character hex string into a frame.
    ///
    /// The checksum is taken as-is; use [`Frame::has_valid_checksum`] to check it.
    pub fn from_hex(s: &str) -> Result<Frame> {
        let mut bytes = [0u8; FRAME_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| Error::InvalidArgument(format!("bad frame hex {s:?}: {e}")))?;
        Ok(Frame(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn family(&self) -> u8 {
        self.0[0]
    }

    pub fn checksum(&self) -> u8 {
        self.0[FRAME_LEN - 1]
    }

    /// Whether the last byte equals the XOR of the preceding ones
    pub fn has_valid_checksum(&self) -> bool {
        checksum(&self.0[..FRAME_LEN - 1]) == self.checksum()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.to_hex())
    }
}

/// Which piece of state a status query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Power,
    Rgb,
    Brightness,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Power => write!(f, "power"),
            QueryKind::Rgb => write!(f, "rgb"),
            QueryKind::Brightness => write!(f, "brightness"),
        }
    }
}

/// A decoded status notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Power(bool),
    Rgb(Rgb),
    Brightness(u8),
    /// Any frame whose header this codec does not know. Not an error.
    Unknown(Vec<u8>),
}

impl Reading {
    /// The query this reading answers, if any
    pub fn kind(&self) -> Option<QueryKind> {
        match self {
            Reading::Power(_) => Some(QueryKind::Power),
            Reading::Rgb(_) => Some(QueryKind::Rgb),
            Reading::Brightness(_) => Some(QueryKind::Brightness),
            Reading::Unknown(_) => None,
        }
    }
}

pub fn encode_turn_on() -> Frame {
    TURN_ON
}

pub fn encode_turn_off() -> Frame {
    TURN_OFF
}

/// Encodes a brightness command: `33 04 <level>`, zero filler, checksum.
pub fn encode_set_brightness(level: u8) -> Frame {
    Frame::seal(&[FAMILY_SET, ID_BRIGHTNESS, level])
}

/// Encodes a manual color command: `33 05 02 <r> <g> <b> 00 ff ae 54`, zero filler, checksum.
pub fn encode_set_color(rgb: Rgb) -> Frame {
    let [t0, t1, t2, t3] = COLOR_TRAILER;
    Frame::seal(&[
        FAMILY_SET,
        ID_COLOR,
        COLOR_MODE_MANUAL,
        rgb.r,
        rgb.g,
        rgb.b,
        t0,
        t1,
        t2,
        t3,
    ])
}

pub fn encode_query(kind: QueryKind) -> Frame {
    match kind {
        QueryKind::Power => QUERY_POWER,
        QueryKind::Rgb => QUERY_RGB,
        QueryKind::Brightness => QUERY_BRIGHTNESS,
    }
}

/// Decodes a notification pushed by the device.
///
/// Frames that are too short for their header, or carry a header this codec
/// does not know, come back as [`Reading::Unknown`].
pub fn decode_notification(frame: &[u8]) -> Reading {
    match frame {
        [FAMILY_STATUS, ID_POWER, state, ..] => Reading::Power(*state != 0),
        [FAMILY_STATUS, ID_COLOR, _, r, g, b, ..] => Reading::Rgb(Rgb::new(*r, *g, *b)),
        [FAMILY_STATUS, ID_BRIGHTNESS, level, ..] => Reading::Brightness(*level),
        other => Reading::Unknown(other.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prefix_xor(frame: &Frame) -> u8 {
        frame.as_bytes()[..FRAME_LEN - 1]
            .iter()
            .fold(0, |acc, b| acc ^ b)
    }

    #[test]
    fn fixed_frames_match_device_literals() {
        let cases = [
            (TURN_ON, "3301010000000000000000000000000000000033"),
            (TURN_OFF, "3301000000000000000000000000000000000032"),
            (QUERY_POWER, "aa010000000000000000000000000000000000ab"),
            (QUERY_RGB, "aa050100000000000000000000000000000000ae"),
            (QUERY_BRIGHTNESS, "aa040000000000000000000000000000000000ae"),
        ];
        for (frame, literal) in cases {
            assert_eq!(frame.to_hex(), literal);
            assert_eq!(frame, Frame::from_hex(literal).unwrap());
        }
    }

    #[test]
    fn encode_query_selects_literal() {
        assert_eq!(encode_query(QueryKind::Power), QUERY_POWER);
        assert_eq!(encode_query(QueryKind::Rgb), QUERY_RGB);
        assert_eq!(encode_query(QueryKind::Brightness), QUERY_BRIGHTNESS);
        assert_eq!(encode_turn_on(), TURN_ON);
        assert_eq!(encode_turn_off(), TURN_OFF);
    }

    #[test]
    fn set_color_layout() {
        let frame = encode_set_color(Rgb::new(0x00, 0xff, 0x40));
        assert_eq!(frame.to_hex(), "33050200ff4000ffae540000000000000000008e");
    }

    #[test]
    fn set_brightness_layout() {
        let frame = encode_set_brightness(0x80);
        assert_eq!(frame.to_hex(), "33048000000000000000000000000000000000b7");
    }

    #[test]
    fn brightness_checksum_for_every_level() {
        for level in 0..=u8::MAX {
            let frame = encode_set_brightness(level);
            assert_eq!(frame.as_bytes().len(), FRAME_LEN);
            assert_eq!(frame.checksum(), prefix_xor(&frame));
            // The shortcut used by the vendor app folds in the header bytes.
            assert_eq!(frame.checksum(), level ^ 0x33 ^ 0x04);
            assert!(frame.has_valid_checksum());
        }
    }

    proptest! {
        #[test]
        fn color_checksum_is_prefix_xor(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let frame = encode_set_color(Rgb::new(r, g, b));
            prop_assert_eq!(frame.as_bytes().len(), FRAME_LEN);
            prop_assert_eq!(frame.checksum(), prefix_xor(&frame));
            prop_assert_eq!(frame.checksum(), r ^ g ^ b ^ 0x31);
            prop_assert_eq!(&frame.as_bytes()[3..6], &[r, g, b]);
        }
    }

    #[test]
    fn decodes_power() {
        let on = Frame::from_hex("aa010100000000000000000000000000000000aa").unwrap();
        assert_eq!(decode_notification(on.as_ref()), Reading::Power(true));
        let off = Frame::from_hex("aa010000000000000000000000000000000000ab").unwrap();
        assert_eq!(decode_notification(off.as_ref()), Reading::Power(false));
    }

    #[test]
    fn decodes_rgb() {
        let bytes = hex::decode("aa0501ff000e000000000000000000000000005f").unwrap();
        assert_eq!(
            decode_notification(&bytes),
            Reading::Rgb(Rgb::new(255, 0, 14))
        );
    }

    #[test]
    fn decodes_brightness() {
        let bytes = hex::decode("aa0480000000000000000000000000000000002e").unwrap();
        assert_eq!(decode_notification(&bytes), Reading::Brightness(128));
    }

    #[test]
    fn unknown_headers_and_short_frames() {
        let cmd = TURN_ON;
        assert_eq!(
            decode_notification(cmd.as_ref()),
            Reading::Unknown(cmd.as_bytes().to_vec())
        );
        assert_eq!(
            decode_notification(&[0xaa, 0x05, 0x01, 0xff]),
            Reading::Unknown(vec![0xaa, 0x05, 0x01, 0xff])
        );
        assert_eq!(decode_notification(&[]), Reading::Unknown(vec![]));
        assert_eq!(Reading::Unknown(vec![]).kind(), None);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(matches!(
            Frame::from_hex("aa01"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Frame::from_hex("zz010000000000000000000000000000000000ab").is_err());
    }
}
