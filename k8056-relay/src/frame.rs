//! K8056 command frames.
//!
//! Every instruction on the bus is a fixed five byte frame:
//!
//! | Byte | Meaning      |
//! |------|--------------|
//! | 0    | marker (13)  |
//! | 1    | card address |
//! | 2    | opcode       |
//! | 3    | relay code   |
//! | 4    | checksum     |
//!
//! The checksum makes the byte sum of the whole frame zero modulo 256. Cards
//! never answer, so frames only ever travel from the host to the bus.

use bytes::{BufMut, BytesMut};
use std::io;
use strum::Display;
use tokio_util::codec::Encoder;

use crate::error::{Error, Result};

/// Leading marker byte of every frame.
pub const MARKER: u8 = 13;

/// Length of an encoded frame in bytes.
pub const FRAME_LEN: usize = 5;

const CHECKSUM_BASE: u8 = 243;

/// Relay code carried by an emergency clear.
const EMERGENCY_RELAY_CODE: u8 = 1;

/// Card addressed by an emergency clear.
const EMERGENCY_CARD: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    Set = b'S',
    Clear = b'C',
    EmergencyClear = b'E',
}

/// Relay selector on a card, 1 through 9.
///
/// Relays 1-8 are the physical outputs. Relay 9 addresses all of them at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relay(u8);

impl Relay {
    /// Selector addressing every relay on a card.
    pub const ALL: Relay = Relay(9);

    pub fn new(number: u32) -> Result<Self> {
        match number {
            1..=9 => Ok(Relay(number as u8)),
            _ => Err(Error::InvalidRelay(number)),
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Byte sent on the wire for this relay (`'1'` through `'9'`).
    pub fn code(self) -> u8 {
        self.0 + b'0'
    }
}

impl TryFrom<u32> for Relay {
    type Error = Error;

    fn try_from(number: u32) -> Result<Self> {
        Relay::new(number)
    }
}

/// A single command addressed to one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub card: u8,
    pub opcode: Opcode,
    pub relay_code: u8,
}

impl Frame {
    /// Switch `relay` on. Card numbers wrap modulo 256.
    pub fn set(card: u32, relay: Relay) -> Self {
        Self {
            card: card_address(card),
            opcode: Opcode::Set,
            relay_code: relay.code(),
        }
    }

    /// Switch `relay` off. Card numbers wrap modulo 256.
    pub fn clear(card: u32, relay: Relay) -> Self {
        Self {
            card: card_address(card),
            opcode: Opcode::Clear,
            relay_code: relay.code(),
        }
    }

    // The card clears its relays on seeing opcode 'E'; whether cards other
    // than 1 honor it is up to the hardware.
    pub fn emergency_clear() -> Self {
        Self {
            card: EMERGENCY_CARD,
            opcode: Opcode::EmergencyClear,
            relay_code: EMERGENCY_RELAY_CODE,
        }
    }

    pub fn checksum(&self) -> u8 {
        CHECKSUM_BASE
            .wrapping_sub(self.opcode as u8)
            .wrapping_sub(self.relay_code)
            .wrapping_sub(self.card)
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [
            MARKER,
            self.card,
            self.opcode as u8,
            self.relay_code,
            self.checksum(),
        ]
    }
}

fn card_address(card: u32) -> u8 {
    (card & 0xff) as u8
}

pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(
        &mut self,
        frame: Frame,
        dst: &mut BytesMut,
    ) -> std::result::Result<(), Self::Error> {
        dst.reserve(FRAME_LEN);
        dst.put_slice(&frame.to_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn as_hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<String>>()
            .join(" ")
    }

    fn assert_frame(frame: Frame, expect: &[u8]) {
        let mut codec = FrameCodec;
        let mut encoded = BytesMut::new();
        codec.encode(frame, &mut encoded).unwrap();
        if encoded != expect {
            panic!(
                "mismatch!\nexpected: {}\nactual: {}",
                as_hex(expect),
                as_hex(&encoded[..])
            )
        }
    }

    #[test]
    fn test_set_card3_relay5() {
        assert_frame(
            Frame::set(3, Relay::new(5).unwrap()),
            &[13, 3, 83, 53, 104],
        );
    }

    #[test]
    fn test_clear_all_on_card1() {
        assert_frame(Frame::clear(1, Relay::ALL), &[13, 1, 67, 57, 118]);
    }

    #[test]
    fn test_emergency_clear() {
        assert_frame(Frame::emergency_clear(), &[13, 1, 69, 1, 172]);
    }

    #[test]
    fn test_card_address_wraps() {
        let relay = Relay::new(5).unwrap();
        assert_eq!(Frame::set(259, relay), Frame::set(3, relay));
        assert_eq!(Frame::clear(256, relay).card, 0);
    }

    #[test]
    fn test_frames_sum_to_zero() {
        for card in 0..=255u32 {
            for number in 1..=9 {
                let relay = Relay::new(number).unwrap();
                for frame in [Frame::set(card, relay), Frame::clear(card, relay)] {
                    let sum = frame
                        .to_bytes()
                        .iter()
                        .fold(0u8, |acc, b| acc.wrapping_add(*b));
                    assert_eq!(sum, 0, "frame {:?} does not sum to zero", frame);
                }
            }
        }
    }

    #[test_case(0 ; "zero")]
    #[test_case(10 ; "one past broadcast")]
    #[test_case(48 ; "ascii offset")]
    #[test_case(u32::MAX ; "max")]
    fn test_relay_out_of_range(number: u32) {
        assert!(matches!(
            Relay::new(number),
            Err(Error::InvalidRelay(n)) if n == number
        ));
    }

    #[test_case(1, b'1')]
    #[test_case(8, b'8')]
    #[test_case(9, b'9')]
    fn test_relay_code(number: u32, code: u8) {
        let relay = Relay::try_from(number).unwrap();
        assert_eq!(u32::from(relay.number()), number);
        assert_eq!(relay.code(), code);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Set.to_string(), "set");
        assert_eq!(Opcode::EmergencyClear.to_string(), "emergency_clear");
    }
}
