//! LCD protocol definitions and encoding.
//!
//! Every exchange is wrapped the way USB mass storage wraps SCSI commands:
//! - Command Block Wrapper (31 bytes, host to device): `USBC` signature, tag,
//!   LE data-phase length, direction flags, LUN, command length, then a
//!   16-byte command block holding the vendor command.
//! - Optional data phase in the direction given by the flags.
//! - Command Status Wrapper (13 bytes, device to host): `USBS` signature,
//!   echoed tag, LE residue, status byte.

use std::fmt;

use super::framebuffer::Rect;
use crate::{Error, Result};

/// CBW signature bytes.
pub const CBW_SIGNATURE: [u8; 4] = *b"USBC";

/// CSW signature bytes.
pub const CSW_SIGNATURE: [u8; 4] = *b"USBS";

/// Fixed CBW tag. The protocol is strictly synchronous so the tag is never
/// used to correlate replies.
pub const CBW_TAG: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Total CBW size.
pub const CBW_SIZE: usize = 31;

/// Offset of the command block inside the CBW.
pub const CBW_COMMAND_OFFSET: usize = 15;

/// Size of the command block field.
pub const COMMAND_SIZE: usize = 16;

/// Total CSW size.
pub const CSW_SIZE: usize = 13;

/// Vendor passthrough block the command is written over.
const VENDOR_PREFIX: [u8; COMMAND_SIZE] = [
    0xcd, 0x00, 0x00, 0x00, 0x00, 0x06, 0x11, 0xf8, 0x70, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Leading byte of every vendor command.
const VENDOR_OPCODE: u8 = 0xcd;

/// Data phase direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device (or no data phase).
    Out,
    /// Device to host.
    In,
}

impl Direction {
    /// `bmCBWFlags` value.
    pub fn flags(self) -> u8 {
        match self {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
        }
    }
}

/// Vendor sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Set a device property.
    SetProperty = 0x01,
    /// Blit pixels to a screen rectangle.
    Blit = 0x12,
}

/// Device properties for [`Command::SetProperty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Property {
    /// Backlight level, 0-7.
    Brightness = 1,
}

/// A vendor command block, at most [`COMMAND_SIZE`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    bytes: [u8; COMMAND_SIZE],
    len: usize,
}

impl CommandDescriptor {
    /// Copies a raw command. Bytes beyond [`COMMAND_SIZE`] do not fit in the
    /// wrapper and are dropped.
    pub fn from_slice(cmd: &[u8]) -> Self {
        let len = cmd.len().min(COMMAND_SIZE);
        let mut bytes = [0u8; COMMAND_SIZE];
        bytes[..len].copy_from_slice(&cmd[..len]);
        Self { bytes, len }
    }

    /// Panel geometry query, answered with 5 bytes.
    pub fn dimensions() -> Self {
        let mut bytes = [0u8; COMMAND_SIZE];
        bytes[0] = VENDOR_OPCODE;
        bytes[5] = 0x02;
        Self::from_slice(&bytes)
    }

    /// Sets `property` to `value`.
    pub fn set_property(property: Property, value: u16) -> Self {
        let mut bytes = Self::vendor(Command::SetProperty);
        bytes[7..9].copy_from_slice(&(property as u16).to_le_bytes());
        bytes[9..11].copy_from_slice(&value.to_le_bytes());
        Self::from_slice(&bytes)
    }

    /// Blit header for `rect`. Bounds are sent inclusive.
    pub fn blit(rect: Rect) -> Self {
        let mut bytes = Self::vendor(Command::Blit);
        let coords = [rect.min_x, rect.min_y, rect.max_x - 1, rect.max_y - 1];
        for (i, v) in coords.into_iter().enumerate() {
            let at = 7 + i * 2;
            bytes[at..at + 2].copy_from_slice(&(v as u16).to_le_bytes());
        }
        Self::from_slice(&bytes)
    }

    fn vendor(command: Command) -> [u8; COMMAND_SIZE] {
        let mut bytes = [0u8; COMMAND_SIZE];
        bytes[0] = VENDOR_OPCODE;
        bytes[5] = 0x06;
        bytes[6] = command as u8;
        bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Command Block Wrapper sent on the OUT endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandBlockWrapper {
    pub command: CommandDescriptor,
    /// Byte count of the data phase that follows.
    pub transfer_length: u32,
    pub direction: Direction,
}

impl CommandBlockWrapper {
    pub fn new(command: CommandDescriptor, transfer_length: u32, direction: Direction) -> Self {
        Self {
            command,
            transfer_length,
            direction,
        }
    }

    /// Serializes the wrapper.
    pub fn encode(&self) -> [u8; CBW_SIZE] {
        let mut buf = [0u8; CBW_SIZE];
        buf[0..4].copy_from_slice(&CBW_SIGNATURE);
        buf[4..8].copy_from_slice(&CBW_TAG);
        buf[8..12].copy_from_slice(&self.transfer_length.to_le_bytes());
        buf[12] = self.direction.flags();
        buf[13] = 0x00; // LUN
        let cmd = self.command.as_bytes();
        buf[14] = cmd.len() as u8;
        buf[CBW_COMMAND_OFFSET..].copy_from_slice(&VENDOR_PREFIX);
        buf[CBW_COMMAND_OFFSET..CBW_COMMAND_OFFSET + cmd.len()].copy_from_slice(cmd);
        buf
    }
}

/// Decoded Command Status Wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub tag: [u8; 4],
    /// Data-phase bytes the device did not process.
    pub residue: u32,
    /// Device-reported return code, 0 on success.
    pub status: u8,
}

impl CommandStatus {
    /// Parses a status wrapper, rejecting anything without the `USBS`
    /// signature.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CSW_SIZE || buf[0..4] != CSW_SIGNATURE {
            return Err(Error::AckMismatch {
                signature: buf[..buf.len().min(4)].to_vec(),
            });
        }
        Ok(Self {
            tag: [buf[4], buf[5], buf[6], buf[7]],
            residue: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            status: buf[12],
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_wrapper() {
        let cbw = CommandBlockWrapper::new(CommandDescriptor::dimensions(), 5, Direction::In);
        let expected: [u8; CBW_SIZE] = [
            0x55, 0x53, 0x42, 0x43, // USBC
            0xde, 0xad, 0xbe, 0xef, // tag
            0x05, 0x00, 0x00, 0x00, // length
            0x80, 0x00, 0x10, // flags, LUN, command length
            0xcd, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        assert_eq!(cbw.encode(), expected);
    }

    #[test]
    fn test_write_wrapper_length() {
        let cmd = CommandDescriptor::blit(Rect::new(0, 0, 16, 16));
        let cbw = CommandBlockWrapper::new(cmd, 512, Direction::Out).encode();
        assert_eq!(&cbw[8..12], &[0x00, 0x02, 0x00, 0x00]);
        assert_eq!(cbw[12], 0x00);
    }

    #[test]
    fn test_short_command_keeps_vendor_tail() {
        let cmd = CommandDescriptor::from_slice(&[0xaa, 0xbb]);
        let cbw = CommandBlockWrapper::new(cmd, 0, Direction::Out).encode();
        assert_eq!(cbw[14], 2);
        assert_eq!(&cbw[15..17], &[0xaa, 0xbb]);
        assert_eq!(&cbw[17..], &VENDOR_PREFIX[2..]);
    }

    #[test]
    fn test_long_command_is_truncated() {
        let cmd = CommandDescriptor::from_slice(&[0x11; 20]);
        assert_eq!(cmd.as_bytes().len(), COMMAND_SIZE);
        let cbw = CommandBlockWrapper::new(cmd, 0, Direction::Out).encode();
        assert_eq!(cbw[14], 16);
    }

    #[test]
    fn test_set_property_command() {
        let cmd = CommandDescriptor::set_property(Property::Brightness, 0x0105);
        assert_eq!(
            cmd.as_bytes(),
            &[0xcd, 0, 0, 0, 0, 6, 0x01, 0x01, 0x00, 0x05, 0x01, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_blit_command_inclusive_bounds() {
        let cmd = CommandDescriptor::blit(Rect::new(16, 32, 272, 320));
        assert_eq!(
            cmd.as_bytes(),
            &[0xcd, 0, 0, 0, 0, 6, 0x12, 16, 0, 32, 0, 0x0f, 0x01, 0x3f, 0x01, 0]
        );
    }

    #[test]
    fn test_status_decode() {
        let csw = [
            b'U', b'S', b'B', b'S', 0xde, 0xad, 0xbe, 0xef, 0x04, 0, 0, 0, 0x01,
        ];
        let status = CommandStatus::decode(&csw).unwrap();
        assert_eq!(status.tag, CBW_TAG);
        assert_eq!(status.residue, 4);
        assert_eq!(status.status, 1);
        assert!(!status.is_success());
    }

    #[test]
    fn test_status_bad_signature() {
        let csw = [b'U', b'S', b'B', b'C', 0, 0, 0, 0, 0, 0, 0, 0, 0];
        match CommandStatus::decode(&csw) {
            Err(Error::AckMismatch { signature }) => assert_eq!(signature, b"USBC"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            CommandStatus::decode(b"US"),
            Err(Error::AckMismatch { .. })
        ));
    }
}
