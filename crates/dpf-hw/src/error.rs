//! Error types for the DPF hardware library.

use thiserror::Error;

use crate::lcd::protocol::Direction;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single bulk transfer did not complete.
#[derive(Error, Debug)]
pub enum TransferFault {
    /// libusb reported an I/O failure or the timeout expired.
    #[error("{0}")]
    Usb(#[from] rusb::Error),

    /// The device moved fewer bytes than requested.
    #[error("short transfer, {actual} bytes moved")]
    Short { actual: usize },
}

/// Errors that can occur when interacting with the hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// No device with the given identifiers could be opened.
    #[error("failed to open device [{vid:04x}:{pid:04x}] (device missing or no permission?)")]
    DeviceNotFound { vid: u16, pid: u16 },

    /// The interface is held by another driver or process.
    #[error("can't claim interface {interface}: {source}")]
    InterfaceClaimFailed {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    /// A bulk transfer failed or moved fewer bytes than requested.
    #[error("bulk {direction} transfer on endpoint {endpoint:#04x} ({requested} bytes) failed: {cause}")]
    TransferFailed {
        direction: Direction,
        endpoint: u8,
        requested: usize,
        #[source]
        cause: TransferFault,
    },

    /// The status wrapper did not carry the `USBS` signature.
    #[error("got invalid reply from device (signature {signature:02x?})")]
    AckMismatch { signature: Vec<u8> },

    /// The data phase of a read exchange completed, a later phase did not.
    #[error("read exchange failed after {} data bytes: {source}", .data.len())]
    PartialRead {
        data: Vec<u8>,
        #[source]
        source: Box<Error>,
    },

    /// The link is not in the interface-claimed state.
    #[error("device link is not open")]
    NotOpen,

    /// A previous exchange panicked while holding the channel lock.
    #[error("command channel lock poisoned")]
    ChannelPoisoned,

    /// libusb context setup error.
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Unparseable color string.
    #[error("invalid color: {0}")]
    InvalidColor(String),
}

impl Error {
    /// Returns the error that ultimately failed the exchange, looking through
    /// [`Error::PartialRead`].
    pub fn root(&self) -> &Error {
        match self {
            Error::PartialRead { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true for bulk transfer failures, including short transfers.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self.root(), Error::TransferFailed { .. })
    }
}
