//! DPF Panel Hardware Library
//!
//! Drives the LCD of hacked AX206 USB photo frames: the vendor command
//! protocol over raw bulk endpoints and the panel's native RGB565 pixel
//! format.

use std::time::Duration;

pub mod color;
pub mod error;
pub mod lcd;
pub mod usb;

pub use color::{parse_hex_color, Color, Rgb565, Rgba64};
pub use error::{Error, Result, TransferFault};
pub use lcd::{Bitmap, CommandChannel, DpfDevice, Framebuffer, Rect};
pub use usb::{DeviceLink, LinkPhase, RusbHost, UsbHost};

/// USB VID:PID of AX206 frames running the hacked firmware
pub const DPF_VID: u16 = 0x1908;
pub const DPF_PID: u16 = 0x0102;

/// Interface carrying the command endpoints
pub const DPF_INTERFACE: u8 = 0;

/// Bulk endpoints (host to device, device to host)
pub const ENDPOINT_OUT: u8 = 0x01;
pub const ENDPOINT_IN: u8 = 0x81;

/// Timeout applied to every bulk transfer
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);
