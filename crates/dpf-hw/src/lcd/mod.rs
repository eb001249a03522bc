//! LCD display module.
//!
//! Drives the RGB565 panel of AX206-based photo frames over the vendor
//! command set carried in mass-storage style bulk transfers.

mod channel;
mod device;

pub mod framebuffer;
pub mod protocol;

pub use channel::CommandChannel;
pub use device::{DpfDevice, DEFAULT_TILE_SIZE, MAX_BRIGHTNESS};
pub use framebuffer::{Bitmap, Framebuffer, Rect};
pub use protocol::{CommandDescriptor, CommandStatus, Direction};
