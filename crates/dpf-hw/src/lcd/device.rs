//! Panel operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use super::channel::CommandChannel;
use super::framebuffer::{Bitmap, Framebuffer};
use super::protocol::{CommandDescriptor, Property};
use crate::color::Rgb565;
use crate::usb::{DeviceLink, RusbHost, UsbHost};
use crate::{Error, Result, DPF_PID, DPF_VID};

/// Highest backlight level the panel accepts.
pub const MAX_BRIGHTNESS: u8 = 7;

/// Edge length of the square tiles used for tiled blits.
pub const DEFAULT_TILE_SIZE: u32 = 16;

/// Length of the geometry query response.
const DIMENSIONS_RESPONSE_SIZE: usize = 5;

/// USB photo frame panel.
pub struct DpfDevice<H: UsbHost = RusbHost> {
    channel: CommandChannel<H>,
    dimensions: Mutex<Option<(u16, u16)>>,
}

impl DpfDevice<RusbHost> {
    /// Opens the panel with the default identifiers.
    pub fn open() -> Result<Self> {
        Self::open_with_ids(DPF_VID, DPF_PID)
    }

    /// Opens a panel that enumerates with non-default identifiers.
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self> {
        Ok(Self::from_link(DeviceLink::open(RusbHost, vid, pid)?))
    }
}

impl<H: UsbHost> DpfDevice<H> {
    pub fn from_link(link: DeviceLink<H>) -> Self {
        Self {
            channel: CommandChannel::new(link),
            dimensions: Mutex::new(None),
        }
    }

    /// Queries the panel size in pixels and refreshes the cached value.
    pub fn get_dimensions(&self) -> Result<(u16, u16)> {
        let data = self
            .channel
            .read_exchange(CommandDescriptor::dimensions(), DIMENSIONS_RESPONSE_SIZE)?;
        let width = u16::from_le_bytes([data[0], data[1]]);
        let height = u16::from_le_bytes([data[2], data[3]]);
        debug!("LCD dimensions: {}x{}", width, height);
        *self.dimensions.lock().map_err(|_| Error::ChannelPoisoned)? = Some((width, height));
        Ok((width, height))
    }

    /// Panel size from the last query, querying the panel if there was none.
    pub fn dimensions(&self) -> Result<(u16, u16)> {
        let cached = *self.dimensions.lock().map_err(|_| Error::ChannelPoisoned)?;
        match cached {
            Some(dims) => Ok(dims),
            None => self.get_dimensions(),
        }
    }

    /// Sets the backlight. Levels outside 0-7 are clamped.
    pub fn set_brightness(&self, level: i32) -> Result<()> {
        let level = level.clamp(0, MAX_BRIGHTNESS as i32) as u16;
        self.channel
            .write_exchange(CommandDescriptor::set_property(Property::Brightness, level), None)?;
        info!("Brightness set to {}", level);
        Ok(())
    }

    /// Sends the pixels of `fb` to the same rectangle on screen.
    pub fn blit<B: AsRef<[u8]>>(&self, fb: &Framebuffer<B>) -> Result<()> {
        let rect = fb.rect();
        if rect.is_empty() {
            debug!("Skipping blit of empty region");
            return Ok(());
        }
        let payload = fb.export_bytes();
        self.channel
            .write_exchange(CommandDescriptor::blit(rect), Some(&*payload))?;
        debug!(
            "Blit at ({}, {}) {}x{}",
            rect.min_x,
            rect.min_y,
            rect.width(),
            rect.height()
        );
        Ok(())
    }

    /// Blits `fb` in square tiles of `tile` pixels, checking `running`
    /// before each tile. Returns the number of tiles actually sent; empty
    /// tiles produce no exchange and are not counted.
    ///
    /// Clearing `running` stops the sequence between tiles; a tile already
    /// in flight always completes.
    pub fn blit_tiled<B: AsRef<[u8]>>(
        &self,
        fb: &Framebuffer<B>,
        tile: u32,
        running: &AtomicBool,
    ) -> Result<usize> {
        let mut sent = 0;
        for rect in fb.rect().tiles(tile, tile) {
            if !running.load(Ordering::Relaxed) {
                debug!("Tiled blit stopped after {} tiles", sent);
                break;
            }
            let view = fb.sub_view(rect);
            if view.is_empty() {
                continue;
            }
            self.blit(&view)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Converts an image to the panel format and blits it tile by tile.
    pub fn show<I: Bitmap + ?Sized>(
        &self,
        image: &I,
        tile: u32,
        running: &AtomicBool,
    ) -> Result<usize> {
        let fb = Framebuffer::convert_from(image);
        self.blit_tiled(&fb, tile, running)
    }

    /// Fills the whole panel with a solid color.
    pub fn clear(&self, color: Rgb565) -> Result<()> {
        let (width, height) = self.dimensions()?;
        let mut fb = Framebuffer::with_dimensions(width, height);
        fb.fill(color);
        self.blit_tiled(&fb, DEFAULT_TILE_SIZE, &AtomicBool::new(true))?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Closes the connection. Also happens on drop.
    pub fn close(&self) {
        self.channel.close();
    }
}
