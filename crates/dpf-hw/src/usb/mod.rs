//! USB host access.
//!
//! [`UsbHost`] is the small slice of libusb the driver needs. [`RusbHost`]
//! implements it with `rusb`; tests substitute a scripted host.

mod link;
#[cfg(test)]
pub(crate) mod mock;

pub use link::{DeviceLink, LinkPhase};

use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;

/// USB host operations consumed by [`DeviceLink`].
pub trait UsbHost {
    /// Library context.
    type Context;
    /// Open device handle.
    type Handle;

    fn init_context(&mut self) -> rusb::Result<Self::Context>;

    /// Opens the first device matching the identifiers.
    fn open_by_vid_pid(&mut self, ctx: &Self::Context, vid: u16, pid: u16) -> Option<Self::Handle>;

    fn set_auto_detach_kernel_driver(
        &mut self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> rusb::Result<()>;

    fn claim_interface(&mut self, handle: &mut Self::Handle, interface: u8) -> rusb::Result<()>;

    fn release_interface(&mut self, handle: &mut Self::Handle, interface: u8) -> rusb::Result<()>;

    fn close_handle(&mut self, handle: Self::Handle);

    fn exit_context(&mut self, ctx: Self::Context);

    /// Bulk OUT transfer, returns the number of bytes written.
    fn write_bulk(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    /// Bulk IN transfer, returns the number of bytes read into `buf`.
    fn read_bulk(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;
}

/// libusb host via `rusb`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusbHost;

impl UsbHost for RusbHost {
    type Context = Context;
    type Handle = DeviceHandle<Context>;

    fn init_context(&mut self) -> rusb::Result<Context> {
        Context::new()
    }

    fn open_by_vid_pid(&mut self, ctx: &Context, vid: u16, pid: u16) -> Option<Self::Handle> {
        ctx.open_device_with_vid_pid(vid, pid)
    }

    fn set_auto_detach_kernel_driver(
        &mut self,
        handle: &mut Self::Handle,
        enable: bool,
    ) -> rusb::Result<()> {
        handle.set_auto_detach_kernel_driver(enable)
    }

    fn claim_interface(&mut self, handle: &mut Self::Handle, interface: u8) -> rusb::Result<()> {
        handle.claim_interface(interface)
    }

    fn release_interface(&mut self, handle: &mut Self::Handle, interface: u8) -> rusb::Result<()> {
        handle.release_interface(interface)
    }

    fn close_handle(&mut self, handle: Self::Handle) {
        drop(handle);
    }

    fn exit_context(&mut self, ctx: Context) {
        drop(ctx);
    }

    fn write_bulk(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        handle.write_bulk(endpoint, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        handle.read_bulk(endpoint, buf, timeout)
    }
}
