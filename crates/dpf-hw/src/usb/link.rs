//! Connection lifecycle for one panel.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{RusbHost, UsbHost};
use crate::error::TransferFault;
use crate::lcd::protocol::Direction;
use crate::{Error, Result, DPF_INTERFACE, DPF_PID, DPF_VID};

/// Resources held by a link. Each variant owns exactly what has been
/// acquired so far, so teardown can never touch something that was not.
enum LinkState<C, D> {
    Unopened,
    ContextReady(C),
    DeviceOpened(C, D),
    InterfaceClaimed(C, D),
    Closed,
}

/// Observable lifecycle phase of a [`DeviceLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Unopened,
    ContextReady,
    DeviceOpened,
    InterfaceClaimed,
    Closed,
}

impl<C, D> LinkState<C, D> {
    fn phase(&self) -> LinkPhase {
        match self {
            LinkState::Unopened => LinkPhase::Unopened,
            LinkState::ContextReady(_) => LinkPhase::ContextReady,
            LinkState::DeviceOpened(..) => LinkPhase::DeviceOpened,
            LinkState::InterfaceClaimed(..) => LinkPhase::InterfaceClaimed,
            LinkState::Closed => LinkPhase::Closed,
        }
    }
}

/// An open connection to one panel with its interface claimed.
///
/// The link is closed when dropped; [`DeviceLink::close`] may also be called
/// explicitly and any number of times.
pub struct DeviceLink<H: UsbHost = RusbHost> {
    host: H,
    state: LinkState<H::Context, H::Handle>,
    vid: u16,
    pid: u16,
}

impl DeviceLink<RusbHost> {
    /// Opens the panel with the default identifiers through libusb.
    pub fn open_default() -> Result<Self> {
        Self::open(RusbHost, DPF_VID, DPF_PID)
    }
}

impl<H: UsbHost> DeviceLink<H> {
    /// Initializes the host context, opens the first matching device and
    /// claims the panel interface.
    ///
    /// On failure everything acquired so far is released before the error is
    /// returned.
    pub fn open(mut host: H, vid: u16, pid: u16) -> Result<Self> {
        match Self::acquire(&mut host, vid, pid) {
            Ok(state) => {
                info!(
                    "DPF device opened (VID:{:04X} PID:{:04X}, interface={})",
                    vid, pid, DPF_INTERFACE
                );
                Ok(Self {
                    host,
                    state,
                    vid,
                    pid,
                })
            }
            Err((state, err)) => {
                debug!("Open failed in phase {:?}: {}", state.phase(), err);
                let mut link = Self {
                    host,
                    state,
                    vid,
                    pid,
                };
                link.close();
                Err(err)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn acquire(
        host: &mut H,
        vid: u16,
        pid: u16,
    ) -> std::result::Result<LinkState<H::Context, H::Handle>, (LinkState<H::Context, H::Handle>, Error)>
    {
        let ctx = host
            .init_context()
            .map_err(|e| (LinkState::Unopened, Error::Usb(e)))?;

        let Some(mut handle) = host.open_by_vid_pid(&ctx, vid, pid) else {
            return Err((
                LinkState::ContextReady(ctx),
                Error::DeviceNotFound { vid, pid },
            ));
        };

        // Not supported on every platform; the claim below reports the
        // real failure if a kernel driver stays attached.
        if let Err(e) = host.set_auto_detach_kernel_driver(&mut handle, true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }

        if let Err(source) = host.claim_interface(&mut handle, DPF_INTERFACE) {
            return Err((
                LinkState::DeviceOpened(ctx, handle),
                Error::InterfaceClaimFailed {
                    interface: DPF_INTERFACE,
                    source,
                },
            ));
        }

        Ok(LinkState::InterfaceClaimed(ctx, handle))
    }

    /// Releases the interface, closes the handle and exits the context,
    /// skipping whatever was never acquired. Never fails.
    pub fn close(&mut self) {
        let mut state = std::mem::replace(&mut self.state, LinkState::Closed);
        let was_open = state.phase() == LinkPhase::InterfaceClaimed;
        loop {
            state = match state {
                LinkState::InterfaceClaimed(ctx, mut handle) => {
                    if let Err(e) = self.host.release_interface(&mut handle, DPF_INTERFACE) {
                        warn!("Failed to release interface {}: {}", DPF_INTERFACE, e);
                    }
                    LinkState::DeviceOpened(ctx, handle)
                }
                LinkState::DeviceOpened(ctx, handle) => {
                    self.host.close_handle(handle);
                    LinkState::ContextReady(ctx)
                }
                LinkState::ContextReady(ctx) => {
                    self.host.exit_context(ctx);
                    LinkState::Unopened
                }
                LinkState::Unopened | LinkState::Closed => break,
            };
        }
        if was_open {
            info!("DPF device closed ({:04X}:{:04X})", self.vid, self.pid);
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.state.phase()
    }

    pub fn is_open(&self) -> bool {
        self.phase() == LinkPhase::InterfaceClaimed
    }

    /// Writes `buf` to a bulk OUT endpoint. Anything short of the full
    /// buffer is a failure.
    pub fn transfer_out(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize> {
        let LinkState::InterfaceClaimed(_, handle) = &mut self.state else {
            return Err(Error::NotOpen);
        };
        let fail = |cause: TransferFault| Error::TransferFailed {
            direction: Direction::Out,
            endpoint,
            requested: buf.len(),
            cause,
        };
        let written = self
            .host
            .write_bulk(handle, endpoint, buf, timeout)
            .map_err(|e| fail(e.into()))?;
        if written < buf.len() {
            return Err(fail(TransferFault::Short { actual: written }));
        }
        Ok(written)
    }

    /// Reads exactly `len` bytes from a bulk IN endpoint.
    pub fn transfer_in(&mut self, endpoint: u8, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let LinkState::InterfaceClaimed(_, handle) = &mut self.state else {
            return Err(Error::NotOpen);
        };
        let fail = |cause: TransferFault| Error::TransferFailed {
            direction: Direction::In,
            endpoint,
            requested: len,
            cause,
        };
        let mut buf = vec![0u8; len];
        let read = self
            .host
            .read_bulk(handle, endpoint, &mut buf, timeout)
            .map_err(|e| fail(e.into()))?;
        if read < len {
            return Err(fail(TransferFault::Short { actual: read }));
        }
        Ok(buf)
    }
}

impl<H: UsbHost> Drop for DeviceLink<H> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<H: UsbHost> fmt::Debug for DeviceLink<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink")
            .field("vid", &format_args!("{:04x}", self.vid))
            .field("pid", &format_args!("{:04x}", self.pid))
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{Call, MockHost};
    use crate::{ENDPOINT_IN, ENDPOINT_OUT, TRANSFER_TIMEOUT};

    #[test]
    fn test_open_and_close() {
        let host = MockHost::new();
        let mut link = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap();
        assert!(link.is_open());
        link.close();
        assert_eq!(link.phase(), LinkPhase::Closed);
        assert_eq!(
            host.calls(),
            vec![
                Call::Init,
                Call::Open(DPF_VID, DPF_PID),
                Call::AutoDetach(true),
                Call::Claim(DPF_INTERFACE),
                Call::Release(DPF_INTERFACE),
                Call::CloseHandle,
                Call::Exit,
            ]
        );
    }

    #[test]
    fn test_close_is_idempotent() {
        let host = MockHost::new();
        let mut link = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap();
        link.close();
        let after_first = host.calls().len();
        link.close();
        drop(link);
        assert_eq!(host.calls().len(), after_first);
    }

    #[test]
    fn test_drop_closes() {
        let host = MockHost::new();
        let link = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap();
        drop(link);
        assert_eq!(host.calls().last(), Some(&Call::Exit));
    }

    #[test]
    fn test_missing_device_releases_context() {
        let host = MockHost::new();
        host.state().device_present = false;
        let err = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { vid: DPF_VID, pid: DPF_PID }));
        assert!(err.to_string().contains("permission"));
        assert_eq!(
            host.calls(),
            vec![Call::Init, Call::Open(DPF_VID, DPF_PID), Call::Exit]
        );
    }

    #[test]
    fn test_claim_failure_closes_handle() {
        let host = MockHost::new();
        host.state().claim_error = Some(rusb::Error::Busy);
        let err = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap_err();
        assert!(matches!(
            err,
            Error::InterfaceClaimFailed {
                interface: 0,
                source: rusb::Error::Busy
            }
        ));
        let calls = host.calls();
        assert!(!calls.contains(&Call::Release(DPF_INTERFACE)));
        assert_eq!(&calls[calls.len() - 2..], &[Call::CloseHandle, Call::Exit]);
    }

    #[test]
    fn test_init_failure_touches_nothing() {
        let host = MockHost::new();
        host.state().init_error = Some(rusb::Error::NoMem);
        let err = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap_err();
        assert!(matches!(err, Error::Usb(rusb::Error::NoMem)));
        assert_eq!(host.calls(), vec![Call::Init]);
    }

    #[test]
    fn test_transfer_after_close() {
        let host = MockHost::new();
        let mut link = DeviceLink::open(host, DPF_VID, DPF_PID).unwrap();
        link.close();
        assert!(matches!(
            link.transfer_out(ENDPOINT_OUT, &[1, 2, 3], TRANSFER_TIMEOUT),
            Err(Error::NotOpen)
        ));
    }

    #[test]
    fn test_transfer_failures_carry_direction() {
        let host = MockHost::new();
        let mut link = DeviceLink::open(host.clone(), DPF_VID, DPF_PID).unwrap();

        host.queue_write_result(Err(rusb::Error::Timeout));
        match link.transfer_out(ENDPOINT_OUT, &[0; 8], TRANSFER_TIMEOUT) {
            Err(Error::TransferFailed {
                direction: Direction::Out,
                endpoint: ENDPOINT_OUT,
                requested: 8,
                cause: TransferFault::Usb(rusb::Error::Timeout),
            }) => {}
            other => panic!("unexpected: {:?}", other),
        }

        host.queue_write_result(Ok(3));
        match link.transfer_out(ENDPOINT_OUT, &[0; 8], TRANSFER_TIMEOUT) {
            Err(Error::TransferFailed {
                cause: TransferFault::Short { actual: 3 },
                ..
            }) => {}
            other => panic!("unexpected: {:?}", other),
        }

        host.queue_read(vec![1, 2]);
        match link.transfer_in(ENDPOINT_IN, 5, TRANSFER_TIMEOUT) {
            Err(Error::TransferFailed {
                direction: Direction::In,
                endpoint: ENDPOINT_IN,
                requested: 5,
                cause: TransferFault::Short { actual: 2 },
            }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    #[ignore]
    fn test_device_open() {
        let link = DeviceLink::open_default();
        assert!(link.is_ok());
    }
}
