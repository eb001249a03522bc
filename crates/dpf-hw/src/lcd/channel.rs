//! Command/status exchanges over the bulk endpoints.

use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::protocol::{
    CommandBlockWrapper, CommandDescriptor, CommandStatus, Direction, CSW_SIZE,
};
use crate::usb::{DeviceLink, RusbHost, UsbHost};
use crate::{Error, Result, ENDPOINT_IN, ENDPOINT_OUT, TRANSFER_TIMEOUT};

/// Serialized command channel to one panel.
///
/// The wrappers carry no request identifier, so the link is locked for the
/// whole command, data and status sequence of every exchange. There are no
/// retries: the first failed phase ends the exchange.
pub struct CommandChannel<H: UsbHost = RusbHost> {
    link: Mutex<DeviceLink<H>>,
}

impl<H: UsbHost> CommandChannel<H> {
    pub fn new(link: DeviceLink<H>) -> Self {
        Self {
            link: Mutex::new(link),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DeviceLink<H>>> {
        self.link.lock().map_err(|_| Error::ChannelPoisoned)
    }

    /// Sends `cmd` followed by an optional payload, then reads the status.
    pub fn write_exchange(
        &self,
        cmd: CommandDescriptor,
        payload: Option<&[u8]>,
    ) -> Result<CommandStatus> {
        let len = payload.map_or(0, <[u8]>::len);
        let cbw = CommandBlockWrapper::new(cmd, len as u32, Direction::Out);
        let mut link = self.lock()?;

        debug!("[WRITE] Write command to device");
        Self::send_wrapper(&mut link, &cbw)?;

        if let Some(data) = payload {
            debug!("[WRITE] Write {} data bytes to device", data.len());
            link.transfer_out(ENDPOINT_OUT, data, TRANSFER_TIMEOUT)?;
        }

        Self::read_status(&mut link)
    }

    /// Sends `cmd`, reads `len` data bytes, then reads the status.
    ///
    /// If the status phase fails after the data arrived, the data is kept in
    /// [`Error::PartialRead`].
    pub fn read_exchange(&self, cmd: CommandDescriptor, len: usize) -> Result<Vec<u8>> {
        let cbw = CommandBlockWrapper::new(cmd, len as u32, Direction::In);
        let mut link = self.lock()?;

        debug!("[READ] Write command to device");
        Self::send_wrapper(&mut link, &cbw)?;

        debug!("[READ] Read {} data bytes from device", len);
        let data = link.transfer_in(ENDPOINT_IN, len, TRANSFER_TIMEOUT)?;
        trace!("[READ] data {:02x?}", data);

        match Self::read_status(&mut link) {
            Ok(_) => Ok(data),
            Err(e) => Err(Error::PartialRead {
                data,
                source: Box::new(e),
            }),
        }
    }

    /// Closes the underlying link.
    pub fn close(&self) {
        // A poisoned link is still closed; teardown only walks owned state.
        let mut link = match self.link.lock() {
            Ok(link) => link,
            Err(poisoned) => poisoned.into_inner(),
        };
        link.close();
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|link| link.is_open()).unwrap_or(false)
    }

    fn send_wrapper(link: &mut DeviceLink<H>, cbw: &CommandBlockWrapper) -> Result<()> {
        trace!("SCSI cmd: {:02x?}", cbw.command.as_bytes());
        let buf = cbw.encode();
        trace!("SCSI command: {:02x?}", buf);
        link.transfer_out(ENDPOINT_OUT, &buf, TRANSFER_TIMEOUT)?;
        Ok(())
    }

    fn read_status(link: &mut DeviceLink<H>) -> Result<CommandStatus> {
        debug!("[ACK] Read ACK from device");
        let buf = link.transfer_in(ENDPOINT_IN, CSW_SIZE, TRANSFER_TIMEOUT)?;
        trace!("[ACK] data {:02x?}", buf);
        let status = CommandStatus::decode(&buf)?;
        if !status.is_success() {
            warn!("Device reported status {:#04x}", status.status);
        }
        Ok(status)
    }
}
