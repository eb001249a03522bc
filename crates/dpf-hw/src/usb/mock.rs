//! Scripted USB host for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::UsbHost;
use crate::lcd::protocol::{CBW_TAG, CSW_SIGNATURE, CSW_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Open(u16, u16),
    AutoDetach(bool),
    Claim(u8),
    Release(u8),
    CloseHandle,
    Exit,
    Write(u8, Vec<u8>),
    Read(u8, usize),
}

pub struct MockState {
    pub calls: Vec<Call>,
    pub device_present: bool,
    pub init_error: Option<rusb::Error>,
    pub claim_error: Option<rusb::Error>,
    pub write_results: VecDeque<rusb::Result<usize>>,
    pub reads: VecDeque<rusb::Result<Vec<u8>>>,
}

/// Records every call and replays queued responses. Reads with nothing
/// queued time out; writes with nothing queued succeed in full.
#[derive(Clone)]
pub struct MockHost {
    inner: Arc<Mutex<MockState>>,
}

pub struct MockHandle;

impl MockHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                calls: Vec::new(),
                device_present: true,
                init_error: None,
                claim_error: None,
                write_results: VecDeque::new(),
                reads: VecDeque::new(),
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Payloads written to the OUT endpoint, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(_, data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn queue_write_result(&self, result: rusb::Result<usize>) {
        self.state().write_results.push_back(result);
    }

    pub fn queue_read(&self, data: Vec<u8>) {
        self.state().reads.push_back(Ok(data));
    }

    pub fn queue_read_error(&self, err: rusb::Error) {
        self.state().reads.push_back(Err(err));
    }

    /// Queues a well-formed status wrapper.
    pub fn queue_ack(&self, status: u8) {
        let mut csw = vec![0u8; CSW_SIZE];
        csw[0..4].copy_from_slice(&CSW_SIGNATURE);
        csw[4..8].copy_from_slice(&CBW_TAG);
        csw[12] = status;
        self.queue_read(csw);
    }
}

impl UsbHost for MockHost {
    type Context = ();
    type Handle = MockHandle;

    fn init_context(&mut self) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Init);
        match state.init_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn open_by_vid_pid(&mut self, _ctx: &(), vid: u16, pid: u16) -> Option<MockHandle> {
        let mut state = self.state();
        state.calls.push(Call::Open(vid, pid));
        state.device_present.then_some(MockHandle)
    }

    fn set_auto_detach_kernel_driver(
        &mut self,
        _handle: &mut MockHandle,
        enable: bool,
    ) -> rusb::Result<()> {
        self.state().calls.push(Call::AutoDetach(enable));
        Ok(())
    }

    fn claim_interface(&mut self, _handle: &mut MockHandle, interface: u8) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Claim(interface));
        match state.claim_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release_interface(&mut self, _handle: &mut MockHandle, interface: u8) -> rusb::Result<()> {
        self.state().calls.push(Call::Release(interface));
        Ok(())
    }

    fn close_handle(&mut self, _handle: MockHandle) {
        self.state().calls.push(Call::CloseHandle);
    }

    fn exit_context(&mut self, _ctx: ()) {
        self.state().calls.push(Call::Exit);
    }

    fn write_bulk(
        &mut self,
        _handle: &mut MockHandle,
        endpoint: u8,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state();
        state.calls.push(Call::Write(endpoint, buf.to_vec()));
        state.write_results.pop_front().unwrap_or(Ok(buf.len()))
    }

    fn read_bulk(
        &mut self,
        _handle: &mut MockHandle,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state();
        state.calls.push(Call::Read(endpoint, buf.len()));
        let data = state.reads.pop_front().unwrap_or(Err(rusb::Error::Timeout))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}
