//! In-memory doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

use tokio::io::Interest;

use super::listener::ExchangeListener;
use super::message::{Frame, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, nlmsg_align};
use super::mux::Multiplexer;
use super::socket::{Received, Transport};

/// Transport fed from a queue of datagrams.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    /// (buffer length, peek) of every recv call.
    pub recv_calls: Vec<(usize, bool)>,
    pub send_error: Option<i32>,
    pub recv_error: Option<i32>,
    pub groups: Vec<u32>,
    pub fail_group: Option<u32>,
}

impl MockTransport {
    pub const FD: RawFd = 42;
    pub const PORT_ID: u32 = 4242;
}

impl AsRawFd for MockTransport {
    fn as_raw_fd(&self) -> RawFd {
        Self::FD
    }
}

impl Transport for MockTransport {
    fn port_id(&self) -> u32 {
        Self::PORT_ID
    }

    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        if let Some(errno) = self.send_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        let datagram: Vec<u8> = bufs.iter().flat_map(|b| b.iter().copied()).collect();
        let len = datagram.len();
        self.sent.push(datagram);
        Ok(len)
    }

    fn recv(&mut self, buf: &mut [u8], peek: bool) -> io::Result<Received> {
        self.recv_calls.push((buf.len(), peek));
        if let Some(errno) = self.recv_error {
            return Err(io::Error::from_raw_os_error(errno));
        }
        let Some(datagram) = self.inbound.front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        let truncated = datagram.len() > buf.len();
        if !peek {
            self.inbound.pop_front();
        }
        Ok(Received { len, truncated })
    }

    fn add_membership(&mut self, group: u32) -> io::Result<()> {
        if self.fail_group == Some(group) {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        self.groups.push(group);
        Ok(())
    }

    fn drop_membership(&mut self, group: u32) -> io::Result<()> {
        if self.fail_group == Some(group) {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        self.groups.retain(|&g| g != group);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MuxCall {
    /// fd, readable, writable
    Register(RawFd, bool, bool),
    WriteInterest(RawFd, bool),
    Unregister(RawFd),
}

/// Multiplexer that records its calls; clones share the record.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingMux {
    calls: Rc<RefCell<Vec<MuxCall>>>,
    fail: bool,
}

impl RecordingMux {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.calls.borrow().clone()
    }
}

impl Multiplexer for RecordingMux {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        self.calls.borrow_mut().push(MuxCall::Register(
            fd,
            interest.is_readable(),
            interest.is_writable(),
        ));
        Ok(())
    }

    fn set_write_interest(&mut self, fd: RawFd, enabled: bool) {
        self.calls
            .borrow_mut()
            .push(MuxCall::WriteInterest(fd, enabled));
    }

    fn unregister(&mut self, fd: RawFd) {
        self.calls.borrow_mut().push(MuxCall::Unregister(fd));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    /// type, seq, payload
    Message(u16, u32, Vec<u8>),
    Done(u32),
    Error(u32, i32),
    Timeout,
}

#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub events: Vec<Event>,
}

impl ExchangeListener for Recorder {
    fn on_message(&mut self, frame: Frame<'_>) {
        let header = frame.header();
        self.events.push(Event::Message(
            header.nlmsg_type,
            header.nlmsg_seq,
            frame.payload().to_vec(),
        ));
    }

    fn on_done(&mut self, seq: u32) {
        self.events.push(Event::Done(seq));
    }

    fn on_error(&mut self, seq: u32, errno: i32) {
        self.events.push(Event::Error(seq, errno));
    }

    fn on_timeout(&mut self) {
        self.events.push(Event::Timeout);
    }
}

/// One aligned frame.
pub(crate) fn data_frame(msg_type: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut header = NlMsgHdr::new(msg_type, 0);
    header.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
    header.nlmsg_seq = seq;
    let mut out = header.as_bytes().to_vec();
    out.extend_from_slice(payload);
    out.resize(nlmsg_align(out.len()), 0);
    out
}

pub(crate) fn done_frame(seq: u32) -> Vec<u8> {
    data_frame(NlMsgType::DONE, seq, &0i32.to_ne_bytes())
}

/// Error frame answering request `seq` with `error` (negative errno or 0).
pub(crate) fn ack(seq: u32, error: i32) -> Vec<u8> {
    let mut echoed = NlMsgHdr::new(NlMsgType::RTM_GETLINK, 0);
    echoed.nlmsg_len = NLMSG_HDRLEN as u32;
    echoed.nlmsg_seq = seq;
    let mut payload = error.to_ne_bytes().to_vec();
    payload.extend_from_slice(echoed.as_bytes());
    data_frame(NlMsgType::ERROR, seq, &payload)
}
