//! Common test utilities for the exchange tests.
//!
//! Provides `ScriptedTransport`, an in-memory stand-in for the kernel side
//! of a netlink socket, a multiplexer that accepts everything, and frame
//! builders for the replies a kernel would send.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::os::unix::io::{AsRawFd, RawFd};

use nlexchange::netlink::{
    Multiplexer, NLMSG_HDRLEN, NlMsgHdr, NlMsgType, Received, Transport, message::nlmsg_align,
};
use tokio::io::Interest;

/// Transport that replays queued datagrams and records what was written.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub replies: VecDeque<Vec<u8>>,
    pub written: Vec<Vec<u8>>,
    pub peeks: usize,
    pub reads: usize,
}

impl ScriptedTransport {
    pub fn reply(&mut self, datagram: Vec<u8>) {
        self.replies.push_back(datagram);
    }
}

impl AsRawFd for ScriptedTransport {
    fn as_raw_fd(&self) -> RawFd {
        100
    }
}

impl Transport for ScriptedTransport {
    fn port_id(&self) -> u32 {
        1234
    }

    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let datagram: Vec<u8> = bufs.iter().flat_map(|b| b.iter().copied()).collect();
        let len = datagram.len();
        self.written.push(datagram);
        Ok(len)
    }

    fn recv(&mut self, buf: &mut [u8], peek: bool) -> io::Result<Received> {
        let Some(datagram) = self.replies.front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        let truncated = datagram.len() > buf.len();
        if peek {
            self.peeks += 1;
        } else {
            self.reads += 1;
            self.replies.pop_front();
        }
        Ok(Received { len, truncated })
    }

    fn add_membership(&mut self, _group: u32) -> io::Result<()> {
        Ok(())
    }

    fn drop_membership(&mut self, _group: u32) -> io::Result<()> {
        Ok(())
    }
}

/// Multiplexer that accepts every registration.
#[derive(Debug, Default)]
pub struct NullMux {
    pub registered: bool,
    pub write_interest: bool,
}

impl Multiplexer for NullMux {
    fn register(&mut self, _fd: RawFd, interest: Interest) -> io::Result<()> {
        self.registered = true;
        self.write_interest = interest.is_writable();
        Ok(())
    }

    fn set_write_interest(&mut self, _fd: RawFd, enabled: bool) {
        self.write_interest = enabled;
    }

    fn unregister(&mut self, _fd: RawFd) {
        self.registered = false;
    }
}

pub fn frame(msg_type: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut header = NlMsgHdr::new(msg_type, 0);
    header.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
    header.nlmsg_seq = seq;
    let mut out = header.as_bytes().to_vec();
    out.extend_from_slice(payload);
    out.resize(nlmsg_align(out.len()), 0);
    out
}

pub fn done(seq: u32) -> Vec<u8> {
    frame(NlMsgType::DONE, seq, &0i32.to_ne_bytes())
}

/// Error frame for `seq`; `error` is a negative errno or 0 for an ACK.
pub fn error(seq: u32, error: i32) -> Vec<u8> {
    let mut echoed = NlMsgHdr::new(NlMsgType::RTM_NEWLINK, 0);
    echoed.nlmsg_len = NLMSG_HDRLEN as u32;
    echoed.nlmsg_seq = seq;
    let mut payload = error.to_ne_bytes().to_vec();
    payload.extend_from_slice(echoed.as_bytes());
    frame(NlMsgType::ERROR, seq, &payload)
}
