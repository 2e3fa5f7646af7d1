//! Non-blocking netlink socket and the transport seam the handler drives.

use std::io::{self, IoSlice};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use netlink_sys::{Socket, SocketAddr, protocols};

use super::error::{Error, Result};

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Routing/device hook (ip, tc, etc.)
    Route,
    /// Generic netlink
    Generic,
    /// Netfilter
    Netfilter,
    /// Kernel connector
    Connector,
    /// Kobject uevent
    KobjectUevent,
    /// Socket diagnostics
    SockDiag,
    /// Any other protocol number.
    Other(isize),
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Route => protocols::NETLINK_ROUTE,
            Protocol::Generic => protocols::NETLINK_GENERIC,
            Protocol::Netfilter => protocols::NETLINK_NETFILTER,
            Protocol::Connector => protocols::NETLINK_CONNECTOR,
            Protocol::KobjectUevent => protocols::NETLINK_KOBJECT_UEVENT,
            Protocol::SockDiag => protocols::NETLINK_SOCK_DIAG,
            Protocol::Other(id) => id,
        }
    }
}

/// Outcome of one `recvmsg` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Bytes returned by the kernel.
    pub len: usize,
    /// The datagram did not fit the buffer (`MSG_TRUNC` in the returned flags).
    pub truncated: bool,
}

/// Datagram socket operations the handler needs.
///
/// [`NetlinkSocket`] is the production implementation. All calls must be
/// non-blocking and report `WouldBlock` instead of waiting.
pub trait Transport: AsRawFd {
    /// Local port id assigned by the kernel.
    fn port_id(&self) -> u32;

    /// Write all slices as one datagram.
    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Read the next datagram into `buf`, leaving it queued when `peek` is set.
    fn recv(&mut self, buf: &mut [u8], peek: bool) -> io::Result<Received>;

    /// Join a multicast group.
    fn add_membership(&mut self, group: u32) -> io::Result<()>;

    /// Leave a multicast group.
    fn drop_membership(&mut self, group: u32) -> io::Result<()>;
}

/// Non-blocking netlink socket bound to a kernel-assigned port.
pub struct NetlinkSocket {
    socket: Socket,
    /// Kernel address used for every send and as receive scratch.
    kernel: libc::sockaddr_nl,
    pid: u32,
    protocol: Protocol,
}

impl NetlinkSocket {
    /// Create, configure and bind a socket for the given protocol.
    ///
    /// A failure after the socket was created closes it again before
    /// returning.
    pub fn open(protocol: Protocol) -> Result<Self> {
        let mut socket = Socket::new(protocol.as_isize()).map_err(Error::Socket)?;
        socket.set_non_blocking(true).map_err(Error::Socket)?;

        // Port 0: the kernel assigns the endpoint identifier.
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr).map_err(Error::Bind)?;
        socket.get_address(&mut addr).map_err(Error::Bind)?;

        Ok(Self {
            socket,
            kernel: kernel_address(),
            pid: addr.port_number(),
            protocol,
        })
    }

    /// Get the protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl Transport for NetlinkSocket {
    fn port_id(&self) -> u32 {
        self.pid
    }

    fn send_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        sendmsg(self.socket.as_raw_fd(), Some(&self.kernel), bufs)
    }

    fn recv(&mut self, buf: &mut [u8], peek: bool) -> io::Result<Received> {
        recvmsg(self.socket.as_raw_fd(), Some(&mut self.kernel), buf, peek)
    }

    fn add_membership(&mut self, group: u32) -> io::Result<()> {
        self.socket.add_membership(group)
    }

    fn drop_membership(&mut self, group: u32) -> io::Result<()> {
        self.socket.drop_membership(group)
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

fn kernel_address() -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value
    // (port 0, no groups) once the family is set.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr
}

/// Scatter/gather write of `bufs` as one datagram.
pub(crate) fn sendmsg(
    fd: RawFd,
    dest: Option<&libc::sockaddr_nl>,
    bufs: &[IoSlice<'_>],
) -> io::Result<usize> {
    // SAFETY: an all-zero msghdr is a valid empty message.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    if let Some(dest) = dest {
        msg.msg_name = (dest as *const libc::sockaddr_nl).cast_mut().cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
    }
    // IoSlice is guaranteed ABI compatible with iovec on Unix.
    msg.msg_iov = bufs.as_ptr().cast_mut().cast();
    msg.msg_iovlen = bufs.len() as _;

    // SAFETY: msg points at live buffers for the duration of the call and
    // the kernel only reads through them.
    let ret = unsafe { libc::sendmsg(fd, &msg, libc::MSG_DONTWAIT) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

/// Non-blocking `recvmsg`, optionally with `MSG_PEEK`.
pub(crate) fn recvmsg(
    fd: RawFd,
    source: Option<&mut libc::sockaddr_nl>,
    buf: &mut [u8],
    peek: bool,
) -> io::Result<Received> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    // SAFETY: an all-zero msghdr is a valid empty message.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    if let Some(source) = source {
        msg.msg_name = (source as *mut libc::sockaddr_nl).cast();
        msg.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
    }
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    let mut flags = libc::MSG_DONTWAIT;
    if peek {
        flags |= libc::MSG_PEEK;
    }

    // SAFETY: iov covers exactly `buf`, which outlives the call.
    let ret = unsafe { libc::recvmsg(fd, &mut msg, flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Received {
        len: ret as usize,
        truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
    })
}

/// Multicast groups for NETLINK_ROUTE.
pub mod rtnetlink_groups {
    pub const RTNLGRP_LINK: u32 = 1;
    pub const RTNLGRP_NOTIFY: u32 = 2;
    pub const RTNLGRP_NEIGH: u32 = 3;
    pub const RTNLGRP_TC: u32 = 4;
    pub const RTNLGRP_IPV4_IFADDR: u32 = 5;
    pub const RTNLGRP_IPV4_MROUTE: u32 = 6;
    pub const RTNLGRP_IPV4_ROUTE: u32 = 7;
    pub const RTNLGRP_IPV4_RULE: u32 = 8;
    pub const RTNLGRP_IPV6_IFADDR: u32 = 9;
    pub const RTNLGRP_IPV6_MROUTE: u32 = 10;
    pub const RTNLGRP_IPV6_ROUTE: u32 = 11;
    pub const RTNLGRP_IPV6_IFINFO: u32 = 12;
    pub const RTNLGRP_IPV6_PREFIX: u32 = 18;
    pub const RTNLGRP_IPV6_RULE: u32 = 19;
    pub const RTNLGRP_NSID: u32 = 28;
}
