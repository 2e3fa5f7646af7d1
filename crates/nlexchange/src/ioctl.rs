//! Datagram sockets used as handles for interface ioctls.
//!
//! Interface ioctls (`SIOCGIFFLAGS`, `SIOCGIFINDEX`, ...) need a socket of
//! the right address family but never send anything on it. One socket per
//! family is opened up front and shared.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, info};

use crate::netlink::{Error, Result};

/// One `AF_INET` and, when the node supports it, one `AF_INET6` socket.
#[derive(Debug)]
pub struct IoctlSockets {
    v4: OwnedFd,
    v6: Option<OwnedFd>,
}

impl IoctlSockets {
    /// Open both sockets. Only a missing IPv4 socket is an error.
    pub fn open() -> Result<Self> {
        let v4 = datagram_socket(libc::AF_INET).map_err(Error::Socket)?;
        let v6 = match datagram_socket(libc::AF_INET6) {
            Ok(fd) => Some(fd),
            Err(e) => {
                info!(error = %e, "no IPv6 socket, node is not IPv6 capable");
                None
            }
        };
        debug!(
            v4 = v4.as_raw_fd(),
            v6 = v6.as_ref().map(AsRawFd::as_raw_fd),
            "ioctl sockets open"
        );
        Ok(Self { v4, v6 })
    }

    /// Socket for `family` (`AF_INET` or `AF_INET6`).
    pub fn fd(&self, family: i32) -> Option<RawFd> {
        match family {
            libc::AF_INET => Some(self.v4.as_raw_fd()),
            libc::AF_INET6 => self.v6.as_ref().map(AsRawFd::as_raw_fd),
            _ => None,
        }
    }

    /// Whether an IPv6 socket could be opened.
    pub fn is_ipv6_supported(&self) -> bool {
        self.v6.is_some()
    }
}

fn datagram_socket(family: i32) -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; the result is checked before use.
    let fd = unsafe { libc::socket(family, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd is a freshly created descriptor owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
