//! Error types for netlink exchanges.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or using a netlink handler.
///
/// Setup-time failures are returned synchronously. Failures of an exchange
/// that is already in flight are never returned; they reach the
/// [`ExchangeListener`](super::ExchangeListener) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The netlink socket could not be created or configured.
    #[error("cannot open netlink socket: {0}")]
    Socket(#[source] io::Error),

    /// The netlink socket could not be bound to the local kernel address.
    #[error("could not bind netlink socket: {0}")]
    Bind(#[source] io::Error),

    /// The socket could not be registered with the reactor.
    #[error("cannot register netlink socket with reactor: {0}")]
    Register(#[source] io::Error),

    /// A buffer could not be allocated or grown.
    #[error("not enough memory for {what} ({bytes} bytes)")]
    Allocation {
        /// Which buffer failed.
        what: &'static str,
        /// Requested size in bytes.
        bytes: usize,
    },

    /// Appending to a message would exceed its size limit.
    #[error("netlink message too large: {len} bytes exceeds limit of {limit}")]
    MessageTooLarge {
        /// Aligned length the message would have reached.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Joining a multicast group failed.
    #[error("could not join netlink multicast group {group:#x}: {source}")]
    MulticastJoin {
        /// The group that failed.
        group: u32,
        /// Underlying socket option error.
        #[source]
        source: io::Error,
    },

    /// Leaving a multicast group failed.
    #[error("could not drop netlink multicast group {group:#x}: {source}")]
    MulticastLeave {
        /// The group that failed.
        group: u32,
        /// Underlying socket option error.
        #[source]
        source: io::Error,
    },

    /// A datagram needs a larger receive buffer than allowed.
    #[error("receive buffer of {size} bytes exceeds limit of {limit}")]
    ReceiveBufferLimit {
        /// Size the buffer would have grown to.
        size: usize,
        /// Configured upper bound.
        limit: usize,
    },

    /// The reactor has no registration for this handler.
    #[error("netlink socket is not registered with a reactor")]
    NotRegistered,

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    ///
    /// Accepts both the raw netlink result code (negative) and a plain
    /// errno (positive), as delivered to
    /// [`ExchangeListener::on_error`](super::ExchangeListener::on_error).
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.abs();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        matches!(self.errno(), Some(libc::ENOENT | libc::ENODEV))
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    /// Get the errno value if this error carries one.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            Self::Io(e) | Self::Socket(e) | Self::Bind(e) | Self::Register(e) => e.raw_os_error(),
            Self::MulticastJoin { source, .. } | Self::MulticastLeave { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));

        let err = Error::from_errno(13); // EACCES, already positive
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(13));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-2).is_not_found()); // ENOENT
        assert!(Error::from_errno(-19).is_not_found()); // ENODEV
        assert!(!Error::from_errno(-17).is_not_found()); // EEXIST
    }

    #[test]
    fn test_errno_from_setup_errors() {
        let err = Error::Bind(io::Error::from_raw_os_error(libc::EADDRINUSE));
        assert_eq!(err.errno(), Some(libc::EADDRINUSE));

        let err = Error::MulticastJoin {
            group: 7,
            source: io::Error::from_raw_os_error(libc::EPERM),
        };
        assert!(err.is_permission_denied());

        assert_eq!(Error::NotRegistered.errno(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = Error::MessageTooLarge {
            len: 1028,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "netlink message too large: 1028 bytes exceeds limit of 1024"
        );

        let err = Error::MulticastLeave {
            group: 0x1f,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.to_string().starts_with("could not drop netlink multicast group 0x1f"));

        let err = Error::Allocation {
            what: "netlink input buffer",
            bytes: 4096,
        };
        assert_eq!(
            err.to_string(),
            "not enough memory for netlink input buffer (4096 bytes)"
        );
    }
}
