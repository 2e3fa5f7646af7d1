//! Reactor seam: registration of a handler's descriptor for readiness events.
//!
//! A [`Multiplexer`] only tracks which directions a descriptor is interested
//! in. The reactor that owns it reports readiness back through
//! [`NetlinkHandler::handle_event`](super::NetlinkHandler::handle_event).
//! [`TokioMultiplexer`] is the implementation used with a tokio runtime.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;

use super::error::{Error, Result};

/// Registration interface of an event reactor.
pub trait Multiplexer {
    /// Start watching `fd` with the given interest.
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Enable or disable write-ready notifications for `fd`.
    fn set_write_interest(&mut self, fd: RawFd, enabled: bool);

    /// Stop watching `fd`. Must happen before the descriptor is closed.
    fn unregister(&mut self, fd: RawFd);
}

/// Readiness reported to, or returned from, a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Read direction.
    pub read: bool,
    /// Write direction.
    pub write: bool,
}

/// Borrowed descriptor handed to tokio. The handler keeps ownership.
#[derive(Debug)]
pub(crate) struct Descriptor(RawFd);

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// [`Multiplexer`] backed by the tokio reactor (edge triggered).
///
/// The descriptor is registered for both directions with tokio; the write
/// interest flag only decides whether [`NetlinkHandler::turn`] waits for
/// write readiness.
///
/// [`NetlinkHandler::turn`]: super::NetlinkHandler::turn
#[derive(Debug)]
pub struct TokioMultiplexer {
    runtime: Handle,
    registration: Option<Arc<AsyncFd<Descriptor>>>,
    write_interest: bool,
}

impl TokioMultiplexer {
    /// Bind to the tokio runtime of the calling context.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Register(io::Error::other(e)))?;
        Ok(Self::with_handle(runtime))
    }

    /// Bind to an explicit runtime.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            registration: None,
            write_interest: false,
        }
    }

    /// True while a descriptor is registered.
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Whether write readiness is currently requested.
    pub fn write_interest(&self) -> bool {
        self.write_interest
    }

    /// The interest a turn of the event loop should wait for.
    pub(crate) fn interest(&self) -> Interest {
        if self.write_interest {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    pub(crate) fn registration(&self) -> Result<Arc<AsyncFd<Descriptor>>> {
        self.registration.clone().ok_or(Error::NotRegistered)
    }
}

impl Multiplexer for TokioMultiplexer {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let _guard = self.runtime.enter();
        let registration =
            AsyncFd::with_interest(Descriptor(fd), Interest::READABLE | Interest::WRITABLE)?;
        self.registration = Some(Arc::new(registration));
        self.write_interest = interest.is_writable();
        Ok(())
    }

    fn set_write_interest(&mut self, _fd: RawFd, enabled: bool) {
        self.write_interest = enabled;
    }

    fn unregister(&mut self, _fd: RawFd) {
        // Dropping the AsyncFd deregisters from epoll without closing the fd.
        self.registration = None;
        self.write_interest = false;
    }
}
