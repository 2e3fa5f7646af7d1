//! Inbound and outbound byte buffers owned by a handler.

use super::error::{Error, Result};

/// Receive buffer that grows one page at a time.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: Vec<u8>,
    page: usize,
    limit: Option<usize>,
}

impl ReceiveBuffer {
    /// Allocate a one-page buffer.
    pub fn new(page: usize, limit: Option<usize>) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(page).map_err(|_| Error::Allocation {
            what: "netlink input buffer",
            bytes: page,
        })?;
        buf.resize(page, 0);
        Ok(Self { buf, page, limit })
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Grow by exactly one page.
    ///
    /// Fails without changing the buffer if the limit would be exceeded or the
    /// allocation fails.
    pub fn grow(&mut self) -> Result<()> {
        let size = self.buf.len() + self.page;
        match self.limit {
            Some(limit) if size > limit => return Err(Error::ReceiveBufferLimit { size, limit }),
            _ => {}
        }
        self.buf
            .try_reserve_exact(self.page)
            .map_err(|_| Error::Allocation {
                what: "netlink input buffer",
                bytes: size,
            })?;
        self.buf.resize(size, 0);
        Ok(())
    }

    /// The whole buffer, for a receive call to fill.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// The first `len` bytes of the buffer.
    pub fn filled(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.buf.len())]
    }
}

/// Queue of serialized requests waiting for the next write-ready event.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    buf: Vec<u8>,
    pending: Vec<u32>,
}

impl OutboundQueue {
    /// Create a queue with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity).map_err(|_| Error::Allocation {
            what: "netlink output buffer",
            bytes: capacity,
        })?;
        Ok(Self {
            buf,
            pending: Vec::new(),
        })
    }

    /// Append one serialized message carrying sequence `seq`.
    pub fn push(&mut self, seq: u32, message: &[u8]) -> Result<()> {
        let bytes = self.buf.len() + message.len();
        let alloc_err = |_| Error::Allocation {
            what: "netlink output buffer",
            bytes,
        };
        self.buf.try_reserve(message.len()).map_err(alloc_err)?;
        self.pending.try_reserve(1).map_err(alloc_err)?;
        self.buf.extend_from_slice(message);
        self.pending.push(seq);
        Ok(())
    }

    /// Queued bytes, in the order they were pushed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Sequence numbers of the queued messages.
    pub fn pending(&self) -> &[u32] {
        &self.pending
    }

    /// Drop all queued bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending.clear();
    }
}
