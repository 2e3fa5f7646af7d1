//! Handler configuration.
//!
//! ```ignore
//! use std::time::Duration;
//! use nlexchange::netlink::HandlerConfig;
//!
//! let config = HandlerConfig::new()
//!     .timeout(Duration::from_millis(250))
//!     .max_receive_buffer(Some(256 * 1024));
//! ```

use std::time::Duration;

/// Feedback timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default upper bound for the receive buffer.
pub const DEFAULT_MAX_RECEIVE_BUFFER: usize = 1024 * 1024;

/// Default number of datagrams read per read-ready event.
pub const DEFAULT_READ_BUDGET: usize = 64;

/// Tunables of a [`NetlinkHandler`](super::NetlinkHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    timeout: Duration,
    page_size: usize,
    max_receive_buffer: Option<usize>,
    read_budget: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            page_size: system_page_size(),
            max_receive_buffer: Some(DEFAULT_MAX_RECEIVE_BUFFER),
            read_budget: DEFAULT_READ_BUDGET,
        }
    }
}

impl HandlerConfig {
    /// Defaults: 100 ms timeout, system page size, 1 MiB receive limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// How long to wait for feedback before declaring exchanges lost.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Receive buffer growth step and initial size. Zero is ignored.
    pub fn page_size(mut self, page_size: usize) -> Self {
        if page_size > 0 {
            self.page_size = page_size;
        }
        self
    }

    /// Upper bound for the receive buffer, `None` for unbounded.
    pub fn max_receive_buffer(mut self, limit: Option<usize>) -> Self {
        self.max_receive_buffer = limit;
        self
    }

    /// Datagrams read per read-ready event before yielding. At least one.
    pub fn read_budget(mut self, budget: usize) -> Self {
        self.read_budget = budget.max(1);
        self
    }

    /// Get the feedback timeout.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the page size.
    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    /// Get the receive buffer limit.
    pub fn get_max_receive_buffer(&self) -> Option<usize> {
        self.max_receive_buffer
    }

    /// Get the read budget.
    pub fn get_read_budget(&self) -> usize {
        self.read_budget
    }
}

/// The system page size, 4096 if it cannot be determined.
pub fn system_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}
