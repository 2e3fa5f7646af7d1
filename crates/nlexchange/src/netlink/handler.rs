//! The netlink handler: request queueing, the receive cycle and frame dispatch.
//!
//! A handler never blocks. [`send`](NetlinkHandler::send) only queues bytes
//! and asks the reactor for a write-ready event; the reactor then calls
//! [`handle_event`](NetlinkHandler::handle_event), which flushes the queue,
//! drains received datagrams and reports results to the listener.
//!
//! # Example
//!
//! ```ignore
//! use nlexchange::netlink::{
//!     HandlerConfig, MessageBuilder, NetlinkHandler, NlMsgType, Protocol, TokioMultiplexer,
//!     listener, message::{NLM_F_DUMP, NLM_F_REQUEST},
//! };
//!
//! let (listener, events) = listener::channel();
//! let mut handler = NetlinkHandler::open(
//!     Protocol::Route,
//!     "routing",
//!     listener,
//!     TokioMultiplexer::new()?,
//!     HandlerConfig::new(),
//! )?;
//!
//! let mut request = MessageBuilder::new(NlMsgType::RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP);
//! request.append_bytes(&[libc::AF_UNSPEC as u8])?;
//! let seq = handler.send(request)?;
//! handler.run_until_idle().await?;
//! ```

use std::fmt;
use std::io::{self, IoSlice};
use std::os::unix::io::AsRawFd;

use tokio::io::Interest;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::buffer::{OutboundQueue, ReceiveBuffer};
use super::builder::MessageBuilder;
use super::config::HandlerConfig;
use super::error::{Error, Result};
use super::listener::ExchangeListener;
use super::message::{MessageIter, NLM_F_ACK, NLM_F_MULTI, NLMSG_HDRLEN, NlMsgError, NlMsgType};
use super::mux::{Multiplexer, Readiness};
use super::sequence::next_sequence;
use super::socket::{NetlinkSocket, Protocol, Transport};
use super::timeout::{FEEDBACK_TIMER, TimeoutBinding};

/// Exchanges sent but not yet completed, and the timer watching them.
#[derive(Debug)]
struct InFlight {
    count: usize,
    timeout: TimeoutBinding,
}

impl InFlight {
    fn started(&mut self, exchanges: usize) {
        self.count += exchanges;
        self.timeout.arm();
    }

    fn finished(&mut self) {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 {
            self.timeout.stop();
        }
    }

    fn expired(&mut self) {
        self.count = 0;
        self.timeout.stop();
    }
}

/// One netlink socket with its buffers, timeout and listener.
///
/// `L` receives results, `M` is the reactor registration and `T` the socket
/// (a [`NetlinkSocket`] unless a different [`Transport`] is supplied).
/// Dropping the handler unregisters it from the reactor before the socket
/// is closed.
pub struct NetlinkHandler<L, M, T = NetlinkSocket>
where
    L: ExchangeListener,
    M: Multiplexer,
    T: Transport,
{
    transport: T,
    mux: M,
    listener: L,
    owner: String,
    config: HandlerConfig,
    outbound: OutboundQueue,
    inbound: ReceiveBuffer,
    in_flight: InFlight,
}

impl<L, M> NetlinkHandler<L, M, NetlinkSocket>
where
    L: ExchangeListener,
    M: Multiplexer,
{
    /// Open a netlink socket for `protocol` and register it with `mux`.
    ///
    /// `owner` names the component using the handler; it is attached to
    /// every log record.
    pub fn open(
        protocol: Protocol,
        owner: impl Into<String>,
        listener: L,
        mux: M,
        config: HandlerConfig,
    ) -> Result<Self> {
        let owner = owner.into();
        let socket = NetlinkSocket::open(protocol)
            .inspect_err(|e| warn!(owner = %owner, error = %e, "cannot open netlink socket"))?;
        Self::with_transport(socket, owner, listener, mux, config)
    }
}

impl<L, M, T> NetlinkHandler<L, M, T>
where
    L: ExchangeListener,
    M: Multiplexer,
    T: Transport,
{
    /// Build a handler around an already bound transport.
    ///
    /// On failure everything acquired so far, the transport included, is
    /// released before returning.
    pub fn with_transport(
        transport: T,
        owner: impl Into<String>,
        listener: L,
        mut mux: M,
        config: HandlerConfig,
    ) -> Result<Self> {
        let owner = owner.into();
        let page = config.get_page_size();

        let outbound = OutboundQueue::with_capacity(page)
            .inspect_err(|e| warn!(owner = %owner, error = %e, "netlink output buffer"))?;
        let inbound = ReceiveBuffer::new(page, config.get_max_receive_buffer())
            .inspect_err(|e| warn!(owner = %owner, error = %e, "netlink input buffer"))?;

        let fd = transport.as_raw_fd();
        mux.register(fd, Interest::READABLE).map_err(|e| {
            warn!(owner = %owner, error = %e, "cannot register netlink socket");
            Error::Register(e)
        })?;

        debug!(owner = %owner, fd, port_id = transport.port_id(), "netlink handler open");

        let in_flight = InFlight {
            count: 0,
            timeout: TimeoutBinding::new(config.get_timeout()),
        };
        Ok(Self {
            transport,
            mux,
            listener,
            owner,
            config,
            outbound,
            inbound,
            in_flight,
        })
    }

    /// Unregister from the reactor, close the socket and free both buffers.
    pub fn close(self) {
        debug!(owner = %self.owner, in_transit = self.in_flight.count, "closing netlink handler");
        drop(self);
    }

    /// Queue `message` for transmission and return its sequence number.
    ///
    /// The message is flagged as an acknowledged multipart request. Nothing
    /// is written until the next write-ready event, so messages sent in a row
    /// leave in a single datagram, in the order they were queued.
    pub fn send(&mut self, mut message: MessageBuilder) -> Result<u32> {
        let seq = next_sequence();
        message.set_seq(seq);
        message.set_pid(self.transport.port_id());
        message.add_flags(NLM_F_ACK | NLM_F_MULTI);
        let bytes = message.finish();

        info!(owner = %self.owner, seq, bytes = bytes.len(), "prepare to send netlink message");
        trace!(owner = %self.owner, seq, content = %Hex(&bytes), "netlink message content");

        self.outbound.push(seq, &bytes)?;
        self.mux.set_write_interest(self.transport.as_raw_fd(), true);
        Ok(seq)
    }

    /// Join multicast groups, stopping at the first failure.
    ///
    /// Groups joined before the failing one stay joined.
    pub fn join_groups(&mut self, groups: &[u32]) -> Result<()> {
        for &group in groups {
            self.transport.add_membership(group).map_err(|source| {
                warn!(owner = %self.owner, group, error = %source, "could not join netlink mc group");
                Error::MulticastJoin { group, source }
            })?;
            debug!(owner = %self.owner, group, "joined netlink mc group");
        }
        Ok(())
    }

    /// Leave multicast groups, stopping at the first failure.
    ///
    /// Groups left before the failing one stay left.
    pub fn leave_groups(&mut self, groups: &[u32]) -> Result<()> {
        for &group in groups {
            self.transport.drop_membership(group).map_err(|source| {
                warn!(owner = %self.owner, group, error = %source, "could not drop netlink mc group");
                Error::MulticastLeave { group, source }
            })?;
            debug!(owner = %self.owner, group, "left netlink mc group");
        }
        Ok(())
    }

    /// Process readiness reported by the reactor.
    ///
    /// Returns the directions that ran into `WouldBlock`; an edge-triggered
    /// reactor clears readiness for exactly those.
    pub fn handle_event(&mut self, read_ready: bool, write_ready: bool) -> Readiness {
        let mut blocked = Readiness::default();
        if write_ready {
            blocked.write = self.flush();
        }
        if read_ready {
            blocked.read = self.drain();
        }
        blocked
    }

    /// The feedback timer expired: report it once and forget every exchange
    /// in transit.
    pub fn handle_timeout(&mut self) {
        warn!(
            owner = %self.owner,
            in_transit = self.in_flight.count,
            timer = FEEDBACK_TIMER,
            "netlink feedback timed out"
        );
        self.listener.on_timeout();
        self.in_flight.expired();
    }

    /// Fire the timeout if its deadline passed at `now`. Returns whether it
    /// fired.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.in_flight.timeout.is_expired(now) {
            self.handle_timeout();
            true
        } else {
            false
        }
    }

    /// Name of the owning component.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Number of exchanges sent but not yet completed.
    pub fn in_transit(&self) -> usize {
        self.in_flight.count
    }

    /// The feedback timeout binding.
    pub fn timeout(&self) -> &TimeoutBinding {
        &self.in_flight.timeout
    }

    /// True while queued bytes wait for a write-ready event.
    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Current receive buffer size.
    pub fn receive_capacity(&self) -> usize {
        self.inbound.capacity()
    }

    /// Kernel-assigned port id of the socket.
    pub fn port_id(&self) -> u32 {
        self.transport.port_id()
    }

    /// The handler configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// The listener.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Mutable access to the listener.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// The reactor registration.
    pub fn mux(&self) -> &M {
        &self.mux
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Write the queue in one datagram. Returns true on `WouldBlock`.
    fn flush(&mut self) -> bool {
        let fd = self.transport.as_raw_fd();
        if self.outbound.is_empty() {
            self.mux.set_write_interest(fd, false);
            return false;
        }

        let queued = self.outbound.len();
        let result = self
            .transport
            .send_vectored(&[IoSlice::new(self.outbound.as_bytes())]);
        match result {
            Ok(sent) => {
                let exchanges = self.outbound.pending().len();
                if sent < queued {
                    warn!(owner = %self.owner, sent, queued, "short write to netlink socket");
                }
                info!(
                    owner = %self.owner,
                    sent,
                    queued,
                    exchanges,
                    "sent netlink messages"
                );
                self.outbound.clear();
                self.mux.set_write_interest(fd, false);
                self.in_flight.started(exchanges);
                false
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
            Err(e) => {
                let errno = e.raw_os_error().unwrap_or(libc::EIO);
                warn!(owner = %self.owner, error = %e, "cannot send data to netlink socket");
                for &seq in self.outbound.pending() {
                    self.listener.on_error(seq, errno);
                }
                self.outbound.clear();
                self.mux.set_write_interest(fd, false);
                false
            }
        }
    }

    /// Read and dispatch datagrams until the socket is drained or the read
    /// budget is spent. Returns true on `WouldBlock`.
    fn drain(&mut self) -> bool {
        for _ in 0..self.config.get_read_budget() {
            match self.receive() {
                Ok(len) => self.dispatch(len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(owner = %self.owner, error = %e, "netlink recvmsg error");
                    return false;
                }
            }
        }
        false
    }

    /// Peek until the buffer fits the next datagram, then consume it.
    fn receive(&mut self) -> io::Result<usize> {
        let mut peek = true;
        loop {
            trace!(
                owner = %self.owner,
                capacity = self.inbound.capacity(),
                peek,
                "read netlink message"
            );
            let received = self.transport.recv(self.inbound.as_mut_slice(), peek)?;
            let capacity = self.inbound.capacity();

            if received.truncated || received.len > capacity {
                if !peek {
                    warn!(owner = %self.owner, len = received.len, capacity, "netlink datagram truncated");
                    return Ok(received.len.min(capacity));
                }
                if let Err(e) = self.inbound.grow() {
                    warn!(owner = %self.owner, error = %e, "dropping netlink datagram");
                    self.discard()?;
                }
                continue;
            }

            if peek {
                debug!(owner = %self.owner, len = received.len, "got estimate of netlink message size");
                peek = false;
                continue;
            }

            info!(owner = %self.owner, bytes = received.len, "got netlink message");
            return Ok(received.len);
        }
    }

    /// Consume the datagram at the head of the queue without keeping it.
    fn discard(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; NLMSG_HDRLEN];
        self.transport.recv(&mut scratch, false).map(drop)
    }

    fn dispatch(&mut self, len: usize) {
        let data = self.inbound.filled(len);
        trace!(owner = %self.owner, content = %Hex(data), "netlink datagram content");

        walk_frames(&self.owner, data, &mut self.listener, &mut self.in_flight);

        if self.in_flight.timeout.is_active() {
            self.in_flight.timeout.arm();
        }
    }
}

impl<L, M, T> Drop for NetlinkHandler<L, M, T>
where
    L: ExchangeListener,
    M: Multiplexer,
    T: Transport,
{
    fn drop(&mut self) {
        // Fields drop after this, so the reactor forgets the descriptor
        // before the socket is closed.
        self.mux.unregister(self.transport.as_raw_fd());
    }
}

/// Walk the frames of one datagram in order and report them.
///
/// A done frame only completes its exchange once a frame with another
/// sequence number follows or the datagram ends.
fn walk_frames<L: ExchangeListener>(
    owner: &str,
    data: &[u8],
    listener: &mut L,
    in_flight: &mut InFlight,
) {
    let mut current_seq = 0;
    let mut done_pending = false;

    for frame in MessageIter::new(data) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(owner, error = %e, "malformed netlink frame, dropping rest of datagram");
                break;
            }
        };
        let header = *frame.header();
        debug!(
            owner,
            msg_type = header.nlmsg_type,
            seq = header.nlmsg_seq,
            "netlink message received"
        );

        if done_pending && current_seq != header.nlmsg_seq {
            complete(owner, listener, in_flight, current_seq, 0);
            done_pending = false;
        }
        current_seq = header.nlmsg_seq;

        match header.nlmsg_type {
            NlMsgType::NOOP => {}
            NlMsgType::DONE => done_pending = true,
            NlMsgType::ERROR => {
                done_pending = false;
                match NlMsgError::from_bytes(frame.payload()) {
                    Ok(feedback) => {
                        info!(
                            owner,
                            seq = feedback.msg.nlmsg_seq,
                            errno = feedback.errno(),
                            "received netlink feedback"
                        );
                        complete(owner, listener, in_flight, feedback.msg.nlmsg_seq, feedback.errno());
                    }
                    Err(e) => warn!(owner, error = %e, "unreadable netlink error frame"),
                }
            }
            _ => listener.on_message(frame),
        }
    }

    if done_pending {
        complete(owner, listener, in_flight, current_seq, 0);
    }
}

fn complete<L: ExchangeListener>(
    owner: &str,
    listener: &mut L,
    in_flight: &mut InFlight,
    seq: u32,
    errno: i32,
) {
    if errno == 0 {
        listener.on_done(seq);
    } else {
        listener.on_error(seq, errno);
    }
    in_flight.finished();
    debug!(owner, seq, in_transit = in_flight.count, "netlink exchange finished");
}

/// Lazily formatted hex dump, 16 bytes per line.
struct Hex<'a>(&'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.0.chunks(16).enumerate() {
            if line > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04x}:", line * 16)?;
            for byte in chunk {
                write!(f, " {:02x}", byte)?;
            }
        }
        Ok(())
    }
}
