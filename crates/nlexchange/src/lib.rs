//! Callback-driven netlink transport for Linux.
//!
//! This crate talks to kernel subsystems over netlink sockets without ever
//! blocking: requests are queued and written when the socket is writable,
//! replies are read when it is readable, and results are delivered to a
//! listener. Each request is an *exchange* identified by a 31-bit sequence
//! number and completed by exactly one done, error or timeout report.
//!
//! # Modules
//!
//! - [`netlink`] - sockets, framing, the handler and its tokio driver
//! - [`ioctl`] - shared IPv4/IPv6 datagram sockets for interface ioctls
//!
//! # Example
//!
//! ```ignore
//! use nlexchange::netlink::{HandlerConfig, NetlinkHandler, Protocol, TokioMultiplexer, listener};
//!
//! #[tokio::main]
//! async fn main() -> nlexchange::Result<()> {
//!     let (listener, events) = listener::channel();
//!     let mut handler = NetlinkHandler::open(
//!         Protocol::Route,
//!         "example",
//!         listener,
//!         TokioMultiplexer::new()?,
//!         HandlerConfig::new(),
//!     )?;
//!     handler.join_groups(&[nlexchange::netlink::rtnetlink_groups::RTNLGRP_LINK])?;
//!     handler.run().await
//! }
//! ```

pub mod ioctl;
pub mod netlink;

pub use ioctl::IoctlSockets;
pub use netlink::{Error, NetlinkHandler, Protocol, Result};
