//! Netlink transport: sockets, framing and sequenced exchanges.
//!
//! A [`NetlinkHandler`] owns one non-blocking netlink socket. Requests built
//! with [`MessageBuilder`] are queued by [`NetlinkHandler::send`] and leave
//! on the next write-ready event. Replies, multipart dumps, acknowledgements
//! and multicast notifications are parsed and reported to an
//! [`ExchangeListener`]. A single timeout watches every exchange in transit.
//!
//! # Quick Start
//!
//! ```ignore
//! use nlexchange::netlink::{
//!     ExchangeEvent, HandlerConfig, MessageBuilder, NetlinkHandler, NlMsgType, Protocol,
//!     TokioMultiplexer, listener,
//!     message::{NLM_F_DUMP, NLM_F_REQUEST},
//! };
//! use tokio_stream::StreamExt;
//!
//! let (listener, mut events) = listener::channel();
//! let mut handler = NetlinkHandler::open(
//!     Protocol::Route,
//!     "addresses",
//!     listener,
//!     TokioMultiplexer::new()?,
//!     HandlerConfig::new(),
//! )?;
//!
//! let mut request = MessageBuilder::new(NlMsgType::RTM_GETADDR, NLM_F_REQUEST | NLM_F_DUMP);
//! request.append_bytes(&[libc::AF_INET as u8, 0, 0, 0, 0, 0, 0, 0])?;
//! handler.send(request)?;
//! handler.run_until_idle().await?;
//! drop(handler);
//!
//! while let Some(event) = events.next().await {
//!     if let ExchangeEvent::Message { header, .. } = event {
//!         println!("{:?}", NlMsgType::name(header.nlmsg_type));
//!     }
//! }
//! ```
//!
//! # Multicast
//!
//! ```ignore
//! use nlexchange::netlink::rtnetlink_groups::{RTNLGRP_LINK, RTNLGRP_IPV4_IFADDR};
//!
//! handler.join_groups(&[RTNLGRP_LINK, RTNLGRP_IPV4_IFADDR])?;
//! handler.run().await?;
//! ```

pub mod attr;
pub mod buffer;
mod builder;
pub mod config;
mod driver;
mod error;
mod handler;
pub mod listener;
pub mod message;
pub mod mux;
pub mod sequence;
mod socket;
#[cfg(test)]
mod testing;
pub mod timeout;

pub use attr::{AttrIter, NlAttr};
pub use builder::{MessageBuilder, NestToken};
pub use config::HandlerConfig;
pub use error::{Error, Result};
pub use handler::NetlinkHandler;
pub use listener::{ChannelListener, ExchangeEvent, ExchangeEvents, ExchangeListener};
pub use message::{Frame, MAX_MESSAGE_LEN, MessageIter, NLMSG_HDRLEN, NlMsgError, NlMsgHdr, NlMsgType};
pub use mux::{Multiplexer, Readiness, TokioMultiplexer};
pub use sequence::next_sequence;
pub use socket::{NetlinkSocket, Protocol, Received, Transport, rtnetlink_groups};
pub use timeout::{FEEDBACK_TIMER, TimeoutBinding};
