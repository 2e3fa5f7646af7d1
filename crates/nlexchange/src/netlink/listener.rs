//! Result delivery for exchanges.
//!
//! A handler reports everything it learns from the kernel through an
//! [`ExchangeListener`]. Completion of an exchange is reported at most once,
//! either as [`on_done`](ExchangeListener::on_done) or as
//! [`on_error`](ExchangeListener::on_error).
//!
//! Callers that prefer a stream over callbacks can use [`channel`]:
//!
//! ```ignore
//! use nlexchange::netlink::{ExchangeEvent, listener};
//! use tokio_stream::StreamExt;
//!
//! let (listener, mut events) = listener::channel();
//! let mut handler = NetlinkHandler::open(Protocol::Route, "monitor", listener, mux, config)?;
//! // ... drive the handler ...
//! while let Some(event) = events.next().await {
//!     if let ExchangeEvent::Done { seq } = event {
//!         println!("exchange {seq} complete");
//!     }
//! }
//! ```

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::error::Error;
use super::message::{Frame, NlMsgHdr};

/// Receives the results of a handler's exchanges.
pub trait ExchangeListener {
    /// A frame that is neither no-op, done nor error.
    fn on_message(&mut self, frame: Frame<'_>);

    /// Exchange `seq` completed successfully.
    fn on_done(&mut self, seq: u32);

    /// Exchange `seq` failed with `errno` (positive).
    fn on_error(&mut self, seq: u32, errno: i32);

    /// The feedback timer expired; all exchanges in transit are considered lost.
    fn on_timeout(&mut self) {}
}

/// Owned form of a listener callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// A forwarded frame.
    Message {
        /// Frame header.
        header: NlMsgHdr,
        /// Whole frame, header included.
        frame: Vec<u8>,
    },
    /// Exchange completed successfully.
    Done {
        /// Sequence number of the exchange.
        seq: u32,
    },
    /// Exchange failed.
    Failed {
        /// Sequence number of the exchange.
        seq: u32,
        /// Positive errno.
        errno: i32,
    },
    /// The feedback timer expired.
    TimedOut,
}

impl ExchangeEvent {
    /// Sequence number this event belongs to, if any.
    pub fn seq(&self) -> Option<u32> {
        match self {
            Self::Message { header, .. } => Some(header.nlmsg_seq),
            Self::Done { seq } | Self::Failed { seq, .. } => Some(*seq),
            Self::TimedOut => None,
        }
    }

    /// Kernel error for a failed exchange.
    pub fn error(&self) -> Option<Error> {
        match self {
            Self::Failed { errno, .. } => Some(Error::from_errno(*errno)),
            _ => None,
        }
    }
}

/// Stream of [`ExchangeEvent`]s fed by a [`ChannelListener`].
///
/// Ends once the listener (and therefore its handler) is dropped.
pub type ExchangeEvents = UnboundedReceiverStream<ExchangeEvent>;

/// Listener that forwards every callback into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ExchangeEvent>,
}

impl ChannelListener {
    fn emit(&self, event: ExchangeEvent) {
        // A closed receiver only means nobody is interested anymore.
        let _ = self.tx.send(event);
    }
}

impl ExchangeListener for ChannelListener {
    fn on_message(&mut self, frame: Frame<'_>) {
        self.emit(ExchangeEvent::Message {
            header: *frame.header(),
            frame: frame.as_bytes().to_vec(),
        });
    }

    fn on_done(&mut self, seq: u32) {
        self.emit(ExchangeEvent::Done { seq });
    }

    fn on_error(&mut self, seq: u32, errno: i32) {
        self.emit(ExchangeEvent::Failed { seq, errno });
    }

    fn on_timeout(&mut self) {
        self.emit(ExchangeEvent::TimedOut);
    }
}

/// Create a listener and the stream it feeds.
pub fn channel() -> (ChannelListener, ExchangeEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelListener { tx }, UnboundedReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::MessageIter;
    use crate::netlink::MessageBuilder;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_channel_forwards_in_order() {
        let (mut listener, events) = channel();

        let mut builder = MessageBuilder::new(16, 0);
        builder.set_seq(3);
        let bytes = builder.finish();
        let frame = MessageIter::new(&bytes).next().unwrap().unwrap();

        listener.on_message(frame);
        listener.on_done(3);
        listener.on_error(4, libc::EEXIST);
        listener.on_timeout();
        drop(listener);

        let collected: Vec<_> = events.collect().await;
        assert_eq!(collected.len(), 4);
        assert_eq!(collected[0].seq(), Some(3));
        assert_eq!(collected[1], ExchangeEvent::Done { seq: 3 });
        assert_eq!(
            collected[2],
            ExchangeEvent::Failed {
                seq: 4,
                errno: libc::EEXIST
            }
        );
        assert_eq!(collected[2].error().and_then(|e| e.errno()), Some(libc::EEXIST));
        assert_eq!(collected[3], ExchangeEvent::TimedOut);
        assert!(collected[3].seq().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (mut listener, events) = channel();
        drop(events);
        listener.on_done(1);
    }
}
