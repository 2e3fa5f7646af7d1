//! Netlink frame header and frame walking.

use super::attr::AttrIter;
use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink frame alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink frame header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Largest outbound message, mirroring the kernel's `UIO_MAXIOV`.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Netlink frame header (mirrors struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of frame including header, before alignment padding.
    pub nlmsg_len: u32,
    /// Message type.
    pub nlmsg_type: u16,
    /// Additional flags.
    pub nlmsg_flags: u16,
    /// Sequence number.
    pub nlmsg_seq: u32,
    /// Sending port ID.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Create a new header with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            nlmsg_seq: 0,
            nlmsg_pid: 0,
        }
    }

    /// Get the payload length (total length minus header).
    pub fn payload_len(&self) -> usize {
        (self.nlmsg_len as usize).saturating_sub(NLMSG_HDRLEN)
    }

    /// Check if this is a no-op frame.
    pub fn is_noop(&self) -> bool {
        self.nlmsg_type == NlMsgType::NOOP
    }

    /// Check if this is an error (or ACK) frame.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NlMsgType::ERROR
    }

    /// Check if this is a done frame.
    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    /// Check if this frame has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.nlmsg_flags & NLM_F_MULTI != 0
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from bytes. The input needs no particular alignment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }
}

/// Standard netlink message types.
pub struct NlMsgType;

impl NlMsgType {
    /// No operation, frame must be discarded.
    pub const NOOP: u16 = 1;
    /// Error frame or ACK.
    pub const ERROR: u16 = 2;
    /// End of multipart exchange.
    pub const DONE: u16 = 3;
    /// Data lost, request resend.
    pub const OVERRUN: u16 = 4;

    // Link messages
    pub const RTM_NEWLINK: u16 = 16;
    pub const RTM_DELLINK: u16 = 17;
    pub const RTM_GETLINK: u16 = 18;

    // Address messages
    pub const RTM_NEWADDR: u16 = 20;
    pub const RTM_DELADDR: u16 = 21;
    pub const RTM_GETADDR: u16 = 22;

    // Route messages
    pub const RTM_NEWROUTE: u16 = 24;
    pub const RTM_DELROUTE: u16 = 25;
    pub const RTM_GETROUTE: u16 = 26;

    // Neighbor messages
    pub const RTM_NEWNEIGH: u16 = 28;
    pub const RTM_DELNEIGH: u16 = 29;
    pub const RTM_GETNEIGH: u16 = 30;

    /// Short name of a known message type, for logs and tools.
    pub fn name(msg_type: u16) -> Option<&'static str> {
        Some(match msg_type {
            Self::NOOP => "NOOP",
            Self::ERROR => "ERROR",
            Self::DONE => "DONE",
            Self::OVERRUN => "OVERRUN",
            Self::RTM_NEWLINK => "RTM_NEWLINK",
            Self::RTM_DELLINK => "RTM_DELLINK",
            Self::RTM_GETLINK => "RTM_GETLINK",
            Self::RTM_NEWADDR => "RTM_NEWADDR",
            Self::RTM_DELADDR => "RTM_DELADDR",
            Self::RTM_GETADDR => "RTM_GETADDR",
            Self::RTM_NEWROUTE => "RTM_NEWROUTE",
            Self::RTM_DELROUTE => "RTM_DELROUTE",
            Self::RTM_GETROUTE => "RTM_GETROUTE",
            Self::RTM_NEWNEIGH => "RTM_NEWNEIGH",
            Self::RTM_DELNEIGH => "RTM_DELNEIGH",
            Self::RTM_GETNEIGH => "RTM_GETNEIGH",
            _ => return None,
        })
    }
}

/// Netlink message flags.
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_ECHO: u16 = 0x08;
pub const NLM_F_DUMP_INTR: u16 = 0x10;

// Modifiers to GET request
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Modifiers to NEW request
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;

/// One aligned protocol unit inside a datagram.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    header: NlMsgHdr,
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// The frame header.
    pub fn header(&self) -> &NlMsgHdr {
        &self.header
    }

    /// The bytes following the header, up to `nlmsg_len`.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[NLMSG_HDRLEN..]
    }

    /// The whole frame, header included, without trailing padding.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Iterate attributes that follow a fixed family header of `offset` bytes.
    pub fn attrs(&self, offset: usize) -> AttrIter<'a> {
        let payload = self.payload();
        let offset = nlmsg_align(offset);
        if payload.len() > offset {
            AttrIter::new(&payload[offset..])
        } else {
            AttrIter::new(&[])
        }
    }
}

/// Iterator over netlink frames in a datagram.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new frame iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLMSG_HDRLEN {
            return None;
        }

        let header = match NlMsgHdr::from_bytes(self.data) {
            Ok(h) => h,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        let msg_len = header.nlmsg_len as usize;
        if msg_len < NLMSG_HDRLEN || msg_len > self.data.len() {
            self.data = &[];
            return Some(Err(Error::InvalidMessage(format!(
                "invalid message length: {}",
                msg_len
            ))));
        }

        let bytes = &self.data[..msg_len];
        let aligned_len = nlmsg_align(msg_len);

        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok(Frame { header, bytes }))
    }
}

/// Netlink error frame payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Result code (negative errno, or 0 for ACK).
    pub error: i32,
    /// Header of the request this frame answers.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    /// Parse an error payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }

    /// Check if this is an ACK (no error).
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    /// The positive errno carried by this frame, 0 for an ACK.
    pub fn errno(&self) -> i32 {
        -self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(msg_type: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
        let mut hdr = NlMsgHdr::new(msg_type, 0);
        hdr.nlmsg_len = (NLMSG_HDRLEN + payload.len()) as u32;
        hdr.nlmsg_seq = seq;
        let mut out = hdr.as_bytes().to_vec();
        out.extend_from_slice(payload);
        out.resize(nlmsg_align(out.len()), 0);
        out
    }

    #[test]
    fn test_walks_aligned_frames() {
        let mut data = frame(16, 5, &[1, 2, 3]);
        data.extend(frame(NlMsgType::DONE, 5, &[0; 4]));

        let frames: Vec<_> = MessageIter::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header().nlmsg_type, 16);
        assert_eq!(frames[0].payload(), &[1, 2, 3]);
        assert_eq!(frames[0].as_bytes().len(), NLMSG_HDRLEN + 3);
        assert!(frames[1].header().is_done());
        assert_eq!(frames[1].header().nlmsg_seq, 5);
    }

    #[test]
    fn test_bad_length_stops_walk() {
        let mut data = frame(16, 1, &[]);
        data[0..4].copy_from_slice(&200u32.to_ne_bytes());

        let mut iter = MessageIter::new(&data);
        assert!(matches!(iter.next(), Some(Err(Error::InvalidMessage(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_error_payload() {
        let mut echoed = NlMsgHdr::new(16, NLM_F_REQUEST);
        echoed.nlmsg_seq = 42;
        let mut payload = (-17i32).to_ne_bytes().to_vec();
        payload.extend_from_slice(echoed.as_bytes());

        let err = NlMsgError::from_bytes(&payload).unwrap();
        assert!(!err.is_ack());
        assert_eq!(err.errno(), 17);
        assert_eq!(err.msg.nlmsg_seq, 42);

        assert!(matches!(
            NlMsgError::from_bytes(&payload[..8]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(NlMsgType::name(NlMsgType::DONE), Some("DONE"));
        assert_eq!(NlMsgType::name(NlMsgType::RTM_NEWLINK), Some("RTM_NEWLINK"));
        assert_eq!(NlMsgType::name(999), None);
    }
}
