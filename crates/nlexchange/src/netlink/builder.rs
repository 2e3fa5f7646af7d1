//! Bounded builder for outbound netlink messages.
//!
//! The header's length field always matches the bytes written so far, so the
//! message is valid after every successful append. An append that would push
//! the aligned length past the builder's limit fails and leaves the message
//! untouched.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr};
use super::error::{Error, Result};
use super::message::{MAX_MESSAGE_LEN, NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Token returned when starting a nested attribute.
/// Used to finalize the nested attribute length.
#[derive(Debug, Clone, Copy)]
pub struct NestToken {
    /// Offset of the nested attribute header in the buffer.
    offset: usize,
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    limit: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_header(NlMsgHdr::new(msg_type, flags))
    }

    /// Create a builder from an existing header. Only the type, flags,
    /// sequence and port id are kept; the length is recomputed.
    pub fn with_header(header: NlMsgHdr) -> Self {
        let mut buf = Vec::with_capacity(NLMSG_HDRLEN * 4);
        buf.extend_from_slice(header.as_bytes());
        let mut builder = Self {
            buf,
            limit: MAX_MESSAGE_LEN,
        };
        builder.sync_len();
        builder
    }

    /// Change the size limit. Defaults to [`MAX_MESSAGE_LEN`].
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The size limit for this message.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Get the current message length (the header's length field).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Get a copy of the current header.
    pub fn header(&self) -> NlMsgHdr {
        let mut header = NlMsgHdr::default();
        header
            .as_mut_bytes()
            .copy_from_slice(&self.buf[..NLMSG_HDRLEN]);
        header
    }

    /// Append raw bytes at the next aligned offset.
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        let offset = self.reserve(data.len())?;
        self.commit(offset, &[data]);
        Ok(())
    }

    /// Append a fixed-size family header (ifinfomsg, rtmsg, ...).
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) -> Result<()> {
        self.append_bytes(data.as_bytes())
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        let attr_len = NLA_HDRLEN + data.len();
        if attr_len > u16::MAX as usize {
            return Err(Error::MessageTooLarge {
                len: nlmsg_align(self.buf.len()) + attr_len,
                limit: self.limit,
            });
        }
        let offset = self.reserve(attr_len)?;
        let attr = NlAttr::new(attr_type, data.len());
        self.commit(offset, &[attr.as_bytes(), data]);
        Ok(())
    }

    /// Append a u8 attribute.
    pub fn append_attr_u8(&mut self, attr_type: u16, value: u8) -> Result<()> {
        self.append_attr(attr_type, &[value])
    }

    /// Append an empty (flag) attribute with no payload.
    pub fn append_attr_empty(&mut self, attr_type: u16) -> Result<()> {
        self.append_attr(attr_type, &[])
    }

    /// Append a u16 attribute (native endian).
    pub fn append_attr_u16(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u64 attribute (native endian).
    pub fn append_attr_u64(&mut self, attr_type: u16, value: u64) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a u16 attribute (big endian / network order).
    pub fn append_attr_u16_be(&mut self, attr_type: u16, value: u16) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a u32 attribute (big endian / network order).
    pub fn append_attr_u32_be(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_be_bytes())
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.append_attr(attr_type, &data)
    }

    /// Start a nested attribute. Returns a token to finalize it.
    pub fn nest_start(&mut self, attr_type: u16) -> Result<NestToken> {
        let offset = self.reserve(NLA_HDRLEN)?;
        let attr = NlAttr::new(attr_type | NLA_F_NESTED, 0);
        self.commit(offset, &[attr.as_bytes()]);
        Ok(NestToken { offset })
    }

    /// End a nested attribute started with `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) -> Result<()> {
        let len = self.buf.len() - token.offset;
        let len = u16::try_from(len).map_err(|_| Error::MessageTooLarge {
            len: self.buf.len(),
            limit: self.limit,
        })?;
        self.buf[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes());
        Ok(())
    }

    /// Set the message flags, replacing the existing ones.
    pub fn set_flags(&mut self, flags: u16) {
        self.buf[6..8].copy_from_slice(&flags.to_ne_bytes());
    }

    /// Add flags to the existing ones.
    pub fn add_flags(&mut self, flags: u16) {
        let current = self.header().nlmsg_flags;
        self.set_flags(current | flags);
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finalize and return the message bytes, padded to alignment so that
    /// further frames can follow in the same datagram.
    pub fn finish(mut self) -> Vec<u8> {
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
        self.buf
    }

    /// Check that `extra` more bytes fit at the next aligned offset and
    /// return that offset.
    fn reserve(&self, extra: usize) -> Result<usize> {
        let offset = nlmsg_align(self.buf.len());
        let len = nlmsg_align(offset + extra);
        if len > self.limit || len > u32::MAX as usize {
            return Err(Error::MessageTooLarge {
                len,
                limit: self.limit,
            });
        }
        Ok(offset)
    }

    fn commit(&mut self, offset: usize, parts: &[&[u8]]) {
        self.buf.resize(offset, 0);
        for part in parts {
            self.buf.extend_from_slice(part);
        }
        self.sync_len();
    }

    fn sync_len(&mut self) {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::AttrIter;
    use crate::netlink::message::{MessageIter, NLM_F_ACK, NLM_F_REQUEST};

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(16, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 16);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_length_field_tracks_unaligned_end() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr(1, &[0xaa, 0xbb, 0xcc]).unwrap();
        assert_eq!(builder.len(), NLMSG_HDRLEN + NLA_HDRLEN + 3);
        assert_eq!(builder.header().nlmsg_len as usize, builder.len());

        // Next attribute starts on the aligned offset.
        builder.append_attr_u32(2, 7).unwrap();
        assert_eq!(builder.len(), NLMSG_HDRLEN + 8 + NLA_HDRLEN + 4);

        let msg = builder.finish();
        let frame = MessageIter::new(&msg).next().unwrap().unwrap();
        let attrs: Vec<_> = frame.attrs(0).collect();
        assert_eq!(attrs[0], (1, &[0xaa, 0xbb, 0xcc][..]));
        assert_eq!(attrs[1], (2, &7u32.to_ne_bytes()[..]));
    }

    #[test]
    fn test_rejects_oversized_attribute_without_change() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr(1, &[0u8; 900]).unwrap();
        let before = builder.as_bytes().to_vec();

        let err = builder.append_attr(2, &[0u8; 200]).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { limit: MAX_MESSAGE_LEN, .. }));
        assert_eq!(builder.as_bytes(), &before[..]);
        assert_eq!(builder.header().nlmsg_len as usize, before.len());
    }

    #[test]
    fn test_repeated_appends_never_exceed_limit() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let mut accepted = 0;
        for i in 0..1000u16 {
            let len = builder.len();
            match builder.append_attr(i, &[1, 2, 3, 4, 5]) {
                Ok(()) => accepted += 1,
                Err(Error::MessageTooLarge { .. }) => assert_eq!(builder.len(), len),
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert!(nlmsg_align(builder.len()) <= MAX_MESSAGE_LEN);
        }
        // 12 bytes per attribute after the 16 byte header.
        assert_eq!(accepted, (MAX_MESSAGE_LEN - NLMSG_HDRLEN) / 12);
    }

    #[test]
    fn test_custom_limit() {
        let mut builder = MessageBuilder::new(16, 0).with_limit(24);
        builder.append_attr_u32(1, 1).unwrap();
        assert!(builder.append_attr_empty(2).is_err());
        assert_eq!(builder.limit(), 24);
    }

    #[test]
    fn test_nested_attribute() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        let nest = builder.nest_start(1).unwrap();
        builder.append_attr_u32(2, 100).unwrap();
        builder.nest_end(nest).unwrap();
        let msg = builder.finish();

        let frame = MessageIter::new(&msg).next().unwrap().unwrap();
        let (kind, inner) = frame.attrs(0).next().unwrap();
        assert_eq!(kind, 1);
        let nested: Vec<_> = AttrIter::new(inner).collect();
        assert_eq!(nested, vec![(2, &100u32.to_ne_bytes()[..])]);
    }

    #[test]
    fn test_header_fields() {
        let mut builder = MessageBuilder::new(18, NLM_F_REQUEST);
        builder.append_bytes(&[0]).unwrap();
        builder.add_flags(NLM_F_ACK);
        builder.set_seq(9);
        builder.set_pid(1234);

        let header = builder.header();
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
        assert_eq!(header.nlmsg_seq, 9);
        assert_eq!(header.nlmsg_pid, 1234);
        assert_eq!(header.nlmsg_len, 17);
        assert_eq!(builder.finish().len(), 20);
    }
}
