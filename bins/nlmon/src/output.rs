//! Frame printing.

use std::io::{self, Write};

use nlexchange::netlink::attr::get;
use nlexchange::netlink::{MessageIter, NlMsgHdr, NlMsgType};
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// IFLA_IFNAME for links, IFA_LABEL for addresses.
const NAME_ATTR: u16 = 3;

/// Where the attributes start in messages that carry a name attribute
/// (after `ifinfomsg` or `ifaddrmsg`).
fn name_attrs_offset(msg_type: u16) -> Option<usize> {
    match msg_type {
        NlMsgType::RTM_NEWLINK | NlMsgType::RTM_DELLINK => Some(16),
        NlMsgType::RTM_NEWADDR | NlMsgType::RTM_DELADDR => Some(8),
        _ => None,
    }
}

/// One printed frame.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub seq: u32,
    pub msg_type: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub len: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FrameRecord {
    pub fn new(header: &NlMsgHdr, frame: &[u8]) -> Self {
        let mut record = Self {
            seq: header.nlmsg_seq,
            msg_type: header.nlmsg_type,
            kind: NlMsgType::name(header.nlmsg_type),
            len: header.nlmsg_len,
            family: None,
            name: None,
        };

        let Some(Ok(frame)) = MessageIter::new(frame).next() else {
            return record;
        };
        record.family = frame.payload().first().copied();

        if let Some(offset) = name_attrs_offset(header.nlmsg_type) {
            record.name = frame
                .attrs(offset)
                .find(|(kind, _)| *kind == NAME_ATTR)
                .and_then(|(_, data)| get::string(data).ok())
                .map(str::to_string);
        }
        record
    }

    pub fn print(&self, out: &mut impl Write, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, self)?;
                writeln!(out)
            }
            OutputFormat::Text => {
                write!(out, "seq {} ", self.seq)?;
                match self.kind {
                    Some(kind) => write!(out, "{kind}")?,
                    None => write!(out, "type {}", self.msg_type)?,
                }
                write!(out, " len {}", self.len)?;
                if let Some(family) = self.family {
                    write!(out, " family {family}")?;
                }
                if let Some(name) = &self.name {
                    write!(out, " {name}")?;
                }
                writeln!(out)
            }
        }
    }
}
