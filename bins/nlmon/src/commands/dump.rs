//! nlmon dump - one dump request over a route handler.

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use nlexchange::IoctlSockets;
use nlexchange::netlink::message::{NLM_F_DUMP, NLM_F_REQUEST};
use nlexchange::netlink::{
    ExchangeEvent, HandlerConfig, MessageBuilder, NetlinkHandler, NlMsgType, Protocol,
    TokioMultiplexer, listener,
};
use tokio_stream::StreamExt;

use crate::output::{FrameRecord, OutputFormat};

/// Objects that can be dumped.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Object {
    /// Network interfaces.
    Links,
    /// Interface addresses.
    Addresses,
    /// Routing table entries.
    Routes,
    /// ARP/NDP cache entries.
    Neighbors,
}

impl Object {
    fn request_type(self) -> u16 {
        match self {
            Object::Links => NlMsgType::RTM_GETLINK,
            Object::Addresses => NlMsgType::RTM_GETADDR,
            Object::Routes => NlMsgType::RTM_GETROUTE,
            Object::Neighbors => NlMsgType::RTM_GETNEIGH,
        }
    }

    /// Size of the family header (`ifinfomsg`, `ifaddrmsg`, `rtmsg`, `ndmsg`).
    fn header_len(self) -> usize {
        match self {
            Object::Links => 16,
            Object::Addresses => 8,
            Object::Routes | Object::Neighbors => 12,
        }
    }

    fn request(self, family: u8) -> nlexchange::Result<MessageBuilder> {
        let mut request = MessageBuilder::new(self.request_type(), NLM_F_REQUEST | NLM_F_DUMP);
        let mut header = vec![0u8; self.header_len()];
        header[0] = family;
        request.append_bytes(&header)?;
        Ok(request)
    }
}

#[derive(Args)]
pub struct DumpCmd {
    /// What to dump.
    object: Object,

    /// Use IPv4 only.
    #[arg(short = '4', conflicts_with = "ipv6")]
    ipv4: bool,

    /// Use IPv6 only.
    #[arg(short = '6')]
    ipv6: bool,
}

impl DumpCmd {
    fn family(&self) -> anyhow::Result<u8> {
        if self.ipv6 {
            let sockets = IoctlSockets::open().context("cannot open ioctl sockets")?;
            if !sockets.is_ipv6_supported() {
                bail!("IPv6 is not supported on this node");
            }
            return Ok(libc::AF_INET6 as u8);
        }
        if self.ipv4 {
            return Ok(libc::AF_INET as u8);
        }
        Ok(libc::AF_UNSPEC as u8)
    }

    pub async fn run(&self, config: HandlerConfig, format: OutputFormat) -> anyhow::Result<()> {
        let family = self.family()?;
        let (listener, mut events) = listener::channel();
        let mut handler = NetlinkHandler::open(
            Protocol::Route,
            "nlmon dump",
            listener,
            TokioMultiplexer::new()?,
            config,
        )?;

        let seq = handler.send(self.object.request(family)?)?;
        tracing::debug!(seq, object = ?self.object, "dump request queued");
        handler.run_until_idle().await?;
        handler.close();

        let mut stdout = std::io::stdout().lock();
        while let Some(event) = events.next().await {
            match event {
                ExchangeEvent::Message { header, frame } => {
                    FrameRecord::new(&header, &frame).print(&mut stdout, format)?;
                }
                ExchangeEvent::Done { .. } => {}
                ExchangeEvent::Failed { errno, .. } => {
                    return Err(nlexchange::Error::from_errno(errno))
                        .with_context(|| format!("dump of {:?} failed", self.object));
                }
                ExchangeEvent::TimedOut => bail!("no answer from the kernel"),
            }
        }
        Ok(())
    }
}
