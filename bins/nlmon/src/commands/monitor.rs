//! nlmon monitor - print rtnetlink multicast notifications.

use clap::{Args, ValueEnum};
use nlexchange::netlink::rtnetlink_groups::*;
use nlexchange::netlink::{
    ExchangeEvent, HandlerConfig, NetlinkHandler, Protocol, TokioMultiplexer, listener,
};
use tokio_stream::StreamExt;

use crate::output::{FrameRecord, OutputFormat};

/// Multicast groups that can be joined.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Group {
    /// Link state changes.
    Link,
    /// Neighbor cache changes.
    Neigh,
    /// IPv4 address changes.
    Ipv4Addr,
    /// IPv6 address changes.
    Ipv6Addr,
    /// IPv4 route changes.
    Ipv4Route,
    /// IPv6 route changes.
    Ipv6Route,
}

impl Group {
    fn id(self) -> u32 {
        match self {
            Group::Link => RTNLGRP_LINK,
            Group::Neigh => RTNLGRP_NEIGH,
            Group::Ipv4Addr => RTNLGRP_IPV4_IFADDR,
            Group::Ipv6Addr => RTNLGRP_IPV6_IFADDR,
            Group::Ipv4Route => RTNLGRP_IPV4_ROUTE,
            Group::Ipv6Route => RTNLGRP_IPV6_ROUTE,
        }
    }
}

#[derive(Args)]
pub struct MonitorCmd {
    /// Groups to join.
    #[arg(short = 'g', long = "group", default_value = "link")]
    groups: Vec<Group>,

    /// Exit after this many notifications.
    #[arg(short = 'c', long)]
    count: Option<usize>,
}

impl MonitorCmd {
    pub async fn run(&self, config: HandlerConfig, format: OutputFormat) -> anyhow::Result<()> {
        let (listener, mut events) = listener::channel();
        let mut handler = NetlinkHandler::open(
            Protocol::Route,
            "nlmon monitor",
            listener,
            TokioMultiplexer::new()?,
            config,
        )?;

        let groups: Vec<u32> = self.groups.iter().map(|g| g.id()).collect();
        handler.join_groups(&groups)?;
        eprintln!("Monitoring netlink events (Ctrl+C to stop)...");

        let mut stdout = std::io::stdout().lock();
        let mut seen = 0;
        loop {
            tokio::select! {
                biased;
                Some(event) = events.next() => {
                    if let ExchangeEvent::Message { header, frame } = event {
                        FrameRecord::new(&header, &frame).print(&mut stdout, format)?;
                        seen += 1;
                        if self.count.is_some_and(|count| seen >= count) {
                            break;
                        }
                    }
                }
                result = handler.turn() => result?,
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        handler.leave_groups(&groups)?;
        handler.close();
        Ok(())
    }
}
