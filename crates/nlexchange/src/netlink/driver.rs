//! Driving a handler on the tokio reactor.

use std::future;

use tokio::io::Ready;
use tokio::time::{Instant, sleep_until};

use super::error::Result;
use super::handler::NetlinkHandler;
use super::listener::ExchangeListener;
use super::mux::TokioMultiplexer;
use super::socket::Transport;

impl<L, T> NetlinkHandler<L, TokioMultiplexer, T>
where
    L: ExchangeListener,
    T: Transport,
{
    /// Wait for one readiness event or the feedback timeout and process it.
    ///
    /// Readiness is cleared only for directions that ran into `WouldBlock`,
    /// so a turn that stopped early because of the read budget is followed
    /// immediately by another one.
    pub async fn turn(&mut self) -> Result<()> {
        let registration = self.mux().registration()?;
        let interest = self.mux().interest();
        let deadline = self.timeout().deadline();

        tokio::select! {
            guard = registration.ready(interest) => {
                let mut guard = guard?;
                let ready = guard.ready();
                let blocked = self.handle_event(ready.is_readable(), ready.is_writable());

                let mut clear = Ready::EMPTY;
                if blocked.read {
                    clear = clear | Ready::READABLE;
                }
                if blocked.write {
                    clear = clear | Ready::WRITABLE;
                }
                guard.clear_ready_matching(clear);
            }
            () = expiry(deadline) => self.handle_timeout(),
        }
        Ok(())
    }

    /// Turn until nothing is queued and no exchange is in transit.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        while self.has_pending_output() || self.in_transit() > 0 {
            self.turn().await?;
        }
        Ok(())
    }

    /// Turn forever. Only returns on a reactor error.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.turn().await?;
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
