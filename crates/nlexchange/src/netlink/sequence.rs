//! Process-wide netlink sequence numbers.
//!
//! Every handler in the process draws from the same 31-bit counter, so two
//! exchanges that are in flight at the same time never share a number unless
//! the counter wraps in between.

use std::sync::atomic::{AtomicU32, Ordering};

/// Mask applied after each increment.
pub const SEQUENCE_MASK: u32 = 0x7fff_ffff;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Successor of `seq` in the 31-bit sequence space.
#[inline]
pub const fn advance(seq: u32) -> u32 {
    seq.wrapping_add(1) & SEQUENCE_MASK
}

/// Take the next sequence number.
pub fn next_sequence() -> u32 {
    let previous = SEQUENCE
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seq| Some(advance(seq)))
        .unwrap_or_else(|seq| seq);
    advance(previous)
}
