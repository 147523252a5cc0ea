//! The batched aggregator ("conveyor"): a cooperative many-to-many small
//! message exchanger used by the aggregated realizations of transpose,
//! reverse transpose, and shuffle (SPEC_FULL.md §4.3).
//!
//! Grounded on the original's `convey_*` state machine (`begin`/`push`/
//! `pull`/`apull`/`unpull`/`advance`/`reset`), expressed here as an explicit
//! cooperative loop per the design note "encode it as an explicit loop with
//! a two-phase progress predicate rather than recursive callbacks", and on
//! the mailbox-per-destination registry pattern in
//! `feldera/dbsp`'s `Exchange` operator (`other_examples/...exchange2.rs`),
//! adapted from async/tarpc channels to the fleet's own message-channel
//! primitive (`SymmetricAllocator::try_send_bytes`/`try_recv_bytes`).

use std::collections::VecDeque;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::allocator::SymmetricAllocator;

/// A record carried through an aggregator: bitwise-copyable, fixed size.
pub trait Message: Pod + Zeroable + Copy {}
impl<T: Pod + Zeroable + Copy> Message for T {}

/// One exchange session. Not `Sync`: aggregators are cooperative and
/// single-threaded per rank, matching SPEC_FULL.md §5's "cooperative,
/// single-threaded per rank" scheduling model.
pub struct Aggregator<T: Message> {
    fleet: Arc<dyn SymmetricAllocator>,
    channel: u32,
    inbox: VecDeque<(usize, T)>,
    /// The most recent `apull` result, re-queued by `unpull` onto the front
    /// of `inbox` rather than kept here directly, so a plain `pull`/`apull`
    /// call afterward sees it first.
    last_apull: Option<(usize, T)>,
    done_sent: bool,
}

/// Outcome of [`Aggregator::pull`].
pub enum Pulled<T> {
    Ok(T),
    Empty,
}

impl<T: Message> Aggregator<T> {
    /// Open a fresh exchange session over `fleet`. Collective: every rank
    /// must call `begin` the same number of times in the same order, since
    /// the underlying channel id is assigned in lockstep (mirrors
    /// `SymmetricAllocator::alloc`'s numbering discipline).
    pub fn begin(fleet: Arc<dyn SymmetricAllocator>) -> Self {
        let channel = fleet.open_channel();
        Self {
            fleet,
            channel,
            inbox: VecDeque::new(),
            last_apull: None,
            done_sent: false,
        }
    }

    /// Enqueue `record` for delivery to `dst_rank`. Returns `false` if the
    /// destination's inbound buffer is backpressured; the caller must
    /// retry the same record later.
    pub fn push(&mut self, record: T, dst_rank: usize) -> bool {
        let bytes = bytemuck::bytes_of(&record);
        self.fleet.try_send_bytes(self.channel, dst_rank, bytes)
    }

    /// Remove and return one received record, from any source.
    pub fn pull(&mut self) -> Pulled<T> {
        self.drain_wire();
        match self.inbox.pop_front() {
            Some((_, record)) => Pulled::Ok(record),
            None => Pulled::Empty,
        }
    }

    /// Zero-copy-flavored variant returning the source rank alongside the
    /// record. The returned record remains the "current" apull result until
    /// the next `advance`, `pull`, or `apull` call, so that `unpull` can
    /// re-queue exactly it.
    pub fn apull(&mut self) -> Option<(usize, T)> {
        self.drain_wire();
        let item = self.inbox.pop_front()?;
        self.last_apull = Some(item);
        Some(item)
    }

    /// Re-queue the most recent `apull` result at the front of the inbox,
    /// so the next `apull`/`pull` sees it again. Guaranteed to survive
    /// exactly one subsequent `advance` (SPEC_FULL.md §9 open question):
    /// `advance` only drains the wire into the back of `inbox`, never
    /// touching the front, so an `unpull`'d record is not disturbed by the
    /// very next `advance` call.
    pub fn unpull(&mut self) {
        if let Some(item) = self.last_apull.take() {
            self.inbox.push_front(item);
        }
    }

    /// Cooperative progress step. `done` asserts the caller will push no
    /// more records this session. Returns `true` while there is still work
    /// outstanding fleet-wide (either undelivered pushes or undrained
    /// inbox contents on some rank); `false` once every rank has called
    /// `advance(true)` and every channel has drained.
    pub fn advance(&mut self, done: bool) -> bool {
        self.drain_wire();
        if done {
            self.done_sent = true;
        }

        // A rank reports itself quiescent once it has asserted `done` and
        // has nothing left locally buffered for a caller to drain; that
        // status round-trips through a fleet-wide AND so every rank agrees
        // when the session is fully drained.
        let locally_quiescent = self.done_sent && self.inbox.is_empty();
        !self.fleet.reduce_and_bool(locally_quiescent)
    }

    /// Return this aggregator to a clean state, ready for the next `begin`.
    pub fn reset(&mut self) {
        self.fleet.close_channel(self.channel);
        self.inbox.clear();
        self.last_apull = None;
        self.done_sent = false;
    }

    fn drain_wire(&mut self) {
        while let Some((src, bytes)) = self.fleet.try_recv_bytes(self.channel) {
            let record: T = *bytemuck::from_bytes(&bytes);
            self.inbox.push_back((src, record));
        }
    }
}
