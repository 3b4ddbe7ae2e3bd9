//! Correlation table for matching replies to outstanding commands.
//!
//! Every command that expects a reply reserves a slot keyed by an
//! identifier in `1..=capacity`. The read side hands a reply to the slot
//! with [`CorrelationTable::deliver`]; the caller waits on the
//! [`PendingReply`] guard it got back from [`CorrelationTable::reserve`].
//!
//! ```text
//!  send_command ──reserve()──► ┌────────────────────────────┐
//!                              │ id → oneshot::Sender       │ ◄──deliver(id)── router
//!  wait(timeout) ◄─── rx ───── │ (parking_lot::Mutex)       │
//!                              └────────────────────────────┘ ◄──drain_all()── disconnect
//! ```
//!
//! A slot leaves the table exactly once: on delivery, on timeout, when its
//! guard is dropped, or when the table is drained. Identifiers are only
//! unique among live slots and are handed out again once freed.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rustcon::correlation::CorrelationTable;
//! use rustcon::protocol::GenericFrame;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rustcon::Result<()> {
//! let table = CorrelationTable::new();
//! let slot = table.reserve()?;
//! let id = slot.identifier();
//!
//! assert!(table.deliver(id, GenericFrame { identifier: id, ..Default::default() }));
//! let reply = slot.wait(Duration::from_secs(1)).await?;
//! assert_eq!(reply.identifier, id);
//! assert!(table.is_empty());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{RconError, Result};
use crate::protocol::{GenericFrame, Identifier};

/// Default upper bound of the identifier range.
pub const DEFAULT_MAX_IDENTIFIER: Identifier = 1000;

struct Entry {
    /// Distinguishes successive registrations of the same identifier.
    ticket: u64,
    tx: oneshot::Sender<GenericFrame>,
}

struct Slots {
    entries: HashMap<Identifier, Entry>,
    /// Last identifier handed out.
    cursor: Identifier,
    next_ticket: u64,
}

impl Slots {
    fn insert(&mut self, identifier: Identifier) -> (u64, oneshot::Receiver<GenericFrame>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.entries.insert(identifier, Entry { ticket, tx });
        (ticket, rx)
    }

    /// Advance the cursor to the next unoccupied identifier, wrapping at
    /// `capacity`. Gives up after one full lap.
    fn next_free(&mut self, capacity: Identifier) -> Result<Identifier> {
        for _ in 0..capacity {
            self.cursor = if self.cursor >= capacity {
                1
            } else {
                self.cursor + 1
            };
            if !self.entries.contains_key(&self.cursor) {
                return Ok(self.cursor);
            }
        }
        Err(RconError::ExhaustedIdentifierSpace { capacity })
    }
}

/// Table of in-flight commands awaiting a reply.
///
/// All operations take a short exclusive lock; none of them await while
/// holding it.
pub struct CorrelationTable {
    slots: Mutex<Slots>,
    capacity: Identifier,
}

impl CorrelationTable {
    /// Create a table allocating identifiers in `1..=1000`.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_IDENTIFIER)
    }

    /// Create a table allocating identifiers in `1..=capacity`.
    ///
    /// A capacity below 1 is raised to 1.
    pub fn with_capacity(capacity: Identifier) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                cursor: 0,
                next_ticket: 1,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Size of the identifier range.
    #[inline]
    pub fn capacity(&self) -> Identifier {
        self.capacity
    }

    /// Pick an identifier not held by any live slot.
    ///
    /// Nothing is reserved: another caller may register the same value
    /// before this one does. Use [`reserve`](Self::reserve) to allocate and
    /// register atomically.
    pub fn allocate(&self) -> Result<Identifier> {
        self.slots.lock().next_free(self.capacity)
    }

    /// Register a slot for a specific identifier.
    ///
    /// # Errors
    ///
    /// - [`RconError::DuplicateIdentifier`] if a live slot already holds it.
    /// - [`RconError::InvalidConfiguration`] if `identifier` is below 1,
    ///   since such a slot could never be matched.
    pub fn register(&self, identifier: Identifier) -> Result<PendingReply<'_>> {
        if identifier < 1 {
            return Err(RconError::invalid(
                "identifier",
                format!("{identifier} is reserved for unsolicited frames"),
            ));
        }

        let mut slots = self.slots.lock();
        if slots.entries.contains_key(&identifier) {
            return Err(RconError::DuplicateIdentifier(identifier));
        }
        let (ticket, rx) = slots.insert(identifier);
        Ok(PendingReply::new(self, identifier, ticket, rx))
    }

    /// Allocate a free identifier and register a slot for it under one lock.
    pub fn reserve(&self) -> Result<PendingReply<'_>> {
        let mut slots = self.slots.lock();
        let identifier = slots.next_free(self.capacity)?;
        let (ticket, rx) = slots.insert(identifier);
        tracing::trace!(identifier, pending = slots.entries.len(), "reserved reply slot");
        Ok(PendingReply::new(self, identifier, ticket, rx))
    }

    /// Hand a reply to the slot registered for `identifier`.
    ///
    /// Returns `true` if a waiter received the frame. The slot is removed
    /// either way; `false` means the frame is not a correlated reply.
    pub fn deliver(&self, identifier: Identifier, frame: GenericFrame) -> bool {
        self.try_deliver(identifier, frame).is_none()
    }

    /// Like [`deliver`](Self::deliver), but hands the frame back when no
    /// waiter took it so the caller can route it elsewhere.
    pub fn try_deliver(&self, identifier: Identifier, frame: GenericFrame) -> Option<GenericFrame> {
        let entry = self.slots.lock().entries.remove(&identifier);
        match entry {
            Some(entry) => entry.tx.send(frame).err(),
            None => Some(frame),
        }
    }

    /// Remove the slot for `identifier`, if any. Its waiter observes
    /// [`RconError::ConnectionClosed`].
    pub fn remove(&self, identifier: Identifier) -> bool {
        self.slots.lock().entries.remove(&identifier).is_some()
    }

    /// Remove every slot. Each waiter observes [`RconError::ConnectionClosed`].
    ///
    /// Returns the number of slots drained. Deliveries racing with the drain
    /// either land before it or find no slot.
    pub fn drain_all(&self) -> usize {
        let drained = std::mem::take(&mut self.slots.lock().entries);
        // Senders drop here, outside the lock, waking every waiter.
        drained.len()
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    /// Check if no command is awaiting a reply.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().entries.is_empty()
    }

    /// Check if a live slot holds `identifier`.
    pub fn contains(&self, identifier: Identifier) -> bool {
        self.slots.lock().entries.contains_key(&identifier)
    }

    /// Identifiers of live slots, sorted (for diagnostics).
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self.slots.lock().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove `identifier` only if it still belongs to `ticket`.
    fn release(&self, identifier: Identifier, ticket: u64) -> bool {
        let mut slots = self.slots.lock();
        match slots.entries.get(&identifier) {
            Some(entry) if entry.ticket == ticket => {
                slots.entries.remove(&identifier);
                true
            }
            _ => false,
        }
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A reserved slot: the single-use rendezvous for one reply.
///
/// Dropping the guard frees the identifier, so an abandoned
/// `send_command` future never leaks a slot.
pub struct PendingReply<'a> {
    table: &'a CorrelationTable,
    identifier: Identifier,
    ticket: u64,
    rx: oneshot::Receiver<GenericFrame>,
}

impl<'a> PendingReply<'a> {
    fn new(
        table: &'a CorrelationTable,
        identifier: Identifier,
        ticket: u64,
        rx: oneshot::Receiver<GenericFrame>,
    ) -> Self {
        Self {
            table,
            identifier,
            ticket,
            rx,
        }
    }

    /// Identifier this slot is registered under.
    #[inline]
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    /// Wait for the reply.
    ///
    /// # Errors
    ///
    /// - [`RconError::Timeout`] if nothing arrives within `timeout`; the
    ///   slot is removed before returning.
    /// - [`RconError::ConnectionClosed`] if the slot was drained or removed.
    pub async fn wait(mut self, timeout: Duration) -> Result<GenericFrame> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(RconError::ConnectionClosed),
            Err(_elapsed) => {
                self.table.release(self.identifier, self.ticket);
                Err(RconError::Timeout {
                    identifier: self.identifier,
                    timeout,
                })
            }
        }
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.table.release(self.identifier, self.ticket) {
            tracing::debug!(
                identifier = self.identifier,
                "reply slot dropped before completion"
            );
        }
    }
}
