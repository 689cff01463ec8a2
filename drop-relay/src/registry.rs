//! Slot registry.
//!
//! One slot per code, created up front and never destroyed. Free slots are
//! kept in a free-list so a claim picks uniformly at random among them in
//! O(1) instead of probing the whole code space.
//!
//! The registry does no locking of its own. [`Pairing`](crate::pairing::Pairing)
//! owns it behind the same mutex as the session index, which makes every
//! method here atomic with respect to concurrent callers.

use crate::error::{RegistryError, RegistryResult};
use drop_types::{generate_all, Code, ConnId};
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Externally visible state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Not allocated; eligible for a claim.
    Free,
    /// Claimed by a sender, no receiver yet.
    AwaitingReceiver,
    /// Sender and receiver both bound; payload may flow.
    Paired,
}

impl SlotState {
    fn as_str(self) -> &'static str {
        match self {
            SlotState::Free => "free",
            SlotState::AwaitingReceiver => "awaiting receiver",
            SlotState::Paired => "paired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Free,
    AwaitingReceiver { sender: ConnId },
    Paired { sender: ConnId, receiver: ConnId },
}

/// One rendezvous slot.
#[derive(Debug, Clone)]
pub struct Slot {
    code: Code,
    phase: Phase,
    last_activity: Instant,
}

impl Slot {
    fn new(code: Code, now: Instant) -> Self {
        Self {
            code,
            phase: Phase::Free,
            last_activity: now,
        }
    }

    /// The slot's code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Current state.
    pub fn state(&self) -> SlotState {
        match self.phase {
            Phase::Free => SlotState::Free,
            Phase::AwaitingReceiver { .. } => SlotState::AwaitingReceiver,
            Phase::Paired { .. } => SlotState::Paired,
        }
    }

    /// Whether the slot is claimed.
    pub fn is_allocated(&self) -> bool {
        !matches!(self.phase, Phase::Free)
    }

    /// Connection that claimed the slot.
    pub fn sender(&self) -> Option<ConnId> {
        match self.phase {
            Phase::Free => None,
            Phase::AwaitingReceiver { sender } | Phase::Paired { sender, .. } => Some(sender),
        }
    }

    /// Connection that joined the slot.
    pub fn receiver(&self) -> Option<ConnId> {
        match self.phase {
            Phase::Paired { receiver, .. } => Some(receiver),
            _ => None,
        }
    }

    /// Time of the last claim, join or relayed chunk.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn invalid(&self, operation: &'static str) -> RegistryError {
        RegistryError::InvalidState {
            code: self.code,
            state: self.state().as_str(),
            operation,
        }
    }
}

/// A slot that was just returned to the free state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    /// The slot's code.
    pub code: Code,
    /// Sender that held it.
    pub sender: ConnId,
    /// Receiver that had joined, if any.
    pub receiver: Option<ConnId>,
}

impl Released {
    /// Every connection that was bound to the slot.
    pub fn participants(&self) -> impl Iterator<Item = ConnId> {
        std::iter::once(self.sender).chain(self.receiver)
    }
}

/// Mapping from code to slot, pre-populated with the whole code space.
#[derive(Debug)]
pub struct SlotRegistry {
    slots: Vec<Slot>,
    index: HashMap<Code, usize>,
    /// Indices of free slots, in no particular order.
    free: Vec<usize>,
    paired: usize,
}

impl SlotRegistry {
    /// Create a registry holding every code in the code space, all free.
    pub fn new() -> Self {
        Self::with_codes(generate_all())
    }

    /// Create a registry over an explicit set of codes. Duplicates are ignored.
    pub fn with_codes(codes: impl IntoIterator<Item = Code>) -> Self {
        let now = Instant::now();
        let mut slots = Vec::new();
        let mut index = HashMap::new();
        for code in codes {
            if index.contains_key(&code) {
                continue;
            }
            index.insert(code, slots.len());
            slots.push(Slot::new(code, now));
        }
        let free = (0..slots.len()).collect();
        Self {
            slots,
            index,
            free,
            paired: 0,
        }
    }

    /// Claim a uniformly random free slot for `requester`.
    ///
    /// Selection and allocation happen in one step; there is no window in
    /// which two callers can both see the same slot as free.
    pub fn try_claim<R: Rng + ?Sized>(
        &mut self,
        requester: ConnId,
        now: Instant,
        rng: &mut R,
    ) -> RegistryResult<Code> {
        if self.free.is_empty() {
            return Err(RegistryError::ResourceExhausted);
        }
        let pick = rng.gen_range(0..self.free.len());
        let idx = self.free.swap_remove(pick);

        let slot = &mut self.slots[idx];
        debug_assert_eq!(slot.phase, Phase::Free);
        slot.phase = Phase::AwaitingReceiver { sender: requester };
        slot.last_activity = now;
        Ok(slot.code)
    }

    /// Look up a slot by code.
    pub fn lookup(&self, code: &Code) -> RegistryResult<&Slot> {
        self.index
            .get(code)
            .map(|&idx| &self.slots[idx])
            .ok_or(RegistryError::NotFound { code: *code })
    }

    /// Record `joiner` as the receiver of an awaiting slot.
    ///
    /// Returns the slot's sender.
    pub fn mark_joined(&mut self, code: &Code, joiner: ConnId, now: Instant) -> RegistryResult<ConnId> {
        let slot = self.slot_mut(code)?;
        match slot.phase {
            Phase::AwaitingReceiver { sender } => {
                slot.phase = Phase::Paired {
                    sender,
                    receiver: joiner,
                };
                slot.last_activity = now;
                self.paired += 1;
                Ok(sender)
            }
            _ => Err(slot.invalid("join")),
        }
    }

    /// Refresh the activity timestamp of an allocated slot.
    pub fn touch(&mut self, code: &Code, now: Instant) -> RegistryResult<()> {
        let slot = self.slot_mut(code)?;
        if !slot.is_allocated() {
            return Err(slot.invalid("touch"));
        }
        slot.last_activity = now;
        Ok(())
    }

    /// Return a slot to the free state.
    ///
    /// Releasing a slot that is already free is a no-op and yields `None`.
    pub fn release(&mut self, code: &Code) -> RegistryResult<Option<Released>> {
        let idx = *self
            .index
            .get(code)
            .ok_or(RegistryError::NotFound { code: *code })?;
        Ok(self.release_at(idx))
    }

    /// Free every allocated slot idle for longer than `timeout` at `now`.
    ///
    /// Staleness is judged on the live slot state, so a slot touched or joined
    /// before the caller took the lock is never reclaimed.
    pub fn sweep_expired(&mut self, now: Instant, timeout: Duration) -> Vec<Released> {
        let stale: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.is_allocated() && now.saturating_duration_since(slot.last_activity) > timeout
            })
            .map(|(idx, _)| idx)
            .collect();

        stale
            .into_iter()
            .filter_map(|idx| self.release_at(idx))
            .collect()
    }

    /// Total number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry holds no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of free slots.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of claimed slots (awaiting or paired).
    pub fn allocated_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of paired slots.
    pub fn paired_count(&self) -> usize {
        self.paired
    }

    fn slot_mut(&mut self, code: &Code) -> RegistryResult<&mut Slot> {
        match self.index.get(code) {
            Some(&idx) => Ok(&mut self.slots[idx]),
            None => Err(RegistryError::NotFound { code: *code }),
        }
    }

    fn release_at(&mut self, idx: usize) -> Option<Released> {
        let slot = &mut self.slots[idx];
        let released = match slot.phase {
            Phase::Free => return None,
            Phase::AwaitingReceiver { sender } => Released {
                code: slot.code,
                sender,
                receiver: None,
            },
            Phase::Paired { sender, receiver } => {
                self.paired -= 1;
                Released {
                    code: slot.code,
                    sender,
                    receiver: Some(receiver),
                }
            }
        };
        slot.phase = Phase::Free;
        self.free.push(idx);
        Some(released)
    }
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}
