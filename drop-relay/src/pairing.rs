//! Pairing state machine.
//!
//! Every slot cycles through
//!
//! ```text
//!            claim                  join
//!   FREE ───────────► AWAITING ───────────► PAIRED ──┐ transmission
//!    ▲                RECEIVER               │  ▲    │ (touch)
//!    │                   │                   │  └────┘
//!    └───────────────────┴───────────────────┘
//!      got_all / disconnect / reaper timeout
//! ```
//!
//! [`Pairing`] owns the slot registry and the session index behind a single
//! mutex. Each transition runs entirely inside one critical section and
//! returns what the caller must tell whom; no I/O happens under the lock.

use crate::error::{ClientError, ClientResult, RegistryError};
use crate::registry::{Released, SlotRegistry, SlotState};
use crate::sessions::SessionIndex;
use drop_types::{Code, ConnId};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A slot torn down because one of its participants left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vacated {
    /// The freed slot.
    pub code: Code,
    /// The participant that stayed behind, if the slot had two.
    pub peer: Option<ConnId>,
}

/// Result of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claimed {
    /// Code now held by the requester.
    pub code: Code,
    /// Slot the requester held before and gave up.
    pub vacated: Option<Vacated>,
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// The joined slot.
    pub code: Code,
    /// Its sender, to be told to start transmitting.
    pub sender: ConnId,
    /// Slot the joiner held before and gave up.
    pub vacated: Option<Vacated>,
}

/// Result of a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed {
    /// The freed slot.
    pub code: Code,
    /// Its sender, to be told the receiver has everything.
    pub sender: ConnId,
}

/// Point-in-time counts for health and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairingStats {
    /// Total slots in the code space.
    pub total: usize,
    /// Slots open for claiming.
    pub free: usize,
    /// Slots awaiting a receiver or paired.
    pub allocated: usize,
    /// Slots with both sides bound.
    pub paired: usize,
    /// Connections bound to a slot.
    pub bound_connections: usize,
}

#[derive(Debug)]
struct PairingState {
    registry: SlotRegistry,
    sessions: SessionIndex,
}

/// The slot lifecycle, shared by every connection.
#[derive(Debug)]
pub struct Pairing {
    state: Mutex<PairingState>,
}

impl Pairing {
    /// Create a state machine over the full code space.
    pub fn new() -> Self {
        Self::with_registry(SlotRegistry::new())
    }

    /// Create a state machine over an existing registry.
    pub fn with_registry(registry: SlotRegistry) -> Self {
        Self {
            state: Mutex::new(PairingState {
                registry,
                sessions: SessionIndex::new(),
            }),
        }
    }

    /// FREE → AWAITING_RECEIVER: claim a random free slot for `conn`.
    ///
    /// If `conn` already held a slot it gives that one up, but only once the
    /// new claim has succeeded.
    pub fn claim(&self, conn: ConnId) -> Result<Claimed, RegistryError> {
        let mut state = self.lock();
        let code = state
            .registry
            .try_claim(conn, Instant::now(), &mut rand::thread_rng())?;
        let vacated = state.rebind(conn, code);

        tracing::info!("Slot {} claimed by {:?}", code, conn);
        Ok(Claimed { code, vacated })
    }

    /// AWAITING_RECEIVER → PAIRED: join the slot named by `slot` as receiver.
    pub fn join(&self, conn: ConnId, slot: Option<&str>) -> ClientResult<Joined> {
        let slot = slot.ok_or(ClientError::NoSlot)?;
        let code = Code::parse(slot).map_err(|_| ClientError::BadSlot)?;

        let mut state = self.lock();
        let current = state.registry.lookup(&code).map_err(|_| ClientError::BadSlot)?;
        if current.sender() == Some(conn) {
            return Err(ClientError::OldSlot);
        }
        let sender = state
            .registry
            .mark_joined(&code, conn, Instant::now())
            .map_err(|e| match e {
                RegistryError::NotFound { .. } => ClientError::BadSlot,
                _ => ClientError::OldSlot,
            })?;
        let vacated = state.rebind(conn, code);

        tracing::info!("Slot {} joined by {:?}", code, conn);
        Ok(Joined {
            code,
            sender,
            vacated,
        })
    }

    /// PAIRED → PAIRED: authorize a chunk from `conn` and refresh the slot.
    ///
    /// Returns the receiver to forward the chunk to. Only the slot's sender
    /// may transmit, and only while the slot is paired.
    pub fn relay(&self, conn: ConnId) -> ClientResult<ConnId> {
        let mut state = self.lock();
        let code = state.sessions.lookup(&conn)?;
        let slot = state.registry.lookup(&code).map_err(|_| ClientError::OldSlot)?;

        match (slot.state(), slot.sender(), slot.receiver()) {
            (SlotState::Paired, Some(sender), Some(receiver)) if sender == conn => {
                state
                    .registry
                    .touch(&code, Instant::now())
                    .map_err(|_| ClientError::OldSlot)?;
                Ok(receiver)
            }
            _ => Err(ClientError::OldSlot),
        }
    }

    /// PAIRED → FREE: the receiver `conn` has everything.
    pub fn complete(&self, conn: ConnId) -> ClientResult<Completed> {
        let mut state = self.lock();
        let code = state.sessions.lookup(&conn)?;
        let slot = state.registry.lookup(&code).map_err(|_| ClientError::OldSlot)?;

        let sender = match (slot.state(), slot.sender(), slot.receiver()) {
            (SlotState::Paired, Some(sender), Some(receiver)) if receiver == conn => sender,
            _ => return Err(ClientError::OldSlot),
        };
        state.teardown(&code);

        tracing::info!("Slot {} finished with; freeing it", code);
        Ok(Completed { code, sender })
    }

    /// AWAITING_RECEIVER / PAIRED → FREE: `conn` went away.
    ///
    /// Frees the slot `conn` was part of, whichever side it was on, and drops
    /// both participants' bindings. Returns `None` if `conn` held nothing.
    pub fn disconnect(&self, conn: ConnId) -> Option<Vacated> {
        let mut state = self.lock();
        let code = state.sessions.lookup(&conn).ok()?;
        let vacated = state.vacate(code, conn);

        tracing::info!("Slot {} vanished; freeing it", code);
        Some(vacated)
    }

    /// Reap: free every allocated slot idle for longer than `timeout` at `now`.
    ///
    /// Staleness is checked under the same lock that guards claim and join,
    /// so a slot cannot be reclaimed while a join on it is in progress.
    pub fn sweep_expired(&self, now: Instant, timeout: Duration) -> Vec<Released> {
        let mut state = self.lock();
        let reclaimed = state.registry.sweep_expired(now, timeout);
        for released in &reclaimed {
            for conn in released.participants() {
                state.sessions.unbind_if(&conn, &released.code);
            }
        }
        reclaimed
    }

    /// Current state of the slot for `code`, if it exists.
    pub fn state(&self, code: &Code) -> Option<SlotState> {
        self.lock().registry.lookup(code).ok().map(|slot| slot.state())
    }

    /// Code `conn` is currently bound to.
    pub fn binding(&self, conn: &ConnId) -> Option<Code> {
        self.lock().sessions.lookup(conn).ok()
    }

    /// Snapshot of slot and session counts.
    pub fn stats(&self) -> PairingStats {
        let state = self.lock();
        PairingStats {
            total: state.registry.len(),
            free: state.registry.free_count(),
            allocated: state.registry.allocated_count(),
            paired: state.registry.paired_count(),
            bound_connections: state.sessions.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PairingState> {
        // Every critical section leaves both maps consistent before it can
        // panic, so a poisoned guard is still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Pairing {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingState {
    /// Bind `conn` to `code`, giving up whatever slot it was bound to before.
    fn rebind(&mut self, conn: ConnId, code: Code) -> Option<Vacated> {
        match self.sessions.bind(conn, code) {
            Some(previous) if previous != code => {
                tracing::debug!("{:?} moved from slot {} to {}", conn, previous, code);
                Some(self.release_for(previous, conn))
            }
            _ => None,
        }
    }

    /// Free `code` on behalf of participant `leaving`, unbinding everyone.
    fn vacate(&mut self, code: Code, leaving: ConnId) -> Vacated {
        self.sessions.unbind_if(&leaving, &code);
        self.release_for(code, leaving)
    }

    fn release_for(&mut self, code: Code, leaving: ConnId) -> Vacated {
        let peer = self.teardown(&code).and_then(|released| {
            released.participants().find(|participant| *participant != leaving)
        });
        Vacated { code, peer }
    }

    /// Release `code` and drop every binding that still points at it.
    fn teardown(&mut self, code: &Code) -> Option<Released> {
        let released = self.registry.release(code).ok().flatten()?;
        for conn in released.participants() {
            self.sessions.unbind_if(&conn, code);
        }
        Some(released)
    }
}
