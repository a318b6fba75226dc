//! Per-session coordinator.
//!
//! Serializes the speculative-turn strategy: every incoming turn aborts any
//! running upstream fetch for its session, then supersedes any pending
//! debounce timer, then arms a fresh one. Operations on a single session
//! are serialized by a per-key `Mutex`; the surrounding `DashMap` gives full
//! parallelism across sessions.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use voxrelay_core::SessionId;

use crate::types::{ArmOutcome, CoordinatorEntry, InFlight, Pending, TurnHandle};

#[derive(Default)]
pub struct SessionCoordinator {
    sessions: DashMap<SessionId, Mutex<CoordinatorEntry>>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `session`'s in-flight upstream fetch, if any, and clear it.
    /// A no-op when there is nothing running.
    pub fn abort_in_flight(&self, session: &SessionId) {
        let Some(slot) = self.sessions.get(session) else {
            return;
        };
        let mut entry = slot.lock().unwrap();
        if let Some(in_flight) = entry.in_flight.take() {
            debug!(session = %session, "aborting in-flight upstream fetch");
            in_flight.handle.cancel.cancel();
        }
    }

    /// Cancel `session`'s pending debounce timer, if any, and clear it. The
    /// waiting `arm_pending` call observes this via its own token and
    /// returns `Superseded`.
    pub fn supersede_pending(&self, session: &SessionId) {
        let Some(slot) = self.sessions.get(session) else {
            return;
        };
        let mut entry = slot.lock().unwrap();
        if let Some(pending) = entry.pending.take() {
            debug!(session = %session, "superseding pending debounce");
            pending.supersede.cancel();
        }
    }

    /// Install a fresh pending debounce for `session` and sleep `wait`.
    /// Returns `Superseded` if another request armed over this one (via
    /// `supersede_pending`) before the wait elapsed, `Settled` otherwise.
    pub async fn arm_pending(&self, session: &SessionId, wait: Duration) -> ArmOutcome {
        let supersede = CancellationToken::new();
        {
            let slot = self
                .sessions
                .entry(session.clone())
                .or_insert_with(|| Mutex::new(CoordinatorEntry::default()));
            let mut entry = slot.lock().unwrap();
            entry.pending = Some(Pending {
                supersede: supersede.clone(),
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                // Only clear our own pending slot — if a newer call already
                // replaced it, leave that one alone.
                if let Some(slot) = self.sessions.get(session) {
                    let mut entry = slot.lock().unwrap();
                    if entry.pending.as_ref().map(|p| p.supersede.is_cancelled()) == Some(false) {
                        entry.pending = None;
                    }
                }
                self.sweep_if_idle(session);
                ArmOutcome::Settled
            }
            _ = supersede.cancelled() => {
                ArmOutcome::Superseded
            }
        }
    }

    /// Register a fresh turn handle as `session`'s in-flight fetch and
    /// return it for the caller to pass into the upstream client.
    pub fn begin_in_flight(&self, session: &SessionId, user_text: String) -> TurnHandle {
        let handle = TurnHandle::new();
        let slot = self
            .sessions
            .entry(session.clone())
            .or_insert_with(|| Mutex::new(CoordinatorEntry::default()));
        let mut entry = slot.lock().unwrap();
        entry.in_flight = Some(InFlight {
            handle: handle.clone(),
            user_text,
        });
        handle
    }

    /// Clear `session`'s in-flight handle, but only if it still points at
    /// `expected` — guards against a late cancellation/error from a turn
    /// that a newer one has already superseded from evicting the newer
    /// turn's handle.
    pub fn clear_in_flight_if_matches(&self, session: &SessionId, expected: &TurnHandle) {
        if let Some(slot) = self.sessions.get(session) {
            let mut entry = slot.lock().unwrap();
            let matches = entry
                .in_flight
                .as_ref()
                .is_some_and(|cur| cur.handle.is_same_turn(expected));
            if matches {
                entry.in_flight = None;
            }
        }
        self.sweep_if_idle(session);
    }

    /// Number of sessions currently tracked (including idle ones not yet
    /// swept) — used by `/health`.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Remove `session`'s entry entirely once both `in_flight` and
    /// `pending` are empty, so idle sessions don't accumulate forever.
    fn sweep_if_idle(&self, session: &SessionId) {
        let idle = self
            .sessions
            .get(session)
            .map(|slot| slot.lock().unwrap().is_idle())
            .unwrap_or(false);
        if idle {
            self.sessions.remove(session);
        }
    }
}
