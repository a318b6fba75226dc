use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Outcome of `SessionCoordinator::arm_pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// No newer request armed over this one during the wait; the caller
    /// is the survivor of the debounce and should proceed to the LLM.
    Settled,
    /// A newer request for the same session armed its own debounce before
    /// this wait finished; the caller's turn is discarded entirely.
    Superseded,
}

/// A handle identifying one turn's in-flight upstream fetch.
///
/// `id` lets the pipeline guard in-flight cleanup with a pointer-identity
/// check: a late completion/error from a cancelled old turn must not clear
/// a newer turn's handle. `CancellationToken` has no public
/// way to compare two clones for identity, so a monotonic counter plays
/// that role instead — two `TurnHandle`s are "the same turn" iff their
/// `id`s match.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    pub cancel: CancellationToken,
    id: u64,
}

static NEXT_TURN_ID: AtomicU64 = AtomicU64::new(1);

impl TurnHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            id: NEXT_TURN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn is_same_turn(&self, other: &TurnHandle) -> bool {
        self.id == other.id
    }
}

impl Default for TurnHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct InFlight {
    pub handle: TurnHandle,
    #[allow(dead_code)] // kept for debugging / future dedup-by-user-text use
    pub user_text: String,
}

pub(crate) struct Pending {
    pub supersede: CancellationToken,
}

#[derive(Default)]
pub(crate) struct CoordinatorEntry {
    pub in_flight: Option<InFlight>,
    pub pending: Option<Pending>,
}

impl CoordinatorEntry {
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_none()
    }
}
