use super::session_state::{merge, SessionState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Folds frame updates into the current session's state.
///
/// The accumulator belongs to one session generation. `live_generation` is
/// shared with whoever can cancel or replace the session; once it moves on,
/// every further update is refused so an abandoned read loop cannot touch
/// the superseded state.
pub struct SessionAccumulator {
    live_generation: Arc<AtomicU64>,
    generation: u64,
    snapshot: Arc<SessionState>,
}

impl SessionAccumulator {
    pub fn new(live_generation: Arc<AtomicU64>) -> Self {
        let generation = live_generation.load(Ordering::SeqCst);
        Self {
            live_generation,
            generation,
            snapshot: Arc::new(SessionState::default()),
        }
    }

    /// Starts a fresh, empty session and returns its generation. Any holder
    /// of the previous generation becomes stale.
    pub fn restart(&mut self) -> u64 {
        self.generation = self.live_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot = Arc::new(SessionState::default());
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.live_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Merges `update` and returns the new snapshot, or `None` when the
    /// update belongs to a stale generation.
    pub fn apply(&mut self, generation: u64, update: SessionState) -> Option<Arc<SessionState>> {
        if generation != self.generation || !self.is_current() {
            return None;
        }
        let next = merge(SessionState::clone(&self.snapshot), update);
        self.snapshot = Arc::new(next);
        Some(Arc::clone(&self.snapshot))
    }

    pub fn snapshot(&self) -> Arc<SessionState> {
        Arc::clone(&self.snapshot)
    }
}
