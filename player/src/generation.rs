//! Generation counter used to invalidate in-flight work.
//!
//! Every load/unload/destroy advances the counter. Async tasks capture the
//! generation they were started under and compare it against the current one
//! after each suspension point; a mismatch means the task is stale and must exit
//! without touching session state.

use std::fmt;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);
    /// Value held after destroy. Nothing is ever tagged with it.
    pub const RETIRED: Generation = Generation(u64::MAX);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

struct CounterState {
    current: Generation,
    token: CancellationToken,
}

/// Owner of the current generation and the cancellation token tied to it.
pub struct GenerationCounter {
    state: Mutex<CounterState>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CounterState {
                current: Generation::INITIAL,
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn current(&self) -> Generation {
        self.lock().current
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.lock().current == generation
    }

    /// Token cancelled as soon as `generation` is superseded.
    ///
    /// Returns an already-cancelled token for a stale generation.
    pub fn token_for(&self, generation: Generation) -> CancellationToken {
        let state = self.lock();
        if state.current == generation {
            state.token.clone()
        } else {
            let token = CancellationToken::new();
            token.cancel();
            token
        }
    }

    /// Starts a new generation, cancelling every timer of the previous one
    /// before returning. Returns `(previous, new)`; `None` once retired.
    pub fn advance(&self) -> Option<(Generation, Generation)> {
        let mut state = self.lock();
        if state.current == Generation::RETIRED {
            return None;
        }
        let previous = state.current;
        state.token.cancel();
        state.current = Generation(previous.0 + 1);
        state.token = CancellationToken::new();
        Some((previous, state.current))
    }

    /// Moves to the retired generation. Returns the generation that was
    /// current, or `None` if already retired.
    pub fn retire(&self) -> Option<Generation> {
        let mut state = self.lock();
        if state.current == Generation::RETIRED {
            return None;
        }
        let previous = state.current;
        state.token.cancel();
        state.current = Generation::RETIRED;
        Some(previous)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CounterState> {
        // A poisoned lock only means a panic elsewhere; the counter itself is
        // always left consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}
