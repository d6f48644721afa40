//! The shared job counter that workers claim units from.
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct DispenserState {
    next: usize,
    cancelled: bool,
}

/// Hands out the indices `0 .. total` one at a time to any number of workers.
///
/// Every index is claimed exactly once. There is no ordering between workers, but the
/// indices claimed by any single worker are strictly increasing.
#[derive(Debug)]
pub struct JobDispenser {
    total: usize,
    state: Mutex<DispenserState>,
}

impl JobDispenser {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(DispenserState::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Claims the next unclaimed index, or returns `None` if all indices have been claimed
    /// or the dispenser was cancelled.
    pub fn claim(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if !state.cancelled && state.next < self.total {
            let index = state.next;
            state.next += 1;
            Some(index)
        } else {
            None
        }
    }

    /// Stops handing out indices. Work already claimed is unaffected.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// The number of indices handed out so far.
    pub fn num_claimed(&self) -> usize {
        self.state.lock().next
    }
}
