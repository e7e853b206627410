//! Library cursor: picks the index of the next track
//!
//! The cursor knows nothing about files, only the count of items in the
//! listing it is handed. An operator override wins exactly once; after that
//! selection continues from the overridden position.

use crate::error::{Error, Result};
use fm_common::config::SelectionOrder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct CursorState {
    /// Last index handed out; `None` before the first selection
    current: Option<usize>,
    /// One-shot "play this next" index
    override_index: Option<usize>,
    rng: StdRng,
}

/// Chooses the next item to play
#[derive(Debug)]
pub struct LibraryCursor {
    order: SelectionOrder,
    state: Mutex<CursorState>,
}

impl LibraryCursor {
    pub fn new(order: SelectionOrder) -> Self {
        Self::with_rng(order, StdRng::from_entropy())
    }

    /// Cursor with a reproducible random sequence
    pub fn with_seed(order: SelectionOrder, seed: u64) -> Self {
        Self::with_rng(order, StdRng::seed_from_u64(seed))
    }

    fn with_rng(order: SelectionOrder, rng: StdRng) -> Self {
        Self {
            order,
            state: Mutex::new(CursorState {
                current: None,
                override_index: None,
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn order(&self) -> SelectionOrder {
        self.order
    }

    /// Index of the next item for a library of `count` items
    ///
    /// A pending override is returned as-is, even if it is out of range for
    /// `count`; callers must bounds-check. With `count == 0` and no override
    /// the result is 0, which callers treat as "nothing to play".
    pub fn select_next(&self, count: usize) -> usize {
        let mut state = self.lock();

        let next = if let Some(index) = state.override_index.take() {
            index
        } else if count == 0 {
            0
        } else {
            match self.order {
                SelectionOrder::Random => state.rng.gen_range(0..count),
                SelectionOrder::Sequential => match state.current {
                    Some(last) if last + 1 < count => last + 1,
                    _ => 0,
                },
            }
        };

        state.current = Some(next);
        next
    }

    /// Queue the item at 1-based `ordinal` to be selected next
    pub fn set_override(&self, ordinal: usize) -> Result<()> {
        let index = ordinal
            .checked_sub(1)
            .ok_or_else(|| Error::Resolution("Media ordinals start at 1".to_string()))?;
        self.lock().override_index = Some(index);
        Ok(())
    }

    /// Pending override index, if any
    pub fn pending_override(&self) -> Option<usize> {
        self.lock().override_index
    }

    /// Last selected index
    pub fn current(&self) -> Option<usize> {
        self.lock().current
    }
}
