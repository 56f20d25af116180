//! Process-wide single-slot guard
//!
//! Some operations (CPU sampling) make no sense twice at once. Instead of
//! queuing a second request, [`ExclusiveSlot::enter`] fails immediately
//! with `AlreadyRunning`.

use crate::error::{Result, SupervisorError};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct SlotState<T> {
    generation: u64,
    occupied: bool,
    value: Option<T>,
}

/// A slot that at most one holder can occupy
#[derive(Debug)]
pub struct ExclusiveSlot<T> {
    name: String,
    state: Arc<Mutex<SlotState<T>>>,
}

impl<T> ExclusiveSlot<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SlotState {
                generation: 0,
                occupied: false,
                value: None,
            })),
        }
    }

    /// Occupy the slot until the returned guard is dropped.
    pub fn enter(&self) -> Result<SlotGuard<T>> {
        let mut state = self.state.lock();
        if state.occupied {
            return Err(SupervisorError::AlreadyRunning(self.name.clone()));
        }
        state.occupied = true;
        state.generation += 1;
        state.value = None;
        Ok(SlotGuard {
            generation: state.generation,
            state: Arc::clone(&self.state),
        })
    }

    /// Attach a value to the occupancy started by `generation`. Ignored if
    /// that occupancy already ended.
    pub fn annotate(&self, generation: u64, value: T) {
        let mut state = self.state.lock();
        if state.occupied && state.generation == generation {
            state.value = Some(value);
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.state.lock().occupied
    }
}

impl<T: Clone> ExclusiveSlot<T> {
    /// Value attached to the current occupancy.
    pub fn current(&self) -> Option<T> {
        let state = self.state.lock();
        if state.occupied {
            state.value.clone()
        } else {
            None
        }
    }
}

/// Releases the slot on drop
#[derive(Debug)]
pub struct SlotGuard<T> {
    generation: u64,
    state: Arc<Mutex<SlotState<T>>>,
}

impl<T> SlotGuard<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.occupied = false;
            state.value = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_fails_fast() {
        let slot: ExclusiveSlot<u32> = ExclusiveSlot::new("Profiler");
        let guard = slot.enter().unwrap();
        assert_eq!(
            slot.enter().unwrap_err(),
            SupervisorError::AlreadyRunning("Profiler".into())
        );
        slot.annotate(guard.generation(), 9);
        assert_eq!(slot.current(), Some(9));
        drop(guard);
        assert!(!slot.is_occupied());
        assert_eq!(slot.current(), None);
        assert!(slot.enter().is_ok());
    }

    #[test]
    fn test_stale_annotation_is_ignored() {
        let slot: ExclusiveSlot<&str> = ExclusiveSlot::new("Profiler");
        let first = slot.enter().unwrap();
        let stale = first.generation();
        drop(first);
        let second = slot.enter().unwrap();
        slot.annotate(stale, "old");
        assert_eq!(slot.current(), None);
        slot.annotate(second.generation(), "new");
        assert_eq!(slot.current(), Some("new"));
    }
}
