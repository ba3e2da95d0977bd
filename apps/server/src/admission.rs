//! Connection admission: a fixed ceiling on concurrently live sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct AdmissionController {
    active: AtomicUsize,
    ceiling: usize,
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            ceiling,
        })
    }

    /// Admits one connection if below the ceiling. The slot is held until the
    /// returned permit is dropped.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < self.ceiling).then_some(active + 1)
            })
            .ok()
            .map(|_| AdmissionPermit {
                controller: Arc::clone(self),
            })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// One admitted connection's slot. Dropping it is the only way to release
/// the slot, so each admission is released exactly once.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.active.fetch_sub(1, Ordering::SeqCst);
    }
}
