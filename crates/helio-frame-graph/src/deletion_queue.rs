//! Deferred destruction, bucketed by ring slot. Grounded in
//! `original_source`'s `DeletionQueue`.
//!
//! Destroying a GPU resource still referenced by an in-flight command buffer
//! is undefined behavior on every real backend; the per-frame fence
//! discipline makes that impossible by construction: a deleter queued for ring
//! slot N only runs the next time the executor reaches the end of a frame
//! occupying slot N, by which point `wait_for_fences` has already confirmed
//! that slot's prior occupant has fully retired.

use crate::rhi::Rhi;

pub struct DeletionQueue<R: Rhi> {
    ring_size: usize,
    per_slot: Vec<Vec<Box<dyn FnOnce(&R) + Send>>>,
}

impl<R: Rhi> DeletionQueue<R> {
    pub fn new(ring_size: usize) -> Self {
        let ring_size = ring_size.max(1);
        Self { ring_size, per_slot: (0..ring_size).map(|_| Vec::new()).collect() }
    }

    /// Enqueues `deleter` to run the next time ring slot `ring_index` retires.
    pub fn enqueue(&mut self, ring_index: usize, deleter: impl FnOnce(&R) + Send + 'static) {
        self.per_slot[ring_index % self.ring_size].push(Box::new(deleter));
    }

    /// Drains and runs every deleter queued for `ring_index`.
    pub fn drain(&mut self, ring_index: usize, rhi: &R) {
        for deleter in std::mem::take(&mut self.per_slot[ring_index % self.ring_size]) {
            deleter(rhi);
        }
    }

    pub fn pending_count(&self, ring_index: usize) -> usize {
        self.per_slot[ring_index % self.ring_size].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::fake::FakeRhi;
    use crate::rhi::TextureHandle;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn deleter_runs_only_after_drain_for_its_ring_index() {
        let rhi = FakeRhi::new();
        let mut queue: DeletionQueue<FakeRhi> = DeletionQueue::new(3);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        queue.enqueue(1, move |rhi: &FakeRhi| {
            rhi.destroy_texture(TextureHandle(7));
            ran_clone.store(true, Ordering::SeqCst);
        });

        queue.drain(0, &rhi);
        assert!(!ran.load(Ordering::SeqCst), "draining a different ring slot must not run this deleter");

        queue.drain(1, &rhi);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(queue.pending_count(1), 0);
    }
}
