//! Per-frame semaphore/fence free lists, one per ring slot. Grounded in
//! `original_source`'s `SynchronizationManager`.
//!
//! Semaphores and fences are recycled rather than destroyed every frame: a
//! ring slot's handles are only safe to reuse once the executor has confirmed
//! (via `wait_for_fences`) that the prior frame occupying that slot has fully
//! retired, which is exactly when `begin_frame` is called.

use crate::rhi::{FenceHandle, Rhi, SemaphoreHandle};

pub struct SynchronizationManager {
    semaphores: Vec<Vec<SemaphoreHandle>>,
    fences: Vec<Vec<FenceHandle>>,
    acquired_semaphores: Vec<Vec<SemaphoreHandle>>,
    acquired_fences: Vec<Vec<FenceHandle>>,
}

impl SynchronizationManager {
    pub fn new(ring_size: usize) -> Self {
        let ring_size = ring_size.max(1);
        Self {
            semaphores: (0..ring_size).map(|_| Vec::new()).collect(),
            fences: (0..ring_size).map(|_| Vec::new()).collect(),
            acquired_semaphores: (0..ring_size).map(|_| Vec::new()).collect(),
            acquired_fences: (0..ring_size).map(|_| Vec::new()).collect(),
        }
    }

    /// Returns every handle acquired for `ring_index` last time this slot was
    /// used to its free pool. Call once at the top of the frame occupying this
    /// ring slot, before any `acquire_*` call for the new frame.
    pub fn begin_frame(&mut self, ring_index: usize) {
        let recycled_semaphores = std::mem::take(&mut self.acquired_semaphores[ring_index]);
        self.semaphores[ring_index].extend(recycled_semaphores);
        let recycled_fences = std::mem::take(&mut self.acquired_fences[ring_index]);
        self.fences[ring_index].extend(recycled_fences);
    }

    pub fn acquire_semaphore(&mut self, ring_index: usize, rhi: &impl Rhi) -> SemaphoreHandle {
        let handle = self.semaphores[ring_index].pop().unwrap_or_else(|| rhi.create_semaphore());
        self.acquired_semaphores[ring_index].push(handle);
        handle
    }

    pub fn acquire_fence(&mut self, ring_index: usize, rhi: &impl Rhi) -> FenceHandle {
        let handle = self.fences[ring_index].pop().unwrap_or_else(|| rhi.create_fence());
        self.acquired_fences[ring_index].push(handle);
        handle
    }

    /// Destroys every handle this manager has ever produced, free or in use.
    /// Called once at shutdown, after the RHI has been drained.
    pub fn destroy_all(&mut self, rhi: &impl Rhi) {
        for slot in self.semaphores.iter().chain(self.acquired_semaphores.iter()) {
            for &handle in slot {
                rhi.destroy_semaphore(handle);
            }
        }
        for slot in self.fences.iter().chain(self.acquired_fences.iter()) {
            for &handle in slot {
                rhi.destroy_fence(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::fake::FakeRhi;

    #[test]
    fn recycled_semaphore_is_reused_after_begin_frame() {
        let rhi = FakeRhi::new();
        let mut manager = SynchronizationManager::new(2);

        manager.begin_frame(0);
        let first = manager.acquire_semaphore(0, &rhi);

        manager.begin_frame(0);
        let second = manager.acquire_semaphore(0, &rhi);

        assert_eq!(first, second, "ring slot 0's semaphore should be recycled, not recreated");
    }

    #[test]
    fn distinct_ring_slots_do_not_share_a_pool() {
        let rhi = FakeRhi::new();
        let mut manager = SynchronizationManager::new(2);

        manager.begin_frame(0);
        let slot0 = manager.acquire_fence(0, &rhi);
        manager.begin_frame(1);
        let slot1 = manager.acquire_fence(1, &rhi);

        assert_ne!(slot0, slot1);
    }
}
