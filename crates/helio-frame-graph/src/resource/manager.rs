//! Transient resource manager: stages resource allocation/usage requests during
//! scheduling, then either carries a resource's handle over from the previous
//! frame or creates it fresh. Grounded in `original_source`'s `ResourceManager`.

use super::{Resource, ResourceHandle, ResourceInfo};
use crate::error::{Error, Result};
use crate::name::Name;
use crate::rhi::{Rhi, ResourceLayout};
use std::collections::HashMap;

/// A configurator is queued alongside an allocation/usage request and run, in
/// request order, once all of a frame's resources have been materialized in
/// `end_resource_scheduling`. It records write/read dependency view infos
/// against the now-guaranteed-to-exist `Resource`.
pub type ResourceConfigurator = Box<dyn FnOnce(&mut Resource) + Send>;

struct StagedRequest {
    pass: Name,
    resource: Name,
    info: Option<ResourceInfo>,
    configurator: ResourceConfigurator,
}

#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
struct IntersectionEntry(u32);

/// Owns the live resource table and the cross-frame handle-transfer bookkeeping.
/// One instance per `FrameContext`; `begin_frame` must run before any pass's
/// `schedule_resources` is called.
pub struct TransientResourceManager {
    current: HashMap<Name, Resource>,
    previous: HashMap<Name, Resource>,
    staged_creations: Vec<StagedRequest>,
    staged_usages: Vec<StagedRequest>,
}

impl TransientResourceManager {
    pub fn new() -> Self {
        Self {
            current: HashMap::new(),
            previous: HashMap::new(),
            staged_creations: Vec::new(),
            staged_usages: Vec::new(),
        }
    }

    /// Swaps the previous/current resource maps. Called once at the top of each
    /// frame, before `begin_resource_scheduling`.
    pub fn begin_frame(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();
    }

    /// Clears staged requests left over from the prior frame's scheduling pass.
    pub fn begin_resource_scheduling(&mut self) {
        self.staged_creations.clear();
        self.staged_usages.clear();
    }

    /// Queues primary creation of `resource` by `pass`, with `info` describing its
    /// GPU shape and `configurator` recording the pass's write dependency once the
    /// resource record exists.
    pub fn queue_resource_allocation(
        &mut self,
        pass: Name,
        resource: Name,
        info: ResourceInfo,
        configurator: ResourceConfigurator,
    ) {
        self.staged_creations.push(StagedRequest { pass, resource, info: Some(info), configurator });
    }

    /// Queues a read/write usage of an already-allocated (by this or an earlier
    /// pass) resource, with `configurator` recording the dependency.
    pub fn queue_resource_usage(&mut self, pass: Name, resource: Name, configurator: ResourceConfigurator) {
        self.staged_usages.push(StagedRequest { pass, resource, info: None, configurator });
    }

    /// Materializes resource records for every staged creation (detecting
    /// duplicates), then applies every configurator — creations before usages,
    /// each group in request order — now that all records exist.
    pub fn end_resource_scheduling(&mut self) -> Result<()> {
        let mut first_seen: HashMap<Name, Name> = HashMap::new();

        for request in &self.staged_creations {
            if let Some(first_pass) = first_seen.get(&request.resource) {
                return Err(Error::DuplicateResource {
                    pass: request.pass,
                    resource: request.resource,
                    first_pass: *first_pass,
                });
            }
            first_seen.insert(request.resource, request.pass);

            let info = request.info.clone().expect("creation request always carries resource info");
            self.current.entry(request.resource).or_insert_with(|| Resource::new(request.resource, info));
        }

        for request in &self.staged_usages {
            if !self.current.contains_key(&request.resource) {
                return Err(Error::UnknownResource { pass: request.pass, resource: request.resource });
            }
        }

        let creations = std::mem::take(&mut self.staged_creations);
        for request in creations {
            if let Some(resource) = self.current.get_mut(&request.resource) {
                (request.configurator)(resource);
            }
        }
        let usages = std::mem::take(&mut self.staged_usages);
        for request in usages {
            if let Some(resource) = self.current.get_mut(&request.resource) {
                (request.configurator)(resource);
            }
        }

        Ok(())
    }

    /// Transfers handles for resources whose name also existed in the previous
    /// frame, then creates fresh handles for everything still unallocated.
    ///
    /// Implements the exact 5-step algorithm from the transient resource manager
    /// contract: build sorted name lists for both frames, intersect by name id,
    /// move handles for the intersection, return early with no further
    /// allocation if the intersection equals both full name sets (stable
    /// cross-frame layout — spec's cross-frame-stability property), otherwise
    /// create fresh handles only for resources still lacking one.
    pub fn allocate_scheduled_resources_with<R: Rhi>(&mut self, rhi: &R) -> Result<()> {
        let layout_is_stable = self.transfer_previous_frame_resources();
        if layout_is_stable {
            return Ok(());
        }

        for resource in self.current.values_mut() {
            if resource.is_valid() {
                continue;
            }
            let handle = match &resource.info {
                ResourceInfo::Texture(info) => ResourceHandle::Texture(rhi.create_texture(info)?),
                ResourceInfo::Buffer(info) => ResourceHandle::Buffer(rhi.create_buffer(info)?),
            };
            resource.handle = Some(handle);
        }
        Ok(())
    }

    fn transfer_previous_frame_resources(&mut self) -> bool {
        let mut current_names: Vec<(IntersectionEntry, Name)> =
            self.current.keys().map(|&n| (IntersectionEntry(n.to_id()), n)).collect();
        current_names.sort_by_key(|(entry, _)| entry.0);

        let mut previous_names: Vec<(IntersectionEntry, Name)> =
            self.previous.keys().map(|&n| (IntersectionEntry(n.to_id()), n)).collect();
        previous_names.sort_by_key(|(entry, _)| entry.0);

        let mut intersection = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < current_names.len() && j < previous_names.len() {
            match current_names[i].0 .0.cmp(&previous_names[j].0 .0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    intersection.push(current_names[i].1);
                    i += 1;
                    j += 1;
                }
            }
        }

        for &name in &intersection {
            if let Some(prev) = self.previous.get_mut(&name) {
                if let Some(handle) = prev.handle.take() {
                    if let Some(curr) = self.current.get_mut(&name) {
                        curr.handle = Some(handle);
                    }
                }
            }
        }

        intersection.len() == current_names.len() && intersection.len() == previous_names.len()
    }

    pub fn get(&self, resource: Name) -> Option<&Resource> {
        self.current.get(&resource)
    }

    pub fn get_mut(&mut self, resource: Name) -> Option<&mut Resource> {
        self.current.get_mut(&resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.current.values()
    }

    /// Resources unique to the previous frame (present before, absent now) are
    /// enqueued for destruction rather than destroyed immediately: a command
    /// buffer recorded earlier this frame, or still in flight from the frame
    /// before, may reference the handle until its ring slot's fence retires.
    pub fn enqueue_unique_previous_frame_resources<R: Rhi>(&mut self, queue: &mut crate::deletion_queue::DeletionQueue<R>, ring_index: usize) {
        for (name, resource) in self.previous.iter() {
            if self.current.contains_key(name) {
                continue;
            }
            match resource.handle {
                Some(ResourceHandle::Texture(handle)) => queue.enqueue(ring_index, move |rhi: &R| rhi.destroy_texture(handle)),
                Some(ResourceHandle::Buffer(handle)) => queue.enqueue(ring_index, move |rhi: &R| rhi.destroy_buffer(handle)),
                None => {}
            }
        }
    }
}

impl Default for TransientResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The fallback layout a view is requested in when a pass reads it with no
/// more specific usage (`pass.rs`'s `read_texture` helper).
pub const DEFAULT_READ_LAYOUT: ResourceLayout = ResourceLayout::SHADER_READ;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::fake::FakeRhi;
    use crate::rhi::{BufferInfo, BufferUsage};

    fn buffer_info() -> ResourceInfo {
        ResourceInfo::Buffer(BufferInfo { size: 256, usage: BufferUsage::STORAGE_BUFFER })
    }

    #[test]
    fn duplicate_allocation_in_one_frame_is_fatal() {
        let mut manager = TransientResourceManager::new();
        manager.begin_frame();
        manager.begin_resource_scheduling();
        let resource = Name::new("manager_test_dup_resource");
        let pass_a = Name::new("manager_test_dup_pass_a");
        let pass_b = Name::new("manager_test_dup_pass_b");
        manager.queue_resource_allocation(pass_a, resource, buffer_info(), Box::new(|_| {}));
        manager.queue_resource_allocation(pass_b, resource, buffer_info(), Box::new(|_| {}));
        let err = manager.end_resource_scheduling().unwrap_err();
        assert!(matches!(err, Error::DuplicateResource { .. }));
    }

    #[test]
    fn unknown_usage_request_is_fatal() {
        let mut manager = TransientResourceManager::new();
        manager.begin_frame();
        manager.begin_resource_scheduling();
        let pass = Name::new("manager_test_unknown_pass");
        let resource = Name::new("manager_test_unknown_resource");
        manager.queue_resource_usage(pass, resource, Box::new(|_| {}));
        let err = manager.end_resource_scheduling().unwrap_err();
        assert!(matches!(err, Error::UnknownResource { .. }));
    }

    #[test]
    fn stable_resource_set_transfers_handles_without_new_rhi_calls() {
        let rhi = FakeRhi::new();
        let mut manager = TransientResourceManager::new();
        let pass = Name::new("manager_test_stable_pass");
        let resource = Name::new("manager_test_stable_resource");

        manager.begin_frame();
        manager.begin_resource_scheduling();
        manager.queue_resource_allocation(pass, resource, buffer_info(), Box::new(|_| {}));
        manager.end_resource_scheduling().unwrap();
        manager.allocate_scheduled_resources_with(&rhi).unwrap();
        assert_eq!(rhi.buffer_creates.load(std::sync::atomic::Ordering::Relaxed), 1);
        let first_handle = manager.get(resource).unwrap().handle;

        manager.begin_frame();
        manager.begin_resource_scheduling();
        manager.queue_resource_allocation(pass, resource, buffer_info(), Box::new(|_| {}));
        manager.end_resource_scheduling().unwrap();
        manager.allocate_scheduled_resources_with(&rhi).unwrap();

        assert_eq!(rhi.buffer_creates.load(std::sync::atomic::Ordering::Relaxed), 1, "second frame must not call create_buffer again");
        let second_handle = manager.get(resource).unwrap().handle;
        match (first_handle, second_handle) {
            (Some(ResourceHandle::Buffer(a)), Some(ResourceHandle::Buffer(b))) => assert_eq!(a, b),
            _ => panic!("expected stable buffer handle across frames"),
        }
    }

    #[test]
    fn resource_dropped_between_frames_is_destroyed_through_the_deletion_queue() {
        let rhi = FakeRhi::new();
        let mut manager = TransientResourceManager::new();
        let mut deletion_queue: crate::deletion_queue::DeletionQueue<FakeRhi> = crate::deletion_queue::DeletionQueue::new(2);
        let pass = Name::new("manager_test_dropped_pass");
        let resource = Name::new("manager_test_dropped_resource");

        manager.begin_frame();
        manager.begin_resource_scheduling();
        manager.queue_resource_allocation(pass, resource, buffer_info(), Box::new(|_| {}));
        manager.end_resource_scheduling().unwrap();
        manager.allocate_scheduled_resources_with(&rhi).unwrap();

        manager.begin_frame();
        manager.begin_resource_scheduling();
        manager.end_resource_scheduling().unwrap();
        manager.enqueue_unique_previous_frame_resources(&mut deletion_queue, 0);
        assert_eq!(deletion_queue.pending_count(0), 1, "resource absent this frame must be queued for destruction");

        deletion_queue.drain(0, &rhi);
        assert_eq!(deletion_queue.pending_count(0), 0);
    }
}
