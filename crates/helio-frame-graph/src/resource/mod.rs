//! Resource descriptors and the per-resource scheduling metadata that the render
//! graph compiler and layout tracker consume.

mod layout_tracker;
mod manager;
mod metadata;
mod scheduling_info;

pub mod ping_pong;

pub use layout_tracker::ResourceLayoutTracker;
pub use manager::{ResourceConfigurator, TransientResourceManager, DEFAULT_READ_LAYOUT};
pub use metadata::{
    GraphMetadata, HitGroupTypeSpec, PipelineMetadata, RenderPassMetadata, RenderPassTypeSpec,
    RenderTargetMetadata, ShaderMetadata, ShaderTypeSpec, TextureMetadata,
};
pub use scheduling_info::{RenderPassInfo as ResourceRenderPassInfo, SchedulingInfo, ViewInfo};

use crate::name::Name;
use crate::rhi::{BufferHandle, BufferInfo, TextureHandle, TextureInfo};

/// A resource's GPU-facing shape: exactly one of texture or buffer, decided once
/// at the point a pass first queues its allocation.
#[derive(Clone, Debug)]
pub enum ResourceInfo {
    Texture(TextureInfo),
    Buffer(BufferInfo),
}

impl ResourceInfo {
    pub fn view_count(&self) -> u32 {
        match self {
            ResourceInfo::Texture(info) => info.mip_levels.max(1),
            ResourceInfo::Buffer(_) => 1,
        }
    }
}

/// Either resource's live handle, once allocated. `None` before
/// `allocate_scheduled_resources` has run for the owning frame.
#[derive(Clone, Copy, Debug)]
pub enum ResourceHandle {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// One entry in the resource table: interned name, declared shape, current GPU
/// handle (if allocated this frame) and the per-frame scheduling metadata passes
/// fill in during `schedule_resources`.
///
/// Invariant: `handle` is `Some` if and only if the resource layout tracker has a
/// tracking entry for this name — the two are always created and destroyed
/// together (see `TransientResourceManager::allocate_scheduled_resources` and
/// `ResourceLayoutTracker::begin_resource_tracking`).
pub struct Resource {
    pub name: Name,
    pub info: ResourceInfo,
    pub handle: Option<ResourceHandle>,
    pub scheduling_info: SchedulingInfo,
}

impl Resource {
    pub fn new(name: Name, info: ResourceInfo) -> Self {
        let view_count = info.view_count();
        Self { name, info, handle: None, scheduling_info: SchedulingInfo::new(view_count) }
    }

    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn view_count(&self) -> u32 {
        self.info.view_count()
    }
}

/// `(name, view_index)` packed for use as a dependency-graph node read/write key.
/// The view index occupies the low 32 bits; both halves round-trip at full
/// width (the original source's decoder narrowed the view index to 16 bits,
/// which this crate does not reproduce — see DESIGN.md).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ViewName(u64);

impl ViewName {
    pub fn encode(resource: Name, view_index: u32) -> Self {
        ViewName(((resource.to_id() as u64) << 32) | view_index as u64)
    }

    pub fn resource_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn view_index(self) -> u32 {
        self.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_name_round_trips_full_width_view_index() {
        let resource = Name::new("view_name_round_trip_resource");
        let v = ViewName::encode(resource, 0xFFFF_FFFE);
        assert_eq!(v.resource_id(), resource.to_id());
        assert_eq!(v.view_index(), 0xFFFF_FFFE);
    }
}
