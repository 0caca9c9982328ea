//! Resource layout tracker: the sole source of truth for each view's current
//! layout. Grounded in `original_source`'s `ResourceLayoutTracker`.

use crate::name::Name;
use crate::rhi::{BufferHandle, PipelineBarrier, ResourceLayout, TextureHandle};
use std::collections::HashMap;

struct ViewState {
    layout: ResourceLayout,
}

struct TrackedResource {
    texture: Option<TextureHandle>,
    buffer: Option<BufferHandle>,
    views: Vec<ViewState>,
}

/// Tracks the current layout of every view of every resource that has been
/// handed a GPU handle this frame. Barriers are computed per-view, never
/// per-resource: two views of the same resource can be in different layouts
/// simultaneously (e.g. different mips of a texture with `use_mips` set).
#[derive(Default)]
pub struct ResourceLayoutTracker {
    resources: HashMap<Name, TrackedResource>,
}

impl ResourceLayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins tracking `resource` with `view_count` views, all initialized to
    /// `ResourceLayout::UNDEFINED`. Must be called exactly once per resource per
    /// frame, at the moment the resource receives (or keeps, across a stable
    /// cross-frame transfer) a GPU handle.
    pub fn begin_resource_tracking(
        &mut self,
        resource: Name,
        view_count: u32,
        texture: Option<TextureHandle>,
        buffer: Option<BufferHandle>,
    ) {
        self.resources.insert(
            resource,
            TrackedResource {
                texture,
                buffer,
                views: (0..view_count).map(|_| ViewState { layout: ResourceLayout::UNDEFINED }).collect(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.resources.clear();
    }

    /// Returns the barrier needed to bring `view_index` of `resource` to
    /// `new_layout`, or `None` if it is already in that layout (the transition is
    /// elided). Updates the tracked state unconditionally.
    pub fn get_transition_to_layout(
        &mut self,
        resource: Name,
        view_index: u32,
        new_layout: ResourceLayout,
    ) -> Option<PipelineBarrier> {
        let tracked = self.resources.get_mut(&resource)?;
        let view = tracked.views.get_mut(view_index as usize)?;
        let old_layout = view.layout;
        if old_layout == new_layout {
            return None;
        }
        view.layout = new_layout;
        Some(PipelineBarrier {
            texture: tracked.texture,
            buffer: tracked.buffer,
            view_index,
            old_layout,
            new_layout,
        })
    }

    pub fn current_layout(&self, resource: Name, view_index: u32) -> Option<ResourceLayout> {
        self.resources.get(&resource)?.views.get(view_index as usize).map(|v| v.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_layout_transition_is_elided() {
        let mut tracker = ResourceLayoutTracker::new();
        let name = Name::new("layout_tracker_test_resource");
        tracker.begin_resource_tracking(name, 1, Some(TextureHandle(1)), None);
        let first = tracker.get_transition_to_layout(name, 0, ResourceLayout::COLOR_ATTACHMENT);
        assert!(first.is_some());
        let second = tracker.get_transition_to_layout(name, 0, ResourceLayout::COLOR_ATTACHMENT);
        assert!(second.is_none(), "repeating the same layout must not emit a barrier");
        let third = tracker.get_transition_to_layout(name, 0, ResourceLayout::SHADER_READ);
        assert!(third.is_some());
    }

    #[test]
    fn views_of_same_resource_track_independently() {
        let mut tracker = ResourceLayoutTracker::new();
        let name = Name::new("layout_tracker_test_multi_view");
        tracker.begin_resource_tracking(name, 2, Some(TextureHandle(2)), None);
        tracker.get_transition_to_layout(name, 0, ResourceLayout::COLOR_ATTACHMENT);
        assert_eq!(tracker.current_layout(name, 1), Some(ResourceLayout::UNDEFINED));
    }
}
