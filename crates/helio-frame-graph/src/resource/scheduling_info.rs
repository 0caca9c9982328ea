//! Per-resource scheduling metadata: which pass requested which layout for which
//! view. Grounded in `original_source`'s `ResourceSchedulingInfo`.

use crate::name::Name;
use crate::rhi::ResourceLayout;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
pub struct ViewInfo {
    pub requested_layout: ResourceLayout,
}

/// One pass's view requests against one resource.
#[derive(Clone, Debug, Default)]
pub struct RenderPassInfo {
    view_infos: Vec<Option<ViewInfo>>,
}

impl RenderPassInfo {
    pub fn view_info(&self, view_index: u32) -> Option<ViewInfo> {
        self.view_infos.get(view_index as usize).copied().flatten()
    }
}

/// Maps `pass name -> RenderPassInfo` for a single resource. Rebuilt every frame:
/// `SchedulingInfo::new` is called when the owning `Resource` is (re)materialized
/// during `end_resource_scheduling`.
#[derive(Debug)]
pub struct SchedulingInfo {
    view_count: u32,
    by_pass: HashMap<Name, RenderPassInfo>,
}

impl SchedulingInfo {
    pub fn new(view_count: u32) -> Self {
        Self { view_count, by_pass: HashMap::new() }
    }

    /// Records that `pass` requests `layout` for `view_index`. Grows the pass's
    /// view-info vector to `view_count` on first use, matching
    /// `ResourceSchedulingInfo::add_view_info`.
    pub fn add_view_info(&mut self, pass: Name, view_index: u32, layout: ResourceLayout) {
        let view_count = self.view_count;
        let entry = self.by_pass.entry(pass).or_default();
        if entry.view_infos.len() < view_count as usize {
            entry.view_infos.resize(view_count as usize, None);
        }
        entry.view_infos[view_index as usize] = Some(ViewInfo { requested_layout: layout });
    }

    pub fn render_pass_info(&self, pass: Name) -> Option<&RenderPassInfo> {
        self.by_pass.get(&pass)
    }
}
