//! Pipeline barrier configuration: step 3 of the frame executor's per-frame
//! sequence. Grounded in `original_source`'s
//! `FrameExecutor::configurePipelineBarriers`.

use crate::graph::{DependencyLevel, RenderGraph};
use crate::name::{Name, BACK_BUFFER_NAME};
use crate::resource::{ResourceLayoutTracker, TransientResourceManager, ViewName};
use crate::rhi::{PipelineBarrier, ResourceLayout};
use std::collections::HashMap;

/// The barriers computed for this frame, keyed by the node that must emit
/// them before recording its own commands, plus which node (if any) targets
/// the implicit swap-chain back buffer.
#[derive(Default)]
pub struct BarrierPlan {
    pub per_node: HashMap<usize, Vec<PipelineBarrier>>,
    pub back_buffer_node: Option<usize>,
}

/// Resolves the layout `view` must be transitioned to for `node_index`'s use
/// of it within `level`. A view read by more than one queue inside a single
/// dependency level resolves to the bitwise union of every reading pass's
/// requested layout in that level, not just `node_index`'s own request — the
/// whole level shares one barrier for that view.
fn resolve_new_layout(
    level: &DependencyLevel,
    graph: &RenderGraph,
    resources: &TransientResourceManager,
    node_index: usize,
    view: ViewName,
    resource_name: Name,
) -> Option<ResourceLayout> {
    if level.views_read_by_multiple_queues.contains(&view) {
        let mut union = ResourceLayout::empty();
        for nodes in level.nodes_per_queue.values() {
            for &candidate in nodes {
                let candidate_node = graph.node(candidate);
                if !candidate_node.reads.contains(&view) {
                    continue;
                }
                let pass_name = graph.pass_name(candidate);
                if let Some(layout) = resources
                    .get(resource_name)
                    .and_then(|r| r.scheduling_info.render_pass_info(pass_name))
                    .and_then(|info| info.view_info(view.view_index()))
                {
                    union |= layout.requested_layout;
                }
            }
        }
        if union.is_empty() {
            None
        } else {
            Some(union)
        }
    } else {
        let pass_name = graph.pass_name(node_index);
        resources
            .get(resource_name)?
            .scheduling_info
            .render_pass_info(pass_name)?
            .view_info(view.view_index())
            .map(|info| info.requested_layout)
    }
}

/// Walks dependency levels in order, resolving each touched view's target
/// layout and asking the tracker for the (possibly elided) transition. The
/// implicit back buffer is never tracked — its node is recorded separately so
/// the executor knows to open a swap-chain rendering pass for it.
pub fn configure_pipeline_barriers(
    graph: &RenderGraph,
    resources: &TransientResourceManager,
    tracker: &mut ResourceLayoutTracker,
) -> BarrierPlan {
    let back_buffer_name = Name::new(BACK_BUFFER_NAME);
    let mut plan = BarrierPlan::default();

    for level in graph.dependency_levels() {
        for &node_index in &level.nodes {
            let node = graph.node(node_index);
            let views: Vec<ViewName> = node.reads.iter().chain(node.writes.iter()).copied().collect();
            for view in views {
                let resource_name = Name::from_id(view.resource_id());
                if resource_name == back_buffer_name {
                    plan.back_buffer_node = Some(node_index);
                    continue;
                }
                let Some(new_layout) = resolve_new_layout(level, graph, resources, node_index, view, resource_name) else {
                    continue;
                };
                if let Some(barrier) = tracker.get_transition_to_layout(resource_name, view.view_index(), new_layout) {
                    plan.per_node.entry(node_index).or_default().push(barrier);
                }
            }
        }
    }

    plan
}

/// Ensures every resource the manager currently holds a handle for has a
/// tracker entry, initializing freshly-allocated resources to `UNDEFINED`.
/// Resources that transferred across the frame boundary already have an
/// entry and are left alone — their GPU-side layout legitimately survives
/// into the new frame.
pub fn sync_layout_tracking(tracker: &mut ResourceLayoutTracker, resources: &TransientResourceManager) {
    for resource in resources.iter() {
        if tracker.current_layout(resource.name, 0).is_some() {
            continue;
        }
        let (texture, buffer) = match resource.handle {
            Some(crate::resource::ResourceHandle::Texture(handle)) => (Some(handle), None),
            Some(crate::resource::ResourceHandle::Buffer(handle)) => (None, Some(handle)),
            None => continue,
        };
        tracker.begin_resource_tracking(resource.name, resource.view_count(), texture, buffer);
    }
}
