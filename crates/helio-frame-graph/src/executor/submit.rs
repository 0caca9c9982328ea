//! Submit-context construction: step 2 of the frame executor's per-frame
//! sequence. Grounded in `original_source`'s `FrameExecutor::configureSubmitContexts`.

use crate::graph::RenderGraph;
use crate::rhi::{QueueType, Rhi, SemaphoreHandle};
use crate::sync_manager::SynchronizationManager;
use std::collections::HashMap;

/// One dependency level's slice of a submit context: the nodes recorded into
/// it, and the command buffer produced once recording completes.
pub struct DependencyLevelContext<R: Rhi> {
    pub level_index: usize,
    pub nodes: Vec<usize>,
    pub command_buffer: Option<R::CommandBuffer>,
}

/// A maximal run of same-queue dependency-level slices that can be submitted
/// together: opened whenever a node is the first on its queue this frame, has
/// an explicit cross-queue wait, or (ray tracing) must wait on the
/// still-outstanding BLAS-build semaphore.
pub struct SubmitContext<R: Rhi> {
    pub queue: QueueType,
    pub levels: Vec<DependencyLevelContext<R>>,
    pub waits: Vec<SemaphoreHandle>,
    pub signal: Option<SemaphoreHandle>,
}

fn queue_type(queue_index: usize) -> QueueType {
    match queue_index {
        0 => QueueType::Graphics,
        _ => QueueType::Compute,
    }
}

/// Walks nodes in global execution order, opening new submit contexts per the
/// forced-open rules, and returns them alongside a `node index -> signal
/// semaphore` map so later nodes can resolve their cross-queue waits. A node
/// whose submit context hasn't yet been assigned a signal gets one allocated
/// the moment `sync_signal_required` is observed true.
pub fn configure_submit_contexts<R: Rhi>(
    rhi: &R,
    sync: &mut SynchronizationManager,
    ring_index: usize,
    graph: &RenderGraph,
    blas_semaphore: Option<SemaphoreHandle>,
) -> (Vec<SubmitContext<R>>, HashMap<usize, SemaphoreHandle>) {
    let queue_count = graph.detected_queue_count().max(1);
    let mut contexts: Vec<SubmitContext<R>> = Vec::new();
    let mut open_context: Vec<Option<usize>> = vec![None; queue_count];
    let mut node_signal: HashMap<usize, SemaphoreHandle> = HashMap::new();
    let mut blas_wait_consumed = false;

    for &node_index in graph.nodes_in_global_exec_order() {
        let node = graph.node(node_index);
        let queue = node.queue_index;
        let level = node.dependency_level_index;

        let needs_blas_wait = node.use_ray_tracing && blas_semaphore.is_some() && !blas_wait_consumed;
        let has_explicit_waits = !node.nodes_to_sync_with.is_empty();
        let force_new = open_context[queue].is_none() || has_explicit_waits || needs_blas_wait;

        if force_new {
            contexts.push(SubmitContext { queue: queue_type(queue), levels: Vec::new(), waits: Vec::new(), signal: None });
            open_context[queue] = Some(contexts.len() - 1);
        }
        let ctx_index = open_context[queue].expect("just opened or already open");

        if needs_blas_wait {
            contexts[ctx_index].waits.push(blas_semaphore.expect("checked above"));
            blas_wait_consumed = true;
        }
        for &source in &node.nodes_to_sync_with {
            if let Some(&semaphore) = node_signal.get(&source) {
                if !contexts[ctx_index].waits.contains(&semaphore) {
                    contexts[ctx_index].waits.push(semaphore);
                }
            }
        }

        if node.sync_signal_required && contexts[ctx_index].signal.is_none() {
            contexts[ctx_index].signal = Some(sync.acquire_semaphore(ring_index, rhi));
        }
        if let Some(semaphore) = contexts[ctx_index].signal {
            node_signal.insert(node_index, semaphore);
        }

        let submit_context = &mut contexts[ctx_index];
        match submit_context.levels.last_mut() {
            Some(level_ctx) if level_ctx.level_index == level => level_ctx.nodes.push(node_index),
            _ => submit_context.levels.push(DependencyLevelContext { level_index: level, nodes: vec![node_index], command_buffer: None }),
        }
    }

    (contexts, node_signal)
}
