//! Node and dependency-level types that make up a compiled render graph.

use crate::name::Name;
use crate::resource::ViewName;
use std::collections::HashSet;

/// One render pass's slot in the graph. Index-based: nodes never reference each
/// other by pointer, only by position in `RenderGraph::nodes`, per the design
/// note favoring index-based node vectors over back-references.
pub struct Node {
    pub pass_name: Name,
    pub queue_index: usize,
    pub use_ray_tracing: bool,

    pub reads: HashSet<ViewName>,
    pub writes: HashSet<ViewName>,

    /// Raw cross-queue predecessors discovered while building adjacency lists,
    /// before redundant-sync removal collapses this list.
    pub(super) raw_nodes_to_sync_with: Vec<usize>,
    /// The node immediately before this one on the same queue, in global
    /// execution order. `None` for each queue's first node. Used to inherit
    /// already-covered sync indices during redundant-sync removal and to add
    /// the implicit same-queue ordering edge.
    pub(super) previous_node_on_queue: Option<usize>,

    pub global_exec_index: usize,
    pub dependency_level_index: usize,
    pub queue_local_exec_index: usize,

    /// Per-source-queue index: the queue-local-exec-index on that queue this
    /// node is known to be synchronized up to (directly or by inheritance).
    pub sync_indices: Vec<Option<usize>>,
    /// Final, minimized set of node indices this node must wait on via
    /// semaphore before executing.
    pub nodes_to_sync_with: Vec<usize>,
    /// Whether some other-queue node waits on this one; if so the executor must
    /// allocate a signal semaphore for this node's submit context.
    pub sync_signal_required: bool,
}

impl Node {
    pub fn new(pass_name: Name, queue_index: usize, use_ray_tracing: bool) -> Self {
        Self {
            pass_name,
            queue_index,
            use_ray_tracing,
            reads: HashSet::new(),
            writes: HashSet::new(),
            raw_nodes_to_sync_with: Vec::new(),
            previous_node_on_queue: None,
            global_exec_index: 0,
            dependency_level_index: 0,
            queue_local_exec_index: 0,
            sync_indices: Vec::new(),
            nodes_to_sync_with: Vec::new(),
            sync_signal_required: false,
        }
    }

    /// Resets everything rebuilt fresh each frame, keeping the node's identity
    /// (pass name, queue, ray-tracing flag) fixed across frames.
    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.raw_nodes_to_sync_with.clear();
        self.previous_node_on_queue = None;
        self.global_exec_index = 0;
        self.dependency_level_index = 0;
        self.queue_local_exec_index = 0;
        self.sync_indices.clear();
        self.nodes_to_sync_with.clear();
        self.sync_signal_required = false;
    }
}

/// An ordered bucket of nodes all at the same longest-path distance from any
/// graph root. Nodes within a level have no dependency on one another and may
/// execute concurrently (subject to queue assignment).
#[derive(Default)]
pub struct DependencyLevel {
    pub nodes: Vec<usize>,
    pub nodes_per_queue: std::collections::HashMap<usize, Vec<usize>>,
    pub views_read_by_multiple_queues: HashSet<ViewName>,
    pub queues_involved_in_cross_queue_reads: HashSet<usize>,
}

impl DependencyLevel {
    pub fn push(&mut self, node_index: usize, queue_index: usize) {
        self.nodes.push(node_index);
        self.nodes_per_queue.entry(queue_index).or_default().push(node_index);
    }
}
