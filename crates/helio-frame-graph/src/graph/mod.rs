//! The render graph: per-frame declared read/write dependencies between passes,
//! compiled into an execution order, dependency levels, queue assignment and
//! minimized cross-queue synchronization edges.
//!
//! Grounded in `original_source`'s `RenderGraph`/`DependencyLevel` (`render_graph.h`,
//! `render_graph.cpp`). The graph itself is long-lived: one `Node` exists per
//! registered render pass for the program's whole lifetime. Only each node's
//! read/write/sync state is rebuilt every frame, by `clear()` followed by passes
//! re-declaring their dependencies through `schedule_resources` and finally
//! `build()`.

mod compiler;
mod node;

pub use node::{DependencyLevel, Node};

use crate::error::{Error, Result};
use crate::name::Name;
use crate::resource::ViewName;
use std::collections::HashMap;

/// The two hardware queues a pass can be assigned to. Queue index 0 is always
/// graphics, 1 is always compute — fixed by `RenderPassType`, never detected.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RenderPassType {
    Graphics,
    Compute,
}

impl RenderPassType {
    pub fn queue_index(self) -> usize {
        match self {
            RenderPassType::Graphics => 0,
            RenderPassType::Compute => 1,
        }
    }
}

pub struct RenderGraph {
    nodes: Vec<Node>,
    node_index_by_pass: HashMap<Name, usize>,
    write_dependency_registry: HashMap<ViewName, usize>,

    adjacency: Vec<Vec<usize>>,
    topo_order: Vec<usize>,
    dependency_levels: Vec<DependencyLevel>,
    nodes_in_global_exec_order: Vec<usize>,
    nodes_per_queue: Vec<Vec<usize>>,
    detected_queue_count: usize,
}

impl RenderGraph {
    /// Builds the (fixed, for the program's lifetime) node set from the
    /// registered passes, in registration order.
    pub fn new(passes: &[(Name, RenderPassType, bool)]) -> Self {
        let mut nodes = Vec::with_capacity(passes.len());
        let mut node_index_by_pass = HashMap::with_capacity(passes.len());
        for (index, (pass_name, pass_type, use_ray_tracing)) in passes.iter().enumerate() {
            nodes.push(Node::new(*pass_name, pass_type.queue_index(), *use_ray_tracing));
            node_index_by_pass.insert(*pass_name, index);
        }
        Self {
            nodes,
            node_index_by_pass,
            write_dependency_registry: HashMap::new(),
            adjacency: Vec::new(),
            topo_order: Vec::new(),
            dependency_levels: Vec::new(),
            nodes_in_global_exec_order: Vec::new(),
            nodes_per_queue: Vec::new(),
            detected_queue_count: 0,
        }
    }

    /// Resets every node's per-frame state and the write-dependency registry.
    /// Called once at the start of each frame, before any pass schedules its
    /// resources.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.clear();
        }
        self.write_dependency_registry.clear();
        self.adjacency.clear();
        self.topo_order.clear();
        self.dependency_levels.clear();
        self.nodes_in_global_exec_order.clear();
        self.nodes_per_queue.clear();
        self.detected_queue_count = 0;
    }

    fn node_index(&self, pass: Name) -> usize {
        *self.node_index_by_pass.get(&pass).expect("pass not registered with the render graph")
    }

    pub fn add_read_dependency(&mut self, pass: Name, view: ViewName) {
        let index = self.node_index(pass);
        self.nodes[index].reads.insert(view);
    }

    /// Declares that `pass` writes `view`. Enforces the single-writer-per-view
    /// invariant: a second pass writing the same view in the same frame is
    /// fatal.
    pub fn add_write_dependency(&mut self, pass: Name, resource: Name, view: ViewName) -> Result<()> {
        let index = self.node_index(pass);
        if let Some(&existing) = self.write_dependency_registry.get(&view) {
            if existing != index {
                return Err(Error::DuplicateWriter {
                    pass,
                    resource,
                    view: (view.resource_id(), view.view_index()),
                    first_writer: self.nodes[existing].pass_name,
                });
            }
        }
        self.write_dependency_registry.insert(view, index);
        self.nodes[index].writes.insert(view);
        Ok(())
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn nodes_in_global_exec_order(&self) -> &[usize] {
        &self.nodes_in_global_exec_order
    }

    pub fn dependency_levels(&self) -> &[DependencyLevel] {
        &self.dependency_levels
    }

    pub fn detected_queue_count(&self) -> usize {
        self.detected_queue_count
    }

    pub fn pass_name(&self, index: usize) -> Name {
        self.nodes[index].pass_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ViewName;

    fn rn(name: &str) -> Name {
        Name::new(name)
    }

    fn graph(passes: &[(&str, RenderPassType)]) -> RenderGraph {
        let passes: Vec<_> = passes.iter().map(|(n, t)| (rn(n), *t, false)).collect();
        RenderGraph::new(&passes)
    }

    #[test]
    fn linear_chain_produces_three_levels_one_node_each() {
        let mut g = graph(&[
            ("g4_1_a", RenderPassType::Graphics),
            ("g4_1_b", RenderPassType::Graphics),
            ("g4_1_c", RenderPassType::Graphics),
        ]);
        g.clear();
        let t1 = rn("g4_1_t1");
        let t2 = rn("g4_1_t2");
        g.add_write_dependency(rn("g4_1_a"), t1, ViewName::encode(t1, 0)).unwrap();
        g.add_read_dependency(rn("g4_1_b"), ViewName::encode(t1, 0));
        g.add_write_dependency(rn("g4_1_b"), t2, ViewName::encode(t2, 0)).unwrap();
        g.add_read_dependency(rn("g4_1_c"), ViewName::encode(t2, 0));
        g.build().unwrap();

        assert_eq!(g.dependency_levels().len(), 3);
        for level in g.dependency_levels() {
            assert_eq!(level.nodes.len(), 1);
        }
        assert_eq!(g.nodes_in_global_exec_order().len(), 3);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut g = graph(&[("g4_5_a", RenderPassType::Graphics), ("g4_5_b", RenderPassType::Graphics)]);
        g.clear();
        let t1 = rn("g4_5_t1");
        let t2 = rn("g4_5_t2");
        g.add_write_dependency(rn("g4_5_a"), t1, ViewName::encode(t1, 0)).unwrap();
        g.add_read_dependency(rn("g4_5_a"), ViewName::encode(t2, 0));
        g.add_write_dependency(rn("g4_5_b"), t2, ViewName::encode(t2, 0)).unwrap();
        g.add_read_dependency(rn("g4_5_b"), ViewName::encode(t1, 0));
        let err = g.build().unwrap_err();
        assert!(matches!(err, Error::CyclicDependency { .. }));
    }
}
