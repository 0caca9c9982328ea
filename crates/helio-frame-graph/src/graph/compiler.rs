//! The compilation algorithms: adjacency construction, cycle-detecting
//! topological sort, dependency-level labeling, execution-index assignment and
//! two-phase redundant cross-queue synchronization removal.
//!
//! Grounded in `original_source`'s `RenderGraph::build_adjacency_lists`,
//! `depth_first_search`/`topological_sort`, `build_dependency_levels`,
//! `finalize_dependency_levels` and `remove_redundant_syncs`. Two bugs present
//! in that source are deliberately not reproduced here (see DESIGN.md): the
//! depth-first search recursing on the start node instead of the neighbor being
//! visited, and `decode_view_name`'s 16-bit view-index mask against a 32-bit
//! encode.

use super::RenderGraph;
use crate::error::{Error, Result};
use crate::resource::ViewName;
use std::collections::{HashMap, HashSet};

impl RenderGraph {
    /// Recompiles the graph from this frame's declared read/write dependencies.
    /// Must be called after every pass has run `schedule_resources` for the
    /// frame and before the frame executor configures submit contexts.
    pub fn build(&mut self) -> Result<()> {
        self.build_adjacency_lists();
        self.topological_sort()?;
        self.build_dependency_levels();
        self.finalize_dependency_levels();
        self.remove_redundant_syncs();
        Ok(())
    }

    /// `b` depends on `a` iff some view `b` reads is written by `a`. O(N^2) over
    /// passes, acceptable at frame-graph scale (tens of passes, not thousands).
    fn build_adjacency_lists(&mut self) {
        let n = self.nodes.len();
        self.adjacency = vec![Vec::new(); n];
        for b in 0..n {
            for a in 0..n {
                if a == b {
                    continue;
                }
                let depends = self.nodes[b].reads.iter().any(|v| self.nodes[a].writes.contains(v));
                if !depends {
                    continue;
                }
                self.adjacency[a].push(b);
                if self.nodes[a].queue_index != self.nodes[b].queue_index {
                    self.nodes[a].sync_signal_required = true;
                    self.nodes[b].raw_nodes_to_sync_with.push(a);
                }
            }
        }
    }

    fn topological_sort(&mut self) -> Result<()> {
        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut postorder = Vec::with_capacity(n);
        for start in 0..n {
            if !visited[start] {
                self.depth_first_search(start, &mut visited, &mut on_stack, &mut postorder)?;
            }
        }
        postorder.reverse();
        self.topo_order = postorder;
        Ok(())
    }

    fn depth_first_search(
        &self,
        node: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        postorder: &mut Vec<usize>,
    ) -> Result<()> {
        visited[node] = true;
        on_stack[node] = true;
        for &neighbor in &self.adjacency[node] {
            if on_stack[neighbor] {
                return Err(Error::CyclicDependency {
                    from: self.nodes[node].pass_name,
                    to: self.nodes[neighbor].pass_name,
                });
            }
            if !visited[neighbor] {
                self.depth_first_search(neighbor, visited, on_stack, postorder)?;
            }
        }
        on_stack[node] = false;
        postorder.push(node);
        Ok(())
    }

    /// A node's dependency-level index is the length of the longest path ending
    /// at it, computed by relaxing successors in topological order.
    fn build_dependency_levels(&mut self) {
        let n = self.nodes.len();
        let mut longest_path = vec![0usize; n];
        for &node in &self.topo_order {
            for &succ in self.adjacency[node].clone().iter() {
                let candidate = longest_path[node] + 1;
                if candidate > longest_path[succ] {
                    longest_path[succ] = candidate;
                }
            }
        }

        let level_count = if n == 0 { 0 } else { longest_path.iter().copied().max().unwrap() + 1 };
        self.dependency_levels = (0..level_count).map(|_| Default::default()).collect();

        for &node in &self.topo_order {
            let level_index = longest_path[node];
            self.nodes[node].dependency_level_index = level_index;
            let queue_index = self.nodes[node].queue_index;
            self.dependency_levels[level_index].push(node, queue_index);
        }

        self.detected_queue_count = self.nodes.iter().map(|node| node.queue_index).max().map(|m| m + 1).unwrap_or(0);
    }

    /// Walks levels in order assigning contiguous global and per-queue execution
    /// indices, wires each node to the previous node on its own queue (the
    /// implicit same-queue ordering edge), and records which views are read by
    /// more than one queue within a level (forcing a conservative union layout
    /// — see `executor::configure_pipeline_barriers`).
    fn finalize_dependency_levels(&mut self) {
        let queue_count = self.detected_queue_count.max(1);
        let mut global_exec_index = 0usize;
        let mut queue_local_exec_index = vec![0usize; queue_count];
        let mut previous_node_per_queue: Vec<Option<usize>> = vec![None; queue_count];

        self.nodes_in_global_exec_order.clear();
        self.nodes_per_queue = vec![Vec::new(); queue_count];

        for level_index in 0..self.dependency_levels.len() {
            let nodes_this_level = self.dependency_levels[level_index].nodes.clone();

            for &node in &nodes_this_level {
                let queue = self.nodes[node].queue_index;
                self.nodes[node].global_exec_index = global_exec_index;
                self.nodes[node].queue_local_exec_index = queue_local_exec_index[queue];
                self.nodes[node].previous_node_on_queue = previous_node_per_queue[queue];

                global_exec_index += 1;
                queue_local_exec_index[queue] += 1;
                previous_node_per_queue[queue] = Some(node);

                self.nodes_in_global_exec_order.push(node);
                self.nodes_per_queue[queue].push(node);
            }

            let mut reading_queues: HashMap<ViewName, HashSet<usize>> = HashMap::new();
            for &node in &nodes_this_level {
                let queue = self.nodes[node].queue_index;
                for &view in &self.nodes[node].reads {
                    reading_queues.entry(view).or_default().insert(queue);
                }
            }

            let level = &mut self.dependency_levels[level_index];
            for (view, queues) in reading_queues {
                if queues.len() > 1 {
                    level.views_read_by_multiple_queues.insert(view);
                    level.queues_involved_in_cross_queue_reads.extend(queues);
                }
            }
        }
    }

    /// Phase 1: per level, collapse each node's raw cross-queue predecessors to
    /// at most one per source queue (the one with the largest
    /// queue-local-exec-index), then merge in whatever the previous node on this
    /// node's own queue was already covered up to — so a node with no direct
    /// cross-queue read still inherits the coverage its predecessor paid for.
    ///
    /// Phase 2: greedily pick, from the collapsed candidates, the one(s)
    /// covering the most still-uncovered source queues, repeating until every
    /// queue this node must synchronize with is covered. Candidates that turn
    /// out to cover only queues already covered by another chosen candidate are
    /// dropped unemitted.
    fn remove_redundant_syncs(&mut self) {
        let queue_count = self.detected_queue_count.max(1);

        for level_index in 0..self.dependency_levels.len() {
            let nodes_this_level = self.dependency_levels[level_index].nodes.clone();
            for &node in &nodes_this_level {
                let raw = std::mem::take(&mut self.nodes[node].raw_nodes_to_sync_with);
                let mut sync_indices: Vec<Option<usize>> = vec![None; queue_count];
                let mut collapsed_by_queue: Vec<Option<usize>> = vec![None; queue_count];

                for &src in &raw {
                    let q = self.nodes[src].queue_index;
                    let src_index = self.nodes[src].queue_local_exec_index;
                    let better = match collapsed_by_queue[q] {
                        None => true,
                        Some(existing) => src_index > self.nodes[existing].queue_local_exec_index,
                    };
                    if better {
                        collapsed_by_queue[q] = Some(src);
                        sync_indices[q] = Some(src_index);
                    }
                }

                if let Some(prev) = self.nodes[node].previous_node_on_queue {
                    for q in 0..queue_count {
                        if let Some(inherited_index) = self.nodes[prev].sync_indices[q] {
                            let already_covers = sync_indices[q].map_or(false, |i| i >= inherited_index);
                            if !already_covers {
                                sync_indices[q] = Some(inherited_index);
                            }
                        }
                    }
                }

                self.nodes[node].sync_indices = sync_indices;
                self.nodes[node].raw_nodes_to_sync_with = collapsed_by_queue.into_iter().flatten().collect();
            }
        }

        for level_index in 0..self.dependency_levels.len() {
            let nodes_this_level = self.dependency_levels[level_index].nodes.clone();
            for &node in &nodes_this_level {
                let candidates = self.nodes[node].raw_nodes_to_sync_with.clone();
                if candidates.is_empty() {
                    continue;
                }

                let mut queues_to_cover: HashSet<usize> = candidates.iter().map(|&c| self.nodes[c].queue_index).collect();
                let mut coverage: Vec<(usize, HashSet<usize>)> = candidates
                    .iter()
                    .map(|&c| {
                        let mut queues = HashSet::new();
                        queues.insert(self.nodes[c].queue_index);
                        for (q, covered) in self.nodes[c].sync_indices.iter().enumerate() {
                            if covered.is_some() {
                                queues.insert(q);
                            }
                        }
                        (c, queues)
                    })
                    .collect();

                let mut chosen = Vec::new();
                while !queues_to_cover.is_empty() {
                    let best = coverage.iter().map(|(_, qs)| qs.intersection(&queues_to_cover).count()).max().unwrap_or(0);
                    if best == 0 {
                        break;
                    }
                    let (winners, rest): (Vec<_>, Vec<_>) =
                        coverage.into_iter().partition(|(_, qs)| qs.intersection(&queues_to_cover).count() == best);
                    for (src, queues) in &winners {
                        chosen.push(*src);
                        for q in queues {
                            queues_to_cover.remove(q);
                        }
                    }
                    coverage = rest;
                }

                self.nodes[node].nodes_to_sync_with = chosen;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RenderPassType;
    use crate::name::Name;

    fn rn(s: &str) -> Name {
        Name::new(s)
    }

    #[test]
    fn parallel_compute_producers_collapse_to_one_wait_on_the_later_one() {
        // A, B on compute write T1/T2; C on graphics reads both -> one level 0
        // (A, B), one level 1 (C). C must wait on only the later-finishing
        // compute node, not both.
        let passes = vec![
            (rn("g4_2_a"), RenderPassType::Compute, false),
            (rn("g4_2_b"), RenderPassType::Compute, false),
            (rn("g4_2_c"), RenderPassType::Graphics, false),
        ];
        let mut g = RenderGraph::new(&passes);
        g.clear();
        let t1 = rn("g4_2_t1");
        let t2 = rn("g4_2_t2");
        g.add_write_dependency(rn("g4_2_a"), t1, ViewName::encode(t1, 0)).unwrap();
        g.add_write_dependency(rn("g4_2_b"), t2, ViewName::encode(t2, 0)).unwrap();
        g.add_read_dependency(rn("g4_2_c"), ViewName::encode(t1, 0));
        g.add_read_dependency(rn("g4_2_c"), ViewName::encode(t2, 0));
        g.build().unwrap();

        assert_eq!(g.dependency_levels().len(), 2);
        assert_eq!(g.dependency_levels()[0].nodes.len(), 2);

        let c_index = g.node_index_by_pass[&rn("g4_2_c")];
        assert_eq!(g.node(c_index).nodes_to_sync_with.len(), 1, "C should collapse to a single cross-queue wait");
    }

    #[test]
    fn multi_queue_read_in_one_level_is_recorded_for_union_layout() {
        let passes = vec![
            (rn("g4_3_a"), RenderPassType::Graphics, false),
            (rn("g4_3_b"), RenderPassType::Compute, false),
            (rn("g4_3_c"), RenderPassType::Graphics, false),
        ];
        let mut g = RenderGraph::new(&passes);
        g.clear();
        let t1 = rn("g4_3_t1");
        g.add_write_dependency(rn("g4_3_a"), t1, ViewName::encode(t1, 0)).unwrap();
        g.add_read_dependency(rn("g4_3_b"), ViewName::encode(t1, 0));
        g.add_read_dependency(rn("g4_3_c"), ViewName::encode(t1, 0));
        g.build().unwrap();

        let level = &g.dependency_levels()[1];
        assert!(level.views_read_by_multiple_queues.contains(&ViewName::encode(t1, 0)));
        assert_eq!(level.queues_involved_in_cross_queue_reads.len(), 2);
    }
}
