//! Feature graph implementation using petgraph
//!
//! Nodes are resolved features, edges point from a feature to the features
//! it references or explicitly depends on. The graph rejects cycles and
//! produces the deterministic line-up order of a configuration.

use std::collections::VecDeque;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, VisitMap, Visitable};

use keel_core::types::FeatureId;

/// Node payload: position of the feature in the builder plus a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureNode {
    /// Index into the builder's feature list
    pub index: usize,
    /// Identity, when the spec declares ID parameters
    pub id: Option<FeatureId>,
    /// Printable description used in cycle reports
    pub label: String,
}

/// Why one feature must be lined up before another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureEdge {
    /// Through the named reference of the dependent's spec
    Reference(String),
    /// Declared in the dependent's config
    Dependency,
}

#[derive(Debug, Default)]
pub struct FeatureGraph {
    /// Underlying directed graph, edges point from dependent to dependency
    graph: DiGraph<FeatureNode, FeatureEdge>,
    /// Map from FeatureId to NodeIndex for fast lookups
    node_map: IndexMap<FeatureId, NodeIndex>,
}

impl FeatureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature node; identified features are added at most once
    pub fn add_feature(&mut self, node: FeatureNode) -> NodeIndex {
        if let Some(existing) = node.id.as_ref().and_then(|id| self.node_map.get(id)) {
            return *existing;
        }
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        if let Some(id) = id {
            self.node_map.insert(id, index);
        }
        index
    }

    pub fn node_for(&self, id: &FeatureId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&FeatureNode> {
        self.graph.node_weight(index)
    }

    /// Record that `from` must come after `to`.
    ///
    /// Self edges are dropped: a feature referencing itself is satisfied by
    /// its own presence. Repeated edges between the same nodes collapse.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: FeatureEdge) {
        if from == to || self.graph.find_edge(from, to).is_some() {
            return;
        }
        self.graph.add_edge(from, to, edge);
    }

    pub fn feature_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Detect cycles; on failure returns the members of one cycle in
    /// traversal order, starting with the earliest-added member
    pub fn detect_cycles(&self) -> Result<(), Vec<NodeIndex>> {
        let cyclic = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .filter_map(|component| component.iter().min().copied().map(|start| (start, component)))
            .min_by_key(|(start, _)| *start);

        match cyclic {
            Some((start, component)) => Err(self.extract_cycle_path(start, &component)),
            None => Ok(()),
        }
    }

    /// Shortest walk from `start` back to itself within one strongly
    /// connected component
    fn extract_cycle_path(&self, start: NodeIndex, component: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut parents: IndexMap<NodeIndex, NodeIndex> = IndexMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.targets(current) {
                if !component.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![current];
                    let mut cursor = current;
                    while let Some(&parent) = parents.get(&cursor) {
                        path.push(parent);
                        cursor = parent;
                    }
                    path.reverse();
                    return path;
                }
                if next != start && !parents.contains_key(&next) {
                    parents.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        component.to_vec()
    }

    /// Format cycle as "a -> b -> c -> a"
    pub fn format_cycle(&self, cycle: &[NodeIndex]) -> String {
        let mut labels: Vec<&str> = cycle
            .iter()
            .filter_map(|index| self.graph.node_weight(*index))
            .map(|node| node.label.as_str())
            .collect();
        if let Some(first) = labels.first().copied() {
            labels.push(first);
        }
        labels.join(" -> ")
    }

    /// Check for cycles and return the formatted cycle if one is found
    pub fn validate_no_cycles(&self) -> Result<(), String> {
        self.detect_cycles()
            .map_err(|cycle| self.format_cycle(&cycle))
    }

    /// Targets of `node` in the order their edges were added
    fn targets(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges(node)
            .map(|edge| (edge.id(), edge.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Depth-first line-up: each root in turn, with every feature's targets
    /// emitted before the feature itself. The graph must be acyclic.
    pub fn line_up(&self, roots: impl IntoIterator<Item = NodeIndex>) -> Vec<NodeIndex> {
        let mut visited = self.graph.visit_map();
        let mut order = Vec::with_capacity(self.graph.node_count());

        for root in roots {
            if !visited.visit(root) {
                continue;
            }
            let mut stack = vec![(root, self.targets(root).into_iter())];
            loop {
                let Some((node, targets)) = stack.last_mut() else {
                    break;
                };
                let node = *node;
                match targets.next() {
                    Some(target) => {
                        if visited.visit(target) {
                            let next = self.targets(target).into_iter();
                            stack.push((target, next));
                        }
                    },
                    None => {
                        stack.pop();
                        order.push(node);
                    },
                }
            }
        }

        order
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn build(count: usize, edges: &[(usize, usize)]) -> (FeatureGraph, Vec<NodeIndex>) {
        let mut graph = FeatureGraph::new();
        let nodes: Vec<NodeIndex> = (0..count)
            .map(|i| {
                graph.add_feature(FeatureNode {
                    index: i,
                    id: Some(FeatureId::single("f", "name", format!("n{}", i))),
                    label: format!("n{}", i),
                })
            })
            .collect();
        for &(from, to) in edges {
            if from < count && to < count {
                graph.add_edge(nodes[from], nodes[to], FeatureEdge::Dependency);
            }
        }
        (graph, nodes)
    }

    proptest! {
        // Edges only from lower to higher index never form a cycle
        #[test]
        fn forward_edges_are_acyclic(
            count in 2usize..8,
            edges in prop::collection::vec((0usize..8, 0usize..8), 0..20)
        ) {
            let forward: Vec<_> = edges.into_iter().filter(|(f, t)| f < t).collect();
            let (graph, _) = build(count, &forward);
            prop_assert!(graph.detect_cycles().is_ok());
        }

        // A reported cycle is a real closed walk
        #[test]
        fn reported_cycles_are_closed_walks(
            count in 2usize..8,
            edges in prop::collection::vec((0usize..8, 0usize..8), 0..20)
        ) {
            let (graph, _) = build(count, &edges);
            if let Err(cycle) = graph.detect_cycles() {
                prop_assert!(cycle.len() > 1);
                for pair in cycle.windows(2) {
                    prop_assert!(graph.graph.find_edge(pair[0], pair[1]).is_some());
                }
                let last = cycle[cycle.len() - 1];
                prop_assert!(graph.graph.find_edge(last, cycle[0]).is_some());
            }
        }

        // Every feature appears once and after all of its targets
        #[test]
        fn line_up_validity(
            count in 2usize..8,
            edges in prop::collection::vec((0usize..8, 0usize..8), 0..20)
        ) {
            let forward: Vec<_> = edges.into_iter().filter(|(f, t)| f < t).collect();
            let (graph, nodes) = build(count, &forward);
            let order = graph.line_up(nodes.iter().copied());

            prop_assert_eq!(order.len(), count);
            let unique: HashSet<_> = order.iter().collect();
            prop_assert_eq!(unique.len(), count);

            let position = |n: NodeIndex| order.iter().position(|o| *o == n).unwrap();
            for (from, to) in forward {
                if from < count && to < count {
                    prop_assert!(position(nodes[to]) < position(nodes[from]));
                }
            }
        }
    }
}
