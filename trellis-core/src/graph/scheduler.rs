//! Update Scheduler
//!
//! The scheduler owns the dependency edges and determines the order in which
//! derived nodes are brought up to date after a source changes. Dependencies
//! are always ordered before their dependents.
//!
//! # Algorithm
//!
//! 1. Collect every node reachable from the changed source through
//!    dependent edges (BFS).
//! 2. Sort the collected set topologically with Kahn's algorithm, counting
//!    only edges inside the set.
//!
//! The runtime walks that order and recomputes a node only when one of its
//! dependencies actually changed, so a diamond recomputes its join once.
//!
//! Dependency sets are validated on installation: a dependency that can
//! already reach its would-be dependent is rejected as a cycle, which keeps
//! the graph a DAG and the topological order total.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{Node, NodeId, NodeKind};
use crate::error::{Error, Result};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a node exists, creating it with `kind` if missing.
    ///
    /// A node first seen as someone's dependency is recorded as a source;
    /// registering it later as derived or effect upgrades its kind.
    pub fn ensure_node(&mut self, id: NodeId, kind: NodeKind) -> &mut Node {
        let node = self.nodes.entry(id).or_insert_with(|| Node::new(id, kind));
        if kind != NodeKind::Source {
            node.set_kind(kind);
        }
        node
    }

    /// Remove a node from the graph, along with every edge involving it.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for dep_id in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Swap the full dependency set of `node_id` for `dependencies`.
    ///
    /// Either every new edge is installed or, on a cycle, the graph is left
    /// exactly as it was.
    pub fn replace_dependencies(
        &mut self,
        node_id: NodeId,
        kind: NodeKind,
        dependencies: &[NodeId],
    ) -> Result<()> {
        // Dropping the node's incoming edges cannot break a path that starts
        // at the node itself, so checking against the current graph is exact.
        if let Some(&bad) = dependencies
            .iter()
            .find(|&&dep| self.would_cycle(dep, node_id))
        {
            tracing::warn!(node = %node_id, dependency = %bad, "rejecting cyclic dependency");
            return Err(Error::CyclicDependency(node_id));
        }

        let previous = self.ensure_node(node_id, kind).take_dependencies();
        for dep in previous {
            if let Some(dep_node) = self.nodes.get_mut(&dep) {
                dep_node.remove_dependent(node_id);
            }
        }
        for &dep in dependencies {
            self.ensure_node(dep, NodeKind::Source).add_dependent(node_id);
            self.ensure_node(node_id, kind).add_dependency(dep);
        }
        Ok(())
    }

    /// Whether `dependency -> dependent` would close a cycle.
    fn would_cycle(&self, dependency: NodeId, dependent: NodeId) -> bool {
        dependency == dependent || self.reaches(dependent, dependency)
    }

    /// Whether `to` is reachable from `from` along dependent edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(node_id) = stack.pop() {
            if node_id == to {
                return true;
            }
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                stack.extend(node.dependents().iter().copied());
            }
        }
        false
    }

    /// Every node downstream of `source_id`, dependencies first.
    ///
    /// The source itself is not part of the result.
    pub fn downstream(&self, source_id: NodeId) -> Vec<NodeId> {
        let mut collected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                collected.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(collected)
    }

    /// Perform a topological sort of the given nodes.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
