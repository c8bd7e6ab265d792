//! Dependency graph and build-order computation.
//!
//! This module provides the graph data structure used to turn a template's
//! dependency closure into a linear build order, with cycle detection.
//!
//! # Build order
//!
//! [`DependencyGraph::build_order`] performs a depth-first traversal from the
//! target using three-color marking (white = unvisited, gray = in progress,
//! black = done) over an explicit work stack, so deep dependency chains do
//! not consume call stack. A node is emitted only after all of its
//! dependencies have been emitted (post-order), which guarantees:
//!
//! - every dependency precedes its dependents, directly or transitively
//! - the target is the last element
//! - each name appears once, at the position of its first completion
//!
//! Dependencies are visited in declaration order, so the order is
//! deterministic for a given store. Reaching a gray node means the traversal
//! came back to a template that is still waiting on its own dependencies:
//! the graph has a cycle and [`EnvdepsError::CircularDependency`] is returned
//! with the full cycle path.

use anyhow::Result;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::EnvdepsError;
use crate::store::TemplateStore;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (on the work stack).
    Gray,
    /// Node and all its dependencies have been emitted.
    Black,
}

/// One entry of the explicit DFS work stack.
struct Frame {
    node: NodeIndex,
    children: Vec<NodeIndex>,
    next: usize,
}

/// Dependency graph over template names.
///
/// An edge `from → to` means `from` depends on `to`, so `to` must be built
/// before `from`.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<String, ()>,
    /// Map from template names to their graph indices.
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Build the graph of everything reachable from `target` in `store`.
    ///
    /// Dependencies that are not in the store are skipped; reporting them is
    /// the resolver's job.
    ///
    /// # Errors
    ///
    /// Returns [`EnvdepsError::TemplateNotFound`] if `target` is not in the store.
    pub fn from_store(target: &str, store: &TemplateStore) -> Result<Self> {
        if !store.contains(target) {
            return Err(EnvdepsError::TemplateNotFound {
                name: target.to_string(),
                suggestions: store.similar_names(target),
            }
            .into());
        }

        let mut graph = Self::new();
        graph.ensure_node(target);

        let mut queue = VecDeque::from([target.to_string()]);
        let mut seen = HashSet::from([target.to_string()]);

        while let Some(name) = queue.pop_front() {
            // A template may have been removed concurrently; treat it as a leaf.
            let Some(template) = store.get(&name) else {
                continue;
            };
            for dep in &template.dependencies {
                if !store.contains(&dep.name) {
                    tracing::debug!("Graph: skipping '{}' -> '{}' (not in store)", name, dep.name);
                    continue;
                }
                graph.add_dependency(&name, &dep.name);
                if seen.insert(dep.name.clone()) {
                    queue.push_back(dep.name.clone());
                }
            }
        }

        Ok(graph)
    }

    /// Add a node to the graph if it doesn't already exist.
    ///
    /// Returns the node index in the graph.
    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Add a dependency relationship to the graph.
    ///
    /// `from` depends on `to`, meaning `to` must be built before `from`.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Direct dependencies of `node` in the order they were added.
    ///
    /// petgraph iterates outgoing edges newest first, so edges are re-sorted
    /// by index to recover declaration order.
    fn ordered_children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> =
            self.graph.edges(node).map(|e| (e.id(), e.target())).collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Iterative post-order DFS from `start`, appending finished nodes to `order`.
    fn visit(
        &self,
        start: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        colors.insert(start, Color::Gray);
        let mut stack = vec![Frame {
            node: start,
            children: self.ordered_children(start),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.children.len() {
                let child = frame.children[frame.next];
                frame.next += 1;

                match colors.get(&child).copied().unwrap_or(Color::White) {
                    Color::White => {
                        colors.insert(child, Color::Gray);
                        stack.push(Frame {
                            node: child,
                            children: self.ordered_children(child),
                            next: 0,
                        });
                    }
                    Color::Gray => {
                        // The gray child is on the stack; the cycle runs from it to the top.
                        let start = stack.iter().position(|f| f.node == child).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|f| self.graph[f.node].clone()).collect();
                        path.push(self.graph[child].clone());
                        return Err(EnvdepsError::CircularDependency { path }.into());
                    }
                    Color::Black => {}
                }
            } else {
                let node = frame.node;
                stack.pop();
                colors.insert(node, Color::Black);
                order.push(self.graph[node].clone());
            }
        }

        Ok(())
    }

    /// Compute the build order for `target`.
    ///
    /// Returns the names of `target` and everything it reaches, each
    /// dependency before its dependents and `target` last.
    ///
    /// # Errors
    ///
    /// - [`EnvdepsError::TemplateNotFound`] if `target` is not a node
    /// - [`EnvdepsError::CircularDependency`] if a cycle is reachable from `target`
    pub fn build_order(&self, target: &str) -> Result<Vec<String>> {
        let Some(&start) = self.node_map.get(target) else {
            return Err(EnvdepsError::TemplateNotFound {
                name: target.to_string(),
                suggestions: Vec::new(),
            }
            .into());
        };

        let mut colors = HashMap::new();
        let mut order = Vec::new();
        self.visit(start, &mut colors, &mut order)?;
        Ok(order)
    }

    /// Direct dependencies of `name`, in declaration order.
    pub fn get_direct_deps(&self, name: &str) -> Vec<String> {
        self.node_map
            .get(name)
            .map(|&idx| {
                self.ordered_children(idx).into_iter().map(|c| self.graph[c].clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Build a human-readable dependency tree rooted at `root`.
    ///
    /// Templates already printed are marked `(*)` instead of being expanded
    /// again; a template that reaches itself is marked as a circular reference.
    pub fn to_tree_string(&self, root: &str) -> String {
        let mut result = format!("{root}\n");
        let mut expanded = HashSet::from([root.to_string()]);
        let mut ancestors = vec![root.to_string()];
        self.build_tree_string(root, &mut result, "", &mut expanded, &mut ancestors);
        result
    }

    fn build_tree_string(
        &self,
        node: &str,
        result: &mut String,
        prefix: &str,
        expanded: &mut HashSet<String>,
        ancestors: &mut Vec<String>,
    ) {
        let deps = self.get_direct_deps(node);
        for (i, dep) in deps.iter().enumerate() {
            let is_last = i == deps.len() - 1;
            let connector = if is_last {
                "└── "
            } else {
                "├── "
            };
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };

            if ancestors.contains(dep) {
                result.push_str(&format!("{prefix}{connector}{dep} (circular reference)\n"));
            } else if !expanded.insert(dep.clone()) {
                result.push_str(&format!("{prefix}{connector}{dep} (*)\n"));
            } else {
                result.push_str(&format!("{prefix}{connector}{dep}\n"));
                ancestors.push(dep.clone());
                self.build_tree_string(dep, result, &child_prefix, expanded, ancestors);
                ancestors.pop();
            }
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the build order for `target` over the templates in `store`.
///
/// Convenience wrapper around [`DependencyGraph::from_store`] and
/// [`DependencyGraph::build_order`].
pub fn build_order(target: &str, store: &TemplateStore) -> Result<Vec<String>> {
    DependencyGraph::from_store(target, store)?.build_order(target)
}
