//! Dependency graph and best-effort topological sort.
//!
//! Nodes are identified by name and indexed by discovery order. Each node
//! declares the names it depends on; names that do not resolve to another
//! node in the graph are collected as [`UnresolvedDependency`] entries and
//! the edge is dropped.
//!
//! [`DependencyGraph::sort`] never fails. It produces one total order in
//! two parts: the strictly ordered prefix (Kahn's algorithm, ties broken by
//! discovery order) followed by the remainder that could not be ordered
//! because of cycles. The remainder keeps a deterministic order and the
//! nodes that actually sit on a cycle are reported separately.
//!
//! # Examples
//!
//! ```
//! use schema_sync_core::DependencyGraph;
//!
//! let graph = DependencyGraph::build([
//!     ("ORDERS", vec!["CUSTOMERS".to_string()]),
//!     ("CUSTOMERS", vec![]),
//!     ("AUDIT", vec!["MISSING".to_string()]),
//! ]);
//! assert_eq!(graph.unresolved().len(), 1);
//!
//! let sorted = graph.sort();
//! let names: Vec<&str> = sorted.order.iter().map(|&i| graph.name(i)).collect();
//! assert_eq!(names, vec!["CUSTOMERS", "ORDERS", "AUDIT"]);
//! assert!(sorted.cyclic.is_empty());
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// A dependency name that did not resolve to a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
    /// The node declaring the dependency.
    pub node: String,
    /// The name that could not be resolved.
    pub dependency: String,
}

/// Result of [`DependencyGraph::sort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedOrder {
    /// Every node index exactly once.
    pub order: Vec<usize>,
    /// Length of the strictly ordered prefix of `order`.
    pub strict_len: usize,
    /// Nodes that lie on a dependency cycle, in discovery order.
    pub cyclic: Vec<usize>,
}

impl SortedOrder {
    /// Nodes placed after the strictly ordered prefix.
    pub fn remainder(&self) -> &[usize] {
        &self.order[self.strict_len..]
    }

    /// Returns `true` if every node was strictly ordered.
    pub fn is_complete(&self) -> bool {
        self.strict_len == self.order.len()
    }
}

/// Directed graph of named nodes and their dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    names: Vec<String>,
    dependencies: Vec<Vec<usize>>,
    unresolved: Vec<UnresolvedDependency>,
}

impl DependencyGraph {
    /// Builds a graph from `(name, dependency names)` pairs in discovery
    /// order.
    ///
    /// Self references and repeated dependencies are ignored. When two
    /// nodes share a name, references resolve to the first one.
    pub fn build<N, I>(nodes: I) -> Self
    where
        N: AsRef<str>,
        I: IntoIterator<Item = (N, Vec<String>)>,
    {
        let nodes: Vec<(String, Vec<String>)> = nodes
            .into_iter()
            .map(|(name, deps)| (name.as_ref().to_string(), deps))
            .collect();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (i, (name, _)) in nodes.iter().enumerate() {
            index.entry(name.as_str()).or_insert(i);
        }

        let mut dependencies = Vec::with_capacity(nodes.len());
        let mut unresolved = Vec::new();
        for (i, (name, deps)) in nodes.iter().enumerate() {
            let mut resolved: Vec<usize> = Vec::with_capacity(deps.len());
            for dep in deps {
                match index.get(dep.as_str()) {
                    Some(&target) if target == i => {}
                    Some(&target) => {
                        if !resolved.contains(&target) {
                            resolved.push(target);
                        }
                    }
                    None => unresolved.push(UnresolvedDependency {
                        node: name.clone(),
                        dependency: dep.clone(),
                    }),
                }
            }
            dependencies.push(resolved);
        }

        Self {
            names: nodes.into_iter().map(|(name, _)| name).collect(),
            dependencies,
            unresolved,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of node `index`.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Resolved dependencies of node `index`.
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Dependency names dropped because they resolved to no node.
    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        &self.unresolved
    }

    /// Sorts the graph so every node comes after the nodes it depends on,
    /// as far as cycles allow.
    ///
    /// Nodes that cannot be strictly ordered are appended after the strict
    /// prefix: repeatedly the first unplaced node (in discovery order)
    /// whose dependencies are all placed is taken, falling back to the
    /// first unplaced node when every candidate waits on a cycle.
    pub fn sort(&self) -> SortedOrder {
        let count = self.len();
        let mut pending: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (node, deps) in self.dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut placed = vec![false; count];
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(node)) = ready.pop() {
            placed[node] = true;
            order.push(node);
            for &dependent in &dependents[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
        let strict_len = order.len();

        let cyclic = self.cycle_members(&placed);

        while order.len() < count {
            let next = (0..count)
                .filter(|&i| !placed[i])
                .find(|&i| self.dependencies[i].iter().all(|&d| placed[d]))
                .or_else(|| (0..count).find(|&i| !placed[i]));
            let Some(next) = next else { break };
            placed[next] = true;
            order.push(next);
        }

        SortedOrder {
            order,
            strict_len,
            cyclic,
        }
    }

    /// Unplaced nodes that can reach themselves through unplaced nodes.
    fn cycle_members(&self, placed: &[bool]) -> Vec<usize> {
        (0..self.len())
            .filter(|&start| !placed[start])
            .filter(|&start| {
                let mut visited = vec![false; self.len()];
                let mut stack: Vec<usize> = self.dependencies[start]
                    .iter()
                    .copied()
                    .filter(|&d| !placed[d])
                    .collect();
                while let Some(node) = stack.pop() {
                    if node == start {
                        return true;
                    }
                    if std::mem::replace(&mut visited[node], true) {
                        continue;
                    }
                    stack.extend(
                        self.dependencies[node]
                            .iter()
                            .copied()
                            .filter(|&d| !placed[d]),
                    );
                }
                false
            })
            .collect()
    }
}
