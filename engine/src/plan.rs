//! Graph construction over the table and view definitions of one pass.

use std::collections::HashMap;

use schema_sync_core::{
    ArtifactDefinition, ArtifactKind, ArtifactState, DefinitionBody, DependencyGraph,
    TableDefinition, UnresolvedDependency, ViewDefinition,
};
use tracing::{error, warn};

use crate::change::Outcome;

/// One table or view taking part in the structural phases.
#[derive(Debug, Clone)]
pub struct SyncNode<'d> {
    /// The definition.
    pub definition: &'d ArtifactDefinition,
    /// Change detection result for this pass.
    pub outcome: Outcome,
}

impl<'d> SyncNode<'d> {
    /// Creates a node; returns `None` for definitions that are neither
    /// tables nor views.
    pub fn new(definition: &'d ArtifactDefinition, outcome: Outcome) -> Option<Self> {
        definition
            .kind()
            .is_relation()
            .then_some(Self { definition, outcome })
    }

    /// Logical name.
    pub fn name(&self) -> &'d str {
        &self.definition.name
    }

    /// Source location.
    pub fn location(&self) -> &'d str {
        &self.definition.location
    }

    /// Table or view.
    pub fn kind(&self) -> ArtifactKind {
        self.definition.kind()
    }

    /// The table definition, for table nodes.
    pub fn table(&self) -> Option<&'d TableDefinition> {
        match &self.definition.body {
            DefinitionBody::Table(table) => Some(table),
            _ => None,
        }
    }

    /// The view definition, for view nodes.
    pub fn view(&self) -> Option<&'d ViewDefinition> {
        match &self.definition.body {
            DefinitionBody::View(view) => Some(view),
            _ => None,
        }
    }

    /// Returns `true` if the definition was created or updated this pass.
    pub fn is_changed(&self) -> bool {
        self.outcome.is_change()
    }

    /// State recorded when this node's object is (re)built.
    pub fn success_state(&self) -> ArtifactState {
        match self.outcome {
            Outcome::Updated | Outcome::Renamed { .. } => ArtifactState::SuccessfulUpdate,
            _ => ArtifactState::SuccessfulCreate,
        }
    }

    fn dependency_names(&self) -> Vec<String> {
        match &self.definition.body {
            DefinitionBody::Table(table) => table.dependency_names(),
            DefinitionBody::View(view) => view.dependency_names(),
            _ => Vec::new(),
        }
    }
}

/// The sorted dependency graph shared by all six phases.
///
/// The order is computed once; drop phases walk it backwards so drop order
/// is always the exact reverse of create order.
#[derive(Debug)]
pub struct SyncPlan<'d> {
    nodes: Vec<SyncNode<'d>>,
    graph: DependencyGraph,
    order: Vec<usize>,
    strict: Vec<bool>,
    cyclic: Vec<bool>,
}

impl<'d> SyncPlan<'d> {
    /// Builds and sorts the graph of `nodes`, given in discovery order.
    ///
    /// Dependency names resolve case-insensitively. Unresolved names are
    /// logged and dropped; cycles are logged and their members appended
    /// after the strictly ordered nodes.
    pub fn build(nodes: Vec<SyncNode<'d>>) -> Self {
        let canonical: HashMap<String, &str> = nodes
            .iter()
            .map(|n| (n.name().to_ascii_lowercase(), n.name()))
            .collect();
        let graph = DependencyGraph::build(nodes.iter().map(|node| {
            let dependencies = node
                .dependency_names()
                .into_iter()
                .map(|dep| match canonical.get(&dep.to_ascii_lowercase()) {
                    Some(name) => (*name).to_string(),
                    None => dep,
                })
                .collect();
            (node.name(), dependencies)
        }));

        for UnresolvedDependency { node, dependency } in graph.unresolved() {
            warn!(node = %node, dependency = %dependency, "dependency not found in this pass, edge dropped");
        }

        let sorted = graph.sort();
        let mut strict = vec![false; nodes.len()];
        for &i in &sorted.order[..sorted.strict_len] {
            strict[i] = true;
        }
        let mut cyclic = vec![false; nodes.len()];
        for &i in &sorted.cyclic {
            cyclic[i] = true;
        }
        if !sorted.cyclic.is_empty() {
            let names: Vec<&str> = sorted.cyclic.iter().map(|&i| graph.name(i)).collect();
            error!(nodes = ?names, "dependency cycle detected, ordering is best effort");
        }

        Self {
            nodes,
            graph,
            order: sorted.order,
            strict,
            cyclic,
        }
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> &[SyncNode<'d>] {
        &self.nodes
    }

    /// Node `index`.
    pub fn node(&self, index: usize) -> &SyncNode<'d> {
        &self.nodes[index]
    }

    /// Node indices in create order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Resolved dependencies of node `index`.
    pub fn dependencies(&self, index: usize) -> &[usize] {
        self.graph.dependencies(index)
    }

    /// Returns `true` if node `index` is in the strictly ordered prefix.
    pub fn is_strict(&self, index: usize) -> bool {
        self.strict[index]
    }

    /// Returns `true` if node `index` lies on a dependency cycle.
    pub fn is_cyclic(&self, index: usize) -> bool {
        self.cyclic[index]
    }

    /// Names of the nodes on dependency cycles.
    pub fn cycle_names(&self) -> Vec<String> {
        (0..self.nodes.len())
            .filter(|&i| self.cyclic[i])
            .map(|i| self.nodes[i].name().to_string())
            .collect()
    }

    /// Dependency names that resolved to no node.
    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        self.graph.unresolved()
    }
}
