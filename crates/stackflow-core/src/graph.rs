//! Dependency graph of resources
//!
//! Nodes are indexed by logical name. An input `{ ref: "a.id" }` on resource
//! `b` adds the edge `a -> b`: `a` must be applied before `b`. References are
//! kept by name and resolved lazily against the index when an operator needs
//! them.

use crate::error::{GraphError, Result};
use crate::live::LiveState;
use crate::model::{DERIVED_TARGET, ResourceDescriptor};
use crate::scheduler::{self, Schedule};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Apply status of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not started yet
    Pending,
    /// Backend call in flight
    Applying,
    /// Live state available
    Applied,
    /// Apply failed; see the run report
    Failed,
    /// Never attempted because an earlier layer failed
    Skipped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Applying => write!(f, "applying"),
            NodeStatus::Applied => write!(f, "applied"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Runtime wrapper around a descriptor
#[derive(Debug, Clone)]
pub struct ResourceNode {
    descriptor: ResourceDescriptor,
    dependencies: IndexSet<String>,
    status: NodeStatus,
    live_state: Option<LiveState>,
}

impl ResourceNode {
    fn new(descriptor: ResourceDescriptor, dependencies: IndexSet<String>) -> Self {
        Self {
            descriptor,
            dependencies,
            status: NodeStatus::Pending,
            live_state: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Logical names this node must wait for
    pub fn dependencies(&self) -> &IndexSet<String> {
        &self.dependencies
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Live state, only once the node is applied
    pub fn live_state(&self) -> Option<&LiveState> {
        match self.status {
            NodeStatus::Applied => self.live_state.as_ref(),
            _ => None,
        }
    }

    pub fn mark_applying(&mut self) {
        self.status = NodeStatus::Applying;
    }

    /// Record the live state. A node is applied at most once per run.
    pub fn mark_applied(&mut self, live: LiveState) -> Result<()> {
        if self.live_state.is_some() {
            return Err(GraphError::AlreadyApplied(self.descriptor.name.clone()));
        }
        self.live_state = Some(live);
        self.status = NodeStatus::Applied;
        Ok(())
    }

    pub fn mark_failed(&mut self) {
        self.status = NodeStatus::Failed;
    }

    pub fn mark_skipped(&mut self) {
        self.status = NodeStatus::Skipped;
    }
}

/// Directed acyclic graph of resources, in declaration order
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: IndexMap<String, ResourceNode>,
}

impl DependencyGraph {
    /// Build the graph from descriptors in declaration order.
    ///
    /// Fails on duplicate names, references to unknown resources and cycles
    /// (including self-references). Nothing is applied before this returns.
    pub fn build(descriptors: &[ResourceDescriptor]) -> Result<Self> {
        let mut nodes: IndexMap<String, ResourceNode> = IndexMap::new();

        for descriptor in descriptors {
            if descriptor.name == DERIVED_TARGET {
                return Err(GraphError::ReservedName(descriptor.name.clone()));
            }
            if nodes.contains_key(&descriptor.name) {
                return Err(GraphError::DuplicateResource(descriptor.name.clone()));
            }

            let dependencies: IndexSet<String> = descriptor
                .referenced_names()
                .into_iter()
                .map(str::to_string)
                .collect();

            nodes.insert(
                descriptor.name.clone(),
                ResourceNode::new(descriptor.clone(), dependencies),
            );
        }

        for node in nodes.values() {
            if let Some(missing) = node.dependencies.iter().find(|d| !nodes.contains_key(*d)) {
                return Err(GraphError::UnknownReference {
                    source_name: node.name().to_string(),
                    target: missing.clone(),
                });
            }
        }

        let graph = Self { nodes };
        scheduler::schedule(&graph)?;

        tracing::debug!("Built resource graph with {} nodes", graph.len());
        Ok(graph)
    }

    /// Layered apply order
    pub fn schedule(&self) -> Result<Schedule> {
        scheduler::schedule(self)
    }

    pub fn node(&self, name: &str) -> Option<&ResourceNode> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut ResourceNode> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| GraphError::ResourceNotFound(name.to_string()))
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Position of a node in declaration order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.get_index_of(name)
    }

    /// Names of nodes that depend directly on `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.dependencies.contains(name))
            .map(|n| n.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find one dependency cycle among `candidates`, as a path that starts
    /// and ends at the same node
    pub(crate) fn find_cycle(&self, candidates: &[&str]) -> Vec<String> {
        for start in candidates {
            let Some((name, _)) = self.nodes.get_key_value(*start) else {
                continue;
            };
            let mut path: Vec<&str> = vec![name.as_str()];
            if let Some(cycle) = self.walk_cycle(name.as_str(), &mut path, candidates) {
                return cycle;
            }
        }
        candidates.iter().map(|s| s.to_string()).collect()
    }

    fn walk_cycle<'a>(
        &'a self,
        current: &'a str,
        path: &mut Vec<&'a str>,
        candidates: &[&str],
    ) -> Option<Vec<String>> {
        let node = self.nodes.get(current)?;
        for dep in &node.dependencies {
            if !candidates.contains(&dep.as_str()) {
                continue;
            }
            if let Some(pos) = path.iter().position(|p| *p == dep.as_str()) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            path.push(dep.as_str());
            if let Some(cycle) = self.walk_cycle(dep.as_str(), path, candidates) {
                return Some(cycle);
            }
            path.pop();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn resource(name: &str, refs: &[&str]) -> ResourceDescriptor {
        refs.iter().enumerate().fold(
            ResourceDescriptor::new(name, "test"),
            |d, (i, target)| d.with_input(format!("in{}", i), Value::reference(*target, "id")),
        )
    }

    #[test]
    fn test_build_collects_dependencies() {
        let graph = DependencyGraph::build(&[
            resource("a", &[]),
            resource("b", &["a"]),
            resource("c", &["a", "b"]),
        ])
        .unwrap();

        assert_eq!(graph.len(), 3);
        let c = graph.node("c").unwrap();
        assert_eq!(
            c.dependencies().iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(graph.dependents("a"), vec!["b", "c"]);
        assert_eq!(c.status(), NodeStatus::Pending);
    }

    #[test]
    fn test_duplicate_name() {
        let err = DependencyGraph::build(&[resource("a", &[]), resource("a", &[])]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateResource(name) if name == "a"));
    }

    #[test]
    fn test_unknown_reference() {
        let err = DependencyGraph::build(&[resource("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownReference { target, .. } if target == "ghost"));
    }

    #[test]
    fn test_reserved_name() {
        let err = DependencyGraph::build(&[resource("derived", &[])]).unwrap_err();
        assert!(matches!(err, GraphError::ReservedName(_)));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = DependencyGraph::build(&[resource("a", &["a"])]).unwrap_err();
        match err {
            GraphError::CyclicDependency(names) => assert!(names.contains(&"a".to_string())),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mutual_reference_is_cycle() {
        let err = DependencyGraph::build(&[
            resource("root", &[]),
            resource("a", &["b", "root"]),
            resource("b", &["a"]),
        ])
        .unwrap_err();

        match err {
            GraphError::CyclicDependency(names) => {
                assert!(names.contains(&"a".to_string()));
                assert!(names.contains(&"b".to_string()));
                assert!(!names.contains(&"root".to_string()));
                assert_eq!(names.first(), names.last());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mark_applied_once() {
        let mut graph = DependencyGraph::build(&[resource("a", &[])]).unwrap();
        let node = graph.node_mut("a").unwrap();

        assert!(node.live_state().is_none());
        node.mark_applying();
        assert!(node.live_state().is_none());
        node.mark_applied(LiveState::new("abc")).unwrap();
        assert_eq!(node.live_state().unwrap().id, "abc");

        let err = node.mark_applied(LiveState::new("def")).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyApplied(_)));
        assert_eq!(node.live_state().unwrap().id, "abc");
    }
}
