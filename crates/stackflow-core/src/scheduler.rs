//! Layered topological scheduling
//!
//! Kahn's algorithm, one layer at a time: every node whose dependencies are
//! all scheduled joins the next layer. Within a layer nodes keep declaration
//! order so apply logs are reproducible for identical input.

use crate::error::{GraphError, Result};
use crate::graph::DependencyGraph;

/// Apply order as a sequence of layers.
///
/// Nodes within a layer have no dependency relation and may run
/// concurrently; layers are strictly ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    layers: Vec<Vec<String>>,
}

impl Schedule {
    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Flattened apply order
    pub fn apply_order(&self) -> Vec<&str> {
        self.layers
            .iter()
            .flat_map(|layer| layer.iter().map(String::as_str))
            .collect()
    }

    /// Layers in reverse, for teardown
    pub fn destroy_layers(&self) -> Vec<&[String]> {
        self.layers.iter().rev().map(Vec::as_slice).collect()
    }

    /// Names in layers after `index`
    pub fn remaining_after(&self, index: usize) -> Vec<&str> {
        self.layers
            .iter()
            .skip(index + 1)
            .flat_map(|layer| layer.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Compute the layered order of `graph`, failing on cycles
pub fn schedule(graph: &DependencyGraph) -> Result<Schedule> {
    let names: Vec<&str> = graph.nodes().map(|n| n.name()).collect();
    let mut remaining: Vec<usize> = graph.nodes().map(|n| n.dependencies().len()).collect();
    let mut scheduled = vec![false; names.len()];
    let mut layers: Vec<Vec<String>> = Vec::new();

    loop {
        let ready: Vec<usize> = (0..names.len())
            .filter(|&i| !scheduled[i] && remaining[i] == 0)
            .collect();

        if ready.is_empty() {
            break;
        }

        for &i in &ready {
            scheduled[i] = true;
            for dependent in graph.dependents(names[i]) {
                if let Some(j) = graph.index_of(dependent) {
                    remaining[j] -= 1;
                }
            }
        }

        layers.push(ready.iter().map(|&i| names[i].to_string()).collect());
    }

    let stuck: Vec<&str> = (0..names.len())
        .filter(|&i| !scheduled[i])
        .map(|i| names[i])
        .collect();

    if !stuck.is_empty() {
        return Err(GraphError::CyclicDependency(graph.find_cycle(&stuck)));
    }

    Ok(Schedule { layers })
}
