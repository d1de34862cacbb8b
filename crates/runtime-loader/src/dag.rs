//! Dependency DAG and topological ordering (spec §4.5), grounded on
//! `fluent-agent::workflow::engine::WorkflowEngine`'s
//! `build_execution_dag` use of `petgraph`.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use runtime_core::types::{Manifest, PluginId};
use runtime_core::PluginError;

/// Build a DAG from `dependencies` edges (dependency -> dependent) and
/// return plugin ids in an order where every dependency precedes its
/// dependents. A cycle is reported as the spec's `dependency_cycle`
/// error with the offending path.
pub fn topological_order(manifests: &[Manifest]) -> Result<Vec<PluginId>, PluginError> {
    let mut graph = DiGraph::<PluginId, ()>::new();
    let mut index_of: HashMap<PluginId, NodeIndex> = HashMap::new();

    for manifest in manifests {
        let idx = graph.add_node(manifest.id.clone());
        index_of.insert(manifest.id.clone(), idx);
    }

    for manifest in manifests {
        let dependent_idx = index_of[&manifest.id];
        for dependency in &manifest.dependencies {
            if let Some(&dependency_idx) = index_of.get(dependency) {
                graph.add_edge(dependency_idx, dependent_idx, ());
            }
            // Dependencies that aren't in this batch are reported by
            // the Loader as dependency_unavailable, not a cycle error.
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|idx| graph[idx].clone()).collect()),
        Err(cycle_node) => {
            let cycle = find_cycle_path(&graph, cycle_node.node_id());
            Err(PluginError::DependencyCycle { cycle })
        }
    }
}

/// Walk back along incoming edges from the node toposort flagged to
/// reconstruct a concrete cycle path for the error message.
fn find_cycle_path(graph: &DiGraph<PluginId, ()>, start: NodeIndex) -> Vec<PluginId> {
    use petgraph::visit::EdgeRef;

    let mut path = vec![start];
    let mut current = start;
    let mut seen = std::collections::HashSet::new();
    seen.insert(start);

    loop {
        let Some(edge) = graph.edges_directed(current, petgraph::Direction::Incoming).next() else {
            break;
        };
        let prev = edge.source();
        path.push(prev);
        if prev == start {
            break;
        }
        if !seen.insert(prev) {
            break;
        }
        current = prev;
    }

    path.reverse();
    path.into_iter().map(|idx| graph[idx].clone()).collect()
}

/// Which of `dependencies` are missing from the already-known plugin
/// id set. Used to raise `dependency_unavailable` before scheduling a
/// plugin whose dependency never existed or failed to load.
pub fn missing_dependencies<'a>(manifest: &'a Manifest, known: &[PluginId]) -> Vec<&'a str> {
    manifest
        .dependencies
        .iter()
        .filter(|dep| !known.contains(dep))
        .map(|d| d.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::types::ResourceLimits;

    fn manifest(id: &str, deps: &[&str]) -> Manifest {
        Manifest {
            id: id.into(),
            name: id.into(),
            version: "0.1.0".into(),
            description: "".into(),
            author: "".into(),
            main: "main.so".into(),
            permissions: vec![],
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            resource_limits: ResourceLimits {
                memory_bytes: 1024,
                wall_timeout_ms: 100,
                cpu_time_ms: 100,
            },
        }
    }

    #[test]
    fn dependency_precedes_dependent() {
        let manifests = vec![manifest("B", &["A"]), manifest("A", &[])];
        let order = topological_order(&manifests).unwrap();
        let a_pos = order.iter().position(|id| id == "A").unwrap();
        let b_pos = order.iter().position(|id| id == "B").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn cycle_is_detected() {
        let manifests = vec![manifest("A", &["B"]), manifest("B", &["A"])];
        let err = topological_order(&manifests).unwrap_err();
        assert_eq!(err.kind_tag(), "dependency_cycle");
    }

    #[test]
    fn missing_dependency_is_reported_not_as_a_cycle() {
        let manifest_b = manifest("B", &["A"]);
        let missing = missing_dependencies(&manifest_b, &["B".to_string()]);
        assert_eq!(missing, vec!["A"]);
    }
}
