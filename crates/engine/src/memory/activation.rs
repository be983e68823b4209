//! Spreading activation over the memory graph (§4.2.3) and the
//! subgraph/path-finding helpers built on top of it (§4.4 `recall_memory`).

use std::collections::{HashMap, HashSet};

use runtime_domain::MemoryNodeId;
use serde_json::json;

use super::graph::{MemoryEdge, MemoryGraph};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadingActivationConfig {
    pub max_iterations: u32,
    pub decay: f64,
    pub fire_threshold: f64,
    pub output_threshold: f64,
    pub hub_threshold: usize,
    pub hub_penalty: f64,
    pub max_activation: f64,
    pub convergence_threshold: f64,
    pub lateral_inhibition: bool,
    pub inhibition_factor: f64,
}

impl Default for SpreadingActivationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            decay: 0.6,
            fire_threshold: 0.1,
            output_threshold: 0.15,
            hub_threshold: 20,
            hub_penalty: 0.5,
            max_activation: 1.0,
            convergence_threshold: 0.01,
            lateral_inhibition: false,
            inhibition_factor: 0.1,
        }
    }
}

impl SpreadingActivationConfig {
    /// Preset used by the `recall_memory` tool (§4.4): lateral inhibition on,
    /// everything else at its default.
    pub fn recall_memory_preset() -> Self {
        Self {
            lateral_inhibition: true,
            ..Self::default()
        }
    }
}

/// Run spreading activation from `seeds` (§4.2.3) and return every node
/// whose final activation is strictly above `output_threshold`.
pub fn spread_activation(
    graph: &MemoryGraph,
    seeds: &[MemoryNodeId],
    config: &SpreadingActivationConfig,
) -> HashMap<MemoryNodeId, f64> {
    if graph.node_count() == 0 {
        return HashMap::new();
    }

    let mut activation: HashMap<MemoryNodeId, f64> =
        graph.nodes().map(|n| (n.id, 0.0)).collect();
    for &seed in seeds {
        if activation.contains_key(&seed) {
            activation.insert(seed, 1.0);
        }
    }

    for _ in 0..config.max_iterations {
        let mut next = activation.clone();
        for (&node_id, &act) in activation.iter() {
            if act < config.fire_threshold {
                continue;
            }
            let hub_factor = if graph.out_degree(node_id) > config.hub_threshold {
                config.hub_penalty
            } else {
                1.0
            };
            for edge in graph.outgoing_edges(node_id) {
                let signal = act * edge.weight * config.decay * hub_factor;
                let entry = next.entry(edge.target).or_insert(0.0);
                *entry = (*entry + signal).min(config.max_activation);
            }
        }

        if config.lateral_inhibition {
            apply_lateral_inhibition(&mut next, config);
        }

        let converged = activation
            .iter()
            .all(|(id, &prev)| (next.get(id).copied().unwrap_or(0.0) - prev).abs() <= config.convergence_threshold);

        activation = next;
        if converged {
            break;
        }
    }

    activation
        .into_iter()
        .filter(|(_, act)| *act > config.output_threshold)
        .collect()
}

fn apply_lateral_inhibition(activation: &mut HashMap<MemoryNodeId, f64>, config: &SpreadingActivationConfig) {
    if activation.is_empty() || config.inhibition_factor <= 0.0 {
        return;
    }
    let mean: f64 = activation.values().sum::<f64>() / activation.len() as f64;
    if mean <= 0.0 {
        return;
    }
    let subtract = config.inhibition_factor * mean;
    for value in activation.values_mut() {
        *value = (*value - subtract).clamp(0.0, config.max_activation);
    }
}

/// Build a new graph containing only the activated nodes and the edges
/// between them, stamping each node's `properties.activation` (§4.2.3).
pub fn extract_subgraph(graph: &MemoryGraph, activated: &HashMap<MemoryNodeId, f64>) -> MemoryGraph {
    let mut subgraph = MemoryGraph::new();
    for (&id, &activation) in activated {
        if let Some(node) = graph.get_node(id) {
            let mut copy = node.clone();
            if let serde_json::Value::Object(map) = &mut copy.properties {
                map.insert("activation".to_string(), json!(activation));
            } else {
                copy.properties = json!({ "activation": activation });
            }
            subgraph.upsert_node(copy);
        }
    }
    for edge in graph.edges() {
        if activated.contains_key(&edge.source) && activated.contains_key(&edge.target) {
            let _ = subgraph.upsert_edge(edge.clone());
        }
    }
    subgraph
}

/// Enumerate simple paths from `source` to `target` up to `max_depth` hops,
/// sorted by summed edge weight descending, truncated to `limit`. Returns an
/// empty vector immediately if either endpoint is absent from the graph.
pub fn find_paths(
    graph: &MemoryGraph,
    source: MemoryNodeId,
    target: MemoryNodeId,
    max_depth: usize,
    limit: usize,
) -> Vec<Vec<MemoryNodeId>> {
    if !graph.has_node(source) || !graph.has_node(target) {
        return Vec::new();
    }

    let mut results: Vec<(f64, Vec<MemoryNodeId>)> = Vec::new();
    let mut visited: HashSet<MemoryNodeId> = HashSet::new();
    let mut path = vec![source];
    visited.insert(source);

    walk(graph, source, target, max_depth, &mut visited, &mut path, 0.0, &mut results);

    results.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results.into_iter().map(|(_, path)| path).collect()
}

#[allow(clippy::too_many_arguments)]
fn walk(
    graph: &MemoryGraph,
    current: MemoryNodeId,
    target: MemoryNodeId,
    depth_remaining: usize,
    visited: &mut HashSet<MemoryNodeId>,
    path: &mut Vec<MemoryNodeId>,
    weight_so_far: f64,
    results: &mut Vec<(f64, Vec<MemoryNodeId>)>,
) {
    if current == target && path.len() > 1 {
        results.push((weight_so_far, path.clone()));
        return;
    }
    if depth_remaining == 0 {
        return;
    }

    let outgoing: Vec<&MemoryEdge> = graph.outgoing_edges(current);
    for edge in outgoing {
        if visited.contains(&edge.target) {
            continue;
        }
        visited.insert(edge.target);
        path.push(edge.target);
        walk(
            graph,
            edge.target,
            target,
            depth_remaining - 1,
            visited,
            path,
            weight_so_far + edge.weight,
            results,
        );
        path.pop();
        visited.remove(&edge.target);
    }
}
