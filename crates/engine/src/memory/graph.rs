//! In-memory memory graph (§3.5, §3.6, §4.2.1): a typed multi-digraph with
//! per-type and per-name secondary indices, addressed by [`GraphScope`].

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use runtime_domain::{CharacterId, ChapterId, AreaId, MemoryEdgeId, MemoryNodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Addressing unit for a subgraph (§3.6). The persisted store key of a
/// node/edge is `(world_id, scope, node_id | edge_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphScope {
    World,
    Chapter(ChapterId),
    Area(ChapterId, AreaId),
    Character(CharacterId),
    Camp,
}

impl GraphScope {
    /// Slash-joined path segment identifying this scope, used to build
    /// [`crate::ports::DocPath`]s.
    pub fn path_segment(&self) -> String {
        match self {
            GraphScope::World => "world".to_string(),
            GraphScope::Chapter(chapter) => format!("chapter/{chapter}"),
            GraphScope::Area(chapter, area) => format!("chapter/{chapter}/area/{area}"),
            GraphScope::Character(character) => format!("character/{character}"),
            GraphScope::Camp => "camp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    pub id: MemoryNodeId,
    pub node_type: String,
    pub name: String,
    pub importance: f64,
    pub properties: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryNode {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: MemoryNodeId::new(),
            node_type: node_type.into(),
            name: name.into(),
            importance: 0.5,
            properties: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    fn name_key(&self) -> (String, String) {
        (self.node_type.clone(), self.name.to_lowercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEdge {
    pub id: MemoryEdgeId,
    pub source: MemoryNodeId,
    pub target: MemoryNodeId,
    pub relation: String,
    pub weight: f64,
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryGraphError {
    #[error("edge endpoint does not exist in graph: {0}")]
    MissingEndpoint(MemoryNodeId),
}

/// Arena-and-index memory graph (Design Notes §9: "arena+index, node_id →
/// record, plus per-type and per-name indices; edges reference endpoint ids
/// rather than pointers").
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<MemoryNodeId, MemoryNode>,
    edges: HashMap<MemoryEdgeId, MemoryEdge>,
    type_index: HashMap<String, HashSet<MemoryNodeId>>,
    name_index: HashMap<(String, String), HashSet<MemoryNodeId>>,
    outgoing: HashMap<MemoryNodeId, HashSet<MemoryEdgeId>>,
    incoming: HashMap<MemoryNodeId, HashSet<MemoryEdgeId>>,
    /// (source, target, relation) -> edge id, enforcing at most one edge per
    /// triple (§3.5).
    edge_triples: HashMap<(MemoryNodeId, MemoryNodeId, String), MemoryEdgeId>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. Deindexes any prior value under this id
    /// before reindexing by `(type, name-lowercased)` (§4.2.1).
    pub fn upsert_node(&mut self, node: MemoryNode) {
        if let Some(prior) = self.nodes.remove(&node.id) {
            if let Some(set) = self.type_index.get_mut(&prior.node_type) {
                set.remove(&prior.id);
            }
            if let Some(set) = self.name_index.get_mut(&prior.name_key()) {
                set.remove(&prior.id);
            }
        }
        self.type_index
            .entry(node.node_type.clone())
            .or_default()
            .insert(node.id);
        self.name_index.entry(node.name_key()).or_default().insert(node.id);
        self.nodes.insert(node.id, node);
    }

    pub fn has_node(&self, id: MemoryNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get_node(&self, id: MemoryNodeId) -> Option<&MemoryNode> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: MemoryNodeId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes_by_type(&self, node_type: &str) -> Vec<&MemoryNode> {
        self.type_index
            .get(node_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn find_by_name(&self, node_type: &str, name: &str) -> Option<&MemoryNode> {
        let key = (node_type.to_string(), name.to_lowercase());
        self.name_index
            .get(&key)
            .into_iter()
            .flatten()
            .next()
            .and_then(|id| self.nodes.get(id))
    }

    /// Insert or replace an edge. Both endpoints must already exist. At most
    /// one edge persists per `(source, target, relation)` triple — a second
    /// insert with the same triple replaces the first, keeping its new id.
    pub fn upsert_edge(&mut self, edge: MemoryEdge) -> Result<(), MemoryGraphError> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(MemoryGraphError::MissingEndpoint(edge.source));
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(MemoryGraphError::MissingEndpoint(edge.target));
        }

        let triple = (edge.source, edge.target, edge.relation.clone());
        if let Some(prior_id) = self.edge_triples.remove(&triple) {
            self.remove_edge_by_id(prior_id);
        }

        self.outgoing.entry(edge.source).or_default().insert(edge.id);
        self.incoming.entry(edge.target).or_default().insert(edge.id);
        self.edge_triples.insert(triple, edge.id);
        self.edges.insert(edge.id, edge);
        Ok(())
    }

    fn remove_edge_by_id(&mut self, id: MemoryEdgeId) {
        if let Some(edge) = self.edges.remove(&id) {
            if let Some(set) = self.outgoing.get_mut(&edge.source) {
                set.remove(&id);
            }
            if let Some(set) = self.incoming.get_mut(&edge.target) {
                set.remove(&id);
            }
        }
    }

    pub fn get_edge(&self, id: MemoryEdgeId) -> Option<&MemoryEdge> {
        self.edges.get(&id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &MemoryEdge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn outgoing_edges(&self, id: MemoryNodeId) -> Vec<&MemoryEdge> {
        self.outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|eid| self.edges.get(eid))
            .collect()
    }

    pub fn incoming_edges(&self, id: MemoryNodeId) -> Vec<&MemoryEdge> {
        self.incoming
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|eid| self.edges.get(eid))
            .collect()
    }

    /// Out-degree, used by spreading activation's hub penalty (§4.2.3).
    pub fn out_degree(&self, id: MemoryNodeId) -> usize {
        self.outgoing.get(&id).map(HashSet::len).unwrap_or(0)
    }

    fn neighbors(&self, id: MemoryNodeId, direction: Direction) -> Vec<MemoryNodeId> {
        let mut result = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            result.extend(self.outgoing_edges(id).into_iter().map(|e| e.target));
        }
        if matches!(direction, Direction::In | Direction::Both) {
            result.extend(self.incoming_edges(id).into_iter().map(|e| e.source));
        }
        result
    }

    /// Transitive closure of `seeds` up to `depth` hops in `direction`
    /// (§4.2.1). Includes the seeds themselves.
    pub fn expand_nodes(
        &self,
        seeds: &[MemoryNodeId],
        depth: usize,
        direction: Direction,
    ) -> HashSet<MemoryNodeId> {
        let mut visited: HashSet<MemoryNodeId> = seeds.iter().copied().collect();
        let mut frontier: VecDeque<(MemoryNodeId, usize)> =
            seeds.iter().map(|&id| (id, 0)).collect();

        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= depth {
                continue;
            }
            for next in self.neighbors(node, direction) {
                if visited.insert(next) {
                    frontier.push_back((next, hops + 1));
                }
            }
        }
        visited
    }
}

/// The in-memory working set: one [`MemoryGraph`] per [`GraphScope`] a
/// world has touched. Used by event dispatch, `recall_memory`, and
/// `create_memory` to address world/chapter/area/character/camp subgraphs
/// uniformly.
#[derive(Debug, Default)]
pub struct ScopedGraphs {
    graphs: HashMap<GraphScope, MemoryGraph>,
}

impl ScopedGraphs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope_mut(&mut self, scope: GraphScope) -> &mut MemoryGraph {
        self.graphs.entry(scope).or_default()
    }

    pub fn scope(&self, scope: &GraphScope) -> Option<&MemoryGraph> {
        self.graphs.get(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &GraphScope> {
        self.graphs.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(now: DateTime<Utc>, node_type: &str, name: &str) -> MemoryNode {
        MemoryNode::new(node_type, name, now)
    }

    #[test]
    fn upsert_node_reindexes_on_type_change() {
        let now = Utc::now();
        let mut graph = MemoryGraph::new();
        let mut n = node(now, "person", "Elder");
        let id = n.id;
        graph.upsert_node(n.clone());
        assert_eq!(graph.nodes_by_type("person").len(), 1);

        n.node_type = "location".to_string();
        graph.upsert_node(n);
        assert_eq!(graph.nodes_by_type("person").len(), 0);
        assert_eq!(graph.nodes_by_type("location").len(), 1);
        assert!(graph.has_node(id));
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let now = Utc::now();
        let mut graph = MemoryGraph::new();
        graph.upsert_node(node(now, "person", "Elder Rowan"));
        assert!(graph.find_by_name("person", "elder rowan").is_some());
    }

    #[test]
    fn edge_requires_both_endpoints() {
        let now = Utc::now();
        let mut graph = MemoryGraph::new();
        let a = node(now, "person", "A");
        let a_id = a.id;
        graph.upsert_node(a);
        let missing_target = MemoryNodeId::new();

        let edge = MemoryEdge {
            id: MemoryEdgeId::new(),
            source: a_id,
            target: missing_target,
            relation: "knows".to_string(),
            weight: 1.0,
            properties: Value::Null,
            created_at: now,
        };
        assert!(graph.upsert_edge(edge).is_err());
    }

    #[test]
    fn at_most_one_edge_per_triple() {
        let now = Utc::now();
        let mut graph = MemoryGraph::new();
        let a = node(now, "person", "A");
        let b = node(now, "person", "B");
        let (a_id, b_id) = (a.id, b.id);
        graph.upsert_node(a);
        graph.upsert_node(b);

        graph
            .upsert_edge(MemoryEdge {
                id: MemoryEdgeId::new(),
                source: a_id,
                target: b_id,
                relation: "knows".to_string(),
                weight: 0.2,
                properties: Value::Null,
                created_at: now,
            })
            .unwrap();
        graph
            .upsert_edge(MemoryEdge {
                id: MemoryEdgeId::new(),
                source: a_id,
                target: b_id,
                relation: "knows".to_string(),
                weight: 0.9,
                properties: Value::Null,
                created_at: now,
            })
            .unwrap();

        let edges = graph.outgoing_edges(a_id);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.9);
    }

    #[test]
    fn expand_nodes_respects_depth_and_direction() {
        let now = Utc::now();
        let mut graph = MemoryGraph::new();
        let a = node(now, "person", "A");
        let b = node(now, "person", "B");
        let c = node(now, "person", "C");
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        graph.upsert_node(a);
        graph.upsert_node(b);
        graph.upsert_node(c);
        graph
            .upsert_edge(MemoryEdge {
                id: MemoryEdgeId::new(),
                source: a_id,
                target: b_id,
                relation: "knows".to_string(),
                weight: 1.0,
                properties: Value::Null,
                created_at: now,
            })
            .unwrap();
        graph
            .upsert_edge(MemoryEdge {
                id: MemoryEdgeId::new(),
                source: b_id,
                target: c_id,
                relation: "knows".to_string(),
                weight: 1.0,
                properties: Value::Null,
                created_at: now,
            })
            .unwrap();

        let one_hop = graph.expand_nodes(&[a_id], 1, Direction::Out);
        assert_eq!(one_hop.len(), 2);
        assert!(!one_hop.contains(&c_id));

        let two_hop = graph.expand_nodes(&[a_id], 2, Direction::Out);
        assert_eq!(two_hop.len(), 3);

        let no_in = graph.expand_nodes(&[c_id], 2, Direction::Out);
        assert_eq!(no_in.len(), 1);
    }
}
