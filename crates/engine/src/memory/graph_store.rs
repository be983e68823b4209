//! Persisted Graph Store (§2.2, §4.2.2): the v2 operation set, named
//! secondary indices, and batching contract layered over the raw
//! [`GraphKvPort`] document store. Grounded in `graph_store.py`'s
//! Firestore-backed operation set and key layout, reworked against an
//! abstract async KV port instead of a concrete database client.

use std::sync::Arc;

use serde_json::Value;

use runtime_domain::WorldId;

use crate::ports::{DocPath, GraphKvError, GraphKvPort, KvQuery};

use super::graph::{Direction, GraphScope, MemoryEdge, MemoryGraph, MemoryNode};

/// `where source in (chunk_of_10)` / `where target in (…)` hop batching
/// (§4.2.2).
const HOP_CHUNK_SIZE: usize = 10;
/// All batch writes split at ≤450 ops (§4.2.2).
const BATCH_CHUNK_SIZE: usize = 450;

/// One pending write, chunked by [`PersistedGraphStore::commit_in_chunks`].
struct WriteOp {
    path: DocPath,
    doc: Value,
    merge: bool,
}

/// A `(world, scope)`-addressed Graph Store: nodes/edges collections plus
/// `type_index`/`name_index`/`timeline` secondary indices, built on top of
/// any [`GraphKvPort`] (§6.1).
pub struct PersistedGraphStore {
    kv: Arc<dyn GraphKvPort>,
}

impl PersistedGraphStore {
    pub fn new(kv: Arc<dyn GraphKvPort>) -> Self {
        Self { kv }
    }

    fn base(&self, world_id: WorldId, scope: &GraphScope) -> DocPath {
        DocPath::new(["worlds", &world_id.to_string(), "graphs", &scope.path_segment()])
    }

    fn nodes_collection(&self, world_id: WorldId, scope: &GraphScope) -> DocPath {
        self.base(world_id, scope).child("nodes")
    }

    fn edges_collection(&self, world_id: WorldId, scope: &GraphScope) -> DocPath {
        self.base(world_id, scope).child("edges")
    }

    fn type_index_collection(&self, world_id: WorldId, scope: &GraphScope, node_type: &str) -> DocPath {
        self.base(world_id, scope).child("type_index").child(node_type).child("nodes")
    }

    fn name_index_collection(&self, world_id: WorldId, scope: &GraphScope, name_lower: &str) -> DocPath {
        self.base(world_id, scope).child("name_index").child(sanitize_index_key(name_lower)).child("nodes")
    }

    fn timeline_collection(&self, world_id: WorldId, scope: &GraphScope, day: &str) -> DocPath {
        self.base(world_id, scope).child("timeline").child(sanitize_index_key(day)).child("events")
    }

    /// Index writes for one node: `type_index`, `name_index`, and, for
    /// event-type nodes carrying a `day`/`game_day` property, `timeline`.
    fn index_ops(&self, world_id: WorldId, scope: &GraphScope, node: &MemoryNode) -> Vec<WriteOp> {
        let payload = serde_json::json!({
            "node_id": node.id,
            "name": node.name,
            "type": node.node_type,
        });
        let mut ops = Vec::new();
        if !node.node_type.is_empty() {
            ops.push(WriteOp {
                path: self.type_index_collection(world_id, scope, &node.node_type).child(node.id.to_string()),
                doc: payload.clone(),
                merge: true,
            });
        }
        if !node.name.is_empty() {
            let name_key = sanitize_index_key(&node.name.to_lowercase());
            let mut name_payload = payload.clone();
            name_payload["name_key"] = Value::String(name_key.clone());
            ops.push(WriteOp {
                path: self.name_index_collection(world_id, scope, &name_key).child(node.id.to_string()),
                doc: name_payload,
                merge: true,
            });
        }
        if node.node_type == "event" {
            let day = node
                .properties
                .get("day")
                .or_else(|| node.properties.get("game_day"))
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())));
            if let Some(day) = day {
                let day_key = sanitize_index_key(&day);
                let mut timeline_payload = payload;
                timeline_payload["day"] = Value::String(day.clone());
                timeline_payload["day_key"] = Value::String(day_key.clone());
                ops.push(WriteOp {
                    path: self.timeline_collection(world_id, scope, &day_key).child(node.id.to_string()),
                    doc: timeline_payload,
                    merge: true,
                });
            }
        }
        ops
    }

    async fn commit_in_chunks(&self, ops: Vec<WriteOp>) -> Result<(), GraphKvError> {
        for chunk in ops.chunks(BATCH_CHUNK_SIZE) {
            for op in chunk {
                self.kv.set(&op.path, op.doc.clone(), op.merge).await?;
            }
        }
        Ok(())
    }

    /// `upsert_node_v2`: writes the node document and refreshes its
    /// secondary-index entries.
    pub async fn upsert_node_v2(&self, world_id: WorldId, scope: &GraphScope, node: &MemoryNode) -> Result<(), GraphKvError> {
        let mut ops = vec![WriteOp {
            path: self.nodes_collection(world_id, scope).child(node.id.to_string()),
            doc: serde_json::to_value(node).map_err(|e| GraphKvError::Serialization(e.to_string()))?,
            merge: true,
        }];
        ops.extend(self.index_ops(world_id, scope, node));
        self.commit_in_chunks(ops).await
    }

    /// `upsert_edge_v2`: writes the edge document.
    pub async fn upsert_edge_v2(&self, world_id: WorldId, scope: &GraphScope, edge: &MemoryEdge) -> Result<(), GraphKvError> {
        let doc = serde_json::to_value(edge).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
        self.kv.set(&self.edges_collection(world_id, scope).child(edge.id.to_string()), doc, true).await
    }

    pub async fn get_node(&self, world_id: WorldId, scope: &GraphScope, node_id: runtime_domain::MemoryNodeId) -> Result<Option<MemoryNode>, GraphKvError> {
        let doc = self.kv.get(&self.nodes_collection(world_id, scope).child(node_id.to_string())).await?;
        doc.map(|v| serde_json::from_value(v).map_err(|e| GraphKvError::Serialization(e.to_string()))).transpose()
    }

    pub async fn get_edge(&self, world_id: WorldId, scope: &GraphScope, edge_id: runtime_domain::MemoryEdgeId) -> Result<Option<MemoryEdge>, GraphKvError> {
        let doc = self.kv.get(&self.edges_collection(world_id, scope).child(edge_id.to_string())).await?;
        doc.map(|v| serde_json::from_value(v).map_err(|e| GraphKvError::Serialization(e.to_string()))).transpose()
    }

    /// `get_nodes_by_ids`: batched point reads via `GraphKvPort::get_all`.
    pub async fn get_nodes_by_ids(
        &self,
        world_id: WorldId,
        scope: &GraphScope,
        node_ids: &[runtime_domain::MemoryNodeId],
    ) -> Result<Vec<MemoryNode>, GraphKvError> {
        let collection = self.nodes_collection(world_id, scope);
        let paths: Vec<DocPath> = node_ids.iter().map(|id| collection.child(id.to_string())).collect();
        let docs = self.kv.get_all(&paths).await?;
        docs.into_iter()
            .flatten()
            .map(|v| serde_json::from_value(v).map_err(|e| GraphKvError::Serialization(e.to_string())))
            .collect()
    }

    /// `load_graph_v2`: loads the entire `(world, scope)` graph into memory.
    pub async fn load_graph_v2(&self, world_id: WorldId, scope: &GraphScope) -> Result<MemoryGraph, GraphKvError> {
        let node_docs = self.kv.list(&self.nodes_collection(world_id, scope)).await?;
        let edge_docs = self.kv.list(&self.edges_collection(world_id, scope)).await?;
        let mut graph = MemoryGraph::new();
        for doc in node_docs {
            let node: MemoryNode = serde_json::from_value(doc).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
            graph.upsert_node(node);
        }
        for doc in edge_docs {
            let edge: MemoryEdge = serde_json::from_value(doc).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
            let _ = graph.upsert_edge(edge);
        }
        Ok(graph)
    }

    /// `save_graph_v2(merge)`: writes an in-memory graph back. `merge`
    /// controls whether prior documents not present in `graph` survive;
    /// when `false`, the scope is cleared first.
    pub async fn save_graph_v2(&self, world_id: WorldId, scope: &GraphScope, graph: &MemoryGraph, merge: bool) -> Result<(), GraphKvError> {
        if !merge {
            self.clear(world_id, scope).await?;
        }
        let mut ops = Vec::new();
        for node in graph.nodes() {
            ops.push(WriteOp {
                path: self.nodes_collection(world_id, scope).child(node.id.to_string()),
                doc: serde_json::to_value(node).map_err(|e| GraphKvError::Serialization(e.to_string()))?,
                merge: true,
            });
            ops.extend(self.index_ops(world_id, scope, node));
        }
        for edge in graph.edges() {
            ops.push(WriteOp {
                path: self.edges_collection(world_id, scope).child(edge.id.to_string()),
                doc: serde_json::to_value(edge).map_err(|e| GraphKvError::Serialization(e.to_string()))?,
                merge: true,
            });
        }
        self.commit_in_chunks(ops).await
    }

    /// `load_local_subgraph(seeds, depth, direction)`: BFS-style local
    /// subgraph load, batching hop queries in chunks of
    /// [`HOP_CHUNK_SIZE`] seed/frontier ids per underlying query.
    pub async fn load_local_subgraph(
        &self,
        world_id: WorldId,
        scope: &GraphScope,
        seeds: &[runtime_domain::MemoryNodeId],
        depth: usize,
        direction: Direction,
    ) -> Result<MemoryGraph, GraphKvError> {
        use std::collections::{HashMap, HashSet};

        let edges_collection = self.edges_collection(world_id, scope);
        let mut visited: HashSet<String> = seeds.iter().map(|id| id.to_string()).collect();
        let mut frontier: HashSet<String> = visited.clone();
        let mut edges_by_id: HashMap<String, MemoryEdge> = HashMap::new();

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier: HashSet<String> = HashSet::new();
            let frontier_ids: Vec<String> = frontier.iter().cloned().collect();

            if matches!(direction, Direction::Out | Direction::Both) {
                for chunk in frontier_ids.chunks(HOP_CHUNK_SIZE) {
                    let query = KvQuery::field_in(edges_collection.clone(), "source", chunk.to_vec());
                    for doc in self.kv.stream(&query).await? {
                        let edge: MemoryEdge = serde_json::from_value(doc).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
                        next_frontier.insert(edge.target.to_string());
                        edges_by_id.insert(edge.id.to_string(), edge);
                    }
                }
            }
            if matches!(direction, Direction::In | Direction::Both) {
                for chunk in frontier_ids.chunks(HOP_CHUNK_SIZE) {
                    let query = KvQuery::field_in(edges_collection.clone(), "target", chunk.to_vec());
                    for doc in self.kv.stream(&query).await? {
                        let edge: MemoryEdge = serde_json::from_value(doc).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
                        next_frontier.insert(edge.source.to_string());
                        edges_by_id.insert(edge.id.to_string(), edge);
                    }
                }
            }

            next_frontier.retain(|id| !visited.contains(id));
            visited.extend(next_frontier.iter().cloned());
            frontier = next_frontier;
        }

        let node_ids: Vec<runtime_domain::MemoryNodeId> =
            visited.iter().filter_map(|s| s.parse::<uuid::Uuid>().ok().map(runtime_domain::MemoryNodeId::from_uuid)).collect();
        let nodes = self.get_nodes_by_ids(world_id, scope, &node_ids).await?;

        let mut graph = MemoryGraph::new();
        for node in nodes {
            graph.upsert_node(node);
        }
        for edge in edges_by_id.into_values() {
            let _ = graph.upsert_edge(edge);
        }
        Ok(graph)
    }

    /// `clear`: drops every node/edge and index entry in a scope.
    pub async fn clear(&self, world_id: WorldId, scope: &GraphScope) -> Result<(), GraphKvError> {
        for collection in [
            self.nodes_collection(world_id, scope),
            self.edges_collection(world_id, scope),
        ] {
            for doc in self.kv.list(&collection).await? {
                if let Some(id) = doc.get("id").and_then(Value::as_str) {
                    self.kv.delete(&collection.child(id)).await?;
                }
            }
        }
        self.clear_indexes(world_id, scope).await
    }

    async fn clear_indexes(&self, world_id: WorldId, scope: &GraphScope) -> Result<(), GraphKvError> {
        let base = self.base(world_id, scope);

        for doc in self.kv.list(&base.child("type_index")).await? {
            if let (Some(node_id), Some(node_type)) = (doc.get("node_id").and_then(Value::as_str), doc.get("type").and_then(Value::as_str)) {
                self.kv.delete(&self.type_index_collection(world_id, scope, node_type).child(node_id)).await?;
            }
        }
        for doc in self.kv.list(&base.child("name_index")).await? {
            if let (Some(node_id), Some(name_key)) = (doc.get("node_id").and_then(Value::as_str), doc.get("name_key").and_then(Value::as_str)) {
                self.kv.delete(&self.name_index_collection(world_id, scope, name_key).child(node_id)).await?;
            }
        }
        for doc in self.kv.list(&base.child("timeline")).await? {
            if let (Some(node_id), Some(day_key)) = (doc.get("node_id").and_then(Value::as_str), doc.get("day_key").and_then(Value::as_str)) {
                self.kv.delete(&self.timeline_collection(world_id, scope, day_key).child(node_id)).await?;
            }
        }
        Ok(())
    }

    /// `rebuild_indexes`: recomputes all three secondary indices from the
    /// `nodes` collection from scratch, batching writes at ≤450 ops.
    pub async fn rebuild_indexes(&self, world_id: WorldId, scope: &GraphScope) -> Result<usize, GraphKvError> {
        self.clear_indexes(world_id, scope).await?;
        let node_docs = self.kv.list(&self.nodes_collection(world_id, scope)).await?;
        let mut ops = Vec::new();
        let mut count = 0;
        for doc in node_docs {
            let node: MemoryNode = serde_json::from_value(doc).map_err(|e| GraphKvError::Serialization(e.to_string()))?;
            ops.extend(self.index_ops(world_id, scope, &node));
            count += 1;
        }
        self.commit_in_chunks(ops).await?;
        Ok(count)
    }
}

fn sanitize_index_key(value: &str) -> String {
    value.replace('/', "_").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryGraphKv;
    use chrono::Utc;

    fn store() -> PersistedGraphStore {
        PersistedGraphStore::new(Arc::new(InMemoryGraphKv::new()))
    }

    #[tokio::test]
    async fn upsert_then_get_node_round_trips() {
        let store = store();
        let world_id = WorldId::new();
        let scope = GraphScope::World;
        let node = MemoryNode::new("person", "Elder Rowan", Utc::now());
        store.upsert_node_v2(world_id, &scope, &node).await.unwrap();

        let loaded = store.get_node(world_id, &scope, node.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Elder Rowan");
    }

    #[tokio::test]
    async fn save_then_load_graph_v2_round_trips() {
        let store = store();
        let world_id = WorldId::new();
        let scope = GraphScope::World;
        let mut graph = MemoryGraph::new();
        let a = MemoryNode::new("person", "A", Utc::now());
        let b = MemoryNode::new("person", "B", Utc::now());
        let (a_id, b_id) = (a.id, b.id);
        graph.upsert_node(a);
        graph.upsert_node(b);
        graph
            .upsert_edge(MemoryEdge {
                id: runtime_domain::MemoryEdgeId::new(),
                source: a_id,
                target: b_id,
                relation: "knows".to_string(),
                weight: 1.0,
                properties: Value::Null,
                created_at: Utc::now(),
            })
            .unwrap();

        store.save_graph_v2(world_id, &scope, &graph, true).await.unwrap();
        let loaded = store.load_graph_v2(world_id, &scope).await.unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
    }

    #[tokio::test]
    async fn load_local_subgraph_follows_one_hop() {
        let store = store();
        let world_id = WorldId::new();
        let scope = GraphScope::World;
        let mut graph = MemoryGraph::new();
        let a = MemoryNode::new("person", "A", Utc::now());
        let b = MemoryNode::new("person", "B", Utc::now());
        let c = MemoryNode::new("person", "C", Utc::now());
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        graph.upsert_node(a);
        graph.upsert_node(b);
        graph.upsert_node(c);
        graph
            .upsert_edge(MemoryEdge {
                id: runtime_domain::MemoryEdgeId::new(),
                source: a_id,
                target: b_id,
                relation: "knows".to_string(),
                weight: 1.0,
                properties: Value::Null,
                created_at: Utc::now(),
            })
            .unwrap();
        graph
            .upsert_edge(MemoryEdge {
                id: runtime_domain::MemoryEdgeId::new(),
                source: b_id,
                target: c_id,
                relation: "knows".to_string(),
                weight: 1.0,
                properties: Value::Null,
                created_at: Utc::now(),
            })
            .unwrap();
        store.save_graph_v2(world_id, &scope, &graph, true).await.unwrap();

        let sub = store.load_local_subgraph(world_id, &scope, &[a_id], 1, Direction::Out).await.unwrap();
        assert_eq!(sub.node_count(), 2);
        assert!(!sub.has_node(c_id));
    }

    #[tokio::test]
    async fn clear_removes_nodes_and_edges() {
        let store = store();
        let world_id = WorldId::new();
        let scope = GraphScope::World;
        let node = MemoryNode::new("person", "A", Utc::now());
        store.upsert_node_v2(world_id, &scope, &node).await.unwrap();
        store.clear(world_id, &scope).await.unwrap();

        assert!(store.get_node(world_id, &scope, node.id).await.unwrap().is_none());
    }
}
