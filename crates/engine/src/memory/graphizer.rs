//! Memory graphizer (§4.2.5): turns a selected span of context-window
//! messages into one `event_group` node, its `event` sub-nodes, any new
//! entities, and a fixed set of anchor edges — falling back to a minimal
//! stub event_group if the external extractor fails.

use chrono::{DateTime, Utc};
use runtime_domain::MemoryNodeId;
use serde_json::json;

use crate::ports::ExtractorPort;

use super::context_window::ContextWindow;
use super::graph::{MemoryEdge, MemoryGraph, MemoryNode};

const EVENT_GROUP_TYPE: &str = "event_group";
const EVENT_TYPE: &str = "event";
const PARTICIPATED: &str = "participated";
const LOCATED_IN: &str = "located_in";

/// What one `graphize` call produced.
#[derive(Debug, Clone)]
pub struct GraphizeOutcome {
    pub event_group_id: MemoryNodeId,
    pub sub_event_ids: Vec<MemoryNodeId>,
    pub new_node_ids: Vec<MemoryNodeId>,
    pub extractor_failed: bool,
    pub messages_removed: usize,
}

/// Select the graphization candidate span from `window`, ask `extractor`
/// for structure, write the result (or a fallback) into `graph` under the
/// owner's scope, then mark and remove the span from `window`. No-op
/// (returns `None`) if nothing qualifies for graphization.
pub async fn graphize(
    graph: &mut MemoryGraph,
    window: &mut ContextWindow,
    extractor: &dyn ExtractorPort,
    owner: MemoryNodeId,
    player: MemoryNodeId,
    location: Option<MemoryNodeId>,
    now: DateTime<Utc>,
) -> Option<GraphizeOutcome> {
    let candidate_ids = window.select_messages_for_graphize();
    if candidate_ids.is_empty() {
        return None;
    }

    let candidates: Vec<_> = window
        .messages()
        .iter()
        .filter(|m| candidate_ids.contains(&m.id))
        .cloned()
        .collect();
    let transcript: String = candidates
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let outcome = match extractor.extract(&transcript).await {
        Ok(extraction) => {
            let mut new_node_ids = Vec::new();

            let mut event_group = MemoryNode::new(EVENT_GROUP_TYPE, format!("event_group-{}", candidate_ids[0]), now);
            event_group.properties = json!({
                "transcript": transcript,
                "summary": extraction.summary,
                "emotion": extraction.emotion,
                "location": extraction.location,
                "participants": extraction.participants,
            });
            let event_group_id = event_group.id;
            graph.upsert_node(event_group);

            let mut sub_event_ids = Vec::new();
            for sub_event in &extraction.sub_events {
                let mut node = MemoryNode::new(EVENT_TYPE, format!("event-{}-{}", event_group_id, sub_event.start_idx), now);
                node.properties = json!({
                    "summary": sub_event.summary,
                    "transcript_range": { "start_idx": sub_event.start_idx, "end_idx": sub_event.end_idx },
                });
                let id = node.id;
                graph.upsert_node(node);
                sub_event_ids.push(id);
                new_node_ids.push(id);
            }

            for new_node in &extraction.new_nodes {
                let mut node = MemoryNode::new(new_node.node_type.clone(), new_node.name.clone(), now);
                node.properties = new_node.properties.clone();
                let id = node.id;
                graph.upsert_node(node);
                new_node_ids.push(id);
            }

            anchor_edges(graph, event_group_id, owner, player, location, &extraction.participants, now);

            for edge in &extraction.edges {
                let source = graph
                    .nodes()
                    .find(|n| n.name.eq_ignore_ascii_case(&edge.source_name))
                    .map(|n| n.id);
                let target = graph
                    .nodes()
                    .find(|n| n.name.eq_ignore_ascii_case(&edge.target_name))
                    .map(|n| n.id);
                if let (Some(source), Some(target)) = (source, target) {
                    let _ = graph.upsert_edge(MemoryEdge {
                        id: runtime_domain::MemoryEdgeId::new(),
                        source,
                        target,
                        relation: edge.relation.clone(),
                        weight: edge.weight,
                        properties: json!({}),
                        created_at: now,
                    });
                }
            }

            GraphizeOutcome {
                event_group_id,
                sub_event_ids,
                new_node_ids,
                extractor_failed: false,
                messages_removed: 0,
            }
        }
        Err(_) => {
            let mut event_group = MemoryNode::new(EVENT_GROUP_TYPE, format!("event_group-fallback-{}", candidate_ids[0]), now);
            event_group.properties = json!({
                "transcript": transcript,
                "summary": "(extraction failed; unsummarized span)",
            });
            let event_group_id = event_group.id;
            graph.upsert_node(event_group);
            anchor_edges(graph, event_group_id, owner, player, location, &[], now);

            GraphizeOutcome {
                event_group_id,
                sub_event_ids: Vec::new(),
                new_node_ids: Vec::new(),
                extractor_failed: true,
                messages_removed: 0,
            }
        }
    };

    window.mark_messages_graphized(&candidate_ids, now);
    let removal = window.remove_graphized_messages();

    Some(GraphizeOutcome {
        messages_removed: removal.removed_count,
        ..outcome
    })
}

fn anchor_edges(
    graph: &mut MemoryGraph,
    event_group_id: MemoryNodeId,
    owner: MemoryNodeId,
    player: MemoryNodeId,
    location: Option<MemoryNodeId>,
    participant_names: &[String],
    now: DateTime<Utc>,
) {
    let mut link = |target: MemoryNodeId, relation: &str| {
        let _ = graph.upsert_edge(MemoryEdge {
            id: runtime_domain::MemoryEdgeId::new(),
            source: event_group_id,
            target,
            relation: relation.to_string(),
            weight: 1.0,
            properties: json!({}),
            created_at: now,
        });
    };

    link(owner, PARTICIPATED);
    if player != owner {
        link(player, PARTICIPATED);
    }
    for name in participant_names {
        if let Some(node) = graph.nodes().find(|n| n.name.eq_ignore_ascii_case(name)).map(|n| n.id) {
            if node != owner && node != player {
                link(node, PARTICIPATED);
            }
        }
    }
    if let Some(location) = location {
        link(location, LOCATED_IN);
    }
}
