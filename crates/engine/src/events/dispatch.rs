//! Event ingestion and perspective fan-out (§4.3).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use runtime_domain::{CharacterId, EventId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::memory::{GraphScope, MemoryEdge, MemoryGraph, MemoryNode, ScopedGraphs};

use super::bus::EventBus;

const PERSON_TYPE: &str = "person";
const EVENT_TYPE: &str = "event";
const PARTICIPATED: &str = "participated";
const WITNESSED: &str = "witnessed";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventVisibility {
    pub public: bool,
    pub known_to: Vec<CharacterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEvent {
    pub id: EventId,
    pub event_type: String,
    pub participants: Vec<CharacterId>,
    pub witnesses: Vec<CharacterId>,
    pub location: Option<runtime_domain::AreaId>,
    pub visibility: EventVisibility,
    pub properties: Value,
}

/// Recognized node types / relations; `strict` mode rejects anything else
/// (§4.3 step 3, §7 validation).
#[derive(Debug, Clone)]
pub struct GraphSchemaOptions {
    pub known_node_types: HashSet<String>,
    pub known_relations: HashSet<String>,
}

impl Default for GraphSchemaOptions {
    fn default() -> Self {
        Self {
            known_node_types: [PERSON_TYPE, EVENT_TYPE].into_iter().map(String::from).collect(),
            known_relations: [PARTICIPATED, WITNESSED].into_iter().map(String::from).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Overrides the auto-computed recipient set when present.
    pub recipients: Option<Vec<CharacterId>>,
    pub strict: bool,
    pub validate: bool,
    pub distribute: bool,
    pub default_dispatch: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            recipients: None,
            strict: false,
            validate: true,
            distribute: true,
            default_dispatch: true,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EventDispatchError {
    #[error("unknown node type in strict mode: {0}")]
    UnknownNodeType(String),
    #[error("unknown relation in strict mode: {0}")]
    UnknownRelation(String),
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub event_node_id: runtime_domain::MemoryNodeId,
    pub recipients: Vec<CharacterId>,
}

/// `ingest_event` (§4.3): ensure the event + participant/witness nodes and
/// edges exist in world scope, validate, upsert, publish to the bus, then
/// (if `distribute`) fan the same node/edge set out into each recipient's
/// character scope.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_event(
    graphs: &mut ScopedGraphs,
    bus: &EventBus,
    schema: &GraphSchemaOptions,
    event: NarrativeEvent,
    options: IngestOptions,
    known_characters: &[CharacterId],
    characters_at_location: &[CharacterId],
    now: DateTime<Utc>,
) -> Result<IngestOutcome, EventDispatchError> {
    if options.validate {
        validate(schema, &event, options.strict)?;
    }

    let world = graphs.scope_mut(GraphScope::World);
    let event_node_id = ensure_event_node(world, &event, now);

    let mut participant_edges = Vec::new();
    for &participant in &event.participants {
        let person_id = ensure_person_node(world, participant, now);
        participant_edges.push((person_id, PARTICIPATED));
    }
    for &witness in &event.witnesses {
        let person_id = ensure_person_node(world, witness, now);
        participant_edges.push((person_id, WITNESSED));
    }
    for (person_id, relation) in &participant_edges {
        let _ = world.upsert_edge(MemoryEdge {
            id: runtime_domain::MemoryEdgeId::new(),
            source: *person_id,
            target: event_node_id,
            relation: relation.to_string(),
            weight: 1.0,
            properties: json!({}),
            created_at: now,
        });
    }

    bus.publish(&event).await;

    let mut recipients = Vec::new();
    if options.distribute {
        recipients = options
            .recipients
            .clone()
            .unwrap_or_else(|| compute_recipients(&event, known_characters, characters_at_location));

        if options.default_dispatch {
            for &recipient in &recipients {
                dispatch_to_character_scope(graphs, recipient, &event, now);
            }
        }
    }

    Ok(IngestOutcome {
        event_node_id,
        recipients,
    })
}

fn validate(schema: &GraphSchemaOptions, event: &NarrativeEvent, strict: bool) -> Result<(), EventDispatchError> {
    if !schema.known_node_types.contains(EVENT_TYPE) && strict {
        return Err(EventDispatchError::UnknownNodeType(EVENT_TYPE.to_string()));
    }
    if !schema.known_relations.contains(PARTICIPATED) && strict && !event.participants.is_empty() {
        return Err(EventDispatchError::UnknownRelation(PARTICIPATED.to_string()));
    }
    if !schema.known_relations.contains(WITNESSED) && strict && !event.witnesses.is_empty() {
        return Err(EventDispatchError::UnknownRelation(WITNESSED.to_string()));
    }
    Ok(())
}

fn ensure_event_node(graph: &mut MemoryGraph, event: &NarrativeEvent, now: DateTime<Utc>) -> runtime_domain::MemoryNodeId {
    let key = event.id.to_string();
    if let Some(existing) = graph.find_by_name(EVENT_TYPE, &key) {
        return existing.id;
    }
    let mut node = MemoryNode::new(EVENT_TYPE, key, now);
    node.properties = json!({
        "eventType": event.event_type,
        "properties": event.properties,
    });
    let id = node.id;
    graph.upsert_node(node);
    id
}

fn ensure_person_node(graph: &mut MemoryGraph, character_id: CharacterId, now: DateTime<Utc>) -> runtime_domain::MemoryNodeId {
    let key = character_id.to_string();
    if let Some(existing) = graph.find_by_name(PERSON_TYPE, &key) {
        return existing.id;
    }
    let mut node = MemoryNode::new(PERSON_TYPE, key, now);
    node.properties = json!({ "characterId": character_id });
    let id = node.id;
    graph.upsert_node(node);
    id
}

fn compute_recipients(
    event: &NarrativeEvent,
    known_characters: &[CharacterId],
    characters_at_location: &[CharacterId],
) -> Vec<CharacterId> {
    let mut set: HashSet<CharacterId> = HashSet::new();
    set.extend(event.participants.iter().copied());
    set.extend(event.witnesses.iter().copied());
    set.extend(event.visibility.known_to.iter().copied());
    if event.visibility.public {
        set.extend(known_characters.iter().copied());
    }
    set.extend(characters_at_location.iter().copied());
    set.into_iter().collect()
}

fn dispatch_to_character_scope(graphs: &mut ScopedGraphs, recipient: CharacterId, event: &NarrativeEvent, now: DateTime<Utc>) {
    let scope = GraphScope::Character(recipient);
    let character_graph = graphs.scope_mut(scope);
    let event_node_id = {
        let key = event.id.to_string();
        if let Some(existing) = character_graph.find_by_name(EVENT_TYPE, &key) {
            existing.id
        } else {
            let mut node = MemoryNode::new(EVENT_TYPE, key, now);
            node.properties = json!({
                "eventType": event.event_type,
                "properties": event.properties,
                "perspective": "gm_dispatch",
            });
            let id = node.id;
            character_graph.upsert_node(node);
            id
        }
    };

    for &participant in event.participants.iter().chain(event.witnesses.iter()) {
        let relation = if event.participants.contains(&participant) {
            PARTICIPATED
        } else {
            WITNESSED
        };
        let person_id = ensure_person_node(character_graph, participant, now);
        let _ = character_graph.upsert_edge(MemoryEdge {
            id: runtime_domain::MemoryEdgeId::new(),
            source: person_id,
            target: event_node_id,
            relation: relation.to_string(),
            weight: 1.0,
            properties: json!({}),
            created_at: now,
        });
    }
}
