//! Persistence port (§6.1): an abstract, hierarchical key-value document
//! store. The engine never talks to a concrete database directly — it only
//! ever talks through [`GraphKvPort`], same as the teacher's `*Repo` traits
//! talk through `RepoError` instead of a driver-specific error type.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::error::GraphKvError;

/// A slash-joined path into the document store, e.g.
/// `worlds/{world}/graphs/{scope}/nodes/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let joined = segments
            .into_iter()
            .map(Into::into)
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends one segment, e.g. a collection path plus a document id.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        Self(format!("{}/{}", self.0, segment.into()))
    }

    fn is_under(&self, collection: &DocPath) -> bool {
        self.0
            .strip_prefix(collection.0.as_str())
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A query against one collection, filtering on a single field's membership
/// in a set of values (the Rust analogue of Firestore's
/// `.where(field, "in", chunk)`, used by the Graph Store's hop traversal).
#[derive(Debug, Clone)]
pub struct KvQuery {
    pub collection: DocPath,
    pub field_in: Option<(String, Vec<String>)>,
}

impl KvQuery {
    pub fn all(collection: DocPath) -> Self {
        Self {
            collection,
            field_in: None,
        }
    }

    pub fn field_in(collection: DocPath, field: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            collection,
            field_in: Some((field.into(), values)),
        }
    }
}

/// Required operations over the abstract document store (§6.1). The engine
/// does not require transactions beyond single-document merge.
#[async_trait]
pub trait GraphKvPort: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, GraphKvError>;
    async fn set(&self, path: &DocPath, doc: Value, merge: bool) -> Result<(), GraphKvError>;
    async fn list(&self, collection_path: &DocPath) -> Result<Vec<Value>, GraphKvError>;
    async fn delete(&self, path: &DocPath) -> Result<(), GraphKvError>;
    async fn get_all(&self, paths: &[DocPath]) -> Result<Vec<Option<Value>>, GraphKvError>;
    /// Streams the documents of a collection matching `query`, optionally
    /// filtered by one field's membership in a value set (§6.1). The Graph
    /// Store's `load_local_subgraph` uses this for its chunked
    /// `where source/target in (...)` hop queries.
    async fn stream(&self, query: &KvQuery) -> Result<Vec<Value>, GraphKvError>;
}

fn merge_json(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, incoming_value) => *base_slot = incoming_value,
    }
}

/// In-memory document store: the engine's own default in the absence of a
/// wired persistence backend (persistence itself is an external collaborator
/// per §1).
#[derive(Debug, Default)]
pub struct InMemoryGraphKv {
    docs: Mutex<BTreeMap<DocPath, Value>>,
}

impl InMemoryGraphKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphKvPort for InMemoryGraphKv {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, GraphKvError> {
        let docs = self.docs.lock().expect("graph kv lock poisoned");
        Ok(docs.get(path).cloned())
    }

    async fn set(&self, path: &DocPath, doc: Value, merge: bool) -> Result<(), GraphKvError> {
        let mut docs = self.docs.lock().expect("graph kv lock poisoned");
        if merge {
            if let Some(existing) = docs.get_mut(path) {
                merge_json(existing, doc);
                return Ok(());
            }
        }
        docs.insert(path.clone(), doc);
        Ok(())
    }

    async fn list(&self, collection_path: &DocPath) -> Result<Vec<Value>, GraphKvError> {
        let docs = self.docs.lock().expect("graph kv lock poisoned");
        Ok(docs
            .iter()
            .filter(|(path, _)| path.is_under(collection_path))
            .map(|(_, value)| value.clone())
            .collect())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), GraphKvError> {
        let mut docs = self.docs.lock().expect("graph kv lock poisoned");
        docs.remove(path);
        Ok(())
    }

    async fn get_all(&self, paths: &[DocPath]) -> Result<Vec<Option<Value>>, GraphKvError> {
        let docs = self.docs.lock().expect("graph kv lock poisoned");
        Ok(paths.iter().map(|path| docs.get(path).cloned()).collect())
    }

    async fn stream(&self, query: &KvQuery) -> Result<Vec<Value>, GraphKvError> {
        let docs = self.docs.lock().expect("graph kv lock poisoned");
        Ok(docs
            .iter()
            .filter(|(path, _)| path.is_under(&query.collection))
            .filter(|(_, value)| match &query.field_in {
                None => true,
                Some((field, values)) => value
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|v| values.iter().any(|candidate| candidate == v))
                    .unwrap_or(false),
            })
            .map(|(_, value)| value.clone())
            .collect())
    }
}
