//! Memory Core (§4.2): the in-memory graph, spreading activation, the
//! per-NPC context window, the graphizer that bridges them, and the LRU
//! instance pool that owns per-NPC state.

pub mod activation;
pub mod context_window;
pub mod graph;
pub mod graph_store;
pub mod graphizer;
pub mod instance_pool;

pub use activation::{extract_subgraph, find_paths, spread_activation, SpreadingActivationConfig};
pub use context_window::{count_tokens, ContextWindow, GraphizationRemoval, MessageRole, WindowMessage};
pub use graph::{Direction, GraphScope, MemoryEdge, MemoryGraph, MemoryGraphError, MemoryNode, ScopedGraphs};
pub use graph_store::PersistedGraphStore;
pub use graphizer::{graphize, GraphizeOutcome};
pub use instance_pool::{InstanceKey, InstancePool};
