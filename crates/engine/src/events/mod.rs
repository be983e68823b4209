//! Event Dispatch (§4.3, §6.4): world-scope event recording, perspective
//! fan-out to recipient character scopes, and the in-process event bus.

pub mod bus;
pub mod dispatch;

pub use bus::{EventBus, EventHandler};
pub use dispatch::{
    EventDispatchError, EventVisibility, GraphSchemaOptions, IngestOptions, IngestOutcome,
    NarrativeEvent, ingest_event,
};
