//! Port traits for infrastructure boundaries — the ONLY abstractions in
//! this crate. Everything else (combat, memory, event dispatch, the
//! orchestrator) is concrete types built on top of these.

mod clock;
mod error;
mod external;
mod graph_kv;

#[cfg(test)]
pub mod testing;

pub use clock::{ClockPort, FixedClock, SystemClock};
pub use error::{ExtractorError, GraphKvError, ImageGenError, NarratorError, PlannerError};
pub use external::{
    AnalysisPlan, ExtractedEdge, ExtractedNode, ExtractedSubEvent, ExtractionResult, ExtractorPort,
    ImageResult, ImageGenPort, NarratorPort, PlannedOperation, PlannerPort,
};
pub use graph_kv::{DocPath, GraphKvPort, InMemoryGraphKv, KvQuery};

#[cfg(test)]
pub use clock::MockClockPort;
