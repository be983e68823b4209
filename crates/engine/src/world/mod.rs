//! World Runtime (§2.12, §4.4): static geography, the event-def state
//! machine, and the `navigate`/`enter_sublocation`/`update_time` tools.

pub mod event_def;
pub mod map;
pub mod runtime;

pub use event_def::{CompletionEffects, EventDef, EventDefStatus, EventOutcome, WorldEventError};
pub use map::{Area, AreaConnection, Chapter, DangerLevel, SubLocation, SubLocationKind, WorldMap};
pub use runtime::{
    enter_sublocation, navigate, update_time, EnterSubLocationError, NavigateError, NavigateOutcome,
    UpdateTimeError, WorldRuntimeState,
};
