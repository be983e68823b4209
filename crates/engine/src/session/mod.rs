//! Session State (§3.8, §5): the append-only `GameState`/`StateDelta` log
//! and the per-session locking store built on top of it.

pub mod state;
pub mod store;

pub use state::{ChatMode, GameState, StateDelta};
pub use store::SessionStore;
