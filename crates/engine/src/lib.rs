//! Turn orchestration, combat resolution, memory, and event dispatch for
//! the narrative runtime.

pub mod admin;
pub mod combat;
pub mod events;
pub mod memory;
pub mod ports;
pub mod session;
pub mod world;
