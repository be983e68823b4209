extern crate self as runtime_domain;

pub mod dice;
pub mod disposition;
pub mod error;
pub mod game_clock;
pub mod ids;

pub use dice::{DiceFormula, DiceParseError, DiceRng, DiceRollResult, FixedRollSequence, SeededDiceRng};
pub use disposition::{Disposition, DispositionDelta, DispositionDimension, DispositionHistoryEntry};
pub use error::DomainError;
pub use game_clock::{DayPeriod, GameClock};
pub use ids::{
    AreaId, ChapterId, CharacterId, CombatId, CombatantId, EventDefId, EventId, MemoryEdgeId,
    MemoryNodeId, SessionId, StateDeltaId, ToolCallId, WorldId,
};
