//! Per-session game state and its append-only delta log (§3.8).

use chrono::{DateTime, Utc};
use runtime_domain::{AreaId, ChapterId, CombatId, CharacterId, GameClock, SessionId, StateDeltaId, WorldId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Narration,
    Dialogue,
    Combat,
}

impl Default for ChatMode {
    fn default() -> Self {
        ChatMode::Narration
    }
}

/// `{world_id, session_id, player_location, area_id, chapter_id,
/// sub_location, game_time, active_dialogue_npc?, combat_id?, chat_mode,
/// metadata}` (§3.8). `player_location` is the free-text display name of
/// where the player stands; `area_id` is the canonical address navigation
/// and gating logic operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub world_id: WorldId,
    pub session_id: SessionId,
    pub player_location: String,
    pub area_id: AreaId,
    pub chapter_id: ChapterId,
    pub sub_location: Option<String>,
    pub game_time: GameClock,
    pub active_dialogue_npc: Option<CharacterId>,
    pub combat_id: Option<CombatId>,
    pub chat_mode: ChatMode,
    pub metadata: Value,
}

impl GameState {
    /// `start_session` (§4.4): place the player at the given starting area,
    /// game time defaulting to day 1, 08:00 unless `initial_time` is given.
    pub fn start(
        world_id: WorldId,
        session_id: SessionId,
        chapter_id: ChapterId,
        starting_area: AreaId,
        starting_area_name: impl Into<String>,
        initial_time: Option<GameClock>,
    ) -> Self {
        Self {
            world_id,
            session_id,
            player_location: starting_area_name.into(),
            area_id: starting_area,
            chapter_id,
            sub_location: None,
            game_time: initial_time.unwrap_or_default(),
            active_dialogue_npc: None,
            combat_id: None,
            chat_mode: ChatMode::Narration,
            metadata: Value::Object(Default::default()),
        }
    }
}

/// `{delta_id, timestamp, operation, changes}` (§3.8). Deltas are
/// append-only per session; repeated application is NOT idempotent by
/// design — each application appends another log entry (§8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub delta_id: StateDeltaId,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub changes: Value,
}

impl StateDelta {
    pub fn new(operation: impl Into<String>, changes: Value, now: DateTime<Utc>) -> Self {
        Self {
            delta_id: StateDeltaId::new(),
            timestamp: now,
            operation: operation.into(),
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_session_defaults_to_day_one_eight_am() {
        let state = GameState::start(
            WorldId::new(),
            SessionId::new(),
            ChapterId::new(),
            AreaId::new(),
            "Town Square",
            None,
        );
        assert_eq!(state.game_time.day, 1);
        assert_eq!(state.game_time.hour, 8);
        assert_eq!(state.chat_mode, ChatMode::Narration);
        assert!(state.combat_id.is_none());
    }
}
