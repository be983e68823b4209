//! World runtime tools (§4.4): `navigate`, `enter_sublocation`,
//! `update_time`, and the per-session event-def registry + behavior tick.

use std::collections::{HashMap, HashSet};

use runtime_domain::{AreaId, EventId};

use crate::session::GameState;

use super::event_def::{self, CompletionEffects, EventDef, WorldEventError};
use super::map::{SubLocationKind, WorldMap};

const SHOP_OPEN_HOUR: u32 = 8;
const SHOP_CLOSE_HOUR: u32 = 20;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NavigateError {
    #[error("unknown destination: {0}")]
    UnknownDestination(String),
    #[error("destination is not available in the current chapter")]
    ChapterGated,
    #[error("no connection from the current area; available: {available:?}")]
    NoConnection { available: Vec<String> },
}

#[derive(Debug, Clone, Copy)]
pub struct NavigateOutcome {
    pub area_id: AreaId,
    pub travel_minutes: u32,
}

/// Resolve `destination` to an area id by (i) id match, (ii) connection
/// name from the current area, (iii) global area-name match — then reject
/// if it's outside the chapter's `available_maps` or unreachable, else
/// advance time and relocate the player (§4.4 `navigate`).
pub fn navigate(
    map: &WorldMap,
    state: &mut GameState,
    visited: &mut HashSet<AreaId>,
    destination: &str,
) -> Result<NavigateOutcome, NavigateError> {
    let current = map.area(state.area_id);

    let resolved = uuid::Uuid::parse_str(destination)
        .ok()
        .map(AreaId::from_uuid)
        .filter(|id| map.areas.contains_key(id))
        .or_else(|| {
            current.and_then(|area| {
                area.connections
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(destination))
                    .map(|c| c.target)
            })
        })
        .or_else(|| {
            map.areas
                .values()
                .find(|area| area.name.eq_ignore_ascii_case(destination))
                .map(|area| area.id)
        })
        .ok_or_else(|| NavigateError::UnknownDestination(destination.to_string()))?;

    let chapter = map.chapter(state.chapter_id);
    if !chapter.map(|c| c.available_maps.contains(&resolved)).unwrap_or(false) {
        return Err(NavigateError::ChapterGated);
    }

    let current = current.ok_or_else(|| NavigateError::UnknownDestination(destination.to_string()))?;
    let connection = current
        .connections
        .iter()
        .find(|c| c.target == resolved)
        .ok_or_else(|| NavigateError::NoConnection {
            available: current.connections.iter().map(|c| c.name.clone()).collect(),
        })?;

    let travel_minutes = state.game_time.advance(connection.travel_minutes_literal);

    state.area_id = resolved;
    if let Some(area) = map.area(resolved) {
        state.player_location = area.name.clone();
    }
    state.sub_location = None;
    visited.insert(resolved);

    Ok(NavigateOutcome {
        area_id: resolved,
        travel_minutes,
    })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EnterSubLocationError {
    #[error("no such sub-location here: {0}")]
    NotFound(String),
    #[error("shop is closed at this hour")]
    ShopClosed,
}

/// `enter_sublocation(id_or_name)` (§4.4): gate shop-kind sub-locations to
/// operating hours 08:00-20:00.
pub fn enter_sublocation(map: &WorldMap, state: &mut GameState, id_or_name: &str) -> Result<(), EnterSubLocationError> {
    let area = map
        .area(state.area_id)
        .ok_or_else(|| EnterSubLocationError::NotFound(id_or_name.to_string()))?;
    let sub = area
        .sub_locations
        .iter()
        .find(|s| s.id == id_or_name || s.name.eq_ignore_ascii_case(id_or_name))
        .ok_or_else(|| EnterSubLocationError::NotFound(id_or_name.to_string()))?;

    if sub.kind == SubLocationKind::Shop {
        let hour = state.game_time.hour;
        if !(SHOP_OPEN_HOUR..SHOP_CLOSE_HOUR).contains(&hour) {
            return Err(EnterSubLocationError::ShopClosed);
        }
    }

    state.sub_location = Some(sub.id.clone());
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpdateTimeError {
    #[error("cannot advance time during combat")]
    InCombat,
}

/// `update_time(minutes)` (§4.4): refused while the session has a live
/// combat id; otherwise delegates bucket-snapping to [`GameClock::advance`].
pub fn update_time(state: &mut GameState, minutes: u32) -> Result<u32, UpdateTimeError> {
    if state.combat_id.is_some() {
        return Err(UpdateTimeError::InCombat);
    }
    Ok(state.game_time.advance(minutes))
}

/// Per-session registry of event-def nodes plus the round counter the
/// behavior-engine tick advances (§4.4 step 5).
#[derive(Debug, Clone, Default)]
pub struct WorldRuntimeState {
    pub events: HashMap<EventId, EventDef>,
    pub round: u64,
}

impl WorldRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: EventDef) {
        self.events.insert(event.id, event);
    }

    pub fn activate_event(&mut self, id: EventId, trigger_satisfied: bool) -> Result<(), WorldEventError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(WorldEventError::NotAvailable(super::event_def::EventDefStatus::Locked))?;
        event_def::activate(event, self.round, trigger_satisfied)
    }

    pub fn complete_event(
        &mut self,
        id: EventId,
        outcome_key: Option<&str>,
        outcome_conditions_met: impl Fn(&serde_json::Value) -> bool,
    ) -> Result<CompletionEffects, WorldEventError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(WorldEventError::NotActive(super::event_def::EventDefStatus::Locked))?;
        let effects = event_def::complete(event, outcome_key, outcome_conditions_met)?;
        for &unlocked in &effects.unlock_events {
            if let Some(unlocked_event) = self.events.get_mut(&unlocked) {
                if unlocked_event.status == super::event_def::EventDefStatus::Locked {
                    unlocked_event.status = super::event_def::EventDefStatus::Available;
                }
            }
        }
        Ok(effects)
    }

    pub fn fail_event(&mut self, id: EventId, reason: Option<String>) -> Result<(), WorldEventError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(WorldEventError::NotActive(super::event_def::EventDefStatus::Locked))?;
        event_def::fail(event, reason, self.round)
    }

    /// Advance the round counter and tick every event-def's cooldown
    /// transition (§4.4 step 5).
    pub fn tick(&mut self) {
        self.round += 1;
        for event in self.events.values_mut() {
            event_def::tick(event, self.round);
        }
    }
}
