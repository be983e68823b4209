//! Static world geography: chapters, areas, connections, and
//! sub-locations (§4.4 `navigate`/`enter_sublocation`).

use std::collections::{HashMap, HashSet};

use runtime_domain::{AreaId, ChapterId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubLocationKind {
    Shop,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLocation {
    pub id: String,
    pub name: String,
    pub kind: SubLocationKind,
}

/// A `CONNECTS` edge out of an area, carrying a travel-time literal that
/// `navigate` normalizes through [`runtime_domain::GameClock::advance`]'s
/// own bucket snapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaConnection {
    pub target: AreaId,
    pub name: String,
    pub travel_minutes_literal: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: AreaId,
    pub name: String,
    pub danger: DangerLevel,
    pub connections: Vec<AreaConnection>,
    pub sub_locations: Vec<SubLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub available_maps: HashSet<AreaId>,
}

#[derive(Debug, Clone, Default)]
pub struct WorldMap {
    pub chapters: HashMap<ChapterId, Chapter>,
    pub areas: HashMap<AreaId, Area>,
}

impl WorldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(&id)
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.get(&id)
    }

    /// `start_session` (§4.4): the first chapter-available area with low
    /// danger, else simply the first available area.
    pub fn first_safe_area(&self, chapter_id: ChapterId) -> Option<AreaId> {
        let chapter = self.chapter(chapter_id)?;
        chapter
            .available_maps
            .iter()
            .filter_map(|id| self.areas.get(id))
            .find(|area| area.danger == DangerLevel::Low)
            .map(|area| area.id)
            .or_else(|| chapter.available_maps.iter().copied().next())
    }
}
