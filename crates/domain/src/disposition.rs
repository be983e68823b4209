//! NPC disposition tracking (§4.4 `update_disposition` tool, §3.9 scope).
//!
//! Four independent dimensions track how an NPC feels about a player:
//! approval and trust can run negative, fear and romance are non-negative.
//! Each update is clamped per-delta and per-final-value, and the last 50
//! change reasons are kept for narration/audit.

use serde::{Deserialize, Serialize};

const HISTORY_LIMIT: usize = 50;
const DELTA_CLAMP: i32 = 20;

/// The four disposition dimensions an `update_disposition` call may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionDimension {
    Approval,
    Trust,
    Fear,
    Romance,
}

impl DispositionDimension {
    /// Valid final-value range for this dimension.
    pub fn range(&self) -> (i32, i32) {
        match self {
            DispositionDimension::Approval => (-100, 100),
            DispositionDimension::Trust => (-100, 100),
            DispositionDimension::Fear => (0, 100),
            DispositionDimension::Romance => (0, 100),
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "approval" => Some(Self::Approval),
            "trust" => Some(Self::Trust),
            "fear" => Some(Self::Fear),
            "romance" => Some(Self::Romance),
            _ => None,
        }
    }
}

/// A single requested delta, prior to clamping.
#[derive(Debug, Clone, Copy)]
pub struct DispositionDelta {
    pub dimension: DispositionDimension,
    pub delta: i32,
}

/// One entry in an NPC's disposition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispositionHistoryEntry {
    pub reason: String,
    pub day: u32,
    pub deltas: Vec<(DispositionDimension, i32)>,
}

/// Complete disposition state for one NPC toward the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    approval: i32,
    trust: i32,
    fear: i32,
    romance: i32,
    history: Vec<DispositionHistoryEntry>,
}

impl Default for Disposition {
    fn default() -> Self {
        Self {
            approval: 0,
            trust: 0,
            fear: 0,
            romance: 0,
            history: Vec::new(),
        }
    }
}

impl Disposition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, dimension: DispositionDimension) -> i32 {
        match dimension {
            DispositionDimension::Approval => self.approval,
            DispositionDimension::Trust => self.trust,
            DispositionDimension::Fear => self.fear,
            DispositionDimension::Romance => self.romance,
        }
    }

    pub fn history(&self) -> &[DispositionHistoryEntry] {
        &self.history
    }

    fn set(&mut self, dimension: DispositionDimension, value: i32) {
        match dimension {
            DispositionDimension::Approval => self.approval = value,
            DispositionDimension::Trust => self.trust = value,
            DispositionDimension::Fear => self.fear = value,
            DispositionDimension::Romance => self.romance = value,
        }
    }

    /// Apply a set of requested deltas: each delta is clamped to
    /// `[-20, 20]`, the resulting final value is clamped to the
    /// dimension's range, and a bounded history record is appended.
    /// Dimensions outside the allowed set are rejected by the caller before
    /// this is called — `deltas` here is assumed pre-filtered.
    pub fn apply(&mut self, reason: impl Into<String>, day: u32, deltas: &[DispositionDelta]) {
        let mut applied = Vec::with_capacity(deltas.len());
        for d in deltas {
            let clamped_delta = d.delta.clamp(-DELTA_CLAMP, DELTA_CLAMP);
            let (min, max) = d.dimension.range();
            let new_value = (self.value(d.dimension) + clamped_delta).clamp(min, max);
            self.set(d.dimension, new_value);
            applied.push((d.dimension, clamped_delta));
        }

        self.history.push(DispositionHistoryEntry {
            reason: reason.into(),
            day,
            deltas: applied,
        });
        if self.history.len() > HISTORY_LIMIT {
            let overflow = self.history.len() - HISTORY_LIMIT;
            self.history.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_clamps_to_plus_minus_20() {
        let mut d = Disposition::new();
        d.apply(
            "heroic rescue",
            1,
            &[DispositionDelta {
                dimension: DispositionDimension::Approval,
                delta: 999,
            }],
        );
        assert_eq!(d.value(DispositionDimension::Approval), 20);
    }

    #[test]
    fn fear_and_romance_never_go_negative() {
        let mut d = Disposition::new();
        d.apply(
            "calmed down",
            1,
            &[DispositionDelta {
                dimension: DispositionDimension::Fear,
                delta: -999,
            }],
        );
        assert_eq!(d.value(DispositionDimension::Fear), 0);
    }

    #[test]
    fn approval_and_trust_saturate_at_bounds_over_many_updates() {
        let mut d = Disposition::new();
        for _ in 0..10 {
            d.apply(
                "kept helping",
                1,
                &[DispositionDelta {
                    dimension: DispositionDimension::Trust,
                    delta: 20,
                }],
            );
        }
        assert_eq!(d.value(DispositionDimension::Trust), 100);
    }

    #[test]
    fn history_bounded_to_last_50() {
        let mut d = Disposition::new();
        for i in 0..60 {
            d.apply(
                format!("event {i}"),
                1,
                &[DispositionDelta {
                    dimension: DispositionDimension::Approval,
                    delta: 1,
                }],
            );
        }
        assert_eq!(d.history().len(), 50);
        assert_eq!(d.history().first().unwrap().reason, "event 10");
        assert_eq!(d.history().last().unwrap().reason, "event 59");
    }

    #[test]
    fn parse_dimension_keys() {
        assert_eq!(
            DispositionDimension::parse("trust"),
            Some(DispositionDimension::Trust)
        );
        assert_eq!(DispositionDimension::parse("xyz"), None);
    }
}
