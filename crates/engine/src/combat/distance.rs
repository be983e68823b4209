//! Five-band abstract distance lattice between combatants (§3.4, §4.1).
//! Grounded in `original_source/backend/app/combat/spatial.py`.

use std::collections::HashMap;

use runtime_domain::CombatantId;

/// A position on the five-valued lattice `engaged < close < near < far < distant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Distance {
    Engaged = 0,
    Close = 1,
    Near = 2,
    Far = 3,
    Distant = 4,
}

impl Distance {
    const ORDER: [Distance; 5] = [
        Distance::Engaged,
        Distance::Close,
        Distance::Near,
        Distance::Far,
        Distance::Distant,
    ];

    /// Shift by `delta` bands, saturating at the lattice endpoints.
    pub fn adjust(self, delta: i32) -> Self {
        let idx = self as i32 + delta;
        let clamped = idx.clamp(0, Self::ORDER.len() as i32 - 1) as usize;
        Self::ORDER[clamped]
    }
}

fn pair_key(a: CombatantId, b: CombatantId) -> (CombatantId, CombatantId) {
    if a.as_uuid() <= b.as_uuid() {
        (a, b)
    } else {
        (b, a)
    }
}

/// Which side a combatant is on, used only to seed initial distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    PlayerOrAlly,
    Enemy,
}

/// Stores the distance band between every unordered pair of combatants.
#[derive(Debug, Default, Clone)]
pub struct SpatialProvider {
    distances: HashMap<(CombatantId, CombatantId), Distance>,
}

impl SpatialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize pairwise distances per §4.1: allies pairwise `close`,
    /// allies↔enemies `near`, enemies↔enemies `close`.
    pub fn initialize(sides: &[(CombatantId, Side)]) -> Self {
        let mut provider = Self::new();
        for i in 0..sides.len() {
            for j in (i + 1)..sides.len() {
                let (id_a, side_a) = sides[i];
                let (id_b, side_b) = sides[j];
                let distance = if side_a == side_b {
                    Distance::Close
                } else {
                    Distance::Near
                };
                provider.set_distance(id_a, id_b, distance);
            }
        }
        provider
    }

    pub fn get_distance(&self, a: CombatantId, b: CombatantId) -> Distance {
        if a.as_uuid() == b.as_uuid() {
            return Distance::Engaged;
        }
        self.distances
            .get(&pair_key(a, b))
            .copied()
            .unwrap_or(Distance::Near)
    }

    pub fn set_distance(&mut self, a: CombatantId, b: CombatantId, distance: Distance) {
        if a.as_uuid() == b.as_uuid() {
            return;
        }
        self.distances.insert(pair_key(a, b), distance);
    }

    /// Shift the distance between `a` and `b` by `delta` bands, saturating.
    pub fn adjust_distance(&mut self, a: CombatantId, b: CombatantId, delta: i32) -> Distance {
        let current = self.get_distance(a, b);
        let next = current.adjust(delta);
        self.set_distance(a, b, next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_distance_is_engaged() {
        let provider = SpatialProvider::new();
        let a = CombatantId::new();
        assert_eq!(provider.get_distance(a, a), Distance::Engaged);
    }

    #[test]
    fn distance_is_symmetric() {
        let mut provider = SpatialProvider::new();
        let a = CombatantId::new();
        let b = CombatantId::new();
        provider.set_distance(a, b, Distance::Far);
        assert_eq!(provider.get_distance(a, b), provider.get_distance(b, a));
    }

    #[test]
    fn adjust_saturates_at_endpoints() {
        let mut provider = SpatialProvider::new();
        let a = CombatantId::new();
        let b = CombatantId::new();
        provider.set_distance(a, b, Distance::Engaged);
        provider.adjust_distance(a, b, -5);
        assert_eq!(provider.get_distance(a, b), Distance::Engaged);

        provider.adjust_distance(a, b, 100);
        assert_eq!(provider.get_distance(a, b), Distance::Distant);
    }

    #[test]
    fn initialize_follows_side_rules() {
        let player = CombatantId::new();
        let ally = CombatantId::new();
        let enemy1 = CombatantId::new();
        let enemy2 = CombatantId::new();
        let provider = SpatialProvider::initialize(&[
            (player, Side::PlayerOrAlly),
            (ally, Side::PlayerOrAlly),
            (enemy1, Side::Enemy),
            (enemy2, Side::Enemy),
        ]);

        assert_eq!(provider.get_distance(player, ally), Distance::Close);
        assert_eq!(provider.get_distance(enemy1, enemy2), Distance::Close);
        assert_eq!(provider.get_distance(player, enemy1), Distance::Near);
        assert_eq!(provider.get_distance(ally, enemy2), Distance::Near);
    }
}
