//! Enemy AI decisioning (§4.1 "AI decision (enemy turns)").
//! Grounded in `original_source/backend/app/combat/ai_opponent.py`.

use runtime_domain::DiceRng;

use super::combatant::Combatant;

/// Keyed AI personality configuration (Design Notes §9: "encode as
/// enumerated configuration tables").
#[derive(Debug, Clone, Copy)]
pub struct AiPersonality {
    pub flee_threshold: f64,
    pub prefer_defend: bool,
    pub prefer_weaker_targets: bool,
    pub prefer_wounded_targets: bool,
}

impl AiPersonality {
    pub const AGGRESSIVE: AiPersonality = AiPersonality {
        flee_threshold: 0.0,
        prefer_defend: false,
        prefer_weaker_targets: false,
        prefer_wounded_targets: false,
    };

    pub const CAUTIOUS: AiPersonality = AiPersonality {
        flee_threshold: 0.3,
        prefer_defend: true,
        prefer_weaker_targets: false,
        prefer_wounded_targets: true,
    };

    pub const OPPORTUNIST: AiPersonality = AiPersonality {
        flee_threshold: 0.2,
        prefer_defend: false,
        prefer_weaker_targets: true,
        prefer_wounded_targets: false,
    };

    pub fn by_name(name: &str) -> AiPersonality {
        match name {
            "cautious" => Self::CAUTIOUS,
            "opportunist" => Self::OPPORTUNIST,
            _ => Self::AGGRESSIVE,
        }
    }
}

/// What the AI decided to do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiDecision<T> {
    Flee,
    Defend,
    Attack(T),
}

/// Decide an enemy's action for this turn. `targets` are the alive
/// player/ally combatants it may attack; `rng` drives the probabilistic
/// flee/defend checks (§4.1 a/b) and random target fallback (c).
pub fn decide_action<'a>(
    enemy: &Combatant,
    personality: AiPersonality,
    targets: &'a [&'a Combatant],
    rng: &mut dyn DiceRng,
) -> AiDecision<&'a Combatant> {
    let hp_ratio = enemy.hp_ratio();

    if personality.flee_threshold > 0.0 && hp_ratio < personality.flee_threshold {
        if roll_probability(rng, 0.5) {
            return AiDecision::Flee;
        }
    }

    if personality.prefer_defend && hp_ratio < 0.5 && roll_probability(rng, 0.3) {
        return AiDecision::Defend;
    }

    let target = select_target(personality, targets, rng);
    match target {
        Some(target) => AiDecision::Attack(target),
        None => AiDecision::Defend,
    }
}

fn select_target<'a>(
    personality: AiPersonality,
    targets: &'a [&'a Combatant],
    rng: &mut dyn DiceRng,
) -> Option<&'a Combatant> {
    if targets.is_empty() {
        return None;
    }

    if personality.prefer_weaker_targets {
        return targets.iter().copied().min_by_key(|t| t.hp());
    }

    if personality.prefer_wounded_targets {
        let wounded: Vec<&Combatant> = targets
            .iter()
            .copied()
            .filter(|t| t.hp() < t.max_hp)
            .collect();
        if !wounded.is_empty() {
            return wounded
                .into_iter()
                .min_by(|a, b| a.hp_ratio().total_cmp(&b.hp_ratio()));
        }
    }

    let index = (rng.roll_die(targets.len() as u8) as usize - 1).min(targets.len() - 1);
    Some(targets[index])
}

/// Uses a d100 roll to approximate a probability check, since the engine
/// only ever exposes die rolls through [`DiceRng`].
fn roll_probability(rng: &mut dyn DiceRng, probability: f64) -> bool {
    let roll = rng.roll_die(100);
    (roll as f64) <= probability * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::combatant::{
        AbilityScores, ActionEconomy, CombatantKind, DamageModifiers, SpellBook,
    };
    use runtime_domain::{CombatantId, DiceFormula, FixedRollSequence};

    fn make(hp: i32, max_hp: i32) -> Combatant {
        Combatant {
            id: CombatantId::new(),
            display_name: "Enemy".into(),
            kind: CombatantKind::Enemy,
            hp,
            max_hp,
            armor_class: 12,
            attack_bonus: 2,
            damage_dice: DiceFormula::new(1, 6, 0).unwrap(),
            damage_bonus: 0,
            damage_type: "slashing".into(),
            initiative_bonus: 0,
            initiative_roll: 0,
            action_economy: ActionEconomy::default(),
            movement_speed: 6,
            movement_points: 6,
            ability_scores: AbilityScores::default(),
            weapon_id: None,
            armor_id: None,
            offhand_id: None,
            spell_book: SpellBook::default(),
            damage_modifiers: DamageModifiers::default(),
            status_effects: Vec::new(),
            ai_personality: None,
        }
    }

    #[test]
    fn low_hp_forces_flee_check_with_favorable_roll() {
        let enemy = make(2, 10);
        let mut rng = FixedRollSequence::new(vec![10]);
        let decision = decide_action(&enemy, AiPersonality::CAUTIOUS, &[], &mut rng);
        assert_eq!(decision, AiDecision::Flee);
    }

    #[test]
    fn aggressive_never_flees() {
        let enemy = make(1, 10);
        let target = make(10, 10);
        let targets = [&target];
        let mut rng = FixedRollSequence::new(vec![1]);
        let decision = decide_action(&enemy, AiPersonality::AGGRESSIVE, &targets, &mut rng);
        assert!(matches!(decision, AiDecision::Attack(_)));
    }

    #[test]
    fn no_targets_defends() {
        let enemy = make(10, 10);
        let mut rng = FixedRollSequence::new(vec![50]);
        let decision = decide_action(&enemy, AiPersonality::AGGRESSIVE, &[], &mut rng);
        assert_eq!(decision, AiDecision::Defend);
    }

    #[test]
    fn prefer_weaker_targets_picks_lowest_hp() {
        let enemy = make(10, 10);
        let strong = make(20, 20);
        let weak = make(2, 20);
        let targets = [&strong, &weak];
        let mut rng = FixedRollSequence::new(vec![50]);
        let decision = decide_action(&enemy, AiPersonality::OPPORTUNIST, &targets, &mut rng);
        match decision {
            AiDecision::Attack(target) => assert_eq!(target.hp(), 2),
            other => panic!("expected attack, got {other:?}"),
        }
    }
}
