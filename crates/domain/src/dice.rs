//! Dice notation parsing and rolling.
//!
//! Supports formulas like `"1d20+5"`, `"2d6-1"`, `"1d100"` per the grammar
//! `^\s*(\d+)d(\d+)\s*([+-]\s*\d+)?\s*$` (case-insensitive). Rolling is done
//! through an injected [`DiceRng`] so that combat resolution and tests can
//! force specific outcomes without reaching into global RNG state.

use std::fmt;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error when parsing a dice formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    #[error("empty dice formula")]
    Empty,
    #[error("invalid dice format: {0}")]
    InvalidFormat(String),
    #[error("dice count must be at least 1")]
    InvalidDiceCount,
    #[error("die size must be at least 2")]
    InvalidDieSize,
}

/// A parsed dice formula like `2d6+3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceFormula {
    pub dice_count: u8,
    pub die_size: u8,
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(dice_count: u8, die_size: u8, modifier: i32) -> Result<Self, DiceParseError> {
        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }
        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }
        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    /// Parse a formula string. Case-insensitive; whitespace around the
    /// whole string and around the modifier sign is tolerated.
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_lowercase().replace(' ', "");
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        let d_pos = input
            .find('d')
            .ok_or_else(|| DiceParseError::InvalidFormat(input.clone()))?;

        let dice_count_str = &input[..d_pos];
        let dice_count: u8 = if dice_count_str.is_empty() {
            1
        } else {
            dice_count_str
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(input.clone()))?
        };
        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }

        let after_d = &input[d_pos + 1..];
        let (die_size_str, modifier) = if let Some(plus_pos) = after_d.find('+') {
            let modifier: i32 = after_d[plus_pos + 1..]
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(input.clone()))?;
            (&after_d[..plus_pos], modifier)
        } else if let Some(minus_pos) = after_d.rfind('-') {
            if minus_pos == 0 {
                return Err(DiceParseError::InvalidFormat(input.clone()));
            }
            let modifier: i32 = after_d[minus_pos + 1..]
                .parse()
                .map_err(|_| DiceParseError::InvalidFormat(input.clone()))?;
            (&after_d[..minus_pos], -modifier)
        } else {
            (after_d, 0)
        };

        let die_size: u8 = die_size_str
            .parse()
            .map_err(|_| DiceParseError::InvalidFormat(input.clone()))?;
        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }

        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    pub fn min_roll(&self) -> i32 {
        self.dice_count as i32 + self.modifier
    }

    pub fn max_roll(&self) -> i32 {
        self.dice_count as i32 * self.die_size as i32 + self.modifier
    }

    pub fn display(&self) -> String {
        match self.modifier.cmp(&0) {
            std::cmp::Ordering::Equal => format!("{}d{}", self.dice_count, self.die_size),
            std::cmp::Ordering::Greater => {
                format!("{}d{}+{}", self.dice_count, self.die_size, self.modifier)
            }
            std::cmp::Ordering::Less => {
                format!("{}d{}{}", self.dice_count, self.die_size, self.modifier)
            }
        }
    }

    /// Roll once via `rng`. Each die is uniform in `[1, die_size]`.
    pub fn roll(&self, rng: &mut dyn DiceRng) -> DiceRollResult {
        let individual_rolls: Vec<i32> = (0..self.dice_count)
            .map(|_| rng.roll_die(self.die_size))
            .collect();
        let dice_total: i32 = individual_rolls.iter().sum();
        DiceRollResult {
            formula: *self,
            individual_rolls,
            dice_total,
            modifier_applied: self.modifier,
            total: dice_total + self.modifier,
        }
    }

    /// Roll twice and sum the dice (not the modifier) — used for critical
    /// hits, which double dice only (§4.1 step 5).
    pub fn roll_critical(&self, rng: &mut dyn DiceRng) -> DiceRollResult {
        let mut first = self.roll(rng);
        let second = self.roll(rng);
        first.individual_rolls.extend(second.individual_rolls);
        first.dice_total += second.dice_total;
        first.total = first.dice_total + self.modifier;
        first
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Result of rolling a [`DiceFormula`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollResult {
    pub formula: DiceFormula,
    pub individual_rolls: Vec<i32>,
    pub dice_total: i32,
    pub modifier_applied: i32,
    pub total: i32,
}

impl DiceRollResult {
    pub fn is_natural_20(&self) -> bool {
        self.formula.die_size == 20 && self.individual_rolls.first() == Some(&20)
    }

    pub fn is_natural_1(&self) -> bool {
        self.formula.die_size == 20 && self.individual_rolls.first() == Some(&1)
    }

    pub fn breakdown(&self) -> String {
        let rolls: Vec<String> = self.individual_rolls.iter().map(i32::to_string).collect();
        match self.modifier_applied.cmp(&0) {
            std::cmp::Ordering::Equal => format!("{}[{}] = {}", self.formula, rolls.join(","), self.total),
            std::cmp::Ordering::Greater => format!(
                "{}[{}]+{} = {}",
                self.formula, rolls.join(","), self.modifier_applied, self.total
            ),
            std::cmp::Ordering::Less => format!(
                "{}[{}]{} = {}",
                self.formula, rolls.join(","), self.modifier_applied, self.total
            ),
        }
    }
}

/// Source of die faces injected into dice rolls, so combat resolution and
/// tests never reach into global RNG state directly.
pub trait DiceRng {
    /// Roll a single die of `die_size` faces, uniform in `[1, die_size]`.
    fn roll_die(&mut self, die_size: u8) -> i32;

    /// Roll a d20, used for attack rolls, saves, and flee checks.
    fn roll_d20(&mut self) -> i32 {
        self.roll_die(20)
    }

    /// Best-of-2 d20 (advantage).
    fn roll_d20_advantage(&mut self) -> i32 {
        self.roll_d20().max(self.roll_d20())
    }

    /// Worst-of-2 d20 (disadvantage).
    fn roll_d20_disadvantage(&mut self) -> i32 {
        self.roll_d20().min(self.roll_d20())
    }
}

/// Real randomness, seeded for reproducible sessions.
pub struct SeededDiceRng(StdRng);

impl SeededDiceRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl DiceRng for SeededDiceRng {
    fn roll_die(&mut self, die_size: u8) -> i32 {
        self.0.gen_range(1..=die_size as i32)
    }
}

/// Replays a scripted sequence of die faces, looping if exhausted. Used by
/// the combat engine's tests (§8 scenarios force specific d20/damage rolls).
#[derive(Debug, Clone, Default)]
pub struct FixedRollSequence {
    faces: Vec<i32>,
    cursor: usize,
}

impl FixedRollSequence {
    pub fn new(faces: impl Into<Vec<i32>>) -> Self {
        Self {
            faces: faces.into(),
            cursor: 0,
        }
    }
}

impl DiceRng for FixedRollSequence {
    fn roll_die(&mut self, _die_size: u8) -> i32 {
        if self.faces.is_empty() {
            return 1;
        }
        let face = self.faces[self.cursor % self.faces.len()];
        self.cursor += 1;
        face
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_d20() {
        let f = DiceFormula::parse("1d20").unwrap();
        assert_eq!(f, DiceFormula::new(1, 20, 0).unwrap());
    }

    #[test]
    fn parse_shorthand() {
        let f = DiceFormula::parse("d20").unwrap();
        assert_eq!(f.dice_count, 1);
    }

    #[test]
    fn parse_negative_modifier() {
        let f = DiceFormula::parse("2d6-1").unwrap();
        assert_eq!(f.modifier, -1);
    }

    #[test]
    fn parse_case_insensitive_and_whitespace() {
        let f = DiceFormula::parse("  1D20 + 5 ").unwrap();
        assert_eq!(f.modifier, 5);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(DiceFormula::parse(""), Err(DiceParseError::Empty)));
        assert!(matches!(
            DiceFormula::parse("20"),
            Err(DiceParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            DiceFormula::parse("0d20"),
            Err(DiceParseError::InvalidDiceCount)
        ));
        assert!(matches!(
            DiceFormula::parse("1d1"),
            Err(DiceParseError::InvalidDieSize)
        ));
    }

    #[test]
    fn fixed_sequence_replays_forced_rolls() {
        let mut rng = FixedRollSequence::new(vec![18]);
        let formula = DiceFormula::new(1, 20, 0).unwrap();
        let result = formula.roll(&mut rng);
        assert_eq!(result.total, 18);
    }

    #[test]
    fn critical_doubles_dice_not_modifier() {
        // Scenario 2 in spec §8: 2d6+1 fire, forced rolls 6,6,6,6.
        let mut rng = FixedRollSequence::new(vec![6]);
        let formula = DiceFormula::new(2, 6, 1).unwrap();
        let result = formula.roll_critical(&mut rng);
        assert_eq!(result.dice_total, 24);
        assert_eq!(result.total, 25);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = SeededDiceRng::from_seed(42);
        let mut b = SeededDiceRng::from_seed(42);
        let formula = DiceFormula::new(1, 20, 0).unwrap();
        assert_eq!(formula.roll(&mut a).total, formula.roll(&mut b).total);
    }

    #[test]
    fn roll_range_bounds() {
        let mut rng = SeededDiceRng::from_seed(7);
        let formula = DiceFormula::parse("3d8+2").unwrap();
        for _ in 0..50 {
            let r = formula.roll(&mut rng);
            assert!(r.total >= formula.min_roll() && r.total <= formula.max_roll());
        }
    }
}
