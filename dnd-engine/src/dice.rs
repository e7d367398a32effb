//! Dice rolling for the rules engine.
//!
//! Every damage string in the catalogs follows one small grammar:
//! `NdM`, `NdM+K`, `NdM-K`, `dM` (one die) or a bare integer. Rolls come in
//! two flavours: strict ([`roll`]) which rejects malformed input, and lenient
//! ([`roll_lenient`]) which resolves malformed input to zero.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Largest number of dice a single expression may roll.
const MAX_DICE: u32 = 1000;

/// Largest die an expression may name.
const MAX_SIDES: u32 = 1000;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice expression: {0}")]
    InvalidExpression(String),
    #[error("Invalid die size in '{0}'")]
    InvalidDieSize(String),
    #[error("Too many dice in '{0}'")]
    TooManyDice(String),
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage)
            | (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (x, _) => x,
        }
    }

    /// Build from independent flags; both present cancel out.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }
}

/// A parsed `NdM+K` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceExpression {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// A constant with no dice.
    pub fn constant(value: i32) -> Self {
        Self::new(0, 0, value)
    }

    /// Parse an expression such as `2d6+3`.
    pub fn parse(expr: &str) -> Result<Self, DiceError> {
        let invalid = || DiceError::InvalidExpression(expr.to_string());

        let cleaned: String = expr
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() || !cleaned.is_ascii() {
            return Err(invalid());
        }

        // A leading sign belongs to a constant, so only look for the
        // modifier separator after the first character.
        let (dice_part, modifier) = match cleaned[1..].find(|c: char| c == '+' || c == '-') {
            Some(pos) => {
                let pos = pos + 1;
                let modifier: i32 = cleaned[pos..].parse().map_err(|_| invalid())?;
                (&cleaned[..pos], modifier)
            }
            None => (cleaned.as_str(), 0),
        };

        let Some(d_pos) = dice_part.find('d') else {
            let value: i32 = dice_part.parse().map_err(|_| invalid())?;
            let total = value.checked_add(modifier).ok_or_else(invalid)?;
            return Ok(Self::constant(total));
        };

        let count_str = &dice_part[..d_pos];
        let sides_str = &dice_part[d_pos + 1..];
        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };
        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;

        if sides == 0 || sides > MAX_SIDES {
            return Err(DiceError::InvalidDieSize(expr.to_string()));
        }
        if count > MAX_DICE {
            return Err(DiceError::TooManyDice(expr.to_string()));
        }

        Ok(Self::new(count, sides, modifier))
    }

    /// Same die and modifier, different number of dice.
    pub fn with_count(self, count: u32) -> Self {
        Self {
            count: count.min(MAX_DICE),
            ..self
        }
    }

    /// Double the dice (not the modifier), as on a critical hit.
    pub fn doubled(self) -> Self {
        self.with_count(self.count.saturating_mul(2))
    }

    /// Multiply the dice by `factor` (not the modifier).
    pub fn scaled(self, factor: u32) -> Self {
        self.with_count(self.count.saturating_mul(factor))
    }

    pub fn min_total(&self) -> i32 {
        (self.count as i32).saturating_add(self.modifier)
    }

    pub fn max_total(&self) -> i32 {
        (self.count.saturating_mul(self.sides).min(i32::MAX as u32) as i32).saturating_add(self.modifier)
    }

    pub fn roll(&self) -> RollResult {
        self.roll_with_rng(&mut rand::thread_rng())
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> RollResult {
        let rolls: Vec<u32> = if self.sides == 0 {
            Vec::new()
        } else {
            (0..self.count)
                .map(|_| rng.gen_range(1..=self.sides))
                .collect()
        };
        // Hand-built expressions skip the parse caps
        let dice_total = rolls
            .iter()
            .fold(0i32, |acc, &r| acc.saturating_add(i32::try_from(r).unwrap_or(i32::MAX)));

        RollResult {
            expression: Some(*self),
            total: dice_total.saturating_add(self.modifier),
            rolls,
            modifier: self.modifier,
        }
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 || self.sides == 0 {
            return write!(f, "{}", self.modifier);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// Result of rolling an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    /// `None` when a malformed expression was resolved to zero.
    pub expression: Option<DiceExpression>,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

impl RollResult {
    pub fn zero() -> Self {
        Self {
            expression: None,
            rolls: Vec::new(),
            modifier: 0,
            total: 0,
        }
    }

    /// Format the individual dice for a log line, e.g. `[3, 5] + 2`.
    pub fn dice_display(&self) -> String {
        let dice = format!(
            "[{}]",
            self.rolls
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        match self.modifier {
            0 => dice,
            m if m > 0 => format!("{dice} + {m}"),
            m => format!("{dice} - {}", m.abs()),
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// A d20 roll, keeping both dice when rolled with advantage or disadvantage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    pub rolls: Vec<u32>,
    pub natural: u32,
    pub advantage: Advantage,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.natural == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.natural == 1
    }
}

/// Roll an expression with the thread RNG.
pub fn roll(expr: &str) -> Result<RollResult, DiceError> {
    roll_with_rng(expr, &mut rand::thread_rng())
}

pub fn roll_with_rng<R: Rng + ?Sized>(expr: &str, rng: &mut R) -> Result<RollResult, DiceError> {
    Ok(DiceExpression::parse(expr)?.roll_with_rng(rng))
}

/// Roll an expression, resolving malformed input to a zero result.
pub fn roll_lenient<R: Rng + ?Sized>(expr: &str, rng: &mut R) -> RollResult {
    match roll_with_rng(expr, rng) {
        Ok(result) => result,
        Err(e) => {
            warn!(expression = expr, error = %e, "malformed dice expression resolved to zero");
            RollResult::zero()
        }
    }
}

/// A plain d20 check in `1..=20`.
pub fn roll_check() -> u32 {
    roll_check_with_rng(&mut rand::thread_rng())
}

pub fn roll_check_with_rng<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(1..=20)
}

/// Roll a d20 with advantage or disadvantage.
pub fn roll_d20<R: Rng + ?Sized>(advantage: Advantage, rng: &mut R) -> D20Roll {
    let first = roll_check_with_rng(rng);
    match advantage {
        Advantage::Normal => D20Roll {
            rolls: vec![first],
            natural: first,
            advantage,
        },
        Advantage::Advantage | Advantage::Disadvantage => {
            let second = roll_check_with_rng(rng);
            let natural = if advantage == Advantage::Advantage {
                first.max(second)
            } else {
                first.min(second)
            };
            D20Roll {
                rolls: vec![first, second],
                natural,
                advantage,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(expr, DiceExpression::new(1, 20, 0));
    }

    #[test]
    fn test_parse_with_modifier() {
        assert_eq!(DiceExpression::parse("3d4+3").unwrap().modifier, 3);
        assert_eq!(DiceExpression::parse("2d6-2").unwrap().modifier, -2);
        assert_eq!(
            DiceExpression::parse(" 2D8 + 1 ").unwrap(),
            DiceExpression::new(2, 8, 1)
        );
    }

    #[test]
    fn test_parse_implicit_count_and_constants() {
        assert_eq!(DiceExpression::parse("d6").unwrap().count, 1);
        assert_eq!(DiceExpression::parse("5").unwrap(), DiceExpression::constant(5));
        assert_eq!(DiceExpression::parse("-3").unwrap(), DiceExpression::constant(-3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DiceExpression::parse("").is_err());
        assert!(DiceExpression::parse("fireball").is_err());
        assert!(DiceExpression::parse("2d").is_err());
        assert!(DiceExpression::parse("1d6+x").is_err());
        assert!(matches!(
            DiceExpression::parse("1d0"),
            Err(DiceError::InvalidDieSize(_))
        ));
        assert!(matches!(
            DiceExpression::parse("5000d6"),
            Err(DiceError::TooManyDice(_))
        ));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(matches!(
            DiceExpression::parse("2147483647+1"),
            Err(DiceError::InvalidExpression(_))
        ));
        assert!(matches!(
            DiceExpression::parse("3d4294967295"),
            Err(DiceError::InvalidDieSize(_))
        ));
        assert!(DiceExpression::parse("1d1000").is_ok());
        assert!(DiceExpression::parse("1d1001").is_err());
    }

    #[test]
    fn test_huge_hand_built_expression_never_goes_negative() {
        let mut rng = StdRng::seed_from_u64(2);
        let result = DiceExpression::new(3, u32::MAX, i32::MAX).roll_with_rng(&mut rng);
        assert!(result.total > 0);
    }

    #[test]
    fn test_roll_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let result = roll_with_rng("3d4+3", &mut rng).unwrap();
            assert!((6..=15).contains(&result.total));
            assert_eq!(result.rolls.len(), 3);
            assert!(result.rolls.iter().all(|r| (1..=4).contains(r)));
        }
    }

    #[test]
    fn test_lenient_roll_is_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = roll_lenient("banana", &mut rng);
        assert_eq!(result.total, 0);
        assert!(result.expression.is_none());
    }

    #[test]
    fn test_doubling_keeps_modifier() {
        let expr = DiceExpression::parse("2d6+3").unwrap().doubled();
        assert_eq!(expr, DiceExpression::new(4, 6, 3));
        assert_eq!(expr.to_string(), "4d6+3");
        assert_eq!(DiceExpression::new(1, 8, -1).to_string(), "1d8-1");
    }

    #[test]
    fn test_roll_check_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            assert!((1..=20).contains(&roll_check_with_rng(&mut rng)));
        }
    }

    #[test]
    fn test_d20_advantage_keeps_best() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let roll = roll_d20(Advantage::Advantage, &mut rng);
            assert_eq!(roll.rolls.len(), 2);
            assert_eq!(roll.natural, *roll.rolls.iter().max().unwrap());

            let roll = roll_d20(Advantage::Disadvantage, &mut rng);
            assert_eq!(roll.natural, *roll.rolls.iter().min().unwrap());
        }
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(Advantage::from_flags(true, true), Advantage::Normal);
        assert_eq!(Advantage::from_flags(false, true), Advantage::Disadvantage);
    }
}
