//! Dice formulas (`2d6+3`, `1d8`, `4`) used by effects, variants and upcast scaling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::combat::rng::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub bonus: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dice formula '{0}'")]
pub struct DiceParseError(pub String);

impl DiceFormula {
    pub const fn new(count: u32, sides: u32, bonus: i32) -> Self {
        Self {
            count,
            sides,
            bonus,
        }
    }

    pub const fn flat(bonus: i32) -> Self {
        Self::new(0, 0, bonus)
    }

    pub fn has_dice(&self) -> bool {
        self.count > 0 && self.sides > 0
    }

    pub fn min(&self) -> i32 {
        if self.has_dice() {
            clamp_i64(i64::from(self.count) + i64::from(self.bonus))
        } else {
            self.bonus
        }
    }

    pub fn max(&self) -> i32 {
        if self.has_dice() {
            let dice = i64::from(self.count) * i64::from(self.sides);
            clamp_i64(dice + i64::from(self.bonus))
        } else {
            self.bonus
        }
    }

    pub fn average(&self) -> f64 {
        if self.has_dice() {
            self.count as f64 * (self.sides as f64 + 1.0) / 2.0 + self.bonus as f64
        } else {
            self.bonus as f64
        }
    }

    pub fn roll(&self, rng: &mut Rng) -> i32 {
        self.roll_with_dice_multiplier(rng, 1)
    }

    /// Rolls with the dice count multiplied (critical hits double the dice, never the bonus).
    /// Totals saturate at the `i32` range.
    pub fn roll_with_dice_multiplier(&self, rng: &mut Rng, multiplier: u32) -> i32 {
        let mut total = i64::from(self.bonus);
        if self.has_dice() {
            for _ in 0..self.count.saturating_mul(multiplier.max(1)) {
                total += i64::from(rng.roll_die(self.sides));
                if total >= i64::from(i32::MAX) {
                    break;
                }
            }
        }
        clamp_i64(total)
    }

    /// Adds `other` onto this formula.
    ///
    /// Same die size (or either side flat) combines exactly. Differing die sizes keep this
    /// formula's dice and fold the floored average of `other`'s dice into the flat bonus.
    pub fn combine(&self, other: &DiceFormula) -> DiceFormula {
        if !other.has_dice() {
            return DiceFormula::new(self.count, self.sides, self.bonus.saturating_add(other.bonus));
        }
        let bonus = self.bonus.saturating_add(other.bonus);
        if !self.has_dice() {
            return DiceFormula::new(other.count, other.sides, bonus);
        }
        if self.sides == other.sides {
            return DiceFormula::new(self.count.saturating_add(other.count), self.sides, bonus);
        }
        // `as` saturates float to int.
        let folded = (other.count as f64 * (other.sides as f64 + 1.0) / 2.0).floor() as i32;
        DiceFormula::new(self.count, self.sides, bonus.saturating_add(folded))
    }

    /// Repeats the formula `times` times (used by per-level upcast dice).
    pub fn scaled(&self, times: u32) -> DiceFormula {
        let bonus = i64::from(self.bonus) * i64::from(times);
        DiceFormula::new(self.count.saturating_mul(times), self.sides, clamp_i64(bonus))
    }
}

/// Narrows an `i64` sum into the `i32` range.
pub(crate) fn clamp_i64(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

impl FromStr for DiceFormula {
    type Err = DiceParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(DiceParseError(raw.to_string()));
        }
        let lower = text.to_ascii_lowercase();
        let Some(d_index) = lower.find('d') else {
            return lower
                .parse::<i32>()
                .map(DiceFormula::flat)
                .map_err(|_| DiceParseError(raw.to_string()));
        };

        let count = match &lower[..d_index] {
            "" => 1,
            digits => digits
                .parse::<u32>()
                .map_err(|_| DiceParseError(raw.to_string()))?,
        };
        let rest = &lower[d_index + 1..];
        let split_at = rest.find(['+', '-']).unwrap_or(rest.len());
        let sides = rest[..split_at]
            .parse::<u32>()
            .map_err(|_| DiceParseError(raw.to_string()))?;
        let bonus = if split_at < rest.len() {
            rest[split_at..]
                .parse::<i32>()
                .map_err(|_| DiceParseError(raw.to_string()))?
        } else {
            0
        };
        Ok(DiceFormula::new(count, sides, bonus))
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_dice() {
            return write!(f, "{}", self.bonus);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.bonus {
            0 => Ok(()),
            b if b > 0 => write!(f, "+{b}"),
            b => write!(f, "{b}"),
        }
    }
}

/// Parse-and-combine helper for string formulas carried by effect definitions.
/// An unparseable addition leaves the base untouched.
pub fn combine_formula_strings(base: Option<&str>, addition: &str) -> Option<String> {
    let Ok(add) = addition.parse::<DiceFormula>() else {
        tracing::warn!(formula = addition, "ignoring unparseable dice formula");
        return base.map(str::to_string);
    };
    let combined = match base.map(str::parse::<DiceFormula>) {
        Some(Ok(formula)) => formula.combine(&add),
        Some(Err(_)) => return base.map(str::to_string),
        None => add,
    };
    Some(combined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shapes() {
        assert_eq!("2d6+3".parse::<DiceFormula>().unwrap(), DiceFormula::new(2, 6, 3));
        assert_eq!("1d8".parse::<DiceFormula>().unwrap(), DiceFormula::new(1, 8, 0));
        assert_eq!("d4-1".parse::<DiceFormula>().unwrap(), DiceFormula::new(1, 4, -1));
        assert_eq!("7".parse::<DiceFormula>().unwrap(), DiceFormula::flat(7));
        assert!("fire".parse::<DiceFormula>().is_err());
        assert!("2d".parse::<DiceFormula>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in ["2d6+3", "1d8", "3d4-2", "5"] {
            assert_eq!(text.parse::<DiceFormula>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn combine_same_size_sums_counts_and_bonuses() {
        let base = DiceFormula::new(2, 6, 1);
        let combined = base.combine(&DiceFormula::new(1, 6, 2));
        assert_eq!(combined, DiceFormula::new(3, 6, 3));
    }

    #[test]
    fn combine_different_sizes_folds_floored_average() {
        // 1d4 averages 2.5 -> 2 folded into the bonus.
        let combined = DiceFormula::new(2, 6, 0).combine(&DiceFormula::new(1, 4, 0));
        assert_eq!(combined, DiceFormula::new(2, 6, 2));
    }

    #[test]
    fn min_max_average() {
        let formula = DiceFormula::new(2, 6, 3);
        assert_eq!(formula.min(), 5);
        assert_eq!(formula.max(), 15);
        assert!((formula.average() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn critical_roll_doubles_dice_not_bonus() {
        let formula = DiceFormula::new(1, 1, 5);
        let mut rng = Rng::new(1);
        assert_eq!(formula.roll_with_dice_multiplier(&mut rng, 2), 7);
    }

    #[test]
    fn huge_formulas_saturate_instead_of_wrapping() {
        let formula = DiceFormula::new(u32::MAX, u32::MAX, i32::MAX);
        assert_eq!(formula.max(), i32::MAX);
        assert_eq!(formula.min(), i32::MAX);
        assert_eq!(DiceFormula::new(3, 6, i32::MIN).min(), i32::MIN + 3);
        assert_eq!(DiceFormula::new(2, 6, i32::MAX).scaled(4).bonus, i32::MAX);
        assert_eq!(DiceFormula::new(u32::MAX, 6, 0).scaled(2).count, u32::MAX);

        let mut rng = Rng::new(3);
        let near_max = DiceFormula::new(2, 6, i32::MAX - 1);
        assert_eq!(near_max.roll_with_dice_multiplier(&mut rng, u32::MAX), i32::MAX);
    }

    #[test]
    fn combine_strings_handles_missing_base() {
        assert_eq!(combine_formula_strings(None, "1d6").as_deref(), Some("1d6"));
        assert_eq!(combine_formula_strings(Some("1d6"), "1d6").as_deref(), Some("2d6"));
        assert_eq!(combine_formula_strings(Some("1d6"), "junk").as_deref(), Some("1d6"));
    }
}
