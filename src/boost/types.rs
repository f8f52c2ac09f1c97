//! Boost vocabulary: the closed set of boost kinds, typed parameters and provenance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every boost function the DSL understands. Names match the authored data verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoostType {
    AC,
    ACOverrideFormula,
    Ability,
    AbilityOverrideMinimum,
    ActionResource,
    ActionResourceBlock,
    ActionResourceConsumeMultiplier,
    ActionResourceMultiplier,
    ActionResourceOverride,
    Advantage,
    Attribute,
    BlockSpellCast,
    CannotBeDisarmed,
    CharacterWeaponDamage,
    CriticalHit,
    CriticalHitExtraDice,
    CriticalHitExtraRange,
    DamageBonus,
    DamageReduction,
    Disadvantage,
    ExpertiseBonus,
    IgnoreResistance,
    IncreaseMaxHP,
    Initiative,
    JumpMaxDistanceMultiplier,
    MinimumRollResult,
    MovementSpeedBonus,
    NonLethal,
    ProficiencyBonus,
    ProficiencyBonusOverride,
    Reroll,
    Resistance,
    RollBonus,
    SpellSaveDC,
    StatusImmunity,
    Tag,
    TemporaryHP,
    TwoWeaponFighting,
    UnlockInterrupt,
    UnlockSpell,
    WeaponDamage,
    WeaponEnchantment,
}

impl BoostType {
    pub const ALL: [BoostType; 42] = [
        Self::AC,
        Self::ACOverrideFormula,
        Self::Ability,
        Self::AbilityOverrideMinimum,
        Self::ActionResource,
        Self::ActionResourceBlock,
        Self::ActionResourceConsumeMultiplier,
        Self::ActionResourceMultiplier,
        Self::ActionResourceOverride,
        Self::Advantage,
        Self::Attribute,
        Self::BlockSpellCast,
        Self::CannotBeDisarmed,
        Self::CharacterWeaponDamage,
        Self::CriticalHit,
        Self::CriticalHitExtraDice,
        Self::CriticalHitExtraRange,
        Self::DamageBonus,
        Self::DamageReduction,
        Self::Disadvantage,
        Self::ExpertiseBonus,
        Self::IgnoreResistance,
        Self::IncreaseMaxHP,
        Self::Initiative,
        Self::JumpMaxDistanceMultiplier,
        Self::MinimumRollResult,
        Self::MovementSpeedBonus,
        Self::NonLethal,
        Self::ProficiencyBonus,
        Self::ProficiencyBonusOverride,
        Self::Reroll,
        Self::Resistance,
        Self::RollBonus,
        Self::SpellSaveDC,
        Self::StatusImmunity,
        Self::Tag,
        Self::TemporaryHP,
        Self::TwoWeaponFighting,
        Self::UnlockInterrupt,
        Self::UnlockSpell,
        Self::WeaponDamage,
        Self::WeaponEnchantment,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AC => "AC",
            Self::ACOverrideFormula => "ACOverrideFormula",
            Self::Ability => "Ability",
            Self::AbilityOverrideMinimum => "AbilityOverrideMinimum",
            Self::ActionResource => "ActionResource",
            Self::ActionResourceBlock => "ActionResourceBlock",
            Self::ActionResourceConsumeMultiplier => "ActionResourceConsumeMultiplier",
            Self::ActionResourceMultiplier => "ActionResourceMultiplier",
            Self::ActionResourceOverride => "ActionResourceOverride",
            Self::Advantage => "Advantage",
            Self::Attribute => "Attribute",
            Self::BlockSpellCast => "BlockSpellCast",
            Self::CannotBeDisarmed => "CannotBeDisarmed",
            Self::CharacterWeaponDamage => "CharacterWeaponDamage",
            Self::CriticalHit => "CriticalHit",
            Self::CriticalHitExtraDice => "CriticalHitExtraDice",
            Self::CriticalHitExtraRange => "CriticalHitExtraRange",
            Self::DamageBonus => "DamageBonus",
            Self::DamageReduction => "DamageReduction",
            Self::Disadvantage => "Disadvantage",
            Self::ExpertiseBonus => "ExpertiseBonus",
            Self::IgnoreResistance => "IgnoreResistance",
            Self::IncreaseMaxHP => "IncreaseMaxHP",
            Self::Initiative => "Initiative",
            Self::JumpMaxDistanceMultiplier => "JumpMaxDistanceMultiplier",
            Self::MinimumRollResult => "MinimumRollResult",
            Self::MovementSpeedBonus => "MovementSpeedBonus",
            Self::NonLethal => "NonLethal",
            Self::ProficiencyBonus => "ProficiencyBonus",
            Self::ProficiencyBonusOverride => "ProficiencyBonusOverride",
            Self::Reroll => "Reroll",
            Self::Resistance => "Resistance",
            Self::RollBonus => "RollBonus",
            Self::SpellSaveDC => "SpellSaveDC",
            Self::StatusImmunity => "StatusImmunity",
            Self::Tag => "Tag",
            Self::TemporaryHP => "TemporaryHP",
            Self::TwoWeaponFighting => "TwoWeaponFighting",
            Self::UnlockInterrupt => "UnlockInterrupt",
            Self::UnlockSpell => "UnlockSpell",
            Self::WeaponDamage => "WeaponDamage",
            Self::WeaponEnchantment => "WeaponEnchantment",
        }
    }

    /// Case-insensitive lookup of a DSL function name. Unknown names return None.
    pub fn from_name(name: &str) -> Option<BoostType> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for BoostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One positional boost parameter after best-effort typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoostValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl BoostValue {
    /// Integer, then float, else trimmed string. Only plain numerals are numeric, so
    /// `1d6`, `inf` or `Infinity` stay strings.
    pub fn from_raw(raw: &str) -> BoostValue {
        let text = raw.trim();
        let numeric_shape = !text.is_empty()
            && text.chars().any(|c| c.is_ascii_digit())
            && text
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
        if numeric_shape {
            if let Ok(value) = text.parse::<i64>() {
                return BoostValue::Int(value);
            }
            if let Ok(value) = text.parse::<f64>() {
                return BoostValue::Float(value);
            }
        }
        BoostValue::Str(text.to_string())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) => Some(*v as i64),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Case-insensitive comparison against a keyword; numbers never match.
    pub fn is(&self, keyword: &str) -> bool {
        self.as_str()
            .map_or(false, |s| s.eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for BoostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for BoostValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for BoostValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for BoostValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// A parsed boost clause. Immutable once built by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostDefinition {
    #[serde(rename = "type")]
    pub boost_type: BoostType,
    #[serde(default)]
    pub parameters: Vec<BoostValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub raw: String,
}

impl BoostDefinition {
    pub fn new(boost_type: BoostType, parameters: Vec<BoostValue>) -> Self {
        let raw = format!(
            "{}({})",
            boost_type,
            parameters
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            boost_type,
            parameters,
            condition: None,
            raw,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition
            .as_deref()
            .map_or(false, |c| !c.trim().is_empty())
    }

    pub fn param(&self, index: usize) -> Option<&BoostValue> {
        self.parameters.get(index)
    }

    pub fn int_param(&self, index: usize) -> Option<i64> {
        self.param(index).and_then(BoostValue::as_int)
    }

    pub fn str_param(&self, index: usize) -> Option<&str> {
        self.param(index).and_then(BoostValue::as_str)
    }
}

/// Source categories used for provenance. Free-form strings are accepted as well.
pub mod source {
    pub const STATUS: &str = "Status";
    pub const PASSIVE: &str = "Passive";
    pub const EQUIPMENT: &str = "Equipment";
    pub const SPELL: &str = "Spell";
    pub const FEAT: &str = "Feat";
}

/// A boost plus why it exists. `(source, source_id)` identifies the granting instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBoost {
    pub definition: BoostDefinition,
    pub source: String,
    pub source_id: String,
}

impl ActiveBoost {
    pub fn new(
        definition: BoostDefinition,
        source: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            definition,
            source: source.into(),
            source_id: source_id.into(),
        }
    }

    pub fn boost_type(&self) -> BoostType {
        self.definition.boost_type
    }

    pub fn is_from(&self, source: &str, source_id: &str) -> bool {
        self.source.eq_ignore_ascii_case(source) && self.source_id.eq_ignore_ascii_case(source_id)
    }
}

/// Damage multiplier tier. Ordering is by strength of protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResistanceLevel {
    Vulnerable,
    Normal,
    Resistant,
    Immune,
}

impl ResistanceLevel {
    pub fn apply(self, damage: i32) -> i32 {
        match self {
            Self::Vulnerable => damage.saturating_mul(2),
            Self::Normal => damage,
            Self::Resistant => damage / 2,
            Self::Immune => 0,
        }
    }
}

impl FromStr for ResistanceLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vulnerable" | "vulnerability" => Ok(Self::Vulnerable),
            "normal" | "none" => Ok(Self::Normal),
            "resistant" | "resistance" => Ok(Self::Resistant),
            "immune" | "immunity" => Ok(Self::Immune),
            _ => Err(()),
        }
    }
}

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AbilityScore {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl AbilityScore {
    pub const ALL: [AbilityScore; 6] = [
        Self::Strength,
        Self::Dexterity,
        Self::Constitution,
        Self::Intelligence,
        Self::Wisdom,
        Self::Charisma,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strength => "Strength",
            Self::Dexterity => "Dexterity",
            Self::Constitution => "Constitution",
            Self::Intelligence => "Intelligence",
            Self::Wisdom => "Wisdom",
            Self::Charisma => "Charisma",
        }
    }
}

impl FromStr for AbilityScore {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strength" | "str" => Ok(Self::Strength),
            "dexterity" | "dex" => Ok(Self::Dexterity),
            "constitution" | "con" => Ok(Self::Constitution),
            "intelligence" | "int" => Ok(Self::Intelligence),
            "wisdom" | "wis" => Ok(Self::Wisdom),
            "charisma" | "cha" => Ok(Self::Charisma),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AbilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roll categories a boost can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollType {
    AttackRoll,
    SavingThrow,
    AbilityCheck,
    SkillCheck,
    DamageRoll,
    Initiative,
    DeathSavingThrow,
}

impl RollType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttackRoll => "AttackRoll",
            Self::SavingThrow => "SavingThrow",
            Self::AbilityCheck => "AbilityCheck",
            Self::SkillCheck => "SkillCheck",
            Self::DamageRoll => "DamageRoll",
            Self::Initiative => "Initiative",
            Self::DeathSavingThrow => "DeathSavingThrow",
        }
    }

    /// True if a boost's roll keyword applies to this roll type. Family keywords
    /// (`AllSavingThrows`, `AllAbilityChecks`, `AllAbilities`) cover related types.
    pub fn matches_keyword(self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if keyword.eq_ignore_ascii_case(self.as_str()) {
            return true;
        }
        match keyword.to_ascii_lowercase().as_str() {
            "attack" => self == Self::AttackRoll,
            "ability" => self == Self::AbilityCheck,
            "skill" => self == Self::SkillCheck,
            "damage" => self == Self::DamageRoll,
            "allsavingthrows" => matches!(self, Self::SavingThrow | Self::DeathSavingThrow),
            "allabilitychecks" | "allabilities" => {
                matches!(self, Self::AbilityCheck | Self::SkillCheck)
            }
            _ => false,
        }
    }
}

impl fmt::Display for RollType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
