//! Declarative ability records. Stored definitions are never mutated by execution;
//! the pipeline works on clones.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::boost::AbilityScore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    #[serde(alias = "self")]
    SelfOnly,
    #[default]
    Single,
    Multi,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingConfig {
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default = "default_range")]
    pub range: f32,
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
    #[serde(default)]
    pub radius: Option<f32>,
}

fn default_range() -> f32 {
    1.5
}

fn default_max_targets() -> usize {
    1
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::Single,
            range: default_range(),
            max_targets: default_max_targets(),
            radius: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityCost {
    #[serde(default)]
    pub uses_action: bool,
    #[serde(default)]
    pub uses_bonus_action: bool,
    #[serde(default)]
    pub uses_reaction: bool,
    #[serde(default)]
    pub movement_cost: f32,
    #[serde(default)]
    pub resource_costs: BTreeMap<String, i32>,
}

impl AbilityCost {
    pub fn action() -> Self {
        Self {
            uses_action: true,
            ..Self::default()
        }
    }

    pub fn bonus_action() -> Self {
        Self {
            uses_bonus_action: true,
            ..Self::default()
        }
    }

    pub fn reaction() -> Self {
        Self {
            uses_reaction: true,
            ..Self::default()
        }
    }

    pub fn with_resource(mut self, name: impl Into<String>, amount: i32) -> Self {
        self.resource_costs.insert(name.into(), amount);
        self
    }

    pub fn is_free(&self) -> bool {
        !self.uses_action
            && !self.uses_bonus_action
            && !self.uses_reaction
            && self.movement_cost <= 0.0
            && self.resource_costs.values().all(|v| *v <= 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityCooldown {
    #[serde(default)]
    pub turn_cooldown: u32,
    #[serde(default)]
    pub round_cooldown: u32,
    #[serde(default = "default_charges")]
    pub max_charges: u32,
}

fn default_charges() -> u32 {
    1
}

impl AbilityCooldown {
    pub fn turns(turns: u32) -> Self {
        Self {
            turn_cooldown: turns,
            round_cooldown: 0,
            max_charges: 1,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.turn_cooldown > 0 || self.round_cooldown > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    MeleeWeapon,
    RangedWeapon,
    MeleeSpell,
    RangedSpell,
}

impl AttackType {
    pub const fn is_melee(self) -> bool {
        matches!(self, Self::MeleeWeapon | Self::MeleeSpell)
    }

    pub const fn is_weapon(self) -> bool {
        matches!(self, Self::MeleeWeapon | Self::RangedWeapon)
    }
}

/// When an effect applies relative to the attack or save outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCondition {
    OnHit,
    OnMiss,
    OnCrit,
    OnSaveFail,
    OnSaveSuccess,
}

/// Effect template. `effect_type` stays a string so data can name effects the registry
/// does not implement yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    #[serde(rename = "type")]
    pub effect_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_formula: Option<String>,
    #[serde(default)]
    pub amount: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EffectCondition>,
    /// Successful saves take half damage instead of none.
    #[serde(default)]
    pub save_half: bool,
}

impl EffectDefinition {
    pub fn damage(formula: &str, damage_type: &str) -> Self {
        Self {
            effect_type: "damage".to_string(),
            dice_formula: Some(formula.to_string()),
            damage_type: Some(damage_type.to_string()),
            ..Self::default()
        }
    }

    pub fn heal(formula: &str) -> Self {
        Self {
            effect_type: "heal".to_string(),
            dice_formula: Some(formula.to_string()),
            ..Self::default()
        }
    }

    pub fn apply_status(status_id: &str, duration: Option<u32>) -> Self {
        Self {
            effect_type: "apply_status".to_string(),
            status_id: Some(status_id.to_string()),
            status_duration: duration,
            ..Self::default()
        }
    }

    pub fn when(mut self, condition: EffectCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityVariant {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_damage_type: Option<String>,
    #[serde(default)]
    pub additional_damage: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_dice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_status_id: Option<String>,
    /// Replaces the base cost entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_override: Option<AbilityCost>,
    /// Added on top of the base (or overridden) cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_cost: Option<AbilityCost>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcastScaling {
    /// Generic resource charged when the cost has no `spell_slot_N` key.
    #[serde(default)]
    pub resource_key: String,
    #[serde(default)]
    pub base_cost: i32,
    #[serde(default)]
    pub cost_per_level: i32,
    #[serde(default)]
    pub damage_per_level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dice_per_level: Option<String>,
    #[serde(default)]
    pub duration_per_level: u32,
    #[serde(default = "default_divisor")]
    pub per_level_divisor: u32,
    #[serde(default = "default_max_upcast")]
    pub max_upcast_level: u32,
}

fn default_divisor() -> u32 {
    1
}

pub const DEFAULT_MAX_UPCAST_LEVEL: u32 = 9;

fn default_max_upcast() -> u32 {
    DEFAULT_MAX_UPCAST_LEVEL
}

impl Default for UpcastScaling {
    fn default() -> Self {
        Self {
            resource_key: String::new(),
            base_cost: 0,
            cost_per_level: 0,
            damage_per_level: 0,
            dice_per_level: None,
            duration_per_level: 0,
            per_level_divisor: default_divisor(),
            max_upcast_level: default_max_upcast(),
        }
    }
}

impl UpcastScaling {
    /// `level / divisor`, with a zero divisor treated as one.
    pub fn steps(&self, upcast_level: u32) -> u32 {
        upcast_level / self.per_level_divisor.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementKind {
    HasStatus { status_id: String },
    HasTag { tag: String },
    HpBelowPercent { percent: i32 },
    HasBoost { boost_type: String },
    HasWeapon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityRequirement {
    #[serde(flatten)]
    pub kind: RequirementKind,
    /// The requirement must NOT hold.
    #[serde(default)]
    pub inverted: bool,
}

impl AbilityRequirement {
    pub fn new(kind: RequirementKind) -> Self {
        Self {
            kind,
            inverted: false,
        }
    }

    pub fn inverted(kind: RequirementKind) -> Self {
        Self {
            kind,
            inverted: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub targeting: TargetingConfig,
    #[serde(default)]
    pub cost: AbilityCost,
    #[serde(default)]
    pub cooldown: AbilityCooldown,
    #[serde(default)]
    pub effects: Vec<EffectDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<AttackType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_type: Option<AbilityScore>,
    /// Explicit DC; derived from the caster when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i32>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub variants: Vec<AbilityVariant>,
    #[serde(default)]
    pub can_upcast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upcast: Option<UpcastScaling>,
    #[serde(default)]
    pub requirements: Vec<AbilityRequirement>,
    #[serde(default)]
    pub requires_concentration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration_status_id: Option<String>,
}

impl AbilityDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn variant(&self, variant_id: &str) -> Option<&AbilityVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn is_spell(&self) -> bool {
        self.has_tag("spell")
            || matches!(
                self.attack_type,
                Some(AttackType::MeleeSpell | AttackType::RangedSpell)
            )
    }

    /// Explicit concentration status, else the first `apply_status` effect's id.
    pub fn concentration_status(&self) -> Option<String> {
        self.concentration_status_in(&self.effects)
    }

    /// Same lookup over a shaped effect list, where a variant may have replaced the id.
    pub fn concentration_status_in(&self, effects: &[EffectDefinition]) -> Option<String> {
        self.concentration_status_id.clone().or_else(|| {
            effects
                .iter()
                .find(|e| e.effect_type.eq_ignore_ascii_case("apply_status"))
                .and_then(|e| e.status_id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_definition_fills_defaults() {
        let yaml = r#"
id: fire_bolt
tags: [spell, cantrip]
attack_type: ranged_spell
cost:
  uses_action: true
effects:
  - type: damage
    dice_formula: 1d10
    damage_type: Fire
    condition: on_hit
requirements:
  - kind: has_status
    status_id: SILENCED
    inverted: true
"#;
        let ability: AbilityDefinition = serde_yaml::from_str(yaml).expect("valid yaml");
        assert!(ability.is_spell());
        assert_eq!(ability.cooldown.max_charges, 1);
        assert!(!ability.cooldown.is_defined());
        assert_eq!(ability.effects[0].condition, Some(EffectCondition::OnHit));
        assert!(ability.requirements[0].inverted);
        assert_eq!(ability.targeting.kind, TargetKind::Single);
    }

    #[test]
    fn concentration_status_falls_back_to_first_apply_status() {
        let mut ability = AbilityDefinition::new("bless");
        ability.effects.push(EffectDefinition::heal("1"));
        ability.effects.push(EffectDefinition::apply_status("BLESSED", Some(10)));
        assert_eq!(ability.concentration_status().as_deref(), Some("BLESSED"));
        ability.concentration_status_id = Some("BLESS_AURA".to_string());
        assert_eq!(ability.concentration_status().as_deref(), Some("BLESS_AURA"));
    }

    #[test]
    fn concentration_status_reads_the_given_effects() {
        let mut ability = AbilityDefinition::new("hex");
        ability.effects.push(EffectDefinition::apply_status("HEXED", None));
        let shaped = vec![EffectDefinition::apply_status("HEXED_GREATER", None)];
        assert_eq!(ability.concentration_status_in(&shaped).as_deref(), Some("HEXED_GREATER"));
        assert_eq!(ability.concentration_status_in(&[]), None);
    }

    #[test]
    fn upcast_steps_use_integer_division() {
        let scaling = UpcastScaling {
            per_level_divisor: 2,
            ..UpcastScaling::default()
        };
        assert_eq!(scaling.steps(3), 1);
        assert_eq!(scaling.steps(4), 2);
        let zero = UpcastScaling {
            per_level_divisor: 0,
            ..UpcastScaling::default()
        };
        assert_eq!(zero.steps(3), 3);
    }
}
