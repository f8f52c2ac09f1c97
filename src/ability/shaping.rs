//! Per-execution effect lists: cloned from the definition, variant applied first,
//! upcast scaling on top.

use crate::ability::definition::{AbilityDefinition, AbilityVariant, EffectDefinition};
use crate::combat::dice::combine_formula_strings;

fn is_damage(effect: &EffectDefinition) -> bool {
    effect.effect_type.eq_ignore_ascii_case("damage")
}

fn is_status(effect: &EffectDefinition) -> bool {
    effect.effect_type.eq_ignore_ascii_case("apply_status")
}

fn apply_variant(effects: &mut [EffectDefinition], variant: &AbilityVariant) {
    for effect in effects.iter_mut() {
        if is_damage(effect) {
            if let Some(damage_type) = &variant.replace_damage_type {
                effect.damage_type = Some(damage_type.clone());
            }
            effect.amount += variant.additional_damage;
            if let Some(dice) = &variant.additional_dice {
                effect.dice_formula = combine_formula_strings(effect.dice_formula.as_deref(), dice);
            }
        }
        if is_status(effect) {
            if let Some(status_id) = &variant.replace_status_id {
                effect.status_id = Some(status_id.clone());
            }
        }
    }
}

fn apply_upcast(effects: &mut [EffectDefinition], ability: &AbilityDefinition, upcast_level: u32) {
    let Some(scaling) = ability.upcast.as_ref() else {
        return;
    };
    let steps = scaling.steps(upcast_level);
    if steps == 0 {
        return;
    }
    for effect in effects.iter_mut() {
        if is_damage(effect) || effect.effect_type.eq_ignore_ascii_case("heal") {
            effect.amount += scaling.damage_per_level * steps as i32;
            if let Some(dice) = &scaling.dice_per_level {
                for _ in 0..steps {
                    effect.dice_formula =
                        combine_formula_strings(effect.dice_formula.as_deref(), dice);
                }
            }
        }
        if is_status(effect) && scaling.duration_per_level > 0 {
            if let Some(duration) = effect.status_duration.as_mut() {
                *duration += scaling.duration_per_level * steps;
            }
        }
    }
}

/// Effects for one execution. The definition's own list is never touched.
pub fn effective_effects(
    ability: &AbilityDefinition,
    variant: Option<&AbilityVariant>,
    upcast_level: u32,
) -> Vec<EffectDefinition> {
    let mut effects = ability.effects.clone();
    if let Some(variant) = variant {
        apply_variant(&mut effects, variant);
    }
    if upcast_level > 0 {
        apply_upcast(&mut effects, ability, upcast_level);
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::definition::UpcastScaling;

    fn fireball() -> AbilityDefinition {
        let mut ability = AbilityDefinition::new("fireball");
        ability.effects.push(EffectDefinition::damage("8d6", "Fire"));
        ability.effects.push(EffectDefinition::apply_status("BURNING", Some(1)));
        ability.can_upcast = true;
        ability.upcast = Some(UpcastScaling {
            dice_per_level: Some("1d6".to_string()),
            duration_per_level: 1,
            ..UpcastScaling::default()
        });
        ability
    }

    #[test]
    fn upcast_adds_dice_per_step() {
        let effects = effective_effects(&fireball(), None, 2);
        assert_eq!(effects[0].dice_formula.as_deref(), Some("10d6"));
        assert_eq!(effects[1].status_duration, Some(3));
    }

    #[test]
    fn variant_applies_before_upcast() {
        let variant = AbilityVariant {
            id: "transmuted".to_string(),
            replace_damage_type: Some("Cold".to_string()),
            additional_dice: Some("1d6".to_string()),
            additional_damage: 2,
            replace_status_id: Some("CHILLED".to_string()),
            ..AbilityVariant::default()
        };
        let effects = effective_effects(&fireball(), Some(&variant), 1);
        assert_eq!(effects[0].damage_type.as_deref(), Some("Cold"));
        assert_eq!(effects[0].dice_formula.as_deref(), Some("10d6"));
        assert_eq!(effects[0].amount, 2);
        assert_eq!(effects[1].status_id.as_deref(), Some("CHILLED"));
    }

    #[test]
    fn divisor_groups_levels() {
        let mut ability = fireball();
        if let Some(scaling) = ability.upcast.as_mut() {
            scaling.per_level_divisor = 2;
        }
        let effects = effective_effects(&ability, None, 3);
        assert_eq!(effects[0].dice_formula.as_deref(), Some("9d6"));
    }

    #[test]
    fn differing_dice_fold_into_flat_bonus() {
        let mut ability = fireball();
        ability.upcast = Some(UpcastScaling {
            dice_per_level: Some("1d4".to_string()),
            ..UpcastScaling::default()
        });
        let effects = effective_effects(&ability, None, 1);
        assert_eq!(effects[0].dice_formula.as_deref(), Some("8d6+2"));
    }

    #[test]
    fn stored_effects_are_unchanged() {
        let ability = fireball();
        let snapshot = ability.effects.clone();
        let _ = effective_effects(&ability, None, 4);
        assert_eq!(ability.effects, snapshot);
    }
}
