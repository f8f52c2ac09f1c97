//! Built-in effect handlers.

use tracing::{debug, warn};

use crate::ability::definition::{AbilityDefinition, EffectDefinition};
use crate::ability::effects::{
    DamageEvent, EffectContext, EffectHandler, EffectKind, EffectPreview, EffectResult,
    PreviewContext,
};
use crate::boost::{BoostEvaluator, ConditionContext, EvaluationContext, ResistanceLevel};
use crate::combat::combatant::Combatant;
use crate::combat::dice::DiceFormula;
use crate::combat::status::StatusApplication;

const UNTYPED: &str = "Untyped";

fn parse_formula(text: Option<&str>) -> DiceFormula {
    match text {
        Some(raw) => raw.parse().unwrap_or_else(|err| {
            warn!(%err, "falling back to zero damage");
            DiceFormula::default()
        }),
        None => DiceFormula::default(),
    }
}

/// Formula, modifier and damage type of a damage effect. An effect without dice on a
/// weapon attack falls back to the wielded weapon plus the attack ability modifier.
fn damage_basis(
    effect: &EffectDefinition,
    ability: &AbilityDefinition,
    source: Option<&Combatant>,
) -> (DiceFormula, i32, String) {
    let weapon_attack = ability.attack_type.map_or(false, |t| t.is_weapon());
    let weapon = source.and_then(|s| s.weapon.as_ref().map(|w| (s, w)));
    match (effect.dice_formula.as_deref(), weapon) {
        (None, Some((wielder, weapon))) if weapon_attack => {
            let ranged = ability.attack_type.map_or(false, |t| !t.is_melee());
            let modifier = wielder.ability_modifier(wielder.weapon_attack_ability(ranged));
            let damage_type = effect
                .damage_type
                .clone()
                .unwrap_or_else(|| weapon.damage_type.clone());
            (parse_formula(Some(&weapon.damage)), modifier, damage_type)
        }
        (formula, _) => (
            parse_formula(formula),
            0,
            effect
                .damage_type
                .clone()
                .unwrap_or_else(|| UNTYPED.to_string()),
        ),
    }
}

fn flat_preview(formula: DiceFormula, flat: i32) -> EffectPreview {
    EffectPreview {
        min: formula.min() + flat,
        max: formula.max() + flat,
        average: formula.average() + f64::from(flat),
    }
}

pub struct DamageHandler;

impl EffectHandler for DamageHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let targets = ctx.applicable_targets(effect);
        let (formula, modifier, damage_type) = damage_basis(effect, ctx.ability, ctx.source());
        let is_melee = ctx.ability.attack_type.map(|t| t.is_melee());
        let mut results = Vec::with_capacity(targets.len());

        for target_id in &targets {
            if ctx.world.combatant(target_id).is_none() {
                results.push(EffectResult::failed(EffectKind::Damage, target_id, "unknown target"));
                continue;
            }
            let adjustment = ctx.damage_adjustment(target_id);
            if adjustment.prevented {
                debug!(source = ctx.source_id, target = %target_id, "damage prevented");
                results.push(EffectResult::failed(
                    EffectKind::Damage,
                    target_id,
                    "damage prevented",
                ));
                continue;
            }
            let critical = ctx.is_critical(target_id);
            let halved = effect.save_half && ctx.saved(target_id) == Some(true);

            let (bonus, extra_crit_dice, ignored) = {
                let world = &*ctx.world;
                match world.combatant(ctx.source_id) {
                    Some(source) => {
                        let mut conditions = ConditionContext::for_actor(ctx.source_id)
                            .with_target(target_id)
                            .with_statuses(world)
                            .with_ability_tags(&ctx.ability.tags)
                            .with_damage_type(&damage_type);
                        if let Some(melee) = is_melee {
                            conditions = conditions.with_melee(melee);
                        }
                        let evaluator = BoostEvaluator::new(&source.boosts)
                            .with_context(EvaluationContext::new(ctx.conditions, conditions));
                        (
                            evaluator.damage_bonus(&damage_type),
                            evaluator.critical_hit_extra_dice(),
                            evaluator.ignored_resistance(&damage_type),
                        )
                    }
                    None => (0, 0, None),
                }
            };

            let mut rolled = if critical {
                formula.roll_with_dice_multiplier(ctx.rng, 2)
            } else {
                formula.roll(ctx.rng)
            };
            if critical && extra_crit_dice > 0 && formula.has_dice() {
                let extra_dice = DiceFormula::new(extra_crit_dice as u32, formula.sides, 0);
                let extra = extra_dice.roll(ctx.rng);
                rolled = rolled.saturating_add(extra);
            }
            let mut amount = [effect.amount, modifier, bonus, adjustment.modifier]
                .into_iter()
                .fold(rolled, i32::saturating_add)
                .max(0);
            if halved {
                amount /= 2;
            }

            let (reduction, level) = {
                let world = &*ctx.world;
                let Some(target) = world.combatant(target_id) else {
                    continue;
                };
                let conditions = ConditionContext::for_actor(target_id)
                    .with_target(ctx.source_id)
                    .with_statuses(world)
                    .with_damage_type(&damage_type);
                let evaluator = BoostEvaluator::new(&target.boosts)
                    .with_context(EvaluationContext::new(ctx.conditions, conditions));
                (
                    evaluator.damage_reduction(&damage_type),
                    evaluator.resistance_level(&damage_type),
                )
            };
            amount = amount.saturating_sub(reduction).max(0);
            let level = match ignored {
                Some(ignored) if level > ResistanceLevel::Normal && ignored >= level => {
                    ResistanceLevel::Normal
                }
                _ => level,
            };
            let dealt = level.apply(amount);

            let Some(target) = ctx.world.combatant_mut(target_id) else {
                continue;
            };
            let lost = target.take_damage(dealt);
            debug!(
                source = ctx.source_id,
                target = %target_id,
                dealt,
                lost,
                damage_type = %damage_type,
                critical,
                "damage applied"
            );
            ctx.damage_events.push(DamageEvent {
                source_id: ctx.source_id.to_string(),
                target_id: target_id.clone(),
                amount: dealt,
                damage_type: damage_type.clone(),
            });
            let mut result = EffectResult::new(EffectKind::Damage, target_id, dealt);
            result.damage_type = Some(damage_type.clone());
            results.push(result);
        }
        results
    }

    fn preview(
        &self,
        effect: &EffectDefinition,
        ctx: &PreviewContext<'_>,
    ) -> Option<EffectPreview> {
        let (formula, modifier, damage_type) = damage_basis(effect, ctx.ability, ctx.source);
        let bonus = ctx
            .source
            .map_or(0, |s| BoostEvaluator::new(&s.boosts).damage_bonus(&damage_type));
        Some(flat_preview(formula, effect.amount + modifier + bonus))
    }
}

fn rolled_amount(effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> i32 {
    (parse_formula(effect.dice_formula.as_deref()).roll(ctx.rng) + effect.amount).max(0)
}

pub struct HealHandler;

impl EffectHandler for HealHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let mut results = Vec::new();
        for target_id in ctx.applicable_targets(effect) {
            let amount = rolled_amount(effect, ctx);
            match ctx.world.combatant_mut(&target_id) {
                Some(target) => {
                    let healed = target.heal(amount);
                    results.push(EffectResult::new(EffectKind::Heal, &target_id, healed));
                }
                None => results.push(EffectResult::failed(
                    EffectKind::Heal,
                    &target_id,
                    "unknown target",
                )),
            }
        }
        results
    }

    fn preview(
        &self,
        effect: &EffectDefinition,
        _ctx: &PreviewContext<'_>,
    ) -> Option<EffectPreview> {
        Some(flat_preview(parse_formula(effect.dice_formula.as_deref()), effect.amount))
    }
}

pub struct TemporaryHpHandler;

impl EffectHandler for TemporaryHpHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let mut results = Vec::new();
        for target_id in ctx.applicable_targets(effect) {
            let amount = rolled_amount(effect, ctx);
            match ctx.world.combatant_mut(&target_id) {
                Some(target) => {
                    let granted = target.grant_temp_hp(amount);
                    results.push(EffectResult::new(EffectKind::TemporaryHp, &target_id, granted));
                }
                None => results.push(EffectResult::failed(
                    EffectKind::TemporaryHp,
                    &target_id,
                    "unknown target",
                )),
            }
        }
        results
    }

    fn preview(
        &self,
        effect: &EffectDefinition,
        _ctx: &PreviewContext<'_>,
    ) -> Option<EffectPreview> {
        Some(flat_preview(parse_formula(effect.dice_formula.as_deref()), effect.amount))
    }
}

pub struct ApplyStatusHandler;

impl EffectHandler for ApplyStatusHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let Some(status_id) = effect.status_id.as_deref() else {
            warn!(ability = %ctx.ability.id, "apply_status effect without status_id");
            return Vec::new();
        };
        let mut results = Vec::new();
        for target_id in ctx.applicable_targets(effect) {
            let outcome = ctx
                .world
                .apply_status(&target_id, status_id, ctx.source_id, effect.status_duration);
            let mut result = match outcome {
                Ok(StatusApplication::Immune) => {
                    EffectResult::failed(EffectKind::ApplyStatus, &target_id, "immune")
                }
                Ok(_) => EffectResult::new(EffectKind::ApplyStatus, &target_id, 1),
                Err(err) => {
                    EffectResult::failed(EffectKind::ApplyStatus, &target_id, err.to_string())
                }
            };
            result.status_id = Some(status_id.to_string());
            results.push(result);
        }
        results
    }
}

pub struct RemoveStatusHandler;

impl EffectHandler for RemoveStatusHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let Some(status_id) = effect.status_id.as_deref() else {
            warn!(ability = %ctx.ability.id, "remove_status effect without status_id");
            return Vec::new();
        };
        ctx.applicable_targets(effect)
            .into_iter()
            .map(|target_id| {
                let mut result = if ctx.world.remove_status(&target_id, status_id) {
                    EffectResult::new(EffectKind::RemoveStatus, &target_id, 1)
                } else {
                    EffectResult::failed(EffectKind::RemoveStatus, &target_id, "status not active")
                };
                result.status_id = Some(status_id.to_string());
                result
            })
            .collect()
    }
}

pub struct RestoreResourceHandler;

impl EffectHandler for RestoreResourceHandler {
    fn execute(&self, effect: &EffectDefinition, ctx: &mut EffectContext<'_>) -> Vec<EffectResult> {
        let Some(resource) = effect.resource.as_deref() else {
            warn!(ability = %ctx.ability.id, "restore_resource effect without resource");
            return Vec::new();
        };
        let mut results = Vec::new();
        for target_id in ctx.applicable_targets(effect) {
            let amount = rolled_amount(effect, ctx);
            match ctx.world.combatant_mut(&target_id) {
                Some(target) => {
                    let restored = target.resources.restore(resource, amount);
                    let kind = EffectKind::RestoreResource;
                    results.push(EffectResult::new(kind, &target_id, restored));
                }
                None => results.push(EffectResult::failed(
                    EffectKind::RestoreResource,
                    &target_id,
                    "unknown target",
                )),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ability::definition::{AttackType, EffectCondition};
    use crate::ability::effects::DamageAdjustment;
    use crate::boost::{source, BasicConditionEvaluator};
    use crate::combat::combatant::Weapon;
    use crate::combat::rng::Rng;
    use crate::combat::roll::{AttackRollResult, RollMode, SaveRollResult};
    use crate::combat::world::CombatWorld;

    fn world() -> CombatWorld {
        let mut world = CombatWorld::new();
        let mut fighter = Combatant::new("fighter", "party", 30)
            .with_weapon(Weapon::melee("longsword", "1d8", "Slashing"));
        fighter.ability_scores.strength = 16;
        world.add_combatant(fighter).expect("add fighter");
        world
            .add_combatant(Combatant::new("ogre", "monsters", 60))
            .expect("add ogre");
        world
    }

    fn attack(hit: bool, critical: bool) -> AttackRollResult {
        AttackRollResult {
            natural: if critical { 20 } else { 12 },
            rolls: vec![12],
            mode: RollMode::Normal,
            total: 17,
            hit,
            critical,
            fumble: false,
        }
    }

    fn run(
        world: &mut CombatWorld,
        ability: &AbilityDefinition,
        effect: &EffectDefinition,
        attacks: &BTreeMap<String, AttackRollResult>,
        saves: &BTreeMap<String, SaveRollResult>,
        handler: &dyn EffectHandler,
    ) -> (Vec<EffectResult>, Vec<DamageEvent>) {
        run_adjusted(world, ability, effect, attacks, saves, &BTreeMap::new(), handler)
    }

    fn run_adjusted(
        world: &mut CombatWorld,
        ability: &AbilityDefinition,
        effect: &EffectDefinition,
        attacks: &BTreeMap<String, AttackRollResult>,
        saves: &BTreeMap<String, SaveRollResult>,
        adjustments: &BTreeMap<String, DamageAdjustment>,
        handler: &dyn EffectHandler,
    ) -> (Vec<EffectResult>, Vec<DamageEvent>) {
        let targets = vec!["ogre".to_string()];
        let mut rng = Rng::new(7);
        let mut ctx = EffectContext {
            source_id: "fighter",
            targets: &targets,
            ability,
            world,
            rng: &mut rng,
            conditions: &BasicConditionEvaluator,
            attacks,
            attack_cancelled: false,
            saves,
            damage_adjustments: adjustments,
            damage_events: Vec::new(),
        };
        let results = handler.execute(effect, &mut ctx);
        (results, ctx.damage_events)
    }

    #[test]
    fn weapon_attack_without_formula_uses_weapon_and_modifier() {
        let mut world = world();
        let mut ability = AbilityDefinition::new("main_hand_attack");
        ability.attack_type = Some(AttackType::MeleeWeapon);
        let effect = EffectDefinition {
            effect_type: "damage".to_string(),
            condition: Some(EffectCondition::OnHit),
            ..EffectDefinition::default()
        };
        let attacks = BTreeMap::from([("ogre".to_string(), attack(true, false))]);
        let (results, events) =
            run(&mut world, &ability, &effect, &attacks, &BTreeMap::new(), &DamageHandler);
        assert_eq!(results.len(), 1);
        let dealt = results[0].value;
        assert!((4..=11).contains(&dealt), "1d8+3 out of range: {dealt}");
        assert_eq!(results[0].damage_type.as_deref(), Some("Slashing"));
        assert_eq!(events[0].amount, dealt);
        assert_eq!(world.combatant("ogre").map(|c| c.hp), Some(60 - dealt));
    }

    #[test]
    fn miss_deals_nothing() {
        let mut world = world();
        let mut ability = AbilityDefinition::new("swing");
        ability.attack_type = Some(AttackType::MeleeWeapon);
        let effect = EffectDefinition::damage("1d8", "Slashing").when(EffectCondition::OnHit);
        let attacks = BTreeMap::from([("ogre".to_string(), attack(false, false))]);
        let (results, events) =
            run(&mut world, &ability, &effect, &attacks, &BTreeMap::new(), &DamageHandler);
        assert!(results.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn resistance_halves_and_damage_bonus_adds() {
        let mut world = world();
        world
            .grant_boosts("ogre", source::PASSIVE, "thick_hide", "Resistance(Fire,Resistant)")
            .expect("grant");
        world
            .grant_boosts("fighter", source::FEAT, "savage", "DamageBonus(4,Fire)")
            .expect("grant");
        let ability = AbilityDefinition::new("flame");
        let effect = EffectDefinition {
            amount: 6,
            ..EffectDefinition::damage("0", "Fire")
        };
        let none = BTreeMap::new();
        let (results, _) =
            run(&mut world, &ability, &effect, &none, &BTreeMap::new(), &DamageHandler);
        assert_eq!(results[0].value, 5);
    }

    #[test]
    fn adjustments_add_before_resistance_or_prevent_damage() {
        let mut world = world();
        world
            .grant_boosts("ogre", source::PASSIVE, "thick_hide", "Resistance(Fire,Resistant)")
            .expect("grant");
        let ability = AbilityDefinition::new("flame");
        let effect = EffectDefinition {
            amount: 6,
            ..EffectDefinition::damage("0", "Fire")
        };
        let boosted = BTreeMap::from([(
            "ogre".to_string(),
            DamageAdjustment { modifier: 4, prevented: false },
        )]);
        let (results, _) = run_adjusted(
            &mut world,
            &ability,
            &effect,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &boosted,
            &DamageHandler,
        );
        assert_eq!(results[0].value, 5);

        let warded = BTreeMap::from([(
            "ogre".to_string(),
            DamageAdjustment { modifier: 0, prevented: true },
        )]);
        let (results, events) = run_adjusted(
            &mut world,
            &ability,
            &effect,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &warded,
            &DamageHandler,
        );
        assert!(!results[0].success);
        assert!(events.is_empty());
        assert_eq!(world.combatant("ogre").map(|c| c.hp), Some(55));
    }

    #[test]
    fn save_half_halves_for_savers() {
        let mut world = world();
        let ability = AbilityDefinition::new("burst");
        let mut effect = EffectDefinition {
            amount: 9,
            ..EffectDefinition::damage("0", "Fire")
        }
        .when(EffectCondition::OnSaveFail);
        effect.save_half = true;
        let saves = BTreeMap::from([(
            "ogre".to_string(),
            SaveRollResult {
                natural: 18,
                rolls: vec![18],
                mode: RollMode::Normal,
                total: 18,
                dc: 13,
                success: true,
                critical_failure: false,
                forced: false,
            },
        )]);
        let (results, _) =
            run(&mut world, &ability, &effect, &BTreeMap::new(), &saves, &DamageHandler);
        assert_eq!(results[0].value, 4);
    }

    #[test]
    fn immune_status_reports_failure() {
        let mut world = world();
        world
            .grant_boosts("ogre", source::PASSIVE, "mindless", "StatusImmunity(FRIGHTENED)")
            .expect("grant");
        let ability = AbilityDefinition::new("scare");
        let effect = EffectDefinition::apply_status("FRIGHTENED", Some(2));
        let none = BTreeMap::new();
        let (results, _) =
            run(&mut world, &ability, &effect, &none, &BTreeMap::new(), &ApplyStatusHandler);
        assert!(!results[0].success);
        assert!(!world.statuses.is_active("ogre", "FRIGHTENED"));
    }

    #[test]
    fn heal_caps_at_max_hp() {
        let mut world = world();
        if let Some(ogre) = world.combatant_mut("ogre") {
            ogre.hp = 55;
        }
        let ability = AbilityDefinition::new("cure");
        let effect = EffectDefinition {
            amount: 20,
            ..EffectDefinition::heal("0")
        };
        let none = BTreeMap::new();
        let (results, _) =
            run(&mut world, &ability, &effect, &none, &BTreeMap::new(), &HealHandler);
        assert_eq!(results[0].value, 5);
    }

    #[test]
    fn damage_preview_spans_formula() {
        let ability = AbilityDefinition::new("bolt");
        let effect = EffectDefinition {
            amount: 2,
            ..EffectDefinition::damage("2d6", "Lightning")
        };
        let preview = DamageHandler
            .preview(&effect, &PreviewContext { source: None, ability: &ability })
            .expect("preview");
        assert_eq!((preview.min, preview.max), (4, 14));
        assert!((preview.average - 9.0).abs() < f64::EPSILON);
    }
}
