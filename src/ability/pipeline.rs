//! Ability execution: validate, pay, declare, roll, resolve effects, book-keep.
//!
//! One [AbilityPipeline] serves one encounter. It owns the ability catalogue, the
//! collaborator services and the cooldown state; the [CombatWorld] is passed in per call.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ability::cooldown::{CooldownSnapshot, CooldownTracker};
use crate::ability::cost::effective_cost;
use crate::ability::definition::{
    AbilityCost, AbilityDefinition, EffectDefinition, DEFAULT_MAX_UPCAST_LEVEL,
};
use crate::ability::effects::{
    DamageAdjustment, EffectContext, EffectKind, EffectPreview, EffectRegistry, PreviewContext,
};
use crate::ability::requirements::unmet_requirement;
use crate::ability::result::{AbilityExecutionResult, ExecutionOptions, ValidationFailure};
use crate::ability::shaping::effective_effects;
use crate::boost::{
    AbilityScore, BasicConditionEvaluator, BoostEvaluator, ConditionContext, ConditionEvaluator,
    EvaluationContext, RollType,
};
use crate::combat::budget::ActionBudget;
use crate::combat::concentration::{Concentration, ConcentrationTracker};
use crate::combat::rng::Rng;
use crate::combat::roll::{
    AttackQuery, AttackRollResult, D20RollService, RollService, SaveQuery, SaveRollResult,
};
use crate::combat::services::{
    HeightService, LineOfSightService, ReactionResolver, ReactionTrigger, ReactionTriggerKind,
};
use crate::combat::status::{ids, StatusQuery, StatusService};
use crate::combat::trace::{CombatEvent, EventSource, TraceCollector};
use crate::combat::world::CombatWorld;
use crate::config::EngineConfig;
use crate::rules::{
    push_unique, RuleEvent, RuleEventBus, RuleEventKind, RuleWindow, RuleWindowContext,
    RuleWindowDispatcher,
};

pub type AbilityObserver = Box<dyn FnMut(&AbilityExecutionResult)>;

pub const UNCOUNTERABLE_TAG: &str = "uncounterable";

pub struct AbilityPipeline {
    abilities: BTreeMap<String, AbilityDefinition>,
    effects: EffectRegistry,
    rules: RuleWindowDispatcher,
    events: RuleEventBus,
    rolls: Box<dyn RollService>,
    conditions: Box<dyn ConditionEvaluator>,
    height: Option<Box<dyn HeightService>>,
    line_of_sight: Option<Box<dyn LineOfSightService>>,
    reactions: Option<Box<dyn ReactionResolver>>,
    concentration: Option<Box<dyn ConcentrationTracker>>,
    cooldowns: CooldownTracker,
    rng: Rng,
    config: EngineConfig,
    observers: Vec<AbilityObserver>,
}

impl Default for AbilityPipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AbilityPipeline {
    /// Built-in handlers, d20 rolls and the basic condition evaluator. Optional services
    /// start absent.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            abilities: BTreeMap::new(),
            effects: EffectRegistry::with_builtin_handlers(),
            rules: RuleWindowDispatcher::new(),
            events: RuleEventBus::new(),
            rolls: Box::new(D20RollService),
            conditions: Box::new(BasicConditionEvaluator),
            height: None,
            line_of_sight: None,
            reactions: None,
            concentration: None,
            cooldowns: CooldownTracker::new(),
            rng: Rng::new(config.seed),
            config,
            observers: Vec::new(),
        }
    }

    pub fn with_roll_service(mut self, rolls: Box<dyn RollService>) -> Self {
        self.rolls = rolls;
        self
    }

    pub fn with_condition_evaluator(mut self, conditions: Box<dyn ConditionEvaluator>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_effect_registry(mut self, effects: EffectRegistry) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_height_service(mut self, height: Box<dyn HeightService>) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_line_of_sight(mut self, line_of_sight: Box<dyn LineOfSightService>) -> Self {
        self.line_of_sight = Some(line_of_sight);
        self
    }

    pub fn with_reaction_resolver(mut self, reactions: Box<dyn ReactionResolver>) -> Self {
        self.reactions = Some(reactions);
        self
    }

    pub fn with_concentration_tracker(mut self, tracker: Box<dyn ConcentrationTracker>) -> Self {
        self.concentration = Some(tracker);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Later registrations replace earlier ones with the same id.
    pub fn register_ability(&mut self, ability: AbilityDefinition) {
        self.abilities.insert(ability.id.clone(), ability);
    }

    pub fn register_abilities(&mut self, abilities: impl IntoIterator<Item = AbilityDefinition>) {
        for ability in abilities {
            self.register_ability(ability);
        }
    }

    pub fn ability(&self, ability_id: &str) -> Option<&AbilityDefinition> {
        self.abilities.get(ability_id)
    }

    pub fn abilities(&self) -> impl Iterator<Item = &AbilityDefinition> {
        self.abilities.values()
    }

    pub fn rules_mut(&mut self) -> &mut RuleWindowDispatcher {
        &mut self.rules
    }

    pub fn events_mut(&mut self) -> &mut RuleEventBus {
        &mut self.events
    }

    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        &mut self.effects
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn concentration(&self) -> Option<&dyn ConcentrationTracker> {
        self.concentration.as_deref()
    }

    /// Called after every successful execution.
    pub fn on_ability_executed<F>(&mut self, observer: F)
    where
        F: FnMut(&AbilityExecutionResult) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn can_use(
        &self,
        world: &CombatWorld,
        ability_id: &str,
        source_id: &str,
        options: &ExecutionOptions,
    ) -> Result<(), ValidationFailure> {
        self.validate(world, ability_id, source_id, options).map(|_| ())
    }

    /// Gates in order; the first failure wins. Nothing is mutated here.
    fn validate(
        &self,
        world: &CombatWorld,
        ability_id: &str,
        source_id: &str,
        options: &ExecutionOptions,
    ) -> Result<AbilityCost, ValidationFailure> {
        let ability = self
            .abilities
            .get(ability_id)
            .ok_or_else(|| ValidationFailure::new(format!("Unknown ability: {ability_id}")))?;

        let variant = match options.variant_id.as_deref() {
            Some(variant_id) => Some(ability.variant(variant_id).ok_or_else(|| {
                ValidationFailure::new(format!("Unknown variant: {variant_id}"))
            })?),
            None => None,
        };

        if options.upcast_level > 0 {
            if !ability.can_upcast {
                return Err(ValidationFailure::new("Ability cannot be upcast"));
            }
            let max = ability
                .upcast
                .as_ref()
                .map_or(DEFAULT_MAX_UPCAST_LEVEL, |u| u.max_upcast_level);
            if options.upcast_level > max {
                return Err(ValidationFailure::new(format!(
                    "Upcast level {} exceeds maximum {max}",
                    options.upcast_level
                )));
            }
        }

        let cost = effective_cost(ability, variant, options.upcast_level);

        if !self.cooldowns.has_charges(source_id, ability_id) {
            return Err(ValidationFailure::new("Ability is on cooldown"));
        }

        if let Some(reason) = unmet_requirement(&ability.requirements, world, source_id) {
            return Err(ValidationFailure::new(reason));
        }

        if !world.is_active(source_id) {
            return Err(ValidationFailure::new("Source is not active"));
        }

        let flags = ActionBudget::economy_flags(&cost);
        if let Some(status_id) = world.statuses.blocking_status(source_id, ability_id, &flags) {
            return Err(ValidationFailure::new(format!("Blocked by status {status_id}")));
        }

        if !options.skip_cost_validation {
            let source = world
                .combatant(source_id)
                .ok_or_else(|| ValidationFailure::new(format!("Unknown combatant: {source_id}")))?;
            source.budget.can_pay(&cost).map_err(ValidationFailure::new)?;
            source
                .resources
                .can_pay(&cost.resource_costs)
                .map_err(ValidationFailure::new)?;
        }
        Ok(cost)
    }

    pub fn execute(
        &mut self,
        world: &mut CombatWorld,
        ability_id: &str,
        source_id: &str,
        targets: &[String],
        options: &ExecutionOptions,
    ) -> AbilityExecutionResult {
        let cost = match self.validate(world, ability_id, source_id, options) {
            Ok(cost) => cost,
            Err(failure) => {
                debug!(
                    ability = ability_id,
                    source = source_id,
                    reason = %failure,
                    "ability rejected"
                );
                return AbilityExecutionResult::failure(ability_id, source_id, failure.reason);
            }
        };
        let Some(ability) = self.abilities.get(ability_id).cloned() else {
            return AbilityExecutionResult::failure(ability_id, source_id, "Unknown ability");
        };
        let variant = options
            .variant_id
            .as_deref()
            .and_then(|id| ability.variant(id))
            .cloned();

        if let Some(source) = world.combatant_mut(source_id) {
            source.budget.consume(&cost);
            source.resources.consume(&cost.resource_costs);
        }

        let mut result = AbilityExecutionResult::started(ability_id, source_id, targets);
        result.effective_cost = Some(cost);
        let mut trace = TraceCollector::new(true);
        let round = world.round;
        let event = |event_type: &str, phase: &str, target: Option<&str>| {
            CombatEvent::new(
                event_type,
                phase,
                EventSource {
                    actor_id: Some(source_id.to_string()),
                    target_id: target.map(str::to_string),
                    ability_id: Some(ability_id.to_string()),
                },
            )
            .in_round(round)
        };
        trace.record(
            event("ability_declared", "declare", None)
                .with_value("targets", targets.len())
                .with_value("upcast_level", options.upcast_level),
        );

        if let Some(reason) = self.declare(world, &ability, source_id, targets) {
            debug!(ability = ability_id, source = source_id, %reason, "ability cancelled");
            result.cancelled = true;
            result.failure_reason = Some(reason);
            trace.record(event("ability_cancelled", "declare", None));
            result.events = trace.into_events();
            return result;
        }

        if let Some(reactor_id) = self.offer_counter(world, &ability, source_id, targets) {
            debug!(
                ability = ability_id,
                source = source_id,
                reactor = %reactor_id,
                "ability countered"
            );
            let mut countered = RuleEvent::new(RuleEventKind::AbilityCountered, source_id)
                .for_ability(ability_id, targets)
                .with_value("reactor_id", reactor_id.clone());
            self.events.dispatch(&mut countered);
            trace.record(
                event("ability_countered", "declare", None)
                    .with_value("reactor_id", reactor_id.clone()),
            );
            result.failure_reason = Some(format!("Countered by {reactor_id}"));
            result.countered_by = Some(reactor_id);
            result.events = trace.into_events();
            return result;
        }

        if ability.attack_type.is_some() && !targets.is_empty() {
            for target_id in targets {
                match self.resolve_attack(world, &ability, source_id, target_id) {
                    Some(attack) => {
                        trace.record(
                            event("attack_roll", "attack", Some(target_id))
                                .with_value("natural", attack.natural)
                                .with_value("total", attack.total)
                                .with_value("hit", attack.hit)
                                .with_value("critical", attack.critical),
                        );
                        result.attacks.insert(target_id.clone(), attack);
                    }
                    None => {
                        result.attack_cancelled = true;
                        trace.record(event("attack_cancelled", "attack", Some(target_id)));
                        break;
                    }
                }
            }
            let removed = world.remove_statuses_on_attack(source_id);
            if !removed.is_empty() {
                debug!(source = source_id, ?removed, "statuses removed on attack");
            }
        }

        if let Some(save_ability) = ability.save_type {
            for target_id in targets {
                let save = self.resolve_save(world, &ability, save_ability, source_id, target_id);
                let Some(save) = save else {
                    continue;
                };
                trace.record(
                    event("saving_throw", "save", Some(target_id))
                        .with_value("natural", save.natural)
                        .with_value("total", save.total)
                        .with_value("dc", save.dc)
                        .with_value("success", save.success),
                );
                result.saves.insert(target_id.clone(), save);
            }
        }

        let effects = effective_effects(&ability, variant.as_ref(), options.upcast_level);
        let damage_adjustments = self.before_damage(world, &ability, &effects, source_id, targets);
        for (target_id, adjustment) in &damage_adjustments {
            trace.record(
                event("before_damage", "resolve", Some(target_id))
                    .with_value("modifier", adjustment.modifier)
                    .with_value("prevented", adjustment.prevented),
            );
        }
        let damage_events = {
            let mut context = EffectContext {
                source_id,
                targets,
                ability: &ability,
                world: &mut *world,
                rng: &mut self.rng,
                conditions: self.conditions.as_ref(),
                attacks: &result.attacks,
                attack_cancelled: result.attack_cancelled,
                saves: &result.saves,
                damage_adjustments: &damage_adjustments,
                damage_events: Vec::new(),
            };
            let mut effect_results = Vec::new();
            for effect in &effects {
                effect_results.extend(self.effects.execute(effect, &mut context));
            }
            let damage_events = std::mem::take(&mut context.damage_events);
            drop(context);
            for effect_result in &effect_results {
                trace.record(
                    event("effect", "resolve", Some(&effect_result.target_id))
                        .with_value("effect_type", effect_result.effect_type.clone())
                        .with_value("value", effect_result.value)
                        .with_value("success", effect_result.success),
                );
            }
            let applied = effect_results
                .iter()
                .filter(|r| r.success && r.effect_type == EffectKind::ApplyStatus.as_str());
            for effect_result in applied {
                let mut status_event = RuleEvent::new(RuleEventKind::StatusApplied, source_id)
                    .for_ability(ability_id, std::slice::from_ref(&effect_result.target_id));
                if let Some(status_id) = &effect_result.status_id {
                    status_event = status_event.with_value("status_id", status_id.clone());
                }
                self.events.dispatch(&mut status_event);
            }
            result.effect_results = effect_results;
            damage_events
        };

        for damage in damage_events {
            let mut dealt = RuleEvent::new(RuleEventKind::DamageDealt, &damage.source_id)
                .for_ability(ability_id, std::slice::from_ref(&damage.target_id))
                .with_value("amount", damage.amount)
                .with_value("damage_type", damage.damage_type.clone());
            self.events.dispatch(&mut dealt);

            if let Some(tracker) = self.concentration.as_mut() {
                let check =
                    tracker.on_damage(world, &damage.target_id, damage.amount, &mut self.rng);
                if let Some(check) = check {
                    trace.record(
                        event("concentration_check", "resolve", Some(&damage.target_id))
                            .with_value("dc", check.dc)
                            .with_value("maintained", check.maintained),
                    );
                    result.concentration_checks.push(check);
                }
            }

            if let Some(resolver) = self.reactions.as_mut() {
                let trigger = ReactionTrigger {
                    kind: ReactionTriggerKind::DamageTaken,
                    source_id: source_id.to_string(),
                    ability_id: Some(ability_id.to_string()),
                    target_id: Some(damage.target_id.clone()),
                    damage: Some(damage.amount),
                    ability_tags: ability.tags.clone(),
                };
                let candidates = [damage.target_id.clone()];
                if let Some(outcome) = resolver.offer(&trigger, &candidates, world) {
                    trace.record(
                        event("reaction", "resolve", Some(&outcome.reactor_id))
                            .with_value("reaction_id", outcome.reaction_id.clone()),
                    );
                }
            }
        }

        if ability.requires_concentration {
            if let Some(tracker) = self.concentration.as_mut() {
                let status_id = ability.concentration_status_in(&effects);
                tracker.begin(
                    world,
                    Concentration {
                        caster_id: source_id.to_string(),
                        ability_id: ability_id.to_string(),
                        status_id,
                        target_ids: targets.to_vec(),
                    },
                );
            }
        }

        self.cooldowns.consume(source_id, ability_id, &ability.cooldown);

        let mut resolved = RuleEvent::new(RuleEventKind::AbilityResolved, source_id)
            .for_ability(ability_id, targets)
            .with_value("damage", result.total_damage());
        self.events.dispatch(&mut resolved);
        let mut complete = RuleWindowContext::new(RuleWindow::OnActionComplete, source_id)
            .with_ability(ability_id, &ability.tags);
        self.rules.dispatch(&mut complete, world);

        trace.record(
            event("ability_resolved", "complete", None)
                .with_value("damage", result.total_damage()),
        );
        result.success = true;
        result.events = trace.into_events();
        for observer in self.observers.iter_mut() {
            observer(&result);
        }
        result
    }

    /// `AbilityDeclared` event then the `OnDeclareAction` window. Returns a reason when
    /// either was cancelled.
    fn declare(
        &mut self,
        world: &CombatWorld,
        ability: &AbilityDefinition,
        source_id: &str,
        targets: &[String],
    ) -> Option<String> {
        let mut declared = RuleEvent::new(RuleEventKind::AbilityDeclared, source_id)
            .for_ability(&ability.id, targets)
            .cancellable();
        self.events.dispatch(&mut declared);
        if declared.cancelled {
            return Some("Cancelled by rule event".to_string());
        }
        let mut context = RuleWindowContext::new(RuleWindow::OnDeclareAction, source_id)
            .with_ability(&ability.id, &ability.tags);
        if let Some(first) = targets.first() {
            context = context.with_target(first);
        }
        self.rules.dispatch(&mut context, world);
        context
            .cancel
            .then(|| context.cancel_reason.unwrap_or_else(|| "Cancelled".to_string()))
    }

    /// `BeforeDamage` for each target when the execution carries a damage effect. Only
    /// targets a provider touched get an entry.
    fn before_damage(
        &mut self,
        world: &CombatWorld,
        ability: &AbilityDefinition,
        effects: &[EffectDefinition],
        source_id: &str,
        targets: &[String],
    ) -> BTreeMap<String, DamageAdjustment> {
        let mut adjustments = BTreeMap::new();
        let Some(damage) = effects
            .iter()
            .find(|e| EffectKind::from_tag(&e.effect_type) == Some(EffectKind::Damage))
        else {
            return adjustments;
        };
        for target_id in targets {
            let mut context = RuleWindowContext::new(RuleWindow::BeforeDamage, source_id)
                .with_target(target_id)
                .with_ability(&ability.id, &ability.tags);
            context.damage_type = damage.damage_type.clone();
            self.rules.dispatch(&mut context, world);
            let adjustment = DamageAdjustment {
                modifier: context.modifier,
                prevented: context.cancel,
            };
            if adjustment != DamageAdjustment::default() {
                adjustments.insert(target_id.clone(), adjustment);
            }
        }
        adjustments
    }

    /// Offers a spell cast to hostiles in reaction range. Returns the reactor that
    /// countered it.
    fn offer_counter(
        &mut self,
        world: &mut CombatWorld,
        ability: &AbilityDefinition,
        source_id: &str,
        targets: &[String],
    ) -> Option<String> {
        if !ability.is_spell() {
            return None;
        }
        let resolver = self.reactions.as_mut()?;
        let candidates: Vec<String> = world
            .hostiles_within(source_id, self.config.reaction_range)
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let trigger = ReactionTrigger {
            kind: ReactionTriggerKind::SpellCastNearby,
            source_id: source_id.to_string(),
            ability_id: Some(ability.id.clone()),
            target_id: targets.first().cloned(),
            damage: None,
            ability_tags: ability.tags.clone(),
        };
        let outcome = resolver.offer(&trigger, &candidates, world)?;
        (outcome.cancel && !ability.has_tag(UNCOUNTERABLE_TAG)).then_some(outcome.reactor_id)
    }

    /// Builds and rolls one attack. `None` when `BeforeAttackRoll` cancelled it or a
    /// participant is missing.
    fn resolve_attack(
        &mut self,
        world: &CombatWorld,
        ability: &AbilityDefinition,
        source_id: &str,
        target_id: &str,
    ) -> Option<AttackRollResult> {
        let mut query = self.attack_query(world, ability, source_id, target_id)?;

        let mut before = RuleWindowContext::new(RuleWindow::BeforeAttackRoll, source_id)
            .with_target(target_id)
            .with_ability(&ability.id, &ability.tags);
        before.advantage_sources = query.advantage_sources.clone();
        before.disadvantage_sources = query.disadvantage_sources.clone();
        self.rules.dispatch(&mut before, world);
        if before.cancel {
            debug!(
                ability = %ability.id,
                source = source_id,
                target = target_id,
                "attack roll cancelled"
            );
            return None;
        }
        query.advantage_sources = before.advantage_sources;
        query.disadvantage_sources = before.disadvantage_sources;
        query.attack_bonus += before.modifier;

        let attack = self.rolls.roll_attack(&query, &mut self.rng);

        let mut after = RuleWindowContext::new(RuleWindow::AfterAttackRoll, source_id)
            .with_target(target_id)
            .with_ability(&ability.id, &ability.tags);
        after.natural_roll = Some(attack.natural);
        after.total = Some(attack.total);
        after.success = Some(attack.hit);
        self.rules.dispatch(&mut after, world);
        Some(attack)
    }

    fn attack_query(
        &self,
        world: &CombatWorld,
        ability: &AbilityDefinition,
        source_id: &str,
        target_id: &str,
    ) -> Option<AttackQuery> {
        let attacker = world.combatant(source_id)?;
        let target = world.combatant(target_id)?;
        let attack_type = ability.attack_type?;
        let melee = attack_type.is_melee();

        let conditions = ConditionContext::for_actor(source_id)
            .with_target(target_id)
            .with_statuses(world)
            .with_ability_tags(&ability.tags)
            .with_melee(melee)
            .with_roll_type(RollType::AttackRoll);
        let boosts = BoostEvaluator::new(&attacker.boosts)
            .with_context(EvaluationContext::new(self.conditions.as_ref(), conditions));
        let target_conditions = ConditionContext::for_actor(target_id)
            .with_target(source_id)
            .with_statuses(world)
            .with_melee(melee);
        let target_boosts = BoostEvaluator::new(&target.boosts)
            .with_context(EvaluationContext::new(self.conditions.as_ref(), target_conditions));

        let (ability_score, proficient) = if attack_type.is_weapon() {
            let proficient = attacker.weapon.as_ref().map_or(true, |w| {
                w.proficient || boosts.has_proficiency("Weapon", &w.name)
            });
            (attacker.weapon_attack_ability(!melee), proficient)
        } else {
            (attacker.spell_ability(), true)
        };
        let mut bonus = attacker.ability_modifier(ability_score)
            + if proficient { attacker.proficiency() } else { 0 }
            + boosts.roll_bonus_flat(RollType::AttackRoll);
        if let Some(height) = self.height.as_ref() {
            bonus += height.attack_modifier(attacker, target);
        }
        let cover = self
            .line_of_sight
            .as_ref()
            .map_or(0, |los| los.cover(attacker, target).ac_bonus());

        let armor_class = target.effective_ac().saturating_add(cover);
        let mut query = AttackQuery::new(source_id, target_id, bonus, armor_class);
        let threshold = i64::from(self.config.critical_threshold)
            - i64::from(boosts.critical_hit_extra_range());
        query.critical_threshold = threshold.clamp(2, 20) as u32;
        let attacker_crit = boosts.critical_hit_modifier("AttackRoll");
        let target_crit = target_boosts.critical_hit_modifier("AttackTarget");
        query.auto_crit = attacker_crit.auto_crit || target_crit.auto_crit;
        query.never_crit = attacker_crit.never_crit || target_crit.never_crit;
        query.bonus_dice = boosts.roll_bonus_dice(RollType::AttackRoll);
        query.rerolls = boosts.reroll_rules(RollType::AttackRoll);
        query.minimum_natural = boosts.minimum_roll_result(RollType::AttackRoll);
        let score = Some(ability_score);
        query.advantage_sources = boosts.advantage_sources(RollType::AttackRoll, score);
        query.disadvantage_sources = boosts.disadvantage_sources(RollType::AttackRoll, score);

        let within_melee = world
            .distance(source_id, target_id)
            .map_or(false, |d| d <= self.config.melee_range + f32::EPSILON);
        let attacker_has = |status: &str| world.has_status(source_id, status);
        let target_has = |status: &str| world.has_status(target_id, status);
        let mut adv = Vec::new();
        let mut dis = Vec::new();

        if attacker_has(ids::PRONE) {
            dis.push("Prone");
        }
        if target_has(ids::PRONE) {
            if melee && within_melee {
                adv.push("Target prone");
            } else {
                dis.push("Target prone at range");
            }
        }
        if attacker_has(ids::BLINDED) {
            dis.push("Blinded");
        }
        if target_has(ids::BLINDED) {
            adv.push("Target blinded");
        }
        if attacker_has(ids::INVISIBLE) || attacker_has(ids::HIDDEN) {
            adv.push("Unseen attacker");
        }
        if target_has(ids::INVISIBLE) {
            dis.push("Target invisible");
        }
        if target_has(ids::STUNNED) {
            adv.push("Target stunned");
        }
        if attacker_has(ids::RESTRAINED) {
            dis.push("Restrained");
        }
        if target_has(ids::RESTRAINED) {
            adv.push("Target restrained");
        }
        if target_has(ids::DODGING) {
            dis.push("Target dodging");
        }
        for status in [ids::PARALYZED, ids::ASLEEP, ids::UNCONSCIOUS] {
            if target_has(status) {
                adv.push("Target helpless");
                if melee && within_melee {
                    query.auto_crit = true;
                }
            }
        }
        if attacker_has(ids::RECKLESS) && melee {
            adv.push("Reckless");
        }
        if target_has(ids::RECKLESS) {
            adv.push("Target reckless");
        }
        if !melee && !world.hostiles_within(source_id, self.config.melee_range).is_empty() {
            dis.push("Threatened");
        }

        for source in adv {
            push_unique(&mut query.advantage_sources, source);
        }
        for source in dis {
            push_unique(&mut query.disadvantage_sources, source);
        }
        Some(query)
    }

    /// DC: explicit override, else spell, weapon or flat derivation from the caster.
    fn save_dc(&self, world: &CombatWorld, ability: &AbilityDefinition, source_id: &str) -> i32 {
        if let Some(dc) = ability.save_dc {
            return dc;
        }
        let Some(caster) = world.combatant(source_id) else {
            return 10;
        };
        let proficiency = caster.proficiency();
        if ability.is_spell() {
            8 + proficiency
                + caster.ability_modifier(caster.spell_ability())
                + BoostEvaluator::new(&caster.boosts).spell_save_dc_bonus()
        } else if ability.attack_type.map_or(false, |t| t.is_weapon()) {
            8 + proficiency
                + caster
                    .ability_modifier(AbilityScore::Strength)
                    .max(caster.ability_modifier(AbilityScore::Dexterity))
        } else {
            10 + proficiency
        }
    }

    fn resolve_save(
        &mut self,
        world: &CombatWorld,
        ability: &AbilityDefinition,
        save_ability: AbilityScore,
        source_id: &str,
        target_id: &str,
    ) -> Option<SaveRollResult> {
        let target = world.combatant(target_id)?;
        let dc = self.save_dc(world, ability, source_id);

        let conditions = ConditionContext::for_actor(target_id)
            .with_target(source_id)
            .with_statuses(world)
            .with_ability_tags(&ability.tags)
            .with_roll_type(RollType::SavingThrow);
        let boosts = BoostEvaluator::new(&target.boosts)
            .with_context(EvaluationContext::new(self.conditions.as_ref(), conditions));
        let proficient = target.is_save_proficient(save_ability)
            || boosts.has_proficiency("SavingThrow", save_ability.as_str());
        let bonus = target.ability_modifier(save_ability)
            + if proficient { target.proficiency() } else { 0 }
            + boosts.roll_bonus_flat(RollType::SavingThrow);

        let mut query = SaveQuery::new(target_id, save_ability, bonus, dc);
        let save_score = Some(save_ability);
        query.advantage_sources = boosts.advantage_sources(RollType::SavingThrow, save_score);
        query.disadvantage_sources = boosts.disadvantage_sources(RollType::SavingThrow, save_score);
        query.bonus_dice = boosts.roll_bonus_dice(RollType::SavingThrow);
        query.rerolls = boosts.reroll_rules(RollType::SavingThrow);
        query.minimum_natural = boosts.minimum_roll_result(RollType::SavingThrow);

        let physical = matches!(save_ability, AbilityScore::Strength | AbilityScore::Dexterity);
        let helpless = world.has_status(target_id, ids::PARALYZED)
            || world.has_status(target_id, ids::STUNNED);
        if physical && helpless {
            query.auto_fail = true;
            return Some(SaveRollResult::auto_fail(&query));
        }

        let mut before = RuleWindowContext::new(RuleWindow::BeforeSavingThrow, source_id)
            .with_target(target_id)
            .with_ability(&ability.id, &ability.tags);
        before.save_ability = Some(save_ability);
        before.advantage_sources = query.advantage_sources.clone();
        before.disadvantage_sources = query.disadvantage_sources.clone();
        self.rules.dispatch(&mut before, world);
        if before.cancel {
            debug!(
                ability = %ability.id,
                target = target_id,
                "saving throw cancelled; forced pass"
            );
            return Some(SaveRollResult::forced_pass(&query));
        }
        query.advantage_sources = before.advantage_sources;
        query.disadvantage_sources = before.disadvantage_sources;
        query.save_bonus += before.modifier;

        let save = self.rolls.roll_save(&query, &mut self.rng);

        let mut after = RuleWindowContext::new(RuleWindow::AfterSavingThrow, source_id)
            .with_target(target_id)
            .with_ability(&ability.id, &ability.tags);
        after.save_ability = Some(save_ability);
        after.natural_roll = Some(save.natural);
        after.total = Some(save.total);
        after.success = Some(save.success);
        self.rules.dispatch(&mut after, world);
        Some(save)
    }

    /// Expected value ranges per effect type. Rolls nothing and changes nothing.
    pub fn preview(
        &self,
        world: &CombatWorld,
        ability_id: &str,
        source_id: &str,
        options: &ExecutionOptions,
    ) -> BTreeMap<String, EffectPreview> {
        let mut previews = BTreeMap::new();
        let Some(ability) = self.abilities.get(ability_id) else {
            return previews;
        };
        let variant = options.variant_id.as_deref().and_then(|id| ability.variant(id));
        let context = PreviewContext {
            source: world.combatant(source_id),
            ability,
        };
        for effect in effective_effects(ability, variant, options.upcast_level) {
            if let Some(preview) = self.effects.preview(&effect, &context) {
                let key = effect.effect_type.to_ascii_lowercase();
                let merged = match previews.remove(&key) {
                    Some(existing) => preview.merge(existing),
                    None => preview,
                };
                previews.insert(key, merged);
            }
        }
        previews
    }

    /// Effects of an ability as they would run with these options.
    pub fn effective_effects(
        &self,
        ability_id: &str,
        options: &ExecutionOptions,
    ) -> Vec<EffectDefinition> {
        self.abilities
            .get(ability_id)
            .map(|ability| {
                let variant = options.variant_id.as_deref().and_then(|id| ability.variant(id));
                effective_effects(ability, variant, options.upcast_level)
            })
            .unwrap_or_default()
    }

    pub fn process_turn_start(&mut self, combatant_id: &str) {
        self.cooldowns.process_turn_start(combatant_id);
    }

    pub fn process_round_end(&mut self) {
        self.cooldowns.process_round_end();
    }

    /// New encounter: cooldowns cleared.
    pub fn reset(&mut self) {
        self.cooldowns.reset();
    }

    pub fn export_cooldowns(&self) -> Vec<CooldownSnapshot> {
        self.cooldowns.export()
    }

    pub fn import_cooldowns(&mut self, snapshot: &[CooldownSnapshot]) {
        self.cooldowns.import(snapshot);
    }
}
