use std::cell::RefCell;
use std::rc::Rc;

use qdnd::ability::{
    AbilityCost, AbilityDefinition, AbilityExecutionResult, AbilityPipeline, AttackType,
    EffectCondition, EffectDefinition, ExecutionOptions,
};
use qdnd::boost::AbilityScore;
use qdnd::combat::{CombatWorld, Combatant, Position, RollMode, Weapon};
use qdnd::rules::{
    FnRuleProvider, RuleError, RuleEventKind, RuleProvider, RuleWindow, RuleWindowContext,
};

/// Protection fighting style: once per round, attacks on an adjacent ally roll at disadvantage.
struct Protection {
    guardian: String,
    uses_left: u32,
}

impl RuleProvider for Protection {
    fn id(&self) -> &str {
        "protection"
    }

    fn handles(&self, window: RuleWindow) -> bool {
        window == RuleWindow::BeforeAttackRoll
    }

    fn on_window(
        &mut self,
        context: &mut RuleWindowContext,
        world: &CombatWorld,
    ) -> Result<(), RuleError> {
        let Some(target) = context.target_id.as_deref() else {
            return Ok(());
        };
        let guardian = world
            .combatant(&self.guardian)
            .ok_or_else(|| RuleError::new("guardian missing"))?;
        let hostile = world
            .combatant(&context.source_id)
            .map_or(false, |attacker| attacker.is_hostile_to(guardian));
        let adjacent = world.distance(&self.guardian, target).map_or(false, |d| d <= 1.5);
        if self.uses_left > 0 && hostile && adjacent && target != self.guardian {
            self.uses_left -= 1;
            context.add_disadvantage("Protection");
        }
        Ok(())
    }
}

struct SaveLog(Rc<RefCell<Vec<(String, bool)>>>);

impl RuleProvider for SaveLog {
    fn id(&self) -> &str {
        "save_log"
    }

    fn handles(&self, window: RuleWindow) -> bool {
        window == RuleWindow::AfterSavingThrow
    }

    fn on_window(
        &mut self,
        context: &mut RuleWindowContext,
        _world: &CombatWorld,
    ) -> Result<(), RuleError> {
        let target = context.target_id.clone().unwrap_or_default();
        self.0.borrow_mut().push((target, context.success.unwrap_or(false)));
        Ok(())
    }
}

fn world() -> CombatWorld {
    let mut world = CombatWorld::new();
    world
        .add_combatant(
            Combatant::new("ogre", "monsters", 50)
                .with_weapon(Weapon::melee("club", "2d6", "Bludgeoning")),
        )
        .expect("ogre");
    world
        .add_combatant(Combatant::new("wizard", "party", 12).at(Position::new(1.0, 0.0, 0.0)))
        .expect("wizard");
    world
        .add_combatant(Combatant::new("paladin", "party", 40).at(Position::new(1.0, 1.0, 0.0)))
        .expect("paladin");
    world
}

fn smash() -> AbilityDefinition {
    let mut ability = AbilityDefinition::new("smash");
    ability.attack_type = Some(AttackType::MeleeWeapon);
    ability.effects.push(EffectDefinition {
        effect_type: "damage".to_string(),
        condition: Some(EffectCondition::OnHit),
        ..EffectDefinition::default()
    });
    ability
}

#[test]
fn stateful_provider_applies_once() {
    let mut world = world();
    let mut pipeline = AbilityPipeline::default();
    pipeline.register_ability(smash());
    pipeline.rules_mut().register(Box::new(Protection {
        guardian: "paladin".to_string(),
        uses_left: 1,
    }));
    let wizard = vec!["wizard".to_string()];

    let first =
        pipeline.execute(&mut world, "smash", "ogre", &wizard, &ExecutionOptions::default());
    let second =
        pipeline.execute(&mut world, "smash", "ogre", &wizard, &ExecutionOptions::default());
    let mode = |r: &AbilityExecutionResult| r.attack("wizard").map(|a| a.mode);
    assert_eq!(mode(&first), Some(RollMode::Disadvantage));
    assert_eq!(mode(&second), Some(RollMode::Normal));
}

#[test]
fn after_saving_throw_sees_every_target() {
    let mut world = world();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut roar = AbilityDefinition::new("roar");
    roar.cost = AbilityCost::bonus_action();
    roar.save_type = Some(AbilityScore::Wisdom);
    roar.save_dc = Some(30);
    roar.effects.push(EffectDefinition {
        effect_type: "apply_status".to_string(),
        status_id: Some("FRIGHTENED".to_string()),
        condition: Some(EffectCondition::OnSaveFail),
        ..EffectDefinition::default()
    });

    let mut pipeline = AbilityPipeline::default();
    pipeline.register_ability(roar);
    pipeline.rules_mut().register(Box::new(SaveLog(Rc::clone(&log))));

    let targets = vec!["wizard".to_string(), "paladin".to_string()];
    let result =
        pipeline.execute(&mut world, "roar", "ogre", &targets, &ExecutionOptions::default());
    assert!(result.success);
    let seen = log.borrow();
    assert_eq!(
        seen.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
        vec!["wizard", "paladin"]
    );
    assert!(seen.iter().all(|(_, saved)| !saved));
    assert_eq!(
        result.effect_results.iter().filter(|r| r.success).count(),
        2
    );
}

#[test]
fn cancelled_save_is_a_forced_pass() {
    let mut world = world();
    let mut roar = AbilityDefinition::new("roar");
    roar.save_type = Some(AbilityScore::Wisdom);
    roar.save_dc = Some(30);
    roar.effects.push(EffectDefinition {
        effect_type: "apply_status".to_string(),
        status_id: Some("FRIGHTENED".to_string()),
        condition: Some(EffectCondition::OnSaveFail),
        ..EffectDefinition::default()
    });
    let mut pipeline = AbilityPipeline::default();
    pipeline.register_ability(roar);
    pipeline.rules_mut().register(Box::new(FnRuleProvider::new(
        "aura_of_courage",
        &[RuleWindow::BeforeSavingThrow],
        |context: &mut RuleWindowContext, _world: &CombatWorld| {
            context.cancel("Aura of Courage");
            Ok(())
        },
    )));

    let targets = vec!["wizard".to_string()];
    let result =
        pipeline.execute(&mut world, "roar", "ogre", &targets, &ExecutionOptions::default());
    let save = result.save("wizard").expect("save recorded");
    assert!(save.success && save.forced);
    assert!(result.effect_results.is_empty());
}

#[test]
fn before_damage_adjusts_or_prevents_per_target() {
    let mut world = world();
    let seen_types = Rc::new(RefCell::new(Vec::new()));
    let mut burn = AbilityDefinition::new("burn");
    burn.effects.push(EffectDefinition::damage("1d1+4", "Fire"));

    let mut pipeline = AbilityPipeline::default();
    pipeline.register_ability(burn);
    let types = Rc::clone(&seen_types);
    pipeline.rules_mut().register(Box::new(FnRuleProvider::new(
        "warding",
        &[RuleWindow::BeforeDamage],
        move |context: &mut RuleWindowContext, _world: &CombatWorld| {
            types.borrow_mut().push(context.damage_type.clone());
            match context.target_id.as_deref() {
                Some("paladin") => context.cancel("Warding Bond"),
                Some("wizard") => context.modifier += 3,
                _ => {}
            }
            Ok(())
        },
    )));

    let targets = vec!["wizard".to_string(), "paladin".to_string()];
    let result =
        pipeline.execute(&mut world, "burn", "ogre", &targets, &ExecutionOptions::default());
    assert!(result.success);
    assert_eq!(*seen_types.borrow(), vec![Some("Fire".to_string()); 2]);
    assert_eq!(world.combatant("wizard").map(|c| c.hp), Some(12 - 8));
    assert_eq!(world.combatant("paladin").map(|c| c.hp), Some(40));
    let prevented = result
        .effect_results
        .iter()
        .find(|r| r.target_id == "paladin")
        .expect("paladin result");
    assert!(!prevented.success);
    assert_eq!(prevented.message.as_deref(), Some("damage prevented"));
}

#[test]
fn status_applied_events_name_each_target() {
    let mut world = world();
    let applied = Rc::new(RefCell::new(Vec::new()));
    let mut roar = AbilityDefinition::new("roar");
    roar.effects.push(EffectDefinition {
        effect_type: "apply_status".to_string(),
        status_id: Some("FRIGHTENED".to_string()),
        ..EffectDefinition::default()
    });

    let mut pipeline = AbilityPipeline::default();
    pipeline.register_ability(roar);
    let log = Rc::clone(&applied);
    pipeline
        .events_mut()
        .subscribe("status_log", Some(RuleEventKind::StatusApplied), 0, move |event| {
            let status = event.values.get("status_id").and_then(|v| v.as_str()).unwrap_or_default();
            log.borrow_mut().push((event.target_ids.clone(), status.to_string()));
            Ok(())
        });

    let targets = vec!["wizard".to_string(), "paladin".to_string()];
    let result =
        pipeline.execute(&mut world, "roar", "ogre", &targets, &ExecutionOptions::default());
    assert!(result.success);
    assert_eq!(
        *applied.borrow(),
        vec![
            (vec!["wizard".to_string()], "FRIGHTENED".to_string()),
            (vec!["paladin".to_string()], "FRIGHTENED".to_string()),
        ]
    );
}
