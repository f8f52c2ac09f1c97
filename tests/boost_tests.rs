use qdnd::boost::{
    parse_boosts, parse_boosts_with_report, source, BasicConditionEvaluator, BoostContainer,
    BoostEvaluator, BoostType, BoostValue, ConditionContext, EvaluationContext, ResistanceLevel,
};
use qdnd::combat::{CombatWorld, Combatant, StatusDefinition};

fn container(entries: &[(&str, &str, &str)]) -> BoostContainer {
    let mut boosts = BoostContainer::new();
    for (source, source_id, text) in entries {
        boosts.add_all(parse_boosts(text), source, source_id).expect("add");
    }
    boosts
}

#[test]
fn every_boost_type_parses_back_to_itself() {
    for boost_type in BoostType::ALL {
        let text = format!("{}(3, Fire)", boost_type.as_str());
        let parsed = parse_boosts(&text);
        assert_eq!(parsed.len(), 1, "{text}");
        assert_eq!(parsed[0].boost_type, boost_type);
        assert_eq!(
            parsed[0].parameters,
            vec![BoostValue::Int(3), BoostValue::Str("Fire".to_string())]
        );
    }
}

#[test]
fn if_prefix_condition_is_isolated() {
    let parsed = parse_boosts("IF(HasStatus(RAGING)):DamageBonus(2,Slashing)");
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].condition.as_deref(), Some("HasStatus(RAGING)"));
    assert_eq!(parsed[0].boost_type, BoostType::DamageBonus);
    assert_eq!(
        parsed[0].parameters,
        vec![BoostValue::Int(2), BoostValue::Str("Slashing".to_string())]
    );
}

#[test]
fn malformed_clause_does_not_take_siblings_down() {
    let report = parse_boosts_with_report("AC(2);(3);Resistance(Fire,Resistant)");
    assert_eq!(report.errors.len(), 1);
    let kinds: Vec<BoostType> = report.definitions.iter().map(|d| d.boost_type).collect();
    assert_eq!(kinds, vec![BoostType::AC, BoostType::Resistance]);
    assert!(!report.is_clean());
}

#[test]
fn resistant_dominates_vulnerable_in_either_order() {
    for text in [
        "Resistance(Fire,Resistant);Resistance(Fire,Vulnerable)",
        "Resistance(Fire,Vulnerable);Resistance(Fire,Resistant)",
    ] {
        let boosts = container(&[(source::STATUS, "MIXED", text)]);
        assert_eq!(
            BoostEvaluator::new(&boosts).resistance_level("Fire"),
            ResistanceLevel::Resistant
        );
    }
}

#[test]
fn immune_wins_regardless_of_insertion_order() {
    let orders = [
        ["Resistance(Cold,Vulnerable)", "Resistance(Cold,Immune)", "Resistance(Cold,Resistant)"],
        ["Resistance(Cold,Immune)", "Resistance(Cold,Resistant)", "Resistance(Cold,Vulnerable)"],
        ["Resistance(Cold,Resistant)", "Resistance(Cold,Vulnerable)", "Resistance(Cold,Immune)"],
    ];
    for order in orders {
        let entries: Vec<(&str, &str, &str)> = order
            .iter()
            .enumerate()
            .map(|(i, text)| (source::EQUIPMENT, ["ring", "cloak", "amulet"][i], *text))
            .collect();
        let boosts = container(&entries);
        assert_eq!(
            BoostEvaluator::new(&boosts).resistance_level("Cold"),
            ResistanceLevel::Immune
        );
    }
}

#[test]
fn ac_boosts_from_different_sources_add() {
    let boosts = container(&[
        (source::STATUS, "SHIELD_OF_FAITH", "AC(2)"),
        (source::EQUIPMENT, "ring_of_protection", "AC(2)"),
    ]);
    assert_eq!(BoostEvaluator::new(&boosts).ac_bonus(), 4);
}

#[test]
fn removal_is_scoped_to_the_source_pair() {
    let mut boosts = container(&[
        (source::STATUS, "BLESSED", "RollBonus(Attack,1d4);RollBonus(SavingThrow,1d4)"),
        (
            source::PASSIVE,
            "RAGE",
            "DamageBonus(2);Resistance(Bludgeoning,Resistant);Resistance(Slashing,Resistant)",
        ),
    ]);
    assert_eq!(boosts.remove_from(source::STATUS, "BLESSED"), 2);
    assert_eq!(boosts.len(), 3);
    assert!(boosts.get_from_source(source::STATUS, Some("BLESSED")).is_empty());
    assert_eq!(boosts.get_from_source(source::PASSIVE, Some("RAGE")).len(), 3);
    assert_eq!(boosts.remove_from(source::STATUS, "BLESSED"), 0);
}

#[test]
fn conditional_boost_needs_a_satisfied_context() {
    let mut world = CombatWorld::new();
    world.register_status(StatusDefinition::new("RAGING"));
    world
        .add_combatant(Combatant::new("barbarian", "party", 40))
        .expect("add");
    world
        .grant_boosts(
            "barbarian",
            source::PASSIVE,
            "rage_damage",
            "IF(HasStatus(RAGING)):DamageBonus(2)",
        )
        .expect("grant");

    let evaluator = BasicConditionEvaluator;
    let bonus = |world: &CombatWorld| {
        let barbarian = world.combatant("barbarian").expect("barbarian");
        let context = ConditionContext::for_actor("barbarian").with_statuses(world);
        BoostEvaluator::new(&barbarian.boosts)
            .with_context(EvaluationContext::new(&evaluator, context))
            .damage_bonus("Slashing")
    };

    assert_eq!(bonus(&world), 0);
    world
        .apply_status("barbarian", "RAGING", "barbarian", Some(10))
        .expect("rage");
    assert_eq!(bonus(&world), 2);
}

#[test]
fn status_boosts_leave_with_the_status() {
    let mut world = CombatWorld::new();
    world.register_status(
        StatusDefinition::new("BLESSED").with_boosts("AC(1);RollBonus(Attack,1d4)"),
    );
    world
        .add_combatant(Combatant::new("cleric", "party", 20).with_ac(16))
        .expect("add");
    world
        .grant_boosts("cleric", source::EQUIPMENT, "shield", "AC(2)")
        .expect("grant");

    world.apply_status("cleric", "BLESSED", "cleric", None).expect("bless");
    assert_eq!(world.combatant("cleric").map(Combatant::effective_ac), Some(19));
    assert!(world.remove_status("cleric", "BLESSED"));
    assert_eq!(world.combatant("cleric").map(Combatant::effective_ac), Some(18));
}
