use std::collections::BTreeSet;

use serde::Serialize;

use crate::boost::AbilityScore;
use crate::combat::world::CombatWorld;
use crate::rules::{run_guarded, RuleError};

/// Extension points in the ability execution timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleWindow {
    OnDeclareAction,
    BeforeAttackRoll,
    AfterAttackRoll,
    BeforeSavingThrow,
    AfterSavingThrow,
    BeforeDamage,
    OnActionComplete,
}

impl RuleWindow {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OnDeclareAction => "OnDeclareAction",
            Self::BeforeAttackRoll => "BeforeAttackRoll",
            Self::AfterAttackRoll => "AfterAttackRoll",
            Self::BeforeSavingThrow => "BeforeSavingThrow",
            Self::AfterSavingThrow => "AfterSavingThrow",
            Self::BeforeDamage => "BeforeDamage",
            Self::OnActionComplete => "OnActionComplete",
        }
    }
}

/// Mutable state a window hands to providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleWindowContext {
    pub window: RuleWindow,
    pub source_id: String,
    pub target_id: Option<String>,
    pub ability_id: Option<String>,
    pub ability_tags: BTreeSet<String>,
    pub advantage_sources: Vec<String>,
    pub disadvantage_sources: Vec<String>,
    /// Flat modifier added to the upcoming roll.
    pub modifier: i32,
    pub cancel: bool,
    pub cancel_reason: Option<String>,
    pub save_ability: Option<AbilityScore>,
    /// First damage type of the ability's damage effects, for `BeforeDamage`.
    pub damage_type: Option<String>,
    /// Filled for the `After*` windows.
    pub natural_roll: Option<u32>,
    pub total: Option<i32>,
    pub success: Option<bool>,
}

impl RuleWindowContext {
    pub fn new(window: RuleWindow, source_id: &str) -> Self {
        Self {
            window,
            source_id: source_id.to_string(),
            target_id: None,
            ability_id: None,
            ability_tags: BTreeSet::new(),
            advantage_sources: Vec::new(),
            disadvantage_sources: Vec::new(),
            modifier: 0,
            cancel: false,
            cancel_reason: None,
            save_ability: None,
            damage_type: None,
            natural_roll: None,
            total: None,
            success: None,
        }
    }

    pub fn with_target(mut self, target_id: &str) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_ability(mut self, ability_id: &str, tags: &BTreeSet<String>) -> Self {
        self.ability_id = Some(ability_id.to_string());
        self.ability_tags = tags.clone();
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.ability_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Adds an advantage source unless one with the same name (any case) is present.
    pub fn add_advantage(&mut self, source: &str) {
        push_unique(&mut self.advantage_sources, source);
    }

    pub fn add_disadvantage(&mut self, source: &str) {
        push_unique(&mut self.disadvantage_sources, source);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancel = true;
        self.cancel_reason = Some(reason.into());
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, source: &str) {
    if !list.iter().any(|s| s.eq_ignore_ascii_case(source)) {
        list.push(source.to_string());
    }
}

/// A passive or reactive rule hooked into one or more windows.
pub trait RuleProvider {
    fn id(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn handles(&self, window: RuleWindow) -> bool;

    fn on_window(
        &mut self,
        context: &mut RuleWindowContext,
        world: &CombatWorld,
    ) -> Result<(), RuleError>;
}

/// Closure-backed provider for rules that need no state of their own.
pub struct FnRuleProvider<F> {
    id: String,
    priority: i32,
    windows: Vec<RuleWindow>,
    handler: F,
}

impl<F> FnRuleProvider<F>
where
    F: FnMut(&mut RuleWindowContext, &CombatWorld) -> Result<(), RuleError>,
{
    pub fn new(id: impl Into<String>, windows: &[RuleWindow], handler: F) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            windows: windows.to_vec(),
            handler,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> RuleProvider for FnRuleProvider<F>
where
    F: FnMut(&mut RuleWindowContext, &CombatWorld) -> Result<(), RuleError>,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn handles(&self, window: RuleWindow) -> bool {
        self.windows.contains(&window)
    }

    fn on_window(
        &mut self,
        context: &mut RuleWindowContext,
        world: &CombatWorld,
    ) -> Result<(), RuleError> {
        (self.handler)(context, world)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Default)]
pub struct RuleWindowDispatcher {
    providers: Vec<Box<dyn RuleProvider>>,
}

impl RuleWindowDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order breaks priority ties.
    pub fn register(&mut self, provider: Box<dyn RuleProvider>) {
        self.providers.push(provider);
        self.providers
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    pub fn unregister(&mut self, provider_id: &str) -> bool {
        let before = self.providers.len();
        self.providers.retain(|p| p.id() != provider_id);
        before != self.providers.len()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Runs every provider for the context's window until one cancels. Side effects of
    /// providers that already ran are kept.
    pub fn dispatch(
        &mut self,
        context: &mut RuleWindowContext,
        world: &CombatWorld,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let window = context.window;
        for provider in self.providers.iter_mut().filter(|p| p.handles(window)) {
            if context.cancel {
                break;
            }
            report.invoked += 1;
            let id = provider.id().to_string();
            if !run_guarded(&id, window.as_str(), || provider.on_window(context, world)) {
                report.failed += 1;
            }
        }
        report.cancelled = context.cancel;
        report
    }
}
