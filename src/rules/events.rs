use serde::Serialize;
use serde_json::{Map, Value};

use crate::rules::{run_guarded, RuleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleEventKind {
    AbilityDeclared,
    AbilityCountered,
    AbilityResolved,
    DamageDealt,
    StatusApplied,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvent {
    pub kind: RuleEventKind,
    pub source_id: String,
    pub ability_id: Option<String>,
    pub target_ids: Vec<String>,
    pub cancellable: bool,
    pub cancelled: bool,
    pub values: Map<String, Value>,
}

impl RuleEvent {
    pub fn new(kind: RuleEventKind, source_id: &str) -> Self {
        Self {
            kind,
            source_id: source_id.to_string(),
            ability_id: None,
            target_ids: Vec::new(),
            cancellable: false,
            cancelled: false,
            values: Map::new(),
        }
    }

    pub fn for_ability(mut self, ability_id: &str, target_ids: &[String]) -> Self {
        self.ability_id = Some(ability_id.to_string());
        self.target_ids = target_ids.to_vec();
        self
    }

    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// No-op on events that cannot be cancelled. Returns whether the event is now cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.cancellable {
            self.cancelled = true;
        }
        self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&mut RuleEvent) -> Result<(), RuleError>>;

struct Subscriber {
    id: SubscriptionId,
    label: String,
    priority: i32,
    kind: Option<RuleEventKind>,
    handler: Handler,
}

/// Publish/subscribe for execution events. `kind: None` subscribes to everything.
#[derive(Default)]
pub struct RuleEventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl RuleEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(
        &mut self,
        label: impl Into<String>,
        kind: Option<RuleEventKind>,
        priority: i32,
        handler: F,
    ) -> SubscriptionId
    where
        F: FnMut(&mut RuleEvent) -> Result<(), RuleError> + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            label: label.into(),
            priority,
            kind,
            handler: Box::new(handler),
        });
        self.subscribers
            .sort_by_key(|s| std::cmp::Reverse(s.priority));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers the event by priority. Stops after a handler cancels it. Returns how many
    /// handlers ran.
    pub fn dispatch(&mut self, event: &mut RuleEvent) -> usize {
        let mut invoked = 0;
        let kind = event.kind;
        for subscriber in self
            .subscribers
            .iter_mut()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
        {
            if event.cancelled {
                break;
            }
            invoked += 1;
            let handler = &mut subscriber.handler;
            run_guarded(&subscriber.label, "event", || handler(event));
        }
        invoked
    }
}
