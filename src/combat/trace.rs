use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who caused an event. Absent fields are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ability_id: Option<String>,
}

/// One step of an ability execution (`ability_declared`, `attack_roll`, `effect`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub event_type: String,
    pub round_index: u32,
    pub phase: String,
    pub source: EventSource,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl CombatEvent {
    pub fn new(event_type: &str, phase: &str, source: EventSource) -> Self {
        Self {
            event_type: event_type.to_string(),
            round_index: 0,
            phase: phase.to_string(),
            source,
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn in_round(mut self, round_index: u32) -> Self {
        self.round_index = round_index;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceCollector {
    enabled: bool,
    events: Vec<CombatEvent>,
}

impl TraceCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, event: CombatEvent) {
        if self.enabled {
            self.events.push(event);
        }
    }

    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<CombatEvent> {
        self.events
    }
}

pub fn serialize_events_json(events: &[CombatEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_collector_drops_events() {
        let event = CombatEvent::new("ability_declared", "declare", EventSource::default());
        let mut on = TraceCollector::new(true);
        on.record(event.clone());
        assert_eq!(on.events().len(), 1);

        let mut off = TraceCollector::new(false);
        off.record(event);
        assert!(off.events().is_empty());
    }

    #[test]
    fn json_omits_missing_source_fields() {
        let json = serialize_events_json(&[CombatEvent::new(
            "attack_roll",
            "attack",
            EventSource {
                actor_id: Some("fighter".to_string()),
                ..EventSource::default()
            },
        )
        .with_value("natural", 17)])
        .expect("serializes");
        let parsed: Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed[0]["source"], serde_json::json!({"actor_id": "fighter"}));
        assert_eq!(parsed[0]["values"]["natural"], 17);
    }
}
