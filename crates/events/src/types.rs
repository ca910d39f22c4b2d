//! Event types for scenario lifecycle notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All events published by the scenario orchestrator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A user was granted (or had updated) roles on a scenario
    #[serde(rename = "scenario.user_added")]
    UserAddedToScenario {
        organization_id: String,
        workspace_id: String,
        scenario_id: String,
        user_id: String,
        roles: Vec<String>,
    },

    /// A user lost access to a scenario
    #[serde(rename = "scenario.user_removed")]
    UserRemovedFromScenario {
        organization_id: String,
        workspace_id: String,
        scenario_id: String,
        user_id: String,
    },

    /// The dataset list of a root scenario changed
    #[serde(rename = "scenario.dataset_list_changed")]
    DatasetListChanged {
        organization_id: String,
        workspace_id: String,
        scenario_id: String,
        dataset_list: Vec<String>,
    },
}

impl Event {
    /// Get the scenario ID associated with this event
    pub fn scenario_id(&self) -> &str {
        match self {
            Event::UserAddedToScenario { scenario_id, .. } => scenario_id,
            Event::UserRemovedFromScenario { scenario_id, .. } => scenario_id,
            Event::DatasetListChanged { scenario_id, .. } => scenario_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserAddedToScenario { .. } => "scenario.user_added",
            Event::UserRemovedFromScenario { .. } => "scenario.user_removed",
            Event::DatasetListChanged { .. } => "scenario.dataset_list_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_list_changed() -> Event {
        Event::DatasetListChanged {
            organization_id: "o-1".to_string(),
            workspace_id: "w-1".to_string(),
            scenario_id: "s-1".to_string(),
            dataset_list: vec!["d-1".to_string()],
        }
    }

    #[test]
    fn test_event_envelope_creation() {
        let envelope = EventEnvelope::new(dataset_list_changed());

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&dataset_list_changed()).unwrap();
        assert!(json.contains("scenario.dataset_list_changed"));
        assert!(json.contains("dataset_list"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"scenario.user_removed","organization_id":"o-1","workspace_id":"w-1","scenario_id":"s-9","user_id":"u-1"}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::UserRemovedFromScenario {
                scenario_id,
                user_id,
                ..
            } => {
                assert_eq!(scenario_id, "s-9");
                assert_eq!(user_id, "u-1");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_scenario_id_and_kind() {
        let event = Event::UserAddedToScenario {
            organization_id: "o-1".to_string(),
            workspace_id: "w-1".to_string(),
            scenario_id: "s-2".to_string(),
            user_id: "u-1".to_string(),
            roles: vec!["editor".to_string()],
        };
        assert_eq!(event.scenario_id(), "s-2");
        assert_eq!(event.kind(), "scenario.user_added");
        assert_eq!(dataset_list_changed().scenario_id(), "s-1");
    }
}
