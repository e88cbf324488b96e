//! Event identity and the typed event itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a logical event category (topic).
///
/// Producers and consumers that agree on a category derive identical
/// broker topology names from it — there is no shared registry, the
/// category *is* the coordination mechanism.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventCategory {
    /// What happened (e.g. "user_logged_in").
    pub kind: String,
    /// Which bounded context it happened in (e.g. "auth").
    pub namespace: String,
}

impl EventCategory {
    /// Create a new category.
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.namespace)
    }
}

/// A single occurrence to be transmitted over the bus.
///
/// Created by a producer immediately before publishing and never mutated
/// afterwards. The category is flattened on the wire, so the serialized
/// shape is `{id, created, payload, kind, namespace}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    /// Opaque identifier for this occurrence.
    pub id: String,
    /// When the producer created the event (UTC, ISO-8601 on the wire).
    pub created: DateTime<Utc>,
    /// The typed payload.
    pub payload: T,
    /// The category this event belongs to.
    #[serde(flatten)]
    pub category: EventCategory,
}

impl<T> Event<T> {
    /// Create a fresh event with a generated id and the current instant.
    pub fn new(category: EventCategory, payload: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created: Utc::now(),
            payload,
            category,
        }
    }

    /// Create an event with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, category: EventCategory, payload: T) -> Self {
        Self {
            id: id.into(),
            created: Utc::now(),
            payload,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_compared_by_value() {
        let a = EventCategory::new("foo", "bar");
        let b = EventCategory::new("foo", "bar");
        assert_eq!(a, b);
        assert_ne!(a, EventCategory::new("foo", "baz"));
    }

    #[test]
    fn category_display() {
        assert_eq!(EventCategory::new("foo", "bar").to_string(), "foo-bar");
    }

    #[test]
    fn fresh_events_get_distinct_ids() {
        let category = EventCategory::new("foo", "bar");
        let a = Event::new(category.clone(), 1);
        let b = Event::new(category, 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn category_is_flattened_on_the_wire() {
        let event = Event::with_id("id", EventCategory::new("foo", "bar"), json!({"data": 1}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "foo");
        assert_eq!(value["namespace"], "bar");
        assert_eq!(value["id"], "id");
        assert_eq!(value["payload"], json!({"data": 1}));
        assert!(value.get("category").is_none());
    }
}
