//! Deterministic broker naming.
//!
//! Producers and consumers are deployed independently and never consult a
//! shared registry — these pure functions are the only rendezvous
//! mechanism. Any two processes agreeing on a category (and, for
//! consumers, a service name) derive identical exchange and queue names.

use crate::event::EventCategory;

/// Routing key for fanout exchanges. Ignored by the broker, but must be
/// supplied consistently on publish and bind.
pub const ROUTING_KEY: &str = "";

/// Exchange name for a category: `event__{kind}-{namespace}`.
pub fn exchange_name(category: &EventCategory) -> String {
    format!("event__{}", category)
}

/// Queue name for a consuming service: `consumer__{kind}-{namespace}__{service}`.
///
/// Multiple instances of one service share this queue as competing
/// consumers; distinct services each get their own queue bound to the
/// same fanout exchange.
pub fn queue_name(category: &EventCategory, service_name: &str) -> String {
    format!("consumer__{}__{}", category, service_name)
}

/// Quarantine queue for deliveries that used up their retry budget:
/// `quarantine__{kind}-{namespace}__{service}`.
pub fn quarantine_name(category: &EventCategory, service_name: &str) -> String {
    format!("quarantine__{}__{}", category, service_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_name_for_category() {
        let category = EventCategory::new("foo", "bar");
        assert_eq!(exchange_name(&category), "event__foo-bar");
    }

    #[test]
    fn queue_name_for_category_and_service() {
        let category = EventCategory::new("foo", "bar");
        assert_eq!(queue_name(&category, "service"), "consumer__foo-bar__service");
    }

    #[test]
    fn quarantine_name_for_category_and_service() {
        let category = EventCategory::new("foo", "bar");
        assert_eq!(
            quarantine_name(&category, "service"),
            "quarantine__foo-bar__service"
        );
    }

    #[test]
    fn names_are_deterministic_across_derivations() {
        let a = EventCategory::new("foo", "bar");
        let b = EventCategory::new("foo", "bar");
        assert_eq!(exchange_name(&a), exchange_name(&b));
        assert_eq!(queue_name(&a, "svc"), queue_name(&b, "svc"));
    }
}
