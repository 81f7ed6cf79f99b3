//! Topic handler registration and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use vendra_db::models::IngestedEvent;

use crate::error::HandlerError;

/// A handler for one notification topic.
///
/// Returning `Ok(value)` marks the event completed with `value` persisted
/// as its result; returning `Err` counts as a retryable or terminal
/// attempt per the error's classification.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    /// The topic this handler consumes (e.g. `questions`).
    fn topic(&self) -> &'static str;

    /// Process one event.
    async fn handle(&self, event: &IngestedEvent) -> Result<serde_json::Value, HandlerError>;
}

/// Registry of topic handlers, with priority topics dispatched first.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn TopicHandler>>,
    priority_topics: Vec<String>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its topic.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn TopicHandler>) -> Self {
        self.handlers.insert(handler.topic(), handler);
        self
    }

    /// Register a handler whose topic is claimed ahead of routine topics
    /// (dispute/claim-class events).
    #[must_use]
    pub fn with_priority_handler(mut self, handler: Arc<dyn TopicHandler>) -> Self {
        self.priority_topics.push(handler.topic().to_string());
        self.handlers.insert(handler.topic(), handler);
        self
    }

    /// Look up the handler for a topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Arc<dyn TopicHandler>> {
        self.handlers.get(topic).cloned()
    }

    /// Topics claimed ahead of the rest.
    #[must_use]
    pub fn priority_topics(&self) -> &[String] {
        &self.priority_topics
    }

    /// All registered topics.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl TopicHandler for Echo {
        fn topic(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, _event: &IngestedEvent) -> Result<serde_json::Value, HandlerError> {
            Ok(serde_json::json!({"handled_by": self.0}))
        }
    }

    #[test]
    fn test_registration_and_lookup() {
        let registry = HandlerRegistry::new()
            .with_handler(Arc::new(Echo("questions")))
            .with_priority_handler(Arc::new(Echo("claims")));

        assert!(registry.get("questions").is_some());
        assert!(registry.get("claims").is_some());
        assert!(registry.get("orders").is_none());
        assert_eq!(registry.priority_topics(), &["claims".to_string()]);
    }

    #[test]
    fn test_later_registration_wins_for_same_topic() {
        let registry = HandlerRegistry::new()
            .with_handler(Arc::new(Echo("questions")))
            .with_handler(Arc::new(Echo("questions")));
        assert_eq!(registry.topics().len(), 1);
    }
}
