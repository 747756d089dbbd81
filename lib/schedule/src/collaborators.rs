//! External collaborator interfaces consumed by the schedule trigger
//! (spec.md §6). These are pure boundaries: the core depends on them by
//! trait, never on a concrete implementation.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Renders templated strings/maps against a run context. Used on both
/// trigger `inputs` and backfill `inputs`/`labels` before they're merged
/// into the emitted execution.
#[async_trait]
pub trait VariableRenderer: Send + Sync {
    async fn render(&self, value: &JsonValue) -> Result<JsonValue, String>;

    async fn render_map(
        &self,
        values: &HashMap<String, JsonValue>,
    ) -> Result<HashMap<String, JsonValue>, String> {
        let mut rendered = HashMap::with_capacity(values.len());
        for (key, value) in values {
            rendered.insert(key.clone(), self.render(value).await?);
        }
        Ok(rendered)
    }
}

/// Logs warnings raised while evaluating a trigger, most notably when a
/// condition cannot be evaluated (spec.md §6).
pub trait RunContextLogger: Send + Sync {
    fn warn(&self, message: &str);
}

/// A `RunContextLogger` backed by `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRunContextLogger;

impl RunContextLogger for TracingRunContextLogger {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseRenderer;

    #[async_trait]
    impl VariableRenderer for UppercaseRenderer {
        async fn render(&self, value: &JsonValue) -> Result<JsonValue, String> {
            match value {
                JsonValue::String(s) => Ok(JsonValue::String(s.to_uppercase())),
                other => Ok(other.clone()),
            }
        }
    }

    #[tokio::test]
    async fn render_map_applies_to_each_value() {
        let renderer = UppercaseRenderer;
        let mut values = HashMap::new();
        values.insert("greeting".to_string(), JsonValue::String("hi".to_string()));

        let rendered = renderer.render_map(&values).await.unwrap();
        assert_eq!(
            rendered.get("greeting"),
            Some(&JsonValue::String("HI".to_string()))
        );
    }
}
