use indexmap::IndexMap;
use serde_json::Value;

use crate::error::RelayError;

/// Results of the steps completed so far in one pipeline run, keyed by step id.
///
/// Owned by a single run and dropped with it. A step id is recorded only after
/// that step succeeded, and only once.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    results: IndexMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step_id: &str, result: Value) -> Result<(), RelayError> {
        if self.results.contains_key(step_id) {
            return Err(RelayError::invalid_fields(
                format!("Step id '{step_id}' already has a recorded result"),
                vec![step_id.to_string()],
            ));
        }
        self.results.insert(step_id.to_string(), result);
        Ok(())
    }

    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.results.contains_key(step_id)
    }

    /// Step ids in completion order.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_once_per_step() {
        let mut ctx = ExecutionContext::new();
        ctx.record("c", json!({ "id": 42 })).unwrap();
        assert!(ctx.record("c", json!({ "id": 43 })).is_err());
        assert_eq!(ctx.get("c").unwrap()["id"], 42);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_step_ids_keep_completion_order() {
        let mut ctx = ExecutionContext::new();
        ctx.record("b", Value::Null).unwrap();
        ctx.record("a", Value::Null).unwrap();
        assert_eq!(ctx.step_ids().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(ctx.contains("a"));
        assert!(!ctx.contains("z"));
    }
}
