use std::collections::HashMap;

use sitecrew_core::Metadata;
use tracing::warn;

/// Per-agent mutable key/value store of configuration and learned
/// parameters. Owned exclusively by one agent and only ever touched while
/// that agent's lock is held.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    entries: Metadata,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(coerce_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn set_number(&mut self, key: &str, value: f64) {
        let number = serde_json::Number::from_f64(value)
            .unwrap_or_else(|| serde_json::Number::from(0));
        self.entries
            .insert(key.to_string(), serde_json::Value::Number(number));
    }

    /// Add `delta` to a numeric entry, treating a missing entry as zero.
    pub fn increment(&mut self, key: &str, delta: f64) {
        let current = self.get_f64(key).unwrap_or(0.0);
        self.set_number(key, current + delta);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy for external observers. Taken under the owning agent's
    /// lock, so callers never see a half-applied update.
    pub fn snapshot(&self) -> Metadata {
        self.entries.clone()
    }
}

/// Closed numeric range for a declared knowledge-base key.
#[derive(Debug, Clone, Copy)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Outcome of one `ParameterGuard::apply` batch.
#[derive(Debug, Default)]
pub struct AppliedReport {
    pub applied: Vec<String>,
    pub rejected: Vec<String>,
}

/// Validation layer for external parameter updates.
///
/// Declared keys are coerced to f64 and range-checked; out-of-range or
/// uncoercible values are rejected per key while the rest of the batch is
/// still applied. Undeclared keys bypass checking and are stored verbatim.
#[derive(Debug, Default)]
pub struct ParameterGuard {
    ranges: HashMap<String, ParameterRange>,
}

impl ParameterGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, key: &str, min: f64, max: f64) -> Self {
        self.ranges
            .insert(key.to_string(), ParameterRange::new(min, max));
        self
    }

    pub fn range_for(&self, key: &str) -> Option<&ParameterRange> {
        self.ranges.get(key)
    }

    /// Apply a heterogeneous parameter map. Each key is validated
    /// independently; one bad key never aborts the batch.
    pub fn apply(&self, kb: &mut KnowledgeBase, updates: &Metadata) -> AppliedReport {
        let mut report = AppliedReport::default();
        for (key, value) in updates {
            match self.ranges.get(key) {
                Some(range) => match coerce_f64(value) {
                    Some(number) if range.contains(number) => {
                        kb.set_number(key, number);
                        report.applied.push(key.clone());
                    }
                    Some(number) => {
                        warn!(
                            key = %key,
                            value = number,
                            min = range.min,
                            max = range.max,
                            "Parameter out of range, rejected"
                        );
                        report.rejected.push(key.clone());
                    }
                    None => {
                        warn!(key = %key, value = %value, "Parameter not numeric, rejected");
                        report.rejected.push(key.clone());
                    }
                },
                None => {
                    kb.set(key, value.clone());
                    report.applied.push(key.clone());
                }
            }
        }
        report
    }
}

/// Accept numbers and numeric strings.
fn coerce_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn guard() -> ParameterGuard {
        ParameterGuard::new()
            .declare("optimization_threshold", 0.0, 1.0)
            .declare("learning_rate", 0.001, 0.1)
    }

    #[test]
    fn partial_batch_independence() {
        let mut kb = KnowledgeBase::new();
        kb.set_number("learning_rate", 0.01);

        let mut updates = Metadata::new();
        updates.insert("optimization_threshold".to_string(), json!(0.5));
        updates.insert("learning_rate".to_string(), json!(5.0));

        let report = guard().apply(&mut kb, &updates);

        assert_eq!(report.applied, vec!["optimization_threshold".to_string()]);
        assert_eq!(report.rejected, vec!["learning_rate".to_string()]);
        assert_eq!(kb.get_f64("optimization_threshold"), Some(0.5));
        assert_eq!(kb.get_f64("learning_rate"), Some(0.01));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let mut kb = KnowledgeBase::new();
        let mut updates = Metadata::new();
        updates.insert("learning_rate".to_string(), json!("0.05"));

        let report = guard().apply(&mut kb, &updates);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(kb.get_f64("learning_rate"), Some(0.05));
    }

    #[test]
    fn non_numeric_declared_value_rejected() {
        let mut kb = KnowledgeBase::new();
        let mut updates = Metadata::new();
        updates.insert("learning_rate".to_string(), json!({"nested": true}));

        let report = guard().apply(&mut kb, &updates);
        assert_eq!(report.rejected.len(), 1);
        assert!(!kb.contains("learning_rate"));
    }

    #[test]
    fn undeclared_keys_stored_verbatim() {
        let mut kb = KnowledgeBase::new();
        let mut updates = Metadata::new();
        updates.insert("site_name".to_string(), json!("northside"));

        let report = guard().apply(&mut kb, &updates);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(kb.get_str("site_name"), Some("northside"));
    }

    #[test]
    fn increment_starts_from_zero() {
        let mut kb = KnowledgeBase::new();
        kb.increment("alerts_seen", 1.0);
        kb.increment("alerts_seen", 1.0);
        assert_eq!(kb.get_f64("alerts_seen"), Some(2.0));
    }
}
