// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Structural merge of JSON configuration patches.
//!
//! Recursion only descends into objects present on both sides; arrays and
//! scalars in the patch replace the base value, and a `null` removes the key.
//! Inputs are never mutated so callers can report before/after diffs.

use serde::Serialize;
use serde_json::{Map, Value};

/// Merge `patch` over `base`, returning a new value.
pub fn deep_merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    merged.remove(key);
                    continue;
                }
                let next = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => strip_nulls(patch_value),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, patch) => strip_nulls(patch),
    }
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Before/after pair reported in config-update confirmations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDiff {
    pub before: Value,
    pub after: Value,
}

impl ConfigDiff {
    pub fn apply(before: &Value, patch: &Value) -> Self {
        Self {
            before: before.clone(),
            after: deep_merge(before, patch),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_objects_merge_recursively() {
        let base = json!({"rate": {"perSecond": 5, "burst": 10}, "mode": "fixed"});
        let patch = json!({"rate": {"perSecond": 20}});
        assert_eq!(
            deep_merge(&base, &patch),
            json!({"rate": {"perSecond": 20, "burst": 10}, "mode": "fixed"})
        );
        // Inputs untouched.
        assert_eq!(base["rate"]["perSecond"], 5);
    }

    #[test]
    fn test_arrays_and_scalars_replace() {
        let base = json!({"headers": ["a", "b"], "enabled": true});
        let patch = json!({"headers": ["c"], "enabled": false});
        assert_eq!(
            deep_merge(&base, &patch),
            json!({"headers": ["c"], "enabled": false})
        );
    }

    #[test]
    fn test_null_removes_key() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let patch = json!({"a": null, "b": {"d": null}, "e": {"f": null, "g": 1}});
        assert_eq!(deep_merge(&base, &patch), json!({"b": {"c": 2}, "e": {"g": 1}}));
    }

    #[test]
    fn test_diff_reports_noop() {
        let base = json!({"a": 1});
        assert!(ConfigDiff::apply(&base, &json!({"a": 1})).is_noop());
        assert!(!ConfigDiff::apply(&base, &json!({"a": 2})).is_noop());
    }
}
