//! Order-insensitive structural comparison of JSON documents
//!
//! Objects are compared key by key. Arrays are compared as multisets: an
//! element only counts as added or removed when no equal element is left
//! to pair it with on the other side. Scalars must match exactly, so `1`
//! and `1.0` differ.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Result of comparing an old and a new document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub differences: Vec<Difference>,
}

/// A specific difference between documents
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub category: DiffCategory,
    pub path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffCategory {
    /// Present only in the new document
    Added,
    /// Present only in the old document
    Removed,
    /// Same kind of value, different content
    Changed,
    /// Different kinds of value (e.g. string vs number)
    TypeChanged,
}

impl fmt::Display for DiffCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffCategory::Added => write!(f, "ADDED"),
            DiffCategory::Removed => write!(f, "REMOVED"),
            DiffCategory::Changed => write!(f, "CHANGED"),
            DiffCategory::TypeChanged => write!(f, "TYPE"),
        }
    }
}

impl DiffResult {
    /// True when no difference exists at any depth
    pub fn is_equivalent(&self) -> bool {
        self.differences.is_empty()
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_equivalent() {
            return write!(f, "equivalent");
        }
        write!(f, "{} differences", self.differences.len())?;
        for diff in &self.differences {
            write!(
                f,
                "\n   [{:>8}] {} : old={} new={}",
                diff.category,
                diff.path,
                render(diff.old_value.as_ref()),
                render(diff.new_value.as_ref()),
            )?;
        }
        Ok(())
    }
}

fn render(value: Option<&Value>) -> String {
    value.map_or_else(|| "(missing)".to_string(), Value::to_string)
}

/// Compare two documents, ignoring array order
pub fn diff(old: &Value, new: &Value) -> DiffResult {
    let mut differences = Vec::new();
    compare_json("root", old, new, &mut differences);
    DiffResult { differences }
}

fn compare_json(path: &str, old: &Value, new: &Value, differences: &mut Vec<Difference>) {
    match (old, new) {
        (Value::Object(old_obj), Value::Object(new_obj)) => {
            for (key, old_value) in old_obj {
                let new_path = format!("{}[{}]", path, Value::String(key.clone()));
                match new_obj.get(key) {
                    Some(new_value) => compare_json(&new_path, old_value, new_value, differences),
                    None => differences.push(Difference {
                        category: DiffCategory::Removed,
                        path: new_path,
                        old_value: Some(old_value.clone()),
                        new_value: None,
                    }),
                }
            }

            for (key, new_value) in new_obj {
                if !old_obj.contains_key(key) {
                    differences.push(Difference {
                        category: DiffCategory::Added,
                        path: format!("{}[{}]", path, Value::String(key.clone())),
                        old_value: None,
                        new_value: Some(new_value.clone()),
                    });
                }
            }
        }
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            compare_multiset(path, old_arr, new_arr, differences);
        }
        _ if kind(old) != kind(new) => differences.push(Difference {
            category: DiffCategory::TypeChanged,
            path: path.to_string(),
            old_value: Some(old.clone()),
            new_value: Some(new.clone()),
        }),
        _ => {
            // Same equality rule as array element pairing
            if canonical(old) != canonical(new) {
                differences.push(Difference {
                    category: DiffCategory::Changed,
                    path: path.to_string(),
                    old_value: Some(old.clone()),
                    new_value: Some(new.clone()),
                });
            }
        }
    }
}

/// Pair up equal elements regardless of position; leftovers are reported
/// at their original index.
fn compare_multiset(path: &str, old: &[Value], new: &[Value], differences: &mut Vec<Difference>) {
    let mut unmatched_new: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, value) in new.iter().enumerate().rev() {
        unmatched_new.entry(canonical(value)).or_default().push(idx);
    }

    let mut matched_new = vec![false; new.len()];
    for (idx, value) in old.iter().enumerate() {
        let paired = unmatched_new
            .get_mut(&canonical(value))
            .and_then(|indices| indices.pop());
        match paired {
            Some(new_idx) => matched_new[new_idx] = true,
            None => differences.push(Difference {
                category: DiffCategory::Removed,
                path: format!("{}[{}]", path, idx),
                old_value: Some(value.clone()),
                new_value: None,
            }),
        }
    }

    for (idx, value) in new.iter().enumerate() {
        if !matched_new[idx] {
            differences.push(Difference {
                category: DiffCategory::Added,
                path: format!("{}[{}]", path, idx),
                old_value: None,
                new_value: Some(value.clone()),
            });
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serialize with object keys sorted and array elements sorted, so that
/// two values are order-insensitively equal exactly when their canonical
/// strings are equal.
fn canonical(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(canonical).collect();
            parts.sort_unstable();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, String)> =
                map.iter().map(|(k, v)| (k, canonical(v))).collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        scalar => scalar.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn of(result: &DiffResult, category: DiffCategory) -> Vec<&Difference> {
        result
            .differences
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    #[test]
    fn test_reordered_array_is_equivalent() {
        let result = diff(&json!({"a": [1, 2, 3]}), &json!({"a": [3, 2, 1]}));
        assert!(result.is_equivalent(), "{result}");
    }

    #[test]
    fn test_added_array_element() {
        let result = diff(&json!({"a": [1, 2]}), &json!({"a": [1, 2, 3]}));
        assert_eq!(result.differences.len(), 1);
        let added: Vec<_> = of(&result, DiffCategory::Added);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].path, "root[\"a\"][2]");
        assert_eq!(added[0].new_value, Some(json!(3)));
    }

    #[test]
    fn test_removed_array_element_reports_old_index() {
        let result = diff(&json!([5, 6, 7]), &json!([7, 5]));
        let removed: Vec<_> = of(&result, DiffCategory::Removed);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].path, "root[1]");
        assert_eq!(removed[0].old_value, Some(json!(6)));
    }

    #[test]
    fn test_array_is_multiset_not_set() {
        let result = diff(&json!([1, 1, 2]), &json!([1, 2, 2]));
        assert_eq!(of(&result, DiffCategory::Removed).len(), 1);
        assert_eq!(of(&result, DiffCategory::Added).len(), 1);
    }

    #[test]
    fn test_nested_arrays_of_objects_ignore_order() {
        let old = json!({
            "cpes": [
                {"uri": "cpe:/a:apache:http_server:2.4", "tags": ["x", "y"]},
                {"uri": "cpe:/a:apache:http_server:2.2", "tags": []},
            ]
        });
        let new = json!({
            "cpes": [
                {"tags": [], "uri": "cpe:/a:apache:http_server:2.2"},
                {"tags": ["y", "x"], "uri": "cpe:/a:apache:http_server:2.4"},
            ]
        });
        assert!(diff(&old, &new).is_equivalent());
    }

    #[test]
    fn test_changed_scalar() {
        let result = diff(&json!({"v": 2}), &json!({"v": 3}));
        assert_eq!(
            result.differences,
            vec![Difference {
                category: DiffCategory::Changed,
                path: "root[\"v\"]".to_string(),
                old_value: Some(json!(2)),
                new_value: Some(json!(3)),
            }]
        );
    }

    #[test]
    fn test_type_change() {
        let result = diff(&json!({"v": "1"}), &json!({"v": 1}));
        assert_eq!(of(&result, DiffCategory::TypeChanged).len(), 1);

        let result = diff(&json!({"v": null}), &json!({"v": {}}));
        assert_eq!(of(&result, DiffCategory::TypeChanged).len(), 1);
    }

    #[test]
    fn test_no_numeric_tolerance() {
        assert!(!diff(&json!(1), &json!(1.0)).is_equivalent());
        assert!(!diff(&json!(0.1), &json!(0.10000001)).is_equivalent());
    }

    #[test]
    fn test_negative_zero_same_rule_for_scalars_and_array_elements() {
        let scalar = diff(&json!(-0.0), &json!(0.0));
        let element = diff(&json!([-0.0]), &json!([0.0]));
        assert_eq!(scalar.is_equivalent(), element.is_equivalent());
        assert!(!scalar.is_equivalent());
        assert_eq!(of(&scalar, DiffCategory::Changed).len(), 1);

        assert!(diff(&json!([-0.0, 1]), &json!([1, -0.0])).is_equivalent());
    }

    #[test]
    fn test_object_keys_added_and_removed() {
        let result = diff(&json!({"a": 1, "b": 2}), &json!({"b": 2, "c": 3}));
        let removed: Vec<_> = of(&result, DiffCategory::Removed);
        let added: Vec<_> = of(&result, DiffCategory::Added);
        assert_eq!(removed[0].path, "root[\"a\"]");
        assert_eq!(added[0].path, "root[\"c\"]");
        assert_eq!(result.differences.len(), 2);
    }

    #[test]
    fn test_reflexive() {
        let samples = [
            json!(null),
            json!(true),
            json!(-12.5),
            json!("text"),
            json!([]),
            json!({}),
            json!([[1, [2, 3]], {"k": [null, false]}, "s", [1, 1]]),
            json!({"deep": {"deeper": [{"a": 1}, {"a": 1}, {"b": [3, 2, 1]}]}}),
        ];
        for value in &samples {
            assert!(diff(value, value).is_equivalent(), "{value}");
        }
    }

    #[test]
    fn test_canonical_distinguishes_string_and_number() {
        assert!(!diff(&json!(["1"]), &json!([1])).is_equivalent());
        assert!(!diff(&json!([{"a": "b,c"}]), &json!([{"a": "b", "c": null}])).is_equivalent());
    }

    #[test]
    fn test_display_lists_paths() {
        let result = diff(&json!({"v": 2}), &json!({"v": 3}));
        let text = result.to_string();
        assert!(text.starts_with("1 differences"));
        assert!(text.contains("CHANGED"));
        assert!(text.contains("root[\"v\"]"));
        assert_eq!(diff(&json!(1), &json!(1)).to_string(), "equivalent");
    }
}
