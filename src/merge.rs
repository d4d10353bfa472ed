//! Recursive merge used for partial entity updates and field-level sync.
//!
//! Objects merge key by key, recursively. Arrays are replaced as a whole,
//! never concatenated or merged by index. Scalars, including `null`,
//! overwrite. Keys absent from the patch are left untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Merge `patch` into `target` in place.
pub fn deep_merge(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    match target {
        Value::Object(target) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        target => *target = Value::Object(patch),
    }
}

/// Merge a JSON patch into a typed value, round-tripping through [`Value`].
pub fn merge_into<E>(entity: &E, patch: Value) -> Result<E, serde_json::Error>
where
    E: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(entity)?;
    deep_merge(&mut value, patch);
    serde_json::from_value(value)
}

/// Copy only the listed dot-separated paths out of `source`.
///
/// Paths that do not exist in `source` are skipped.
pub fn select_paths(source: &Value, paths: &[String]) -> Value {
    let mut selected = Value::Object(Map::new());
    for path in paths {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if let Some(found) = lookup(source, &segments) {
            deep_merge(&mut selected, nest(&segments, found.clone()));
        }
    }
    selected
}

fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.as_object()?.get(*segment))
}

fn nest(segments: &[&str], leaf: Value) -> Value {
    segments.iter().rev().fold(leaf, |inner, segment| {
        let mut map = Map::new();
        map.insert((*segment).to_string(), inner);
        Value::Object(map)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn merges_disjoint_fields() {
        let mut target = json!({"a": 1});
        deep_merge(&mut target, json!({"b": 2}));
        assert_eq!(target, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merges_nested_objects_field_by_field() {
        let mut target = json!({"meta": {"color": "red", "size": 3}, "title": "x"});
        deep_merge(&mut target, json!({"meta": {"size": 4}}));
        assert_eq!(
            target,
            json!({"meta": {"color": "red", "size": 4}, "title": "x"})
        );
    }

    #[test]
    fn arrays_are_replaced() {
        let mut target = json!({"tags": ["a", "b", "c"]});
        deep_merge(&mut target, json!({"tags": ["z"]}));
        assert_eq!(target, json!({"tags": ["z"]}));
    }

    #[test]
    fn null_overwrites() {
        let mut target = json!({"due": "tomorrow"});
        deep_merge(&mut target, json!({"due": null}));
        assert_eq!(target, json!({"due": null}));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: String,
        title: String,
        done: bool,
    }

    #[test]
    fn merge_into_typed_entity() {
        let task = Task {
            id: "t1".into(),
            title: "buy milk".into(),
            done: false,
        };
        let merged = merge_into(&task, json!({"done": true})).unwrap();
        assert_eq!(merged.title, "buy milk");
        assert!(merged.done);
    }

    #[test]
    fn merge_into_rejects_ill_typed_patch() {
        let task = Task {
            id: "t1".into(),
            title: "buy milk".into(),
            done: false,
        };
        assert!(merge_into(&task, json!({"done": "yes"})).is_err());
    }

    #[test]
    fn select_paths_keeps_only_listed_fields() {
        let source = json!({"ids": [1], "entities": {"1": {"x": 1}}, "ui": {"open": true, "tab": 2}});
        let selected = select_paths(&source, &["ids".to_string(), "ui.tab".to_string()]);
        assert_eq!(selected, json!({"ids": [1], "ui": {"tab": 2}}));
    }
}
