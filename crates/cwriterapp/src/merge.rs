//! Structural merge of JSON values.
//!
//! Objects merge key by key, recursively. Everything else, arrays included,
//! replaces the target wholesale. A chapter list in a patch is the new chapter
//! list, never an element-wise overlay of the old one.

use serde_json::{Map, Value};

/// Merge `patch` into `target` in place.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            merge_maps(target_map, patch_map);
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn merge_maps(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        let both_objects = value.is_object() && target.get(key).is_some_and(Value::is_object);
        if both_objects {
            if let Some(existing) = target.get_mut(key) {
                deep_merge(existing, value);
            }
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}
