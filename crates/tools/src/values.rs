//! Chart value merging.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// Mapping keys merge recursively; any other value, arrays included, is
/// replaced wholesale by the overlay's value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Baseline values with caller-declared values merged on top.
pub fn merged(baseline: &Value, declared: Option<&Value>) -> Value {
    let mut values = baseline.clone();
    if let Some(declared) = declared.filter(|declared| !declared.is_null()) {
        deep_merge(&mut values, declared.clone());
    }
    if values.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        values
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_nested_maps_merge() {
        let mut base = json!({"driver": {"kind": "ebpf", "loader": {"enabled": true}}, "tty": false});
        deep_merge(&mut base, json!({"driver": {"kind": "kmod"}, "tty": true}));
        assert_eq!(
            base,
            json!({"driver": {"kind": "kmod", "loader": {"enabled": true}}, "tty": true})
        );
    }

    #[test]
    fn test_non_map_values_overwrite() {
        let mut base = json!({"args": ["a", "b"], "resources": {"cpu": "1"}});
        deep_merge(&mut base, json!({"args": ["c"], "resources": "none"}));
        assert_eq!(base, json!({"args": ["c"], "resources": "none"}));
    }

    #[test]
    fn test_merged_without_declared_values_is_baseline() {
        let baseline = json!({"tty": true});
        assert_eq!(merged(&baseline, None), baseline);
        assert_eq!(merged(&Value::Null, None), json!({}));
    }
}
