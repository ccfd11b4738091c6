//! Settings merge.

use crate::plugin::PluginConfig;
use serde_json::{Map, Value as JsonValue};

/// Merge persisted overrides over a descriptor's default settings.
///
/// Nested objects merge key by key; any other override value replaces the
/// default outright.
#[must_use]
pub fn merge_settings(
    defaults: &Map<String, JsonValue>,
    overrides: Option<&Map<String, JsonValue>>,
) -> PluginConfig {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        merge_into(&mut merged, overrides);
    }
    PluginConfig::new(merged)
}

fn merge_into(target: &mut Map<String, JsonValue>, overrides: &Map<String, JsonValue>) {
    for (key, value) in overrides {
        match (target.get_mut(key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn overrides_win_and_nested_objects_merge() {
        let defaults = object(json!({
            "interval": 60,
            "api": { "url": "https://api.example", "timeout": 10 }
        }));
        let overrides = object(json!({
            "interval": 30,
            "api": { "timeout": 5 }
        }));

        let config = merge_settings(&defaults, Some(&overrides));
        assert_eq!(config.get("interval"), Some(&json!(30)));
        assert_eq!(
            config.get("api"),
            Some(&json!({ "url": "https://api.example", "timeout": 5 }))
        );
    }

    #[test]
    fn no_overrides_keeps_defaults() {
        let defaults = object(json!({ "enabled": true }));
        let config = merge_settings(&defaults, None);
        assert_eq!(config.settings(), &defaults);
    }
}
