use serde_json::Value;

/// Deep-merge `source` into `target`, last writer winning.
///
/// Object-valued keys merge recursively and array-valued keys concatenate
/// (provider blocks contribute one array entry per alias); every other
/// conflict is resolved in favor of `source`. Associative under this rule, so
/// fragments can be folded in any grouping as long as order is kept.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    // take() keeps the key in its original slot, so emitted
                    // key order follows first-writer position.
                    Some(existing) => {
                        let prior = existing.take();
                        *existing = deep_merge(prior, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
            Value::Object(target_map)
        }
        (Value::Array(mut target_items), Value::Array(source_items)) => {
            target_items.extend(source_items);
            Value::Array(target_items)
        }
        (_, source) => source,
    }
}
