use crate::engine::tuple::{Fields, Tuple};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;

/// How a stream spreads tuples over the executors of its destination bolt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Grouping {
    /// Tuples with equal values for `fields` always reach the same executor
    Fields { fields: Fields },
    /// Every destination receives every tuple
    Broadcast,
    /// Round robin over destinations
    Shuffle,
}

impl Grouping {
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Grouping::Fields {
            fields: Fields::new(names),
        }
    }
}

/// Concatenated values of the grouping fields, in grouping order.
///
/// Missing fields contribute nothing, so a tuple without the key lands on a
/// fixed slot instead of failing.
pub fn partition_key(fields: &Fields, tuple: &Tuple) -> String {
    let mut key = String::new();
    for name in fields.names() {
        if let Some(value) = tuple.get_by_field(name) {
            key.push_str(&value.to_key_string());
        }
    }
    key
}

/// Destination index for `key` among `count` destinations.
///
/// Uses seahash, which is seedless, so every worker computes the same index
/// for the same key.
pub fn partition_for(key: &str, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let mut hasher = seahash::SeaHasher::new();
    hasher.write(key.as_bytes());
    (hasher.finish() % count as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tuple::{ExecutorId, Value};

    #[test]
    fn test_partition_is_stable() {
        for key in ["a", "b", "hello", ""] {
            let first = partition_for(key, 7);
            for _ in 0..10 {
                assert_eq!(partition_for(key, 7), first);
            }
            assert!(first < 7);
        }
        assert_eq!(partition_for("anything", 1), 0);
    }

    #[test]
    fn test_partition_key_follows_grouping_order() {
        let tuple = Tuple::new(
            Fields::new(["key", "value"]),
            vec![Value::from("a"), Value::from("1")],
            ExecutorId::generate(),
        )
        .unwrap();

        assert_eq!(partition_key(&Fields::new(["value", "key"]), &tuple), "1a");
        assert_eq!(partition_key(&Fields::new(["key"]), &tuple), "a");
    }

    #[test]
    fn test_same_key_same_partition_across_tuples() {
        let make = |value: &str| {
            Tuple::new(
                Fields::new(["key", "value"]),
                vec![Value::from("word"), Value::from(value)],
                ExecutorId::generate(),
            )
            .unwrap()
        };
        let fields = Fields::new(["key"]);
        let a = partition_for(&partition_key(&fields, &make("1")), 4);
        let b = partition_for(&partition_key(&fields, &make("2")), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_grouping_serde() {
        let grouping = Grouping::fields(["key"]);
        let json = serde_json::to_value(&grouping).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "fields", "fields": ["key"]})
        );
        let broadcast: Grouping = serde_json::from_str(r#"{"type":"broadcast"}"#).unwrap();
        assert_eq!(broadcast, Grouping::Broadcast);
    }
}
