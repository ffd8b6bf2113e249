//! Configuration trees: ordered nested mappings with deep merge.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Quoted string.
    Str(String),
    /// Bare Erlang atom.
    Atom(String),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Nested mapping.
    Map(ConfigMap),
}

impl ConfigValue {
    /// Create an atom value.
    pub fn atom(name: impl Into<String>) -> Self {
        ConfigValue::Atom(name.into())
    }

    /// Text of a string or atom.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) | ConfigValue::Atom(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean value, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Nested mapping, if this is one.
    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this is anything but a mapping.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ConfigValue::Map(_))
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Int(i.into())
    }
}

impl From<u16> for ConfigValue {
    fn from(i: u16) -> Self {
        ConfigValue::Int(i.into())
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(m: ConfigMap) -> Self {
        ConfigValue::Map(m)
    }
}

/// An insertion-ordered mapping from setting key to value.
///
/// Keys are unique. Rendering follows insertion order, so defaults keep
/// their layout in generated files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMap {
    entries: Vec<(String, ConfigValue)>,
}

impl ConfigMap {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, keeping the position of an existing key.
    ///
    /// Returns the previous value, if any.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a key for modification.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Look up a nested value, e.g. `["riak_core", "web_port"]`.
    pub fn get_path(&self, path: &[&str]) -> Option<&ConfigValue> {
        let (last, parents) = path.split_last()?;
        let mut map = self;
        for key in parents {
            map = map.get(key)?.as_map()?;
        }
        map.get(last)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deep-merge `overrides` on top of this mapping. See [`merge`].
    pub fn merged(&self, overrides: &ConfigMap) -> ConfigMap {
        merge(self, overrides)
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigMap
where
    K: Into<String>,
    V: Into<ConfigValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ConfigMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Deep-merge two mappings without touching either.
///
/// - keys only in `overrides` are appended, in `overrides` order
/// - keys in both whose values are both mappings are merged recursively
/// - otherwise the value from `overrides` wins
///
/// Keys from `base` keep their position.
pub fn merge(base: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut out = base.clone();
    for (key, value) in overrides.iter() {
        let merged = match (out.get(key), value) {
            (Some(ConfigValue::Map(b)), ConfigValue::Map(o)) => ConfigValue::Map(merge(b, o)),
            _ => value.clone(),
        };
        out.insert(key, merged);
    }
    out
}

// A single-key table `{ atom = "name" }` deserializes to an atom.
const ATOM_KEY: &str = "atom";

impl<'de> Deserialize<'de> for ConfigMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = ConfigMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of setting keys to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ConfigMap, A::Error> {
                let mut map = ConfigMap::new();
                while let Some((key, value)) = access.next_entry::<String, ConfigValue>()? {
                    if map.insert(key.clone(), value).is_some() {
                        return Err(de::Error::custom(format!("duplicate key `{key}`")));
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = ConfigValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number, boolean, atom or mapping")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ConfigValue, E> {
                Ok(ConfigValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ConfigValue, E> {
                Ok(ConfigValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ConfigValue, E> {
                i64::try_from(v)
                    .map(ConfigValue::Int)
                    .map_err(|_| E::custom(format!("integer {v} out of range")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ConfigValue, E> {
                Ok(ConfigValue::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ConfigValue, E> {
                Ok(ConfigValue::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ConfigValue, E> {
                Ok(ConfigValue::Str(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, access: A) -> Result<ConfigValue, A::Error> {
                let map = ConfigMap::deserialize(de::value::MapAccessDeserializer::new(access))?;
                if map.len() == 1 {
                    if let Some(ConfigValue::Str(name)) = map.get(ATOM_KEY) {
                        return Ok(ConfigValue::Atom(name.clone()));
                    }
                }
                Ok(ConfigValue::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigMap {
        ConfigMap::new()
            .with("riak_core", ConfigMap::new().with("web_port", 9000).with("web_ip", "127.0.0.1"))
            .with("riak_kv", ConfigMap::new().with("test", true))
    }

    #[test]
    fn test_merge_empty_is_identity() {
        assert_eq!(merge(&base(), &ConfigMap::new()), base());
    }

    #[test]
    fn test_merge_right_biased_scalars() {
        let overrides = ConfigMap::new().with("riak_core", ConfigMap::new().with("web_port", 8098));
        let merged = merge(&base(), &overrides);

        assert_eq!(
            merged.get_path(&["riak_core", "web_port"]),
            Some(&ConfigValue::Int(8098))
        );
        // untouched sibling survives the nested merge
        assert_eq!(
            merged.get_path(&["riak_core", "web_ip"]),
            Some(&ConfigValue::from("127.0.0.1"))
        );
        assert_eq!(merged.get_path(&["riak_kv", "test"]), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn test_merge_adds_new_keys_after_base_keys() {
        let overrides = ConfigMap::new()
            .with("luwak", ConfigMap::new().with("enabled", true))
            .with("riak_core", ConfigMap::new().with("handoff_port", 9001));
        let merged = merge(&base(), &overrides);

        let top: Vec<&str> = merged.iter().map(|(k, _)| k).collect();
        assert_eq!(top, ["riak_core", "riak_kv", "luwak"]);

        let core: Vec<&str> = merged
            .get("riak_core")
            .and_then(ConfigValue::as_map)
            .unwrap()
            .iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(core, ["web_port", "web_ip", "handoff_port"]);
    }

    #[test]
    fn test_merge_scalar_replaces_mapping() {
        let overrides = ConfigMap::new().with("riak_kv", "disabled");
        let merged = merge(&base(), &overrides);
        assert_eq!(merged.get("riak_kv"), Some(&ConfigValue::from("disabled")));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let b = base();
        let o = ConfigMap::new().with("riak_core", ConfigMap::new().with("web_port", 1));
        let _ = merge(&b, &o);
        assert_eq!(b, base());
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut map = ConfigMap::new().with("a", 1).with("b", 2);
        assert_eq!(map.insert("a", 3), Some(ConfigValue::Int(1)));
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_get_path_misses() {
        let map = base();
        assert!(map.get_path(&[]).is_none());
        assert!(map.get_path(&["riak_core", "web_port", "deeper"]).is_none());
        assert!(map.get_path(&["nope"]).is_none());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let map: ConfigMap = toml::from_str(
            r#"
            [riak_kv]
            storage_backend = { atom = "riak_kv_eleveldb_backend" }
            pb_port = 8087
            riak_kv_stat = false
            ratio = 0.5

            [riak_kv.memory_backend]
            max_memory = 16
            "#,
        )
        .unwrap();

        assert_eq!(
            map.get_path(&["riak_kv", "storage_backend"]),
            Some(&ConfigValue::atom("riak_kv_eleveldb_backend"))
        );
        assert_eq!(map.get_path(&["riak_kv", "pb_port"]), Some(&ConfigValue::Int(8087)));
        assert_eq!(map.get_path(&["riak_kv", "riak_kv_stat"]), Some(&ConfigValue::Bool(false)));
        assert_eq!(map.get_path(&["riak_kv", "ratio"]), Some(&ConfigValue::Float(0.5)));
        assert_eq!(
            map.get_path(&["riak_kv", "memory_backend", "max_memory"]),
            Some(&ConfigValue::Int(16))
        );
    }
}
