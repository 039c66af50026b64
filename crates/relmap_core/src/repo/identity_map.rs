use indexmap::IndexMap;
use serde_json::Value;

/// Normalizes a primary key value into an identity map key.
///
/// `7` and `"7"` share a key; null, empty strings and structured values are
/// not identities.
pub fn identity_key(id: &Value) -> Option<String> {
    match id {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Tracked<E> {
    live: E,
    snapshot: E,
}

/// Loaded entities by id, each with the snapshot of its last persisted state.
#[derive(Debug, Clone)]
pub struct IdentityMap<E> {
    entries: IndexMap<String, Tracked<E>>,
}

impl<E> Default for IdentityMap<E> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<E: Clone> IdentityMap<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entity` as both live value and snapshot.
    pub fn insert(&mut self, key: String, entity: E) {
        let snapshot = entity.clone();
        self.entries.insert(
            key,
            Tracked {
                live: entity,
                snapshot,
            },
        );
    }

    /// Replaces the live value, keeping the snapshot. No-op for unknown keys.
    pub fn set_live(&mut self, key: &str, entity: E) {
        if let Some(tracked) = self.entries.get_mut(key) {
            tracked.live = entity;
        }
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.entries.get(key).map(|tracked| &tracked.live)
    }

    pub fn snapshot(&self, key: &str) -> Option<&E> {
        self.entries.get(key).map(|tracked| &tracked.snapshot)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the entry, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<E> {
        self.entries.shift_remove(key).map(|tracked| tracked.live)
    }

    /// Snapshots in insertion order.
    pub fn snapshots(&self) -> impl Iterator<Item = (&str, &E)> {
        self.entries
            .iter()
            .map(|(key, tracked)| (key.as_str(), &tracked.snapshot))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{identity_key, IdentityMap};
    use serde_json::json;

    #[test]
    fn identity_key_normalizes_numbers_and_strings() {
        assert_eq!(identity_key(&json!(7)), Some("7".to_string()));
        assert_eq!(identity_key(&json!(" 7 ")), Some("7".to_string()));
        assert_eq!(identity_key(&json!(null)), None);
        assert_eq!(identity_key(&json!("")), None);
        assert_eq!(identity_key(&json!([1])), None);
    }

    #[test]
    fn live_value_diverges_from_snapshot_until_reinserted() {
        let mut map = IdentityMap::new();
        map.insert("1".to_string(), "draft".to_string());
        map.set_live("1", "edited".to_string());

        assert_eq!(map.get("1").map(String::as_str), Some("edited"));
        assert_eq!(map.snapshot("1").map(String::as_str), Some("draft"));

        map.insert("1".to_string(), "edited".to_string());
        assert_eq!(map.snapshot("1").map(String::as_str), Some("edited"));

        assert_eq!(map.remove("1").as_deref(), Some("edited"));
        assert!(map.is_empty());
    }
}
