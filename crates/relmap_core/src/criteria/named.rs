//! Registry of pluggable single-token filter keys.

use super::node::Criteria;
use super::{CriteriaError, CriteriaResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Filter key that expands into arbitrary predicates on a criteria node.
///
/// Implemented for closures, so `|criteria, value| { ... }` registers directly.
pub trait NamedCriterion: Send + Sync {
    fn apply(&self, criteria: &mut Criteria, value: &Value) -> CriteriaResult<()>;
}

impl<F> NamedCriterion for F
where
    F: Fn(&mut Criteria, &Value) -> CriteriaResult<()> + Send + Sync,
{
    fn apply(&self, criteria: &mut Criteria, value: &Value) -> CriteriaResult<()> {
        self(criteria, value)
    }
}

/// Named criteria keyed by `(entity name, criterion name)`.
#[derive(Default, Clone)]
pub struct NamedCriteriaRegistry {
    criteria: BTreeMap<(String, String), Arc<dyn NamedCriterion>>,
}

impl NamedCriteriaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one named criterion; duplicate `(entity, name)` pairs are rejected.
    pub fn register(
        &mut self,
        entity_name: &str,
        name: &str,
        criterion: Arc<dyn NamedCriterion>,
    ) -> CriteriaResult<()> {
        let key = (entity_name.trim().to_string(), name.trim().to_string());
        if key.0.is_empty() || key.1.is_empty() {
            return Err(CriteriaError::invalid(
                "named criterion requires an entity name and a criterion name",
            ));
        }
        if self.criteria.contains_key(&key) {
            return Err(CriteriaError::invalid(format!(
                "named criterion `{}` already registered for `{}`",
                key.1, key.0
            )));
        }
        self.criteria.insert(key, criterion);
        Ok(())
    }

    /// Closure shorthand for [`NamedCriteriaRegistry::register`].
    pub fn register_fn<F>(&mut self, entity_name: &str, name: &str, criterion: F) -> CriteriaResult<()>
    where
        F: Fn(&mut Criteria, &Value) -> CriteriaResult<()> + Send + Sync + 'static,
    {
        self.register(entity_name, name, Arc::new(criterion))
    }

    pub fn get(&self, entity_name: &str, name: &str) -> Option<Arc<dyn NamedCriterion>> {
        self.criteria
            .get(&(entity_name.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl std::fmt::Debug for NamedCriteriaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedCriteriaRegistry")
            .field("criteria", &self.criteria.keys().collect::<Vec<_>>())
            .finish()
    }
}
