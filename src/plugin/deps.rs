//! # Resolved dependency values handed to plugins.

use std::sync::Arc;

use crate::error::PluginError;
use crate::plugin::capability::{Capability, Value};

/// Values resolved for a plugin's declared needs, looked up by type.
///
/// Each entry remembers the name of the plugin that produced it.
#[derive(Clone, Debug, Default)]
pub struct Dependencies {
    entries: Vec<Entry>,
}

#[derive(Clone, Debug)]
struct Entry {
    wanted: Capability,
    provider: Arc<str>,
    value: Value,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, wanted: Capability, provider: Arc<str>, value: Value) {
        self.entries.push(Entry {
            wanted,
            provider,
            value,
        });
    }

    /// Returns the first value of type `T`, if resolved.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries.iter().find_map(|e| e.value.downcast::<T>())
    }

    /// Like [`get`](Self::get) but reports a missing value as a fatal plugin error.
    pub fn require<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, PluginError> {
        self.get::<T>().ok_or_else(|| {
            PluginError::fatal(format!(
                "dependency {} was not resolved",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Returns every value of type `T` together with its provider's name.
    pub fn all<T: ?Sized + Send + Sync + 'static>(&self) -> Vec<(Arc<str>, Arc<T>)> {
        self.entries
            .iter()
            .filter_map(|e| e.value.downcast::<T>().map(|v| (e.provider.clone(), v)))
            .collect()
    }

    /// Name of the plugin that produced the value for `wanted`.
    pub fn provider_of(&self, wanted: Capability) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.wanted == wanted)
            .map(|e| e.provider.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Db;
    struct Cache;

    #[test]
    fn lookup_by_type() {
        let mut deps = Dependencies::new();
        deps.push(Capability::of::<Db>(), "db".into(), Value::new(Arc::new(Db)));

        assert!(deps.get::<Db>().is_some());
        assert!(deps.get::<Cache>().is_none());
        assert_eq!(deps.provider_of(Capability::of::<Db>()), Some("db"));
        assert!(matches!(
            deps.require::<Cache>(),
            Err(PluginError::Fatal { .. })
        ));
    }

    #[test]
    fn all_returns_every_provider() {
        let mut deps = Dependencies::new();
        deps.push(Capability::of::<Db>(), "primary".into(), Value::new(Arc::new(Db)));
        deps.push(Capability::of::<Db>(), "replica".into(), Value::new(Arc::new(Db)));

        let names: Vec<String> = deps.all::<Db>().into_iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["primary".to_string(), "replica".to_string()]);
        assert_eq!(deps.len(), 2);
    }
}
