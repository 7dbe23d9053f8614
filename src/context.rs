use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const CACHE_MANAGER_NAME: &str = "cacheManagerName";
pub const CACHE_NAME: &str = "cacheName";
pub const CLIENT_ID: &str = "clientId";
pub const ENTITY_ID: &str = "entityId";
pub const ALIAS: &str = "alias";

/// Key/value coordinates identifying a managed object (cache manager, cache, client, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, String>);

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn create(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::empty().with(key, value)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Merge `other` into this context; `other` wins on conflicting keys.
    #[must_use]
    pub fn with_all(mut self, other: &Context) -> Self {
        self.0.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True if every entry of `other` is present here with the same value.
    pub fn contains_all(&self, other: &Context) -> bool {
        other.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
