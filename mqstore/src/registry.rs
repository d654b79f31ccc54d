//! Registry snapshot of tenants, users and store-topic patterns
//!
//! A [`Snapshot`] is validated when it is built and never mutated afterwards.
//! [`Registry`] publishes the current snapshot behind one atomic reference, readers
//! load it once per operation and keep that view even if a reload swaps it.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::MqstoreError;
use crate::topic::TopicFilter;

pub type StoreTopics = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tenant {
    pub id: String,
    #[serde(rename = "allowedUsers", alias = "allowed_users", default)]
    pub allowed_users: Vec<String>,
}

impl Tenant {
    #[inline]
    pub fn new<I, S>(id: impl Into<String>, allowed_users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { id: id.into(), allowed_users: allowed_users.into_iter().map(Into::into).collect() }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub username: String,
    #[serde(alias = "password")]
    pub credential: String,
}

impl User {
    #[inline]
    pub fn new(username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self { username: username.into(), credential: credential.into() }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User").field("username", &self.username).field("credential", &"***").finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    store_topics: StoreTopics,
}

impl Snapshot {
    /// Build a snapshot, rejecting content that must never become live. A tenant id
    /// listed twice is kept, access checks deny that tenant.
    pub fn new(tenants: Vec<Tenant>, users: Vec<User>, store_topics: StoreTopics) -> Result<Self, MqstoreError> {
        let mut ids = BTreeSet::new();
        for t in &tenants {
            if t.id.is_empty() {
                return Err(MqstoreError::config_reload("tenant with empty id"));
            }
            if !ids.insert(t.id.as_str()) {
                log::warn!("duplicated tenant id `{}`, access to it is denied", t.id);
            }
        }
        if users.iter().any(|u| u.username.is_empty()) {
            return Err(MqstoreError::config_reload("user with empty username"));
        }
        for pattern in &store_topics {
            pattern.parse::<TopicFilter>().map_err(|e| {
                MqstoreError::config_reload(format!("store topic `{}` is malformed, {}", pattern, e))
            })?;
        }
        Ok(Self { tenants, users, store_topics })
    }

    #[inline]
    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    #[inline]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    #[inline]
    pub fn store_topics(&self) -> &StoreTopics {
        &self.store_topics
    }
}

pub struct Registry {
    current: ArcSwap<Snapshot>,
}

impl Registry {
    #[inline]
    pub fn new(snapshot: Snapshot) -> Self {
        Self { current: ArcSwap::from_pointee(snapshot) }
    }

    /// The snapshot live at the time of the call
    #[inline]
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Publish `snapshot` as current and hand back the one it replaced
    #[inline]
    pub(crate) fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        self.current.swap(Arc::new(snapshot))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn topics(items: &[&str]) -> StoreTopics {
        items.iter().map(|s| s.to_string()).collect()
    }

    pub(crate) fn boiler_snapshot() -> Snapshot {
        Snapshot::new(
            vec![Tenant::new("boiler1", ["alice"])],
            vec![User::new("alice", "secret")],
            topics(&["boiler1/temp"]),
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize_registry_files() {
        let users: Vec<User> = serde_json::from_str(r#"[{"username":"alice","password":"secret"}]"#).unwrap();
        assert_eq!(users[0].credential, "secret");
        let tenants: Vec<Tenant> =
            serde_json::from_str(r#"[{"id":"boiler1","allowedUsers":["alice","bob"]}]"#).unwrap();
        assert_eq!(tenants[0].allowed_users, vec!["alice", "bob"]);
        let tenants: Vec<Tenant> = serde_json::from_str(r#"[{"id":"boiler2","allowed_users":[]}]"#).unwrap();
        assert!(tenants[0].allowed_users.is_empty());
    }

    #[test]
    fn test_validation() {
        let dup = Snapshot::new(vec![Tenant::new("a", ["x"]), Tenant::new("a", ["y"])], vec![], topics(&[]));
        assert_eq!(dup.unwrap().tenants().len(), 2);

        let empty_id = Snapshot::new(vec![Tenant::new("", ["x"])], vec![], topics(&[]));
        assert!(matches!(empty_id, Err(MqstoreError::ConfigReload(_))));

        let empty_user = Snapshot::new(vec![], vec![User::new("", "pw")], topics(&[]));
        assert!(empty_user.is_err());

        let bad_pattern = Snapshot::new(vec![], vec![], topics(&["a/#/b"]));
        assert!(bad_pattern.is_err());

        let never_matches = Snapshot::new(vec![], vec![], topics(&["boiler-1/temp"]));
        assert!(matches!(never_matches, Err(MqstoreError::ConfigReload(_))));

        assert!(Snapshot::new(vec![], vec![], topics(&["a/+/c", "b/#"])).is_ok());
    }

    #[test]
    fn test_swap_keeps_captured_view() {
        let registry = Registry::new(boiler_snapshot());
        let captured = registry.load();
        let old = registry.swap(Snapshot::default());
        assert_eq!(old.tenants().len(), 1);
        assert_eq!(captured.tenants()[0].id, "boiler1");
        assert!(registry.load().tenants().is_empty());
    }

    #[test]
    fn test_credential_hidden_in_debug() {
        let s = format!("{:?}", User::new("alice", "secret"));
        assert!(!s.contains("secret"));
    }
}
