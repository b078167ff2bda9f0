//! Guard rules
//!
//! A stored [`Rule`] is data: a name, a type name and a JSON payload. The
//! registry turns it into executable behaviour by looking up a factory
//! registered for the type name. Nothing in the hierarchy code executes
//! guards; the authorization layer above does.

use crate::error::{RbacError, Result};
use crate::types::{Item, Rule};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executable guard attached to an item
#[async_trait]
pub trait Guard: Send + Sync {
    /// Does the guard let `username` use `item` given the request `params`?
    async fn execute(&self, username: &str, item: &Item, params: &Value) -> Result<bool>;
}

/// Builds a guard from its stored record
pub type GuardFactory = Arc<dyn Fn(&Rule) -> Result<Arc<dyn Guard>> + Send + Sync>;

/// Type name -> guard factory
#[derive(Clone, Default)]
pub struct RuleRegistry {
    factories: HashMap<String, GuardFactory>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `type_name`
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Rule) -> Result<Arc<dyn Guard>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Build the guard for a stored rule
    ///
    /// Fails with `NotFound` when no factory is registered for the rule's
    /// type name.
    pub fn instantiate(&self, rule: &Rule) -> Result<Arc<dyn Guard>> {
        let factory = self
            .factories
            .get(&rule.type_name)
            .ok_or_else(|| RbacError::NotFound {
                entity: "Rule type",
                name: rule.type_name.clone(),
            })?;
        factory(rule)
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("RuleRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Grants when the request names the user as the author
    struct AuthorGuard {
        really: bool,
    }

    #[async_trait]
    impl Guard for AuthorGuard {
        async fn execute(&self, username: &str, _item: &Item, params: &Value) -> Result<bool> {
            Ok(self.really && params["author"] == username)
        }
    }

    fn registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry.register("AuthorRule", |rule: &Rule| {
            let really = rule.payload["reallyReally"].as_bool().unwrap_or(false);
            Ok(Arc::new(AuthorGuard { really }) as Arc<dyn Guard>)
        });
        registry
    }

    #[tokio::test]
    async fn test_instantiate_and_execute() {
        let rule = Rule::new("isAuthor", "AuthorRule", json!({"reallyReally": true}));
        let guard = registry().instantiate(&rule).unwrap();
        let item = Item::permission("updateOwnPost").with_rule("isAuthor");

        assert!(guard.execute("alice", &item, &json!({"author": "alice"})).await.unwrap());
        assert!(!guard.execute("bob", &item, &json!({"author": "alice"})).await.unwrap());
    }

    #[tokio::test]
    async fn test_payload_reaches_factory() {
        let rule = Rule::new("isAuthor", "AuthorRule", json!({"reallyReally": false}));
        let guard = registry().instantiate(&rule).unwrap();
        let item = Item::permission("updateOwnPost");

        assert!(!guard.execute("alice", &item, &json!({"author": "alice"})).await.unwrap());
    }

    #[test]
    fn test_unknown_type() {
        let rule = Rule::new("isAuthor", "MissingRule", json!({}));
        let err = registry().instantiate(&rule).err().unwrap();
        assert!(err.is_not_found());
        assert!(registry().contains("AuthorRule"));
    }
}
