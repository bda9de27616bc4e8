//! Role → permission policy engine
//!
//! Rules are `(role, permission)` pairs derived from the credential store,
//! plus a built-in rule that lets the `admin` role do everything. The rule
//! set lives in memory and is replaced wholesale by [`PolicyEngine::rebuild`].

use quizbank_core::{performance, CredentialStore, QuizbankResult};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Role that matches every permission
pub const ADMIN_ROLE: &str = "admin";

/// Immutable set of allow rules
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    rules: HashSet<(String, String)>,
}

impl PolicySnapshot {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let rules = pairs
            .into_iter()
            .map(|(role, permission)| (role.to_lowercase(), permission))
            .collect();
        Self { rules }
    }

    pub fn allows(&self, role: &str, permission: &str) -> bool {
        let role = role.to_lowercase();
        if role == ADMIN_ROLE {
            return true;
        }
        self.rules.contains(&(role, permission.to_string()))
    }

    /// Number of derived rules, not counting the admin wildcard
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Shared, rebuildable matcher
pub struct PolicyEngine {
    store: Arc<dyn CredentialStore>,
    snapshot: RwLock<PolicySnapshot>,
}

impl PolicyEngine {
    /// Create the engine and load the current rules
    pub async fn new(store: Arc<dyn CredentialStore>) -> QuizbankResult<Self> {
        let engine = Self {
            store,
            snapshot: RwLock::new(PolicySnapshot::default()),
        };
        engine.rebuild().await?;
        Ok(engine)
    }

    /// Replace all rules with the store's current associations.
    ///
    /// The write lock is held for the whole rebuild, so rebuilds never
    /// interleave and readers see either the old or the new rule set. On a
    /// store failure the previous rules stay in place.
    pub async fn rebuild(&self) -> QuizbankResult<usize> {
        let mut snapshot = self.snapshot.write().await;

        let pairs = performance::measure_async(
            "policy_rebuild",
            self.store.role_permission_pairs(),
        )
        .await?;

        *snapshot = PolicySnapshot::from_pairs(pairs);
        info!(rules = snapshot.len(), "Policy rebuilt");
        Ok(snapshot.len())
    }

    /// May `role` exercise `permission`?
    pub async fn enforce(&self, role: &str, permission: &str) -> bool {
        self.snapshot.read().await.allows(role, permission)
    }

    /// True when any of the roles is allowed; stops at the first match
    pub async fn enforce_any<S: AsRef<str>>(&self, roles: &[S], permission: &str) -> bool {
        let snapshot = self.snapshot.read().await;
        let allowed = roles
            .iter()
            .any(|role| snapshot.allows(role.as_ref(), permission));
        debug!(permission, allowed, "Policy check");
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(r, p)| (r.to_string(), p.to_string()))
            .collect()
    }

    #[test]
    fn test_admin_matches_everything() {
        let snapshot = PolicySnapshot::default();
        assert!(snapshot.allows("admin", "quiz:edit"));
        assert!(snapshot.allows("Admin", "anything:at_all"));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_role_without_permissions_matches_nothing() {
        let snapshot = PolicySnapshot::from_pairs(pairs(&[("editor", "quiz:edit")]));
        assert!(!snapshot.allows("viewer", "quiz:edit"));
        assert!(!snapshot.allows("viewer", "quiz:read"));
    }

    #[test]
    fn test_derived_rules_lowercase_roles() {
        let snapshot = PolicySnapshot::from_pairs(pairs(&[("Editor", "quiz:edit")]));
        assert!(snapshot.allows("editor", "quiz:edit"));
        assert!(snapshot.allows("EDITOR", "quiz:edit"));
        assert!(!snapshot.allows("editor", "quiz:delete"));
        assert_eq!(snapshot.len(), 1);
    }
}
