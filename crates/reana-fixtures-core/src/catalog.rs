//! Catalog of the fixtures this library provides.
//!
//! Every fixture is registered with its reuse scope and the fixtures it
//! requires. The catalog resolves acquisition order (dependencies first) and
//! rejects unknown names, cycles and scope mismatches. Teardown runs in the
//! reverse of the acquisition order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, Result};

/// How long a fixture instance is reused before it is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureScope {
    /// Fresh instance for every test.
    Function,
    /// Shared by all tests of one test module.
    Module,
    /// Shared by the whole test process.
    Session,
}

impl FixtureScope {
    /// Get the scope name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Module => "module",
            Self::Session => "session",
        }
    }

    /// Whether a fixture of this scope may depend on one of `other` scope.
    ///
    /// A fixture can only rely on fixtures that live at least as long.
    pub fn can_depend_on(&self, other: FixtureScope) -> bool {
        other >= *self
    }
}

impl std::fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDef {
    /// Fixture name.
    pub name: &'static str,
    /// Reuse scope.
    pub scope: FixtureScope,
    /// Names of the fixtures that must be acquired first.
    pub requires: &'static [&'static str],
    /// One-line description.
    pub description: &'static str,
}

impl FixtureDef {
    const fn new(
        name: &'static str,
        scope: FixtureScope,
        requires: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            name,
            scope,
            requires,
            description,
        }
    }
}

use FixtureScope::{Function, Module, Session};

const BUILTIN: &[FixtureDef] = &[
    FixtureDef::new("base_app", Module, &[], "Application configuration provided by the component under test"),
    FixtureDef::new("tmp_shared_volume_path", Module, &[], "Temporary shared file system"),
    FixtureDef::new("db_engine", Module, &["base_app"], "Test database engine"),
    FixtureDef::new("session", Function, &["db_engine"], "Database session"),
    FixtureDef::new("app", Function, &["base_app", "db_engine", "session"], "Application context with all tables created"),
    FixtureDef::new("default_user", Function, &["app", "session"], "Default user (user0)"),
    FixtureDef::new("user0", Function, &["app", "session"], "Admin user"),
    FixtureDef::new("user1", Function, &["app", "session"], "First regular user"),
    FixtureDef::new("user2", Function, &["app", "session"], "Second regular user"),
    FixtureDef::new("serial_workflow", Function, &[], "Serial workflow specification"),
    FixtureDef::new("cwl_workflow_with_name", Function, &[], "CWL workflow with a name"),
    FixtureDef::new("cwl_workflow_without_name", Function, &[], "CWL workflow without a name"),
    FixtureDef::new("yadage_workflow_with_name", Function, &[], "Yadage workflow with a name"),
    FixtureDef::new("yadage_workflow_without_name", Function, &[], "Yadage workflow without a name"),
    FixtureDef::new("yadage_workflow_spec_loaded", Function, &[], "Nested yadage specification"),
    FixtureDef::new("snakemake_workflow_spec_loaded", Function, &[], "Scatter-gather snakemake specification"),
    FixtureDef::new("sample_workflow_workspace", Module, &["tmp_shared_volume_path"], "Workspace directory factory"),
    FixtureDef::new(
        "sample_yadage_workflow_in_db",
        Function,
        &["app", "user0", "session", "yadage_workflow_with_name", "sample_workflow_workspace", "tmp_shared_volume_path"],
        "Yadage workflow owned by user0",
    ),
    FixtureDef::new(
        "sample_yadage_workflow_in_db_owned_by_user1",
        Function,
        &["app", "user1", "session", "yadage_workflow_with_name", "sample_workflow_workspace", "tmp_shared_volume_path"],
        "Yadage workflow owned by user1",
    ),
    FixtureDef::new(
        "sample_serial_workflow_in_db",
        Function,
        &["app", "user0", "session", "serial_workflow", "sample_workflow_workspace", "tmp_shared_volume_path"],
        "Serial workflow owned by user0",
    ),
    FixtureDef::new(
        "sample_serial_workflow_in_db_owned_by_user1",
        Function,
        &["app", "user1", "session", "serial_workflow", "sample_workflow_workspace", "tmp_shared_volume_path"],
        "Serial workflow owned by user1",
    ),
    FixtureDef::new("ConsumerBase", Function, &[], "Consumer that acknowledges every message"),
    FixtureDef::new("ConsumerBaseOnMessageMock", Function, &["ConsumerBase"], "Consumer recording every message"),
    FixtureDef::new("consume_queue", Function, &[], "Bounded queue drainer"),
    FixtureDef::new("in_memory_queue_connection", Session, &[], "In-memory message queue connection"),
    FixtureDef::new("default_exchange", Function, &[], "Default direct exchange"),
    FixtureDef::new("default_queue", Function, &["default_exchange"], "Default queue"),
    FixtureDef::new(
        "default_in_memory_producer",
        Function,
        &["in_memory_queue_connection", "default_exchange"],
        "JSON producer on the in-memory connection",
    ),
    FixtureDef::new("no_db_user", Function, &[], "User that only exists in memory"),
    FixtureDef::new("user_secrets", Function, &[], "Sample user secrets"),
    FixtureDef::new("kerberos_user_secrets", Function, &[], "Kerberos user secrets"),
    FixtureDef::new("empty_user_secrets", Function, &[], "No user secrets"),
    FixtureDef::new(
        "corev1_api_client_with_user_secrets",
        Function,
        &["no_db_user"],
        "Kubernetes secret store client factory",
    ),
];

/// Registry of fixture definitions.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    fixtures: HashMap<&'static str, FixtureDef>,
}

impl FixtureCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            fixtures: HashMap::new(),
        }
    }

    /// Catalog of every fixture this library provides.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for def in BUILTIN {
            catalog.register(def.clone());
        }
        catalog
    }

    /// Register a fixture, replacing any previous definition with that name.
    pub fn register(&mut self, def: FixtureDef) {
        self.fixtures.insert(def.name, def);
    }

    /// Get a fixture by name.
    pub fn get(&self, name: &str) -> Option<&FixtureDef> {
        self.fixtures.get(name)
    }

    /// Number of registered fixtures.
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// All fixture names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.fixtures.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Check every definition: requirements exist, no cycles, scopes line up.
    pub fn validate(&self) -> Result<()> {
        for name in self.names() {
            self.acquisition_order(&[name])?;
        }
        Ok(())
    }

    /// Resolve the order in which the requested fixtures and everything they
    /// require must be acquired. Each fixture appears once.
    pub fn acquisition_order(&self, requested: &[&str]) -> Result<Vec<&FixtureDef>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = Vec::new();

        for name in requested {
            self.visit(name, &mut visiting, &mut done, &mut order)?;
        }

        Ok(order)
    }

    /// Order in which the requested fixtures are torn down.
    pub fn teardown_order(&self, requested: &[&str]) -> Result<Vec<&FixtureDef>> {
        let mut order = self.acquisition_order(requested)?;
        order.reverse();
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        visiting: &mut Vec<&'static str>,
        done: &mut HashSet<&'static str>,
        order: &mut Vec<&'a FixtureDef>,
    ) -> Result<()> {
        let def = self
            .fixtures
            .get(name)
            .ok_or_else(|| FixtureError::NotFound(format!("fixture '{}'", name)))?;

        if done.contains(def.name) {
            return Ok(());
        }
        if visiting.contains(&def.name) {
            visiting.push(def.name);
            return Err(FixtureError::Fixture(format!(
                "dependency cycle: {}",
                visiting.join(" -> ")
            )));
        }

        visiting.push(def.name);
        for required in def.requires {
            let dep = self.fixtures.get(required).ok_or_else(|| {
                FixtureError::NotFound(format!("fixture '{}' required by '{}'", required, def.name))
            })?;
            if !def.scope.can_depend_on(dep.scope) {
                return Err(FixtureError::Fixture(format!(
                    "scope mismatch: {}-scoped '{}' requires {}-scoped '{}'",
                    def.scope, def.name, dep.scope, dep.name
                )));
            }
            self.visit(required, visiting, done, order)?;
        }
        visiting.pop();

        done.insert(def.name);
        order.push(def);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[&FixtureDef], name: &str) -> usize {
        order.iter().position(|d| d.name == name).unwrap()
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = FixtureCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN.len());
        catalog.validate().unwrap();
    }

    #[test]
    fn test_default_user_acquisition_order() {
        let catalog = FixtureCatalog::builtin();
        let order = catalog.acquisition_order(&["default_user"]).unwrap();
        let names: Vec<_> = order.iter().map(|d| d.name).collect();

        assert_eq!(names, vec!["base_app", "db_engine", "session", "app", "default_user"]);
    }

    #[test]
    fn test_shared_dependencies_acquired_once() {
        let catalog = FixtureCatalog::builtin();
        let order = catalog
            .acquisition_order(&["sample_yadage_workflow_in_db", "sample_serial_workflow_in_db"])
            .unwrap();

        let sessions = order.iter().filter(|d| d.name == "session").count();
        assert_eq!(sessions, 1);
        assert!(position(&order, "tmp_shared_volume_path") < position(&order, "sample_workflow_workspace"));
        assert!(position(&order, "user0") < position(&order, "sample_yadage_workflow_in_db"));
        assert!(position(&order, "serial_workflow") < position(&order, "sample_serial_workflow_in_db"));
    }

    #[test]
    fn test_teardown_is_reverse_of_acquisition() {
        let catalog = FixtureCatalog::builtin();
        let acquire = catalog.acquisition_order(&["default_in_memory_producer"]).unwrap();
        let teardown = catalog.teardown_order(&["default_in_memory_producer"]).unwrap();

        let mut reversed = acquire.clone();
        reversed.reverse();
        assert_eq!(teardown, reversed);
        assert_eq!(teardown[0].name, "default_in_memory_producer");
    }

    #[test]
    fn test_unknown_fixture() {
        let catalog = FixtureCatalog::builtin();
        let result = catalog.acquisition_order(&["no_such_fixture"]);
        assert!(matches!(result, Err(FixtureError::NotFound(_))));
    }

    #[test]
    fn test_scope_mismatch_rejected() {
        let mut catalog = FixtureCatalog::new();
        catalog.register(FixtureDef::new("per_test", Function, &[], ""));
        catalog.register(FixtureDef::new("shared", Session, &["per_test"], ""));

        let err = catalog.acquisition_order(&["shared"]).unwrap_err();
        assert!(err.to_string().contains("scope mismatch"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut catalog = FixtureCatalog::new();
        catalog.register(FixtureDef::new("a", Function, &["b"], ""));
        catalog.register(FixtureDef::new("b", Function, &["a"], ""));

        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("a -> b -> a") || err.to_string().contains("b -> a -> b"));
    }

    #[test]
    fn test_scope_ordering() {
        assert!(FixtureScope::Function.can_depend_on(FixtureScope::Session));
        assert!(FixtureScope::Module.can_depend_on(FixtureScope::Module));
        assert!(!FixtureScope::Session.can_depend_on(FixtureScope::Module));
        assert_eq!(FixtureScope::Module.to_string(), "module");
    }
}
