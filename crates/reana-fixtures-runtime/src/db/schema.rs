//! Test schema rendering.

use reana_fixtures_core::error::{FixtureError, Result};

const TEST_SCHEMA_SQL: &str = include_str!("../../migrations/0001_test_schema.sql");

/// Tables in creation order. Dropped in reverse.
pub const TABLES: &[&str] = &[
    "user_",
    "workflow",
    "job",
    "resource",
    "workflow_resource",
    "user_workflow",
];

/// A resource every fresh platform database starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultResource {
    pub name: &'static str,
    pub resource_type: &'static str,
    pub unit: &'static str,
    pub title: &'static str,
}

/// Resources created by [`super::TestApp::setup`].
pub const DEFAULT_RESOURCES: &[DefaultResource] = &[
    DefaultResource {
        name: "processing time",
        resource_type: "cpu",
        unit: "milliseconds",
        title: "CPU processing time",
    },
    DefaultResource {
        name: "shared storage",
        resource_type: "disk",
        unit: "bytes",
        title: "Shared storage",
    },
];

/// Reject anything that is not a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(FixtureError::Config(format!(
            "'{}' is not a valid schema name",
            name
        )))
    }
}

/// SQL creating the schema and every table.
pub fn create_sql(schema: &str) -> Result<String> {
    let schema = validate_identifier(schema)?;
    Ok(TEST_SCHEMA_SQL.replace("{{schema}}", schema))
}

/// SQL dropping every table, dependants first.
pub fn drop_sql(schema: &str) -> Result<String> {
    let schema = validate_identifier(schema)?;
    Ok(TABLES
        .iter()
        .rev()
        .map(|table| format!("DROP TABLE IF EXISTS {}.{} CASCADE;", schema, table))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sql_contains_tables() {
        let sql = create_sql("__reana").unwrap();

        assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS __reana;"));
        for table in TABLES {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS __reana.{} (", table)),
                "missing table {}",
                table
            );
        }
        assert!(!sql.contains("{{schema}}"));
    }

    #[test]
    fn test_drop_sql_order() {
        let sql = drop_sql("__reana").unwrap();
        let first = sql.lines().next().unwrap();
        let last = sql.lines().last().unwrap();

        assert_eq!(first, "DROP TABLE IF EXISTS __reana.user_workflow CASCADE;");
        assert_eq!(last, "DROP TABLE IF EXISTS __reana.user_ CASCADE;");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("__reana").is_ok());
        assert!(validate_identifier("reana_test_1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1reana").is_err());
        assert!(validate_identifier("reana; DROP TABLE x").is_err());
    }

    #[test]
    fn test_default_resources() {
        let names: Vec<_> = DEFAULT_RESOURCES.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["processing time", "shared storage"]);
    }
}
