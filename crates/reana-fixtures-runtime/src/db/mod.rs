//! Explicit database provisioning for tests.
//!
//! Database configuration is EXPLICIT. Either:
//! 1. Pass a URL directly via `from_url()`
//! 2. Use `from_env()` to read TEST_DATABASE_URL
//! 3. Enable the `embedded-test-db` feature and use `embedded()`
//!
//! DATABASE_URL is never read.

mod app;
pub mod schema;
mod session;
mod users;
mod workflows;

pub use app::{ResourceRecord, TestApp};
pub use session::Session;
pub use users::{default_user, ensure_user, user0, user1, user2};
pub use workflows::{
    delete_workflow, insert_workflow, sample_serial_workflow_in_db,
    sample_serial_workflow_in_db_owned_by_user1, sample_workflow_in_db,
    sample_yadage_workflow_in_db, sample_yadage_workflow_in_db_owned_by_user1, NewWorkflow,
    SampleWorkflow, WorkflowRecord,
};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
#[cfg(feature = "embedded-test-db")]
use tokio::sync::OnceCell;

use reana_fixtures_core::config::{DatabaseConfig, TEST_DATABASE_URL_ENV};
use reana_fixtures_core::error::{FixtureError, Result};

#[cfg(feature = "embedded-test-db")]
static EMBEDDED_PG: OnceCell<postgresql_embedded::PostgreSQL> = OnceCell::const_new();

/// The database engine shared by a group of tests.
///
/// # Examples
///
/// ```ignore
/// let db = TestDatabase::from_url("postgres://localhost/reana_test").await?;
/// let db = TestDatabase::from_env().await?;
/// let db = TestDatabase::embedded().await?;
/// ```
pub struct TestDatabase {
    pool: PgPool,
    url: String,
    schema: String,
}

impl TestDatabase {
    /// Connect to the database at the given URL with default settings.
    pub async fn from_url(url: &str) -> Result<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    /// Connect using the TEST_DATABASE_URL environment variable.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var(TEST_DATABASE_URL_ENV).map_err(|_| {
            FixtureError::Database(format!(
                "{} not set. Set it explicitly for database tests.",
                TEST_DATABASE_URL_ENV
            ))
        })?;
        Self::from_url(&url).await
    }

    /// Connect as configured, creating the database first if it is missing
    /// and `create_if_missing` is set.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(FixtureError::Config(
                "database url is not configured".to_string(),
            ));
        }
        schema::validate_identifier(&config.schema)?;

        if config.create_if_missing {
            create_database_if_missing(&config.url).await?;
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::debug!(
            database = database_name(&config.url).unwrap_or("<default>"),
            pool_size = config.pool_size,
            "Connected to test database"
        );

        Ok(Self {
            pool,
            url: config.url.clone(),
            schema: config.schema.clone(),
        })
    }

    /// Start an embedded PostgreSQL instance.
    ///
    /// Requires the `embedded-test-db` feature. The instance is started once
    /// per process and shared.
    #[cfg(feature = "embedded-test-db")]
    pub async fn embedded() -> Result<Self> {
        let pg = EMBEDDED_PG
            .get_or_try_init(|| async {
                let mut pg = postgresql_embedded::PostgreSQL::default();
                pg.setup().await.map_err(|e| {
                    FixtureError::Database(format!("Failed to setup embedded Postgres: {}", e))
                })?;
                pg.start().await.map_err(|e| {
                    FixtureError::Database(format!("Failed to start embedded Postgres: {}", e))
                })?;
                Ok::<_, FixtureError>(pg)
            })
            .await?;

        let url = pg.settings().url("postgres");
        Self::from_url(&url).await
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the database URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Schema holding the platform tables.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Run raw SQL, possibly several statements.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Open a session on a dedicated connection.
    pub async fn session(&self) -> Result<Session> {
        Session::open(self).await
    }

    /// Creates a dedicated database for a single test.
    ///
    /// Each call creates a new database with a unique name.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        let base_url = self.url.clone();
        let db_name = format!(
            "reana_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await?;

        let test_url = replace_db_name(&base_url, &db_name);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&test_url)
            .await?;

        tracing::debug!(database = %db_name, "Created isolated test database");

        Ok(IsolatedTestDb {
            database: TestDatabase {
                pool,
                url: test_url,
                schema: self.schema.clone(),
            },
            db_name,
            base_url,
        })
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// A test database that exists for the lifetime of a single test.
///
/// Dropped on [`IsolatedTestDb::cleanup`].
pub struct IsolatedTestDb {
    database: TestDatabase,
    db_name: String,
    base_url: String,
}

impl IsolatedTestDb {
    /// The isolated database as a regular engine.
    pub fn database(&self) -> &TestDatabase {
        &self.database
    }

    /// Get the connection pool for this isolated database.
    pub fn pool(&self) -> &PgPool {
        self.database.pool()
    }

    /// Get the database name.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.database.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await?;

        // Stray connections would block the drop.
        let terminated = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&pool)
        .await;
        if let Err(e) = terminated {
            tracing::warn!(database = %self.db_name, error = %e, "Failed to terminate connections");
        }

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&pool)
            .await?;
        pool.close().await;

        tracing::debug!(database = %self.db_name, "Dropped isolated test database");
        Ok(())
    }
}

/// Create the database named in `url` when it does not exist.
async fn create_database_if_missing(url: &str) -> Result<()> {
    let Some(name) = database_name(url) else {
        return Ok(());
    };

    let maintenance = PgPoolOptions::new()
        .max_connections(1)
        .connect(&replace_db_name(url, "postgres"))
        .await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&maintenance)
            .await?;

    if !exists {
        tracing::info!(database = name, "Creating test database");
        sqlx::query(&format!("CREATE DATABASE \"{}\"", name.replace('"', "\"\"")))
            .execute(&maintenance)
            .await?;
    }

    maintenance.close().await;
    Ok(())
}

/// Split a connection URL into everything up to the end of the authority,
/// the path after it (without the leading `/`) and the query.
fn split_url(url: &str) -> (&str, Option<&str>, Option<&str>) {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let authority_start = base.find("://").map_or(0, |idx| idx + 3);
    match base[authority_start..].find('/') {
        Some(idx) => {
            let slash = authority_start + idx;
            (&base[..slash], Some(&base[slash + 1..]), query)
        }
        None => (base, None, query),
    }
}

/// Database name component of a connection URL.
fn database_name(url: &str) -> Option<&str> {
    let (_, path, _) = split_url(url);
    path.filter(|name| !name.is_empty())
}

/// Longest test-name part of an isolated database name. Keeps
/// `reana_test_<name>_<uuid>` within PostgreSQL's 63-byte identifier limit.
const MAX_TEST_NAME_LEN: usize = 19;

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_TEST_NAME_LEN)
        .collect()
}

/// Replace the database name in a connection URL, keeping its query.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let (authority, _, query) = split_url(url);
    match query {
        Some(query) => format!("{}/{}?{}", authority, new_db, query),
        None => format!("{}/{}", authority, new_db),
    }
}
