use sqlx::PgPool;
use uuid::Uuid;

use reana_fixtures_core::error::Result;

use super::schema::{self, DEFAULT_RESOURCES};
use super::TestDatabase;

/// A platform resource row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: Uuid,
    pub name: String,
    pub resource_type: String,
    pub unit: String,
    pub title: Option<String>,
}

/// Application context with the platform schema in place.
///
/// [`TestApp::setup`] creates the schema, every table and the default
/// resources. [`TestApp::teardown`] drops the tables again.
pub struct TestApp {
    pool: PgPool,
    schema: String,
}

impl TestApp {
    /// Create the schema and tables, then the default resources.
    pub async fn setup(db: &TestDatabase) -> Result<Self> {
        let schema = db.schema().to_string();
        sqlx::raw_sql(&schema::create_sql(&schema)?)
            .execute(db.pool())
            .await?;

        let app = Self {
            pool: db.pool().clone(),
            schema,
        };
        app.init_default_resources().await?;

        tracing::debug!(schema = %app.schema, "Created platform tables");
        Ok(app)
    }

    async fn init_default_resources(&self) -> Result<()> {
        let sql = format!(
            "INSERT INTO {}.resource (id_, name, type_, unit, title) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (name) DO NOTHING",
            self.schema
        );
        for resource in DEFAULT_RESOURCES {
            sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(resource.name)
                .bind(resource.resource_type)
                .bind(resource.unit)
                .bind(resource.title)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Schema holding the platform tables.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Connection pool of the engine.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// All resources, by name.
    pub async fn resources(&self) -> Result<Vec<ResourceRecord>> {
        let rows: Vec<(Uuid, String, String, String, Option<String>)> = sqlx::query_as(&format!(
            "SELECT id_, name, type_, unit, title FROM {}.resource ORDER BY name",
            self.schema
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, resource_type, unit, title)| ResourceRecord {
                id,
                name,
                resource_type,
                unit,
                title,
            })
            .collect())
    }

    /// Drop every platform table.
    pub async fn teardown(self) -> Result<()> {
        sqlx::raw_sql(&schema::drop_sql(&self.schema)?)
            .execute(&self.pool)
            .await?;
        tracing::debug!(schema = %self.schema, "Dropped platform tables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_database;

    #[tokio::test]
    async fn test_setup_creates_default_resources() {
        let Some(db) = test_database().await else {
            return;
        };
        let isolated = db.isolated("app_setup").await.unwrap();

        let app = TestApp::setup(isolated.database()).await.unwrap();
        let resources = app.resources().await.unwrap();
        let names: Vec<_> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["processing time", "shared storage"]);
        assert_eq!(resources[0].resource_type, "cpu");
        assert_eq!(resources[1].unit, "bytes");

        // Setting up twice keeps a single copy of each resource.
        let again = TestApp::setup(isolated.database()).await.unwrap();
        assert_eq!(again.resources().await.unwrap().len(), 2);

        app.teardown().await.unwrap();
        isolated.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_drops_tables() {
        let Some(db) = test_database().await else {
            return;
        };
        let isolated = db.isolated("app_teardown").await.unwrap();

        let app = TestApp::setup(isolated.database()).await.unwrap();
        app.teardown().await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '__reana'",
        )
        .fetch_one(isolated.pool())
        .await
        .unwrap();
        assert_eq!(tables, 0);

        isolated.cleanup().await.unwrap();
    }
}
