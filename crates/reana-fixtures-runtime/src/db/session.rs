use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};

use reana_fixtures_core::error::Result;

use super::TestDatabase;

/// A database session bound to one pooled connection.
///
/// Everything a test does through the session sees its own writes. Closing
/// the session returns the connection to the engine.
pub struct Session {
    conn: PoolConnection<Postgres>,
}

impl Session {
    /// Check out a connection from the engine.
    pub async fn open(db: &TestDatabase) -> Result<Self> {
        let conn = db.pool().acquire().await?;
        tracing::trace!("Opened database session");
        Ok(Self { conn })
    }

    /// The underlying connection, usable as an executor.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Run raw SQL on this session.
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&mut *self.conn).await?;
        Ok(())
    }

    /// Release the connection.
    pub fn close(self) {
        tracing::trace!("Closed database session");
        drop(self.conn);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_database;

    #[tokio::test]
    async fn test_session_sees_own_writes() {
        let Some(db) = test_database().await else {
            return;
        };

        let mut session = db.session().await.unwrap();
        session
            .execute("CREATE TEMPORARY TABLE session_scratch (id INT); INSERT INTO session_scratch VALUES (7);")
            .await
            .unwrap();

        let id: i32 = sqlx::query_scalar("SELECT id FROM session_scratch")
            .fetch_one(session.conn())
            .await
            .unwrap();
        assert_eq!(id, 7);

        session.close();
    }
}
