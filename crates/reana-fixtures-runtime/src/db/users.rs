use sqlx::PgConnection;
use uuid::Uuid;

use reana_fixtures_core::error::{FixtureError, Result};
use reana_fixtures_core::users::{SampleUser, UserRecord};

use super::{Session, TestApp};

/// Get a sample user, creating it first if it does not exist.
pub async fn ensure_user(
    conn: &mut PgConnection,
    schema: &str,
    user: SampleUser,
) -> Result<UserRecord> {
    let record = user.record();

    sqlx::query(&format!(
        "INSERT INTO {}.user_ (id_, email, access_token) VALUES ($1, $2, $3) \
         ON CONFLICT (id_) DO NOTHING",
        schema
    ))
    .bind(record.id)
    .bind(&record.email)
    .bind(&record.access_token)
    .execute(&mut *conn)
    .await?;

    let row: Option<(Uuid, String, Option<String>)> = sqlx::query_as(&format!(
        "SELECT id_, email, access_token FROM {}.user_ WHERE id_ = $1",
        schema
    ))
    .bind(record.id)
    .fetch_optional(&mut *conn)
    .await?;

    let (id, email, access_token) =
        row.ok_or_else(|| FixtureError::NotFound(format!("user {}", user.as_str())))?;

    tracing::debug!(user = user.as_str(), %id, "Ensured sample user");
    Ok(UserRecord {
        id,
        email,
        access_token,
    })
}

/// The default user, `user0`.
pub async fn default_user(app: &TestApp, session: &mut Session) -> Result<UserRecord> {
    user0(app, session).await
}

/// The admin user.
pub async fn user0(app: &TestApp, session: &mut Session) -> Result<UserRecord> {
    ensure_user(session.conn(), app.schema(), SampleUser::User0).await
}

pub async fn user1(app: &TestApp, session: &mut Session) -> Result<UserRecord> {
    ensure_user(session.conn(), app.schema(), SampleUser::User1).await
}

pub async fn user2(app: &TestApp, session: &mut Session) -> Result<UserRecord> {
    ensure_user(session.conn(), app.schema(), SampleUser::User2).await
}
