use std::path::PathBuf;

use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Connection, PgConnection};
use uuid::Uuid;

use reana_fixtures_core::error::{FixtureError, Result};
use reana_fixtures_core::users::SampleUser;
use reana_fixtures_core::workflows::{
    serial_workflow, yadage_workflow_with_name, WorkflowFixture, WorkflowType,
};
use reana_fixtures_core::workspace::SharedVolume;

use super::{ensure_user, Session, TestApp};

/// A workflow about to be written.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub workflow_type: WorkflowType,
    pub reana_specification: Value,
    pub workspace_path: PathBuf,
}

impl NewWorkflow {
    /// Build a workflow from a specification fixture.
    pub fn from_fixture(
        id: Uuid,
        name: impl Into<String>,
        owner_id: Uuid,
        fixture: &WorkflowFixture,
        workspace_path: PathBuf,
    ) -> Result<Self> {
        let workflow_type = fixture.workflow_type().ok_or_else(|| {
            FixtureError::Fixture("workflow specification has no known type".to_string())
        })?;

        Ok(Self {
            id,
            name: name.into(),
            owner_id,
            workflow_type,
            reana_specification: fixture.reana_specification().clone(),
            workspace_path,
        })
    }
}

/// A workflow row.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub name: String,
    pub run_number: i32,
    pub owner_id: Uuid,
    pub status: String,
    pub workflow_type: WorkflowType,
    pub reana_specification: Value,
    pub workspace_path: PathBuf,
}

/// Insert a workflow with empty logs and operational options.
pub async fn insert_workflow(
    conn: &mut PgConnection,
    schema: &str,
    workflow: &NewWorkflow,
) -> Result<WorkflowRecord> {
    let (run_number, status): (i32, String) = sqlx::query_as(&format!(
        "INSERT INTO {}.workflow \
         (id_, name, owner_id, reana_specification, operational_options, type_, logs, workspace_path) \
         VALUES ($1, $2, $3, $4, '{{}}', $5, '', $6) \
         RETURNING run_number, status",
        schema
    ))
    .bind(workflow.id)
    .bind(&workflow.name)
    .bind(workflow.owner_id)
    .bind(Json(&workflow.reana_specification))
    .bind(workflow.workflow_type.as_str())
    .bind(workflow.workspace_path.to_string_lossy().into_owned())
    .fetch_one(&mut *conn)
    .await?;

    tracing::debug!(workflow = %workflow.name, id = %workflow.id, "Inserted workflow");

    Ok(WorkflowRecord {
        id: workflow.id,
        name: workflow.name.clone(),
        run_number,
        owner_id: workflow.owner_id,
        status,
        workflow_type: workflow.workflow_type,
        reana_specification: workflow.reana_specification.clone(),
        workspace_path: workflow.workspace_path.clone(),
    })
}

/// Delete a workflow with its jobs, resource usage and user links.
///
/// Returns whether the workflow existed.
pub async fn delete_workflow(conn: &mut PgConnection, schema: &str, id: Uuid) -> Result<bool> {
    let mut tx = conn.begin().await?;

    for (table, column) in [
        ("job", "workflow_uuid"),
        ("workflow_resource", "workflow_id"),
        ("user_workflow", "workflow_id"),
    ] {
        sqlx::query(&format!("DELETE FROM {}.{} WHERE {} = $1", schema, table, column))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let deleted = sqlx::query(&format!("DELETE FROM {}.workflow WHERE id_ = $1", schema))
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    tracing::debug!(%id, existed = deleted > 0, "Deleted workflow");
    Ok(deleted > 0)
}

/// The sample workflows kept in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWorkflow {
    Yadage,
    Serial,
}

impl SampleWorkflow {
    /// Name of the sample owned by `owner`.
    pub fn name(&self, owner: SampleUser) -> &'static str {
        match (self, owner) {
            (Self::Yadage, SampleUser::User1) => "sample_yadage_workflow_2",
            (Self::Yadage, _) => "sample_yadage_workflow_1",
            (Self::Serial, SampleUser::User1) => "sample_serial_workflow_2",
            (Self::Serial, _) => "sample_serial_workflow_1",
        }
    }

    /// The specification the sample runs.
    pub fn fixture(&self) -> WorkflowFixture {
        match self {
            Self::Yadage => yadage_workflow_with_name(),
            Self::Serial => serial_workflow(),
        }
    }
}

/// Insert a sample workflow owned by `owner`, with its workspace created on
/// the shared volume.
///
/// The caller removes it with [`delete_workflow`].
pub async fn sample_workflow_in_db(
    app: &TestApp,
    session: &mut Session,
    volume: &SharedVolume,
    sample: SampleWorkflow,
    owner: SampleUser,
) -> Result<WorkflowRecord> {
    let record = ensure_user(session.conn(), app.schema(), owner).await?;
    let id = Uuid::new_v4();
    let workspace_path = volume.workflow_workspace(record.id, id)?;
    let workflow = NewWorkflow::from_fixture(
        id,
        sample.name(owner),
        record.id,
        &sample.fixture(),
        workspace_path,
    )?;

    insert_workflow(session.conn(), app.schema(), &workflow).await
}

/// Yadage workflow owned by `user0`.
pub async fn sample_yadage_workflow_in_db(
    app: &TestApp,
    session: &mut Session,
    volume: &SharedVolume,
) -> Result<WorkflowRecord> {
    sample_workflow_in_db(app, session, volume, SampleWorkflow::Yadage, SampleUser::User0).await
}

/// Yadage workflow owned by `user1`.
pub async fn sample_yadage_workflow_in_db_owned_by_user1(
    app: &TestApp,
    session: &mut Session,
    volume: &SharedVolume,
) -> Result<WorkflowRecord> {
    sample_workflow_in_db(app, session, volume, SampleWorkflow::Yadage, SampleUser::User1).await
}

/// Serial workflow owned by `user0`.
pub async fn sample_serial_workflow_in_db(
    app: &TestApp,
    session: &mut Session,
    volume: &SharedVolume,
) -> Result<WorkflowRecord> {
    sample_workflow_in_db(app, session, volume, SampleWorkflow::Serial, SampleUser::User0).await
}

/// Serial workflow owned by `user1`.
pub async fn sample_serial_workflow_in_db_owned_by_user1(
    app: &TestApp,
    session: &mut Session,
    volume: &SharedVolume,
) -> Result<WorkflowRecord> {
    sample_workflow_in_db(app, session, volume, SampleWorkflow::Serial, SampleUser::User1).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_database;
    use reana_fixtures_core::workspace::build_workspace_path;

    #[test]
    fn test_sample_names() {
        assert_eq!(
            SampleWorkflow::Yadage.name(SampleUser::User0),
            "sample_yadage_workflow_1"
        );
        assert_eq!(
            SampleWorkflow::Yadage.name(SampleUser::User1),
            "sample_yadage_workflow_2"
        );
        assert_eq!(
            SampleWorkflow::Serial.name(SampleUser::User0),
            "sample_serial_workflow_1"
        );
        assert_eq!(
            SampleWorkflow::Serial.name(SampleUser::User1),
            "sample_serial_workflow_2"
        );
    }

    #[test]
    fn test_new_workflow_from_fixture() {
        let fixture = serial_workflow();
        let workflow = NewWorkflow::from_fixture(
            Uuid::nil(),
            "w",
            Uuid::nil(),
            &fixture,
            PathBuf::from("/tmp/w"),
        )
        .unwrap();
        assert_eq!(workflow.workflow_type, WorkflowType::Serial);
        assert_eq!(&workflow.reana_specification, fixture.reana_specification());
    }

    #[tokio::test]
    async fn test_sample_workflow_lifecycle() {
        let Some(db) = test_database().await else {
            return;
        };
        let isolated = db.isolated("sample_workflows").await.unwrap();
        let app = TestApp::setup(isolated.database()).await.unwrap();
        let mut session = isolated.database().session().await.unwrap();
        let volume = SharedVolume::temporary("reana").unwrap();

        let yadage = sample_yadage_workflow_in_db(&app, &mut session, &volume)
            .await
            .unwrap();
        assert_eq!(yadage.name, "sample_yadage_workflow_1");
        assert_eq!(yadage.workflow_type, WorkflowType::Yadage);
        assert_eq!(yadage.status, "created");
        assert_eq!(yadage.owner_id, SampleUser::User0.id());
        assert_eq!(
            yadage.workspace_path,
            build_workspace_path(yadage.owner_id, Some(yadage.id), volume.path())
        );
        assert!(yadage.workspace_path.is_dir());

        let serial = sample_serial_workflow_in_db_owned_by_user1(&app, &mut session, &volume)
            .await
            .unwrap();
        assert_eq!(serial.name, "sample_serial_workflow_2");
        assert_eq!(serial.owner_id, SampleUser::User1.id());

        // Teardown removes dependent rows too.
        let processing_time: Uuid = sqlx::query_scalar(
            "SELECT id_ FROM __reana.resource WHERE name = 'processing time'",
        )
        .fetch_one(session.conn())
        .await
        .unwrap();
        session
            .execute(&format!(
                "INSERT INTO __reana.job (id_, workflow_uuid) VALUES ('{}', '{}'); \
                 INSERT INTO __reana.workflow_resource (workflow_id, resource_id, quantity_used) \
                 VALUES ('{}', '{}', 10); \
                 INSERT INTO __reana.user_workflow (user_id, workflow_id) VALUES ('{}', '{}');",
                Uuid::new_v4(),
                yadage.id,
                yadage.id,
                processing_time,
                SampleUser::User1.id(),
                yadage.id
            ))
            .await
            .unwrap();

        assert!(delete_workflow(session.conn(), app.schema(), yadage.id)
            .await
            .unwrap());
        assert!(!delete_workflow(session.conn(), app.schema(), yadage.id)
            .await
            .unwrap());
        assert!(delete_workflow(session.conn(), app.schema(), serial.id)
            .await
            .unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM __reana.workflow")
            .fetch_one(session.conn())
            .await
            .unwrap();
        assert_eq!(remaining, 0);

        session.close();
        app.teardown().await.unwrap();
        volume.close().unwrap();
        isolated.cleanup().await.unwrap();
    }
}
