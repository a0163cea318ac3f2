//! The fixtures context.
//!
//! [`Fixtures`] owns everything a test asked for and tears it down in reverse
//! acquisition order when the test ends, whether the test passed, failed or
//! panicked.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures::FutureExt;

use reana_fixtures_core::catalog::{FixtureCatalog, FixtureScope};
use reana_fixtures_core::config::FixtureConfig;
use reana_fixtures_core::error::{FixtureError, Result};
use reana_fixtures_core::mock_api::{make_mock_api_client, Component, MockApiClientFactory};
use reana_fixtures_core::users::{no_db_user, NoDbUser, SampleUser, UserRecord};
use reana_fixtures_core::workspace::SharedVolume;
use reana_fixtures_runtime::db::{
    delete_workflow, ensure_user, sample_workflow_in_db, SampleWorkflow, Session, TestApp,
    TestDatabase, WorkflowRecord,
};
use reana_fixtures_runtime::queue::{
    consumer_base, consumer_base_on_message_mock, exchange_from_config, queue_from_config,
    AckingHandler, Consumer, Exchange, InMemoryConnection, Producer, Queue, RecordingHandler,
};
use reana_fixtures_runtime::secret_store::CoreV1ClientFactory;
use reana_fixtures_runtime::teardown::TeardownStack;

use crate::logging::init_test_logging;

/// Future returned by a test body passed to [`Fixtures::run`].
pub type TestFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

struct DatabaseFixtures {
    database: TestDatabase,
    session: Session,
    app: TestApp,
}

/// Fixtures for one test.
///
/// # Example
///
/// ```ignore
/// Fixtures::builder()
///     .with_users(&[SampleUser::User0])
///     .build()
///     .await?
///     .run(|fx| Box::pin(async move {
///         let workflow = fx.sample_workflow_in_db(SampleWorkflow::Serial, SampleUser::User0).await?;
///         assert!(workflow.workspace_path.is_dir());
///         Ok::<_, FixtureError>(())
///     }))
///     .await?;
/// ```
pub struct Fixtures {
    config: FixtureConfig,
    catalog: FixtureCatalog,
    acquired: Vec<&'static str>,
    volume: SharedVolume,
    queue: InMemoryConnection,
    owns_queue: bool,
    db: Option<DatabaseFixtures>,
    users: HashMap<SampleUser, UserRecord>,
    no_db_user: NoDbUser,
    teardown: TeardownStack,
}

impl Fixtures {
    /// Create a new builder.
    pub fn builder() -> FixturesBuilder {
        FixturesBuilder::new()
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FixtureCatalog {
        &self.catalog
    }

    /// Names of the acquired fixtures, dependencies first.
    pub fn acquired(&self) -> &[&'static str] {
        &self.acquired
    }

    /// The shared volume.
    pub fn volume(&self) -> &SharedVolume {
        &self.volume
    }

    /// Create `<volume>/<relative>` and return it.
    pub fn sample_workflow_workspace(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        self.volume.sample_workflow_workspace(relative)
    }

    /// The in-memory queue connection.
    pub fn queue(&self) -> &InMemoryConnection {
        &self.queue
    }

    pub fn default_exchange(&self) -> Exchange {
        exchange_from_config(&self.config.queue)
    }

    pub fn default_queue(&self) -> Queue {
        queue_from_config(&self.config.queue)
    }

    /// A JSON producer on the default exchange.
    ///
    /// The queue is not exhausted while a producer is alive: drop every
    /// producer before `consume_queue(.., None)`, or that drain never returns.
    pub fn default_producer(&self) -> Result<Producer> {
        self.queue.default_producer(&self.config.queue)
    }

    /// A consumer acknowledging everything on the default queue.
    pub fn consumer_base(&self) -> Result<Consumer<AckingHandler>> {
        consumer_base(&self.queue, vec![self.default_queue()])
    }

    /// A consumer recording everything on the default queue.
    pub fn consumer_base_on_message_mock(&self) -> Result<Consumer<RecordingHandler>> {
        consumer_base_on_message_mock(&self.queue, vec![self.default_queue()])
    }

    fn db(&self) -> Result<&DatabaseFixtures> {
        self.db.as_ref().ok_or_else(database_not_requested)
    }

    pub fn database(&self) -> Result<&TestDatabase> {
        Ok(&self.db()?.database)
    }

    pub fn app(&self) -> Result<&TestApp> {
        Ok(&self.db()?.app)
    }

    pub fn session(&mut self) -> Result<&mut Session> {
        self.db
            .as_mut()
            .map(|db| &mut db.session)
            .ok_or_else(database_not_requested)
    }

    /// A sample user, created on first use.
    pub async fn user(&mut self, user: SampleUser) -> Result<&UserRecord> {
        if !self.users.contains_key(&user) {
            let db = self.db.as_mut().ok_or_else(database_not_requested)?;
            let record = ensure_user(db.session.conn(), db.app.schema(), user).await?;
            self.users.insert(user, record);
        }
        self.users
            .get(&user)
            .ok_or_else(|| FixtureError::NotFound(format!("user {}", user.as_str())))
    }

    /// The default user, `user0`.
    pub async fn default_user(&mut self) -> Result<&UserRecord> {
        self.user(SampleUser::User0).await
    }

    /// The in-memory user of this test.
    pub fn no_db_user(&self) -> NoDbUser {
        self.no_db_user
    }

    /// Secret store clients for the in-memory user.
    pub fn corev1_api_client_with_user_secrets(&self) -> CoreV1ClientFactory {
        CoreV1ClientFactory::new(self.no_db_user, self.config.secrets.clone())
    }

    /// Mock API clients for a platform component.
    pub fn mock_api_client(&self, component: Component) -> MockApiClientFactory {
        make_mock_api_client(component)
    }

    /// Insert a sample workflow, removed again at teardown.
    pub async fn sample_workflow_in_db(
        &mut self,
        sample: SampleWorkflow,
        owner: SampleUser,
    ) -> Result<WorkflowRecord> {
        let db = self.db.as_mut().ok_or_else(database_not_requested)?;
        let workflow =
            sample_workflow_in_db(&db.app, &mut db.session, &self.volume, sample, owner).await?;

        let pool = db.app.pool().clone();
        let schema = db.app.schema().to_string();
        let id = workflow.id;
        self.teardown
            .push(workflow.name.clone(), FixtureScope::Function, move || async move {
                let mut conn = pool.acquire().await?;
                delete_workflow(&mut conn, &schema, id).await?;
                Ok(())
            });

        Ok(workflow)
    }

    /// Register extra teardown work, run before the built-in fixtures are
    /// released.
    pub fn on_teardown<F, Fut>(&mut self, fixture: impl Into<String>, teardown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.teardown.push(fixture, FixtureScope::Function, teardown);
    }

    /// Run `test`, then tear everything down.
    ///
    /// Teardown happens even if the test fails or panics. A panic is resumed
    /// after teardown; a test error wins over teardown errors, which are then
    /// only logged.
    pub async fn run<T, F>(mut self, test: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Fixtures) -> TestFuture<'a, T>,
    {
        let outcome = AssertUnwindSafe(test(&mut self)).catch_unwind().await;
        let teardown = self.teardown().await;

        match outcome {
            Ok(Ok(value)) => teardown.map(|()| value),
            Ok(Err(e)) => {
                if let Err(teardown_error) = teardown {
                    tracing::warn!(error = %teardown_error, "Teardown failed after test error");
                }
                Err(e)
            }
            Err(panic) => {
                if let Err(teardown_error) = teardown {
                    tracing::warn!(error = %teardown_error, "Teardown failed after test panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Release every fixture, last acquired first.
    pub async fn teardown(self) -> Result<()> {
        let Fixtures {
            mut teardown,
            db,
            queue,
            owns_queue,
            volume,
            ..
        } = self;

        let mut failures = Vec::new();

        if let Err(e) = teardown.run().await {
            failures.push(e.to_string());
        }

        if let Some(DatabaseFixtures {
            database,
            session,
            app,
        }) = db
        {
            if let Err(e) = app.teardown().await {
                tracing::warn!(error = %e, "Failed to drop platform tables");
                failures.push(format!("app: {}", e));
            }
            session.close();
            database.close().await;
        }

        if owns_queue {
            queue.close();
        }

        if let Err(e) = volume.close() {
            tracing::warn!(error = %e, "Failed to remove shared volume");
            failures.push(format!("tmp_shared_volume_path: {}", e));
        }

        tracing::debug!("Fixtures torn down");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::Teardown {
                fixture: "fixtures".to_string(),
                message: failures.join("; "),
            })
        }
    }
}

fn database_not_requested() -> FixtureError {
    FixtureError::Fixture(
        "database fixtures were not requested, use FixturesBuilder::with_database".to_string(),
    )
}

/// Builder for [`Fixtures`].
#[derive(Default)]
pub struct FixturesBuilder {
    config: Option<FixtureConfig>,
    database: bool,
    users: Vec<SampleUser>,
    queue: Option<InMemoryConnection>,
}

impl FixturesBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration. Defaults to [`FixtureConfig::from_env`].
    pub fn config(mut self, config: FixtureConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Connect to the test database and create the platform tables.
    pub fn with_database(mut self) -> Self {
        self.database = true;
        self
    }

    /// Create sample users up front. Implies [`Self::with_database`].
    pub fn with_users(mut self, users: &[SampleUser]) -> Self {
        self.database = true;
        for user in users {
            if !self.users.contains(user) {
                self.users.push(*user);
            }
        }
        self
    }

    /// Share an existing queue connection instead of opening one.
    ///
    /// A shared connection is left open at teardown.
    pub fn with_queue_connection(mut self, connection: InMemoryConnection) -> Self {
        self.queue = Some(connection);
        self
    }

    fn requested(&self) -> Vec<&'static str> {
        let mut requested = vec!["tmp_shared_volume_path", "in_memory_queue_connection"];
        if self.database {
            requested.push("app");
        }
        requested.extend(self.users.iter().map(SampleUser::as_str));
        requested
    }

    /// Acquire every requested fixture.
    ///
    /// If acquisition fails part way, whatever was already acquired is
    /// released before the error is returned.
    pub async fn build(self) -> Result<Fixtures> {
        let config = self.config.clone().unwrap_or_else(FixtureConfig::from_env);
        init_test_logging(&config.logging);

        let catalog = FixtureCatalog::builtin();
        let acquired: Vec<&'static str> = catalog
            .acquisition_order(&self.requested())?
            .into_iter()
            .map(|def| def.name)
            .collect();
        tracing::debug!(fixtures = ?acquired, "Acquiring fixtures");

        let volume = SharedVolume::from_config(&config.shared_volume)?;
        let (queue, owns_queue) = match self.queue {
            Some(queue) => (queue, false),
            None => match InMemoryConnection::from_config(&config.queue) {
                Ok(queue) => (queue, true),
                Err(e) => {
                    if let Err(close_error) = volume.close() {
                        tracing::warn!(error = %close_error, "Failed to remove shared volume");
                    }
                    return Err(e);
                }
            },
        };

        let mut fixtures = Fixtures {
            config,
            catalog,
            acquired,
            volume,
            queue,
            owns_queue,
            db: None,
            users: HashMap::new(),
            no_db_user: no_db_user(),
            teardown: TeardownStack::new(),
        };

        if self.database {
            if let Err(e) = fixtures.acquire_database(&self.users).await {
                if let Err(teardown_error) = fixtures.teardown().await {
                    tracing::warn!(error = %teardown_error, "Teardown failed after setup error");
                }
                return Err(e);
            }
        }

        Ok(fixtures)
    }
}

impl Fixtures {
    async fn acquire_database(&mut self, users: &[SampleUser]) -> Result<()> {
        let database = TestDatabase::from_config(&self.config.database).await?;
        let session = match database.session().await {
            Ok(session) => session,
            Err(e) => {
                database.close().await;
                return Err(e);
            }
        };
        let app = match TestApp::setup(&database).await {
            Ok(app) => app,
            Err(e) => {
                session.close();
                database.close().await;
                return Err(e);
            }
        };

        self.db = Some(DatabaseFixtures {
            database,
            session,
            app,
        });

        for user in users {
            self.user(*user).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reana_fixtures_core::config::TEST_DATABASE_URL_ENV;
    use reana_fixtures_runtime::queue::consume_queue;
    use serde_json::json;

    fn config() -> FixtureConfig {
        FixtureConfig::default()
    }

    #[tokio::test]
    async fn test_queue_fixtures() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();

        fixtures
            .run(|fx| {
                Box::pin(async move {
                    let mut consumer = fx.consumer_base_on_message_mock()?;
                    let producer = fx.default_producer()?;
                    for id in 1..=3 {
                        producer.publish(&json!({"id": id}), &[fx.default_queue()])?;
                    }
                    drop(producer);

                    consume_queue(&mut consumer, Some(2)).await?;
                    assert_eq!(
                        consumer.handler().bodies(),
                        vec![json!({"id": 1}), json!({"id": 2})]
                    );
                    assert_eq!(fx.queue().queue_len("test-queue"), 1);
                    Ok::<_, FixtureError>(())
                })
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_volume_removed_after_run() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        let path = fixtures.volume().path().to_path_buf();
        assert!(fixtures.volume().is_temporary());

        let workspace = fixtures
            .run(|fx| Box::pin(async move { fx.sample_workflow_workspace("w1") }))
            .await
            .unwrap();

        assert!(workspace.starts_with(&path));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_teardown_runs_after_test_error() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        let path = fixtures.volume().path().to_path_buf();

        let result: Result<()> = fixtures
            .run(|_| Box::pin(async { Err::<(), _>(FixtureError::Fixture("boom".to_string())) }))
            .await;

        assert!(matches!(result, Err(FixtureError::Fixture(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_teardown_runs_after_panic() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        let path = fixtures.volume().path().to_path_buf();

        let result = AssertUnwindSafe(fixtures.run(|fx| {
            Box::pin(async move {
                assert!(!fx.volume().is_temporary(), "test body failed");
                Ok::<_, FixtureError>(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_custom_teardown_runs_first() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let hook_seen = seen.clone();

        fixtures
            .run(|fx| {
                let volume = fx.volume().path().to_path_buf();
                fx.on_teardown("volume_check", move || async move {
                    *hook_seen.lock().unwrap() = Some(volume.exists());
                    Ok(())
                });
                Box::pin(async { Ok::<_, FixtureError>(()) })
            })
            .await
            .unwrap();

        // The volume still existed when the custom hook ran.
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_shared_queue_stays_open() {
        let shared = InMemoryConnection::new();
        let fixtures = Fixtures::builder()
            .config(config())
            .with_queue_connection(shared.clone())
            .build()
            .await
            .unwrap();

        fixtures.teardown().await.unwrap();
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn test_database_accessors_require_database() {
        let mut fixtures = Fixtures::builder().config(config()).build().await.unwrap();

        assert!(matches!(fixtures.database(), Err(FixtureError::Fixture(_))));
        assert!(matches!(fixtures.session(), Err(FixtureError::Fixture(_))));
        assert!(matches!(
            fixtures.user(SampleUser::User1).await,
            Err(FixtureError::Fixture(_))
        ));
        fixtures.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_database_fails_cleanly() {
        let result = Fixtures::builder()
            .config(config())
            .with_database()
            .build()
            .await;

        assert!(matches!(result, Err(FixtureError::Config(_))));
    }

    #[tokio::test]
    async fn test_acquisition_order() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        assert_eq!(
            fixtures.acquired(),
            &["tmp_shared_volume_path", "in_memory_queue_connection"]
        );
        fixtures.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_secret_store_client_uses_no_db_user() {
        let fixtures = Fixtures::builder().config(config()).build().await.unwrap();
        let client = fixtures
            .corev1_api_client_with_user_secrets()
            .make(&reana_fixtures_core::secrets::user_secrets())
            .unwrap();

        assert_eq!(
            client.secret().metadata.name,
            Some(format!("reana-secretsstore-{}", fixtures.no_db_user().id))
        );
        fixtures.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_database_fixtures() {
        let url = match std::env::var(TEST_DATABASE_URL_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                eprintln!("skipping database test: {} is not set", TEST_DATABASE_URL_ENV);
                return;
            }
        };
        let root = TestDatabase::from_url(&url).await.unwrap();
        let isolated = root.isolated("fixtures_context").await.unwrap();

        let mut config = config();
        config.database.url = isolated.database().url().to_string();

        let fixtures = Fixtures::builder()
            .config(config)
            .with_users(&[SampleUser::User0, SampleUser::User1])
            .build()
            .await
            .unwrap();

        fixtures
            .run(|fx| {
                Box::pin(async move {
                    assert_eq!(fx.default_user().await?.email, "user0@reana.io");

                    let workflow = fx
                        .sample_workflow_in_db(SampleWorkflow::Yadage, SampleUser::User1)
                        .await?;
                    assert_eq!(workflow.name, "sample_yadage_workflow_2");
                    assert!(workflow.workspace_path.is_dir());
                    Ok::<_, FixtureError>(())
                })
            })
            .await
            .unwrap();

        isolated.cleanup().await.unwrap();
    }
}
