//! Test fixtures for REANA components.
//!
//! Ready-made users, workflows, secrets, a test database with the platform
//! schema, an in-memory message broker with a bounded queue drainer, and mock
//! clients for the Kubernetes secret store and the platform APIs.

mod fixtures;
mod logging;

#[doc(hidden)]
pub use reana_fixtures_core;
#[doc(hidden)]
pub use reana_fixtures_runtime;

// #[macro_export] places the assertion macros at the core crate root.
pub use reana_fixtures_core::{
    assert_err, assert_err_variant, assert_handled, assert_not_handled, assert_ok,
};

pub use fixtures::{Fixtures, FixturesBuilder, TestFuture};
pub use logging::init_test_logging;

/// Prelude module for common imports.
pub mod prelude {
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;

    pub use reana_fixtures_core::assertions::{assert_json_matches, error_contains};
    pub use reana_fixtures_core::catalog::{FixtureCatalog, FixtureScope};
    pub use reana_fixtures_core::config::FixtureConfig;
    pub use reana_fixtures_core::error::{FixtureError, Result};
    pub use reana_fixtures_core::mock_api::{
        make_mock_api_client, Component, MockApiClient, MockHttpResponse,
    };
    pub use reana_fixtures_core::secrets::{
        empty_user_secrets, kerberos_user_secrets, user_secrets, SecretType, UserSecrets,
    };
    pub use reana_fixtures_core::users::{default_user, no_db_user, SampleUser, UserRecord};
    pub use reana_fixtures_core::workflows::{
        cwl_workflow_with_name, cwl_workflow_without_name, sample_condition_for_requeueing_workflows,
        sample_condition_for_starting_queued_workflows, serial_workflow,
        snakemake_workflow_spec_loaded, yadage_workflow_spec_loaded, yadage_workflow_with_name,
        yadage_workflow_without_name, WorkflowFixture, WorkflowType,
    };
    pub use reana_fixtures_core::workspace::{build_workspace_path, SharedVolume};

    pub use reana_fixtures_runtime::db::{SampleWorkflow, TestDatabase, WorkflowRecord};
    pub use reana_fixtures_runtime::queue::{
        consume_queue, default_exchange, default_in_memory_producer, default_queue,
        in_memory_queue_connection, Consume, Consumer, InMemoryConnection, Message,
        MessageHandler, RecordingHandler,
    };
    pub use reana_fixtures_runtime::secret_store::{
        corev1_api_client_with_user_secrets, fetch_user_secrets, SecretStoreClient,
    };

    pub use crate::{Fixtures, FixturesBuilder, TestFuture};
}
