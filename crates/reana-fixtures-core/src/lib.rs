//! Core fixture data and helpers for testing REANA components.
//!
//! Everything here is independent of a running database or broker: the
//! fixture catalog, configuration, sample workflows, users and secrets,
//! workspace handling and the mock API client.

pub mod assertions;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mock_api;
pub mod secrets;
pub mod users;
pub mod workflows;
pub mod workspace;

pub use catalog::{FixtureCatalog, FixtureDef, FixtureScope};
pub use config::FixtureConfig;
pub use error::{FixtureError, Result};
pub use mock_api::{make_mock_api_client, Component, MockApiClient, MockApiClientFactory, MockHttpResponse};
pub use secrets::{SecretType, UserSecret, UserSecrets};
pub use users::{NoDbUser, SampleUser, UserRecord};
pub use workflows::{WorkflowFixture, WorkflowType};
pub use workspace::{build_workspace_path, SharedVolume};
