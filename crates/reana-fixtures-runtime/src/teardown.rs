//! Ordered fixture teardown.

use std::future::Future;
use std::pin::Pin;

use reana_fixtures_core::catalog::FixtureScope;
use reana_fixtures_core::error::{FixtureError, Result};

type TeardownFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type TeardownFn = Box<dyn FnOnce() -> TeardownFuture + Send>;

struct Hook {
    fixture: String,
    scope: FixtureScope,
    run: TeardownFn,
}

/// Teardown actions, run last-registered first.
///
/// Every hook runs even when an earlier one fails; the failures are reported
/// together. A stack dropped with hooks still pending logs a warning.
///
/// # Example
///
/// ```ignore
/// let mut teardown = TeardownStack::new();
/// teardown.push("session", FixtureScope::Function, move || async move {
///     session.close();
///     Ok(())
/// });
/// teardown.run().await?;
/// ```
#[derive(Default)]
pub struct TeardownStack {
    hooks: Vec<Hook>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the teardown of `fixture`.
    pub fn push<F, Fut>(&mut self, fixture: impl Into<String>, scope: FixtureScope, teardown: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.push(Hook {
            fixture: fixture.into(),
            scope,
            run: Box::new(move || -> TeardownFuture { Box::pin(teardown()) }),
        });
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names of the pending fixtures, in teardown order.
    pub fn pending(&self) -> Vec<&str> {
        self.hooks.iter().rev().map(|h| h.fixture.as_str()).collect()
    }

    /// Run every hook, last registered first.
    pub async fn run(&mut self) -> Result<()> {
        let hooks = std::mem::take(&mut self.hooks);
        run_hooks(hooks).await
    }

    /// Run only the hooks of `scope`, last registered first. Other hooks stay.
    pub async fn run_scope(&mut self, scope: FixtureScope) -> Result<()> {
        let (selected, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.hooks)
            .into_iter()
            .partition(|hook| hook.scope == scope);
        self.hooks = kept;
        run_hooks(selected).await
    }
}

async fn run_hooks(hooks: Vec<Hook>) -> Result<()> {
    let mut failures = Vec::new();

    for hook in hooks.into_iter().rev() {
        tracing::debug!(fixture = %hook.fixture, scope = %hook.scope, "Tearing down fixture");
        if let Err(e) = (hook.run)().await {
            tracing::warn!(fixture = %hook.fixture, error = %e, "Fixture teardown failed");
            failures.push((hook.fixture, e.to_string()));
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    let (fixtures, messages): (Vec<_>, Vec<_>) = failures.into_iter().unzip();
    Err(FixtureError::Teardown {
        fixture: fixtures.join(", "),
        message: messages.join("; "),
    })
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if !self.hooks.is_empty() {
            tracing::warn!(
                pending = ?self.pending(),
                "Teardown stack dropped with fixtures still set up"
            );
        }
    }
}

impl std::fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownStack")
            .field("pending", &self.pending())
            .finish()
    }
}
