//! Testing utilities for provider implementations.
//!
//! This module provides utilities to test `ProviderService` implementations
//! without spinning up a gRPC server.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_xyz::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_random() {
//!     let tester = ProviderTester::new(provider());
//!
//!     let created = tester
//!         .lifecycle_create("xyz_random", "my-random", json!({"length": 8}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(created.state["result"].as_str().unwrap().len(), 8);
//! }
//! ```

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{CreatedResource, PlanResult, ProviderMetadata};
use serde_json::Value;

/// A test harness for provider implementations.
///
/// Wraps a `ProviderService` and drives it the way the host would,
/// without a gRPC server in between.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the provider's metadata.
    pub fn metadata(&self) -> ProviderMetadata {
        self.provider.metadata()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Configure the provider.
    ///
    /// Returns `Err` with the error diagnostics if there are any.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        name: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(resource_type, name, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a change to an existing resource.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(
            resource_type,
            name,
            Some(prior_state),
            proposed_state.clone(),
            proposed_state,
        )
        .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(resource_type, name, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Full plan operation with explicit config.
    pub async fn plan(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, name, prior_state, proposed_state, config)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        name: &str,
        planned_state: Value,
    ) -> Result<CreatedResource, ProviderError> {
        self.provider
            .create(resource_type, name, planned_state)
            .await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, id, current_state).await
    }

    /// Update an existing resource in place.
    pub async fn update(
        &self,
        resource_type: &str,
        id: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, id, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, id, current_state).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the ID and the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        name: &str,
        config: Value,
    ) -> Result<CreatedResource, ProviderError> {
        let plan_result = self.plan_create(resource_type, name, config).await?;

        let created = self
            .create(resource_type, name, plan_result.planned_state)
            .await?;

        let state = self.read(resource_type, &created.id, created.state).await?;
        Ok(CreatedResource::new(created.id, state))
    }

    /// Apply a change the way the host would: plan, then either keep the
    /// resource, update it in place, or create a replacement and delete the
    /// original.
    ///
    /// Returns the resulting resource.
    pub async fn lifecycle_change(
        &self,
        resource_type: &str,
        name: &str,
        current: CreatedResource,
        proposed_state: Value,
    ) -> Result<CreatedResource, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, name, current.state.clone(), proposed_state)
            .await?;

        if plan_result.changes.is_empty() {
            return Ok(current);
        }

        if !plan_result.requires_replace {
            let state = self
                .update(
                    resource_type,
                    &current.id,
                    current.state,
                    plan_result.planned_state,
                )
                .await?;
            return Ok(CreatedResource::new(current.id, state));
        }

        let replacement = self
            .create(resource_type, name, plan_result.planned_state)
            .await?;
        self.delete(resource_type, &current.id, current.state)
            .await?;
        Ok(replacement)
    }

    /// Run a full delete lifecycle: plan → delete.
    ///
    /// The plan is made for `name`; the delete goes to `current.id`.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        name: &str,
        current: CreatedResource,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, name, current.state.clone())
            .await?;

        self.delete(resource_type, &current.id, current.state).await
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
