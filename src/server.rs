//! Server helpers for running providers.
//!
//! This module provides the `ProviderService` trait that providers implement,
//! and the `serve` functions that start a gRPC server with the handshake protocol.
//!
//! # Signal Handling
//!
//! The server handles OS signals (SIGTERM, SIGINT) for graceful shutdown.
//! When a signal is received, the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete (up to `shutdown_timeout`)
//! 3. Calls the provider's `stop()` method
//! 4. Exits cleanly

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated::provider_server::ProviderServer;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    CreatedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// Trait that provider implementations must implement.
///
/// This provides a higher-level API than the raw gRPC trait, using
/// ergonomic Rust types instead of protobuf types. Most providers get an
/// implementation from [`crate::infer::InferredProvider`] rather than
/// writing one by hand.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.into_keys().collect();
        resources.sort();
        ProviderMetadata {
            resources,
            ..Default::default()
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Configure the provider. Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `prior_state` is `None` for a create.
    async fn plan(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        resource_type: &str,
        name: &str,
        planned_state: Value,
    ) -> Result<CreatedResource, ProviderError>;

    /// Read the current state of a resource.
    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<(), ProviderError>;
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<crate::generated::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| crate::generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => crate::generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => {
                    crate::generated::diagnostic::Severity::Warning as i32
                },
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: ProviderError) -> Vec<crate::generated::Diagnostic> {
    vec![crate::generated::Diagnostic {
        severity: crate::generated::diagnostic::Severity::Error as i32,
        summary: err.to_string(),
        detail: String::new(),
        attribute: String::new(),
    }]
}

fn schema_to_proto(schema: &crate::schema::Schema) -> crate::generated::Schema {
    let mut attributes: Vec<_> = schema
        .block
        .attributes
        .iter()
        .map(|(name, attr)| crate::generated::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: attr
                .default
                .as_ref()
                .map(|v| serde_json::to_vec(v).unwrap_or_default())
                .unwrap_or_default(),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    crate::generated::Schema {
        version: schema.version as i64,
        block: Some(crate::generated::Block {
            attributes,
            description: schema.block.description.clone().unwrap_or_default(),
        }),
    }
}

fn decode(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[tonic::async_trait]
impl<P: ProviderService> crate::generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<crate::generated::GetMetadataRequest>,
    ) -> Result<tonic::Response<crate::generated::GetMetadataResponse>, tonic::Status> {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(
            provider = %metadata.name,
            version = %metadata.version,
            resources = metadata.resources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(
            crate::generated::GetMetadataResponse {
                server_capabilities: Some(crate::generated::ServerCapabilities {
                    plan_destroy: metadata.capabilities.plan_destroy,
                }),
                resources: metadata.resources,
                diagnostics: vec![],
                name: metadata.name,
                version: metadata.version,
            },
        ))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<crate::generated::GetSchemaRequest>,
    ) -> Result<tonic::Response<crate::generated::GetSchemaResponse>, tonic::Status> {
        debug!("GetSchema called");
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(tonic::Response::new(crate::generated::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<crate::generated::ConfigureRequest>,
    ) -> Result<tonic::Response<crate::generated::ConfigureResponse>, tonic::Status> {
        debug!("Configure called");
        let config = decode(&request.into_inner().config);

        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(
                        diagnostics = diagnostics.len(),
                        "Configure completed with errors"
                    );
                } else {
                    info!("Configure completed successfully");
                }
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(crate::generated::ConfigureResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<crate::generated::StopRequest>,
    ) -> Result<tonic::Response<crate::generated::StopResponse>, tonic::Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                String::new()
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(crate::generated::StopResponse {
            error,
        }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<crate::generated::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<crate::generated::ValidateResourceConfigResponse>, tonic::Status>
    {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");

        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, decode(&req.config))
            .await
        {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(resource_type = %req.resource_type, diagnostics = diagnostics.len(), "ValidateResourceConfig completed with errors");
                } else {
                    info!(resource_type = %req.resource_type, "ValidateResourceConfig completed successfully");
                }
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "ValidateResourceConfig failed");
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(
            crate::generated::ValidateResourceConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<crate::generated::PlanRequest>,
    ) -> Result<tonic::Response<crate::generated::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        let is_create = req.prior_state.is_empty();
        debug!(resource_type = %req.resource_type, name = %req.name, is_create, "Plan called");

        let prior_state = if is_create {
            None
        } else {
            Some(decode(&req.prior_state))
        };

        match self
            .provider
            .plan(
                &req.resource_type,
                &req.name,
                prior_state,
                decode(&req.proposed_state),
                decode(&req.config),
            )
            .await
        {
            Ok(result) => {
                info!(
                    resource_type = %req.resource_type,
                    name = %req.name,
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(tonic::Response::new(crate::generated::PlanResponse {
                    planned_state: encode(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, name = %req.name, error = %e, "Plan failed");
                Ok(tonic::Response::new(crate::generated::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<crate::generated::CreateRequest>,
    ) -> Result<tonic::Response<crate::generated::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, name = %req.name, "Create called");

        match self
            .provider
            .create(&req.resource_type, &req.name, decode(&req.planned_state))
            .await
        {
            Ok(created) => {
                info!(resource_type = %req.resource_type, id = %created.id, "Create completed successfully");
                Ok(tonic::Response::new(crate::generated::CreateResponse {
                    id: created.id,
                    state: encode(&created.state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, name = %req.name, error = %e, "Create failed");
                Ok(tonic::Response::new(crate::generated::CreateResponse {
                    id: String::new(),
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<crate::generated::ReadRequest>,
    ) -> Result<tonic::Response<crate::generated::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, id = %req.id, "Read called");

        match self
            .provider
            .read(&req.resource_type, &req.id, decode(&req.current_state))
            .await
        {
            Ok(state) => {
                debug!(resource_type = %req.resource_type, id = %req.id, "Read completed successfully");
                Ok(tonic::Response::new(crate::generated::ReadResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "Read failed");
                Ok(tonic::Response::new(crate::generated::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<crate::generated::UpdateRequest>,
    ) -> Result<tonic::Response<crate::generated::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "Update called");

        match self
            .provider
            .update(
                &req.resource_type,
                &req.id,
                decode(&req.prior_state),
                decode(&req.planned_state),
            )
            .await
        {
            Ok(state) => {
                info!(resource_type = %req.resource_type, id = %req.id, "Update completed successfully");
                Ok(tonic::Response::new(crate::generated::UpdateResponse {
                    state: encode(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "Update failed");
                Ok(tonic::Response::new(crate::generated::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<crate::generated::DeleteRequest>,
    ) -> Result<tonic::Response<crate::generated::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "Delete called");

        let diagnostics = match self
            .provider
            .delete(&req.resource_type, &req.id, decode(&req.current_state))
            .await
        {
            Ok(()) => {
                info!(resource_type = %req.resource_type, id = %req.id, "Delete completed successfully");
                vec![]
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "Delete failed");
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(crate::generated::DeleteResponse {
            diagnostics,
        }))
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Timeout for graceful shutdown. After receiving a shutdown signal,
    /// the server will wait this long for in-flight requests to complete.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// The handshake line printed to stdout once the server is listening.
///
/// Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT; CTRL+C on Windows).
///
/// If the handlers cannot be installed, this never resolves and the
/// provider runs until the host kills it.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, initiating graceful shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve a provider implementation as a gRPC server.
///
/// This function:
/// 1. Binds an available port on localhost
/// 2. Outputs the handshake string to stdout
/// 3. Serves until SIGTERM/SIGINT, then shuts down gracefully
///
/// For custom configuration, use [`serve_with_options`].
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), ProviderError> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_with_shutdown(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve a provider on a specific address.
///
/// Unlike [`serve`], this binds to the given address rather than
/// picking an available port.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), ProviderError> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), ProviderError> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// The handshake is printed before serving starts. Once `shutdown`
/// resolves, in-flight requests get `options.shutdown_timeout` to finish,
/// then the provider's `stop()` is called.
pub async fn serve_with_shutdown<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), ProviderError>
where
    P: ProviderService,
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    println!("{}", handshake_line(addr));
    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(ProviderServer::new(grpc_service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                let _ = drain_rx.await;
            },
        );
    tokio::pin!(server);
    tokio::pin!(shutdown);

    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
            info!("Server stopped");
        }
        _ = &mut shutdown => {
            let _ = drain_tx.send(());
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                }
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        }
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::provider_server::Provider as _;
    use crate::infer::InferredProvider;
    use crate::random::{Random, CHARSET};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn grpc() -> ProviderGrpcService<InferredProvider> {
        ProviderGrpcService {
            provider: Arc::new(InferredProvider::new("xyz", "0.0.1").with_resource(Random)),
        }
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "HEMMER_PROVIDER|1|127.0.0.1:50051");
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_millis(250));
        assert_eq!(options.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_diagnostics_to_proto() {
        let proto = diagnostics_to_proto(vec![
            Diagnostic::error("bad").with_attribute("length"),
            Diagnostic::warning("meh").with_detail("details"),
        ]);
        assert_eq!(
            proto[0].severity,
            crate::generated::diagnostic::Severity::Error as i32
        );
        assert_eq!(proto[0].attribute, "length");
        assert_eq!(
            proto[1].severity,
            crate::generated::diagnostic::Severity::Warning as i32
        );
        assert_eq!(proto[1].detail, "details");
    }

    #[tokio::test]
    async fn test_grpc_get_metadata() {
        let response = grpc()
            .get_metadata(tonic::Request::new(crate::generated::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.name, "xyz");
        assert_eq!(response.version, "0.0.1");
        assert_eq!(response.resources, vec!["xyz_random"]);
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_grpc_get_schema() {
        let response = grpc()
            .get_schema(tonic::Request::new(crate::generated::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        let block = response.resources["xyz_random"].block.clone().unwrap();
        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["length", "result"]);
        assert!(block.attributes[0].required);
        assert!(block.attributes[0].force_new);
        assert_eq!(block.attributes[0].r#type, b"\"int64\"".to_vec());
        assert!(block.attributes[1].computed);
    }

    #[tokio::test]
    async fn test_grpc_plan_and_create() {
        let service = grpc();

        let plan = service
            .plan(tonic::Request::new(crate::generated::PlanRequest {
                resource_type: "xyz_random".to_string(),
                name: "my-random".to_string(),
                prior_state: vec![],
                proposed_state: br#"{"length": 10}"#.to_vec(),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(plan.diagnostics.is_empty());
        let planned: Value = serde_json::from_slice(&plan.planned_state).unwrap();
        assert_eq!(planned, json!({"length": 10}));

        let created = service
            .create(tonic::Request::new(crate::generated::CreateRequest {
                resource_type: "xyz_random".to_string(),
                name: "my-random".to_string(),
                planned_state: plan.planned_state,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(created.diagnostics.is_empty());
        assert_eq!(created.id, "my-random");

        let state: Value = serde_json::from_slice(&created.state).unwrap();
        let result = state["result"].as_str().unwrap();
        assert_eq!(result.len(), 10);
        assert!(result.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[tokio::test]
    async fn test_grpc_errors_become_diagnostics() {
        let service = grpc();

        let created = service
            .create(tonic::Request::new(crate::generated::CreateRequest {
                resource_type: "xyz_unknown".to_string(),
                name: "x".to_string(),
                planned_state: br#"{"length": 1}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(created.diagnostics.len(), 1);
        assert!(created.diagnostics[0].summary.contains("xyz_unknown"));
        assert!(created.state.is_empty());

        let updated = service
            .update(tonic::Request::new(crate::generated::UpdateRequest {
                resource_type: "xyz_random".to_string(),
                id: "my-random".to_string(),
                prior_state: br#"{"length": 1, "result": "a"}"#.to_vec(),
                planned_state: br#"{"length": 2}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(updated.diagnostics[0].summary.starts_with("Unimplemented"));
    }

    #[tokio::test]
    async fn test_grpc_plan_with_corrupt_prior_state_reports_error() {
        let response = grpc()
            .plan(tonic::Request::new(crate::generated::PlanRequest {
                resource_type: "xyz_random".to_string(),
                name: "my-random".to_string(),
                prior_state: b"{not json".to_vec(),
                proposed_state: br#"{"length": 5}"#.to_vec(),
                config: br#"{"length": 5}"#.to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            crate::generated::diagnostic::Severity::Error as i32
        );
        assert!(response.diagnostics[0]
            .summary
            .starts_with("Serialization error"));
        assert!(response.changes.is_empty());
        assert!(response.planned_state.is_empty());
    }

    #[tokio::test]
    async fn test_grpc_validate_resource_config() {
        let response = grpc()
            .validate_resource_config(tonic::Request::new(
                crate::generated::ValidateResourceConfigRequest {
                    resource_type: "xyz_random".to_string(),
                    config: br#"{"length": "long"}"#.to_vec(),
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            crate::generated::diagnostic::Severity::Error as i32
        );
    }

    #[tokio::test]
    async fn test_grpc_read_and_delete() {
        let service = grpc();
        let state = br#"{"length":3,"result":"abc"}"#.to_vec();

        let read = service
            .read(tonic::Request::new(crate::generated::ReadRequest {
                resource_type: "xyz_random".to_string(),
                id: "r".to_string(),
                current_state: state.clone(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(read.state, state);

        let deleted = service
            .delete(tonic::Request::new(crate::generated::DeleteRequest {
                resource_type: "xyz_random".to_string(),
                id: "r".to_string(),
                current_state: state,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(deleted.diagnostics.is_empty());
    }

    struct StopTracker {
        stopped: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ProviderService for StopTracker {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
        }

        async fn configure(&self, _config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![])
        }

        async fn plan(
            &self,
            _resource_type: &str,
            _name: &str,
            _prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            Ok(PlanResult::no_change(proposed_state))
        }

        async fn create(
            &self,
            _resource_type: &str,
            name: &str,
            planned_state: Value,
        ) -> Result<CreatedResource, ProviderError> {
            Ok(CreatedResource::new(name, planned_state))
        }

        async fn read(
            &self,
            _resource_type: &str,
            _id: &str,
            current_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(current_state)
        }

        async fn update(
            &self,
            _resource_type: &str,
            _id: &str,
            _prior_state: Value,
            planned_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn delete(
            &self,
            _resource_type: &str,
            _id: &str,
            _current_state: Value,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), ProviderError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_calls_stop() {
        let stopped = Arc::new(AtomicBool::new(false));
        let provider = StopTracker {
            stopped: Arc::clone(&stopped),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        serve_with_shutdown(
            provider,
            listener,
            ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5)),
            std::future::ready(()),
        )
        .await
        .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_default_metadata_is_sorted() {
        struct Named;

        #[async_trait::async_trait]
        impl ProviderService for Named {
            fn schema(&self) -> ProviderSchema {
                ProviderSchema::new()
                    .with_resource("b_thing", Default::default())
                    .with_resource("a_thing", Default::default())
            }
            async fn configure(&self, _: Value) -> Result<Vec<Diagnostic>, ProviderError> {
                Ok(vec![])
            }
            async fn plan(
                &self,
                _: &str,
                _: &str,
                _: Option<Value>,
                proposed: Value,
                _: Value,
            ) -> Result<PlanResult, ProviderError> {
                Ok(PlanResult::no_change(proposed))
            }
            async fn create(
                &self,
                _: &str,
                name: &str,
                planned: Value,
            ) -> Result<CreatedResource, ProviderError> {
                Ok(CreatedResource::new(name, planned))
            }
            async fn read(&self, _: &str, _: &str, state: Value) -> Result<Value, ProviderError> {
                Ok(state)
            }
            async fn update(
                &self,
                _: &str,
                _: &str,
                _: Value,
                planned: Value,
            ) -> Result<Value, ProviderError> {
                Ok(planned)
            }
            async fn delete(&self, _: &str, _: &str, _: Value) -> Result<(), ProviderError> {
                Ok(())
            }
        }

        let metadata = Named.metadata();
        assert_eq!(metadata.resources, vec!["a_thing", "b_thing"]);
        assert!(metadata.name.is_empty());
    }
}
