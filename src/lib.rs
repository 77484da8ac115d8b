//! Hemmer provider `xyz`
//!
//! A minimal provider exposing a single resource, `xyz_random`, which
//! generates a random alphanumeric string of a requested length.
//!
//! # Overview
//!
//! The crate is split into:
//!
//! - **Protocol Buffers types**: Rust types for the provider protocol ([`generated`])
//! - **Schema types**: Types for describing provider and resource schemas
//! - **Resource inference**: Schemas and lifecycle derived from typed [`Resource`] implementations
//! - **ProviderService trait**: The seam between the gRPC server and provider logic
//! - **Server helpers**: Functions to start a gRPC server with the handshake protocol
//! - **Logging**: Integration with `tracing` for structured logging on stderr
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_xyz::{init_logging, provider, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(provider()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it outputs a handshake string to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`
//!
//! The host spawns the provider as a subprocess, reads this line and connects via gRPC.
//!
//! # Provider Protocol
//!
//! - **GetMetadata**: Returns provider name, version and resource type names
//! - **GetSchema**: Returns the provider config schema and resource schemas
//! - **Configure**: Accepts provider configuration (`xyz` takes none)
//! - **Stop**: Gracefully shuts down the provider
//! - **ValidateResourceConfig**: Checks a resource configuration against its inputs
//! - **Plan**: Previews creation, replacement or deletion
//! - **Create/Read/Update/Delete**: Resource lifecycle operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod infer;
pub mod logging;
pub mod random;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use error::ProviderError;
pub use infer::{infer_schema, resource_token, InferSchema, InferredProvider, Resource};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use random::{Random, RandomArgs, RandomState};
pub use schema::ProviderSchema;
pub use server::{
    handshake_line, serve, serve_on, serve_on_with_options, serve_with_options,
    serve_with_shutdown, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, CreatedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;

/// Name of this provider, used as the prefix of its resource tokens.
pub const PROVIDER_NAME: &str = "xyz";

/// Version reported to the host.
pub const PROVIDER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the `xyz` provider with all of its resources registered.
pub fn provider() -> InferredProvider {
    InferredProvider::new(PROVIDER_NAME, PROVIDER_VERSION).with_resource(Random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_registers_random() {
        let provider = provider();
        assert_eq!(provider.name(), "xyz");
        assert_eq!(provider.version(), PROVIDER_VERSION);
        assert_eq!(provider.resource_types(), vec!["xyz_random".to_string()]);
        assert_eq!(resource_token(PROVIDER_NAME, Random::NAME), "xyz_random");
    }
}
