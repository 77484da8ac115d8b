//! Typed resources with inferred schemas.
//!
//! Instead of hand-writing a [`ProviderSchema`] and matching on resource type
//! strings, a resource is described by three Rust types: a controller
//! implementing [`Resource`], an input type (`Args`) and an output type
//! (`State`). Both data types list their fields through [`InferSchema`], and
//! [`InferredProvider`] turns the registered resources into a complete
//! [`ProviderService`].
//!
//! ```ignore
//! use hemmer_provider_xyz::infer::InferredProvider;
//! use hemmer_provider_xyz::random::Random;
//!
//! let provider = InferredProvider::new("xyz", "0.0.1").with_resource(Random);
//! assert_eq!(provider.resource_types(), vec!["xyz_random"]);
//! ```
//!
//! Resources only implement `create`. Everything else follows from that:
//! reads echo the stored state, deletes are no-ops, and any change to the
//! inputs is planned as a replacement.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{AttributeChange, CreatedResource, PlanResult, ProviderMetadata};

/// Maps a Rust field type onto a schema attribute type.
pub trait InferType {
    /// The schema type of values of this Rust type.
    fn attribute_type() -> AttributeType;

    /// Whether the field may be omitted (true for `Option<T>`).
    fn is_optional() -> bool {
        false
    }
}

macro_rules! infer_type {
    ($attr:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl InferType for $ty {
                fn attribute_type() -> AttributeType {
                    $attr
                }
            }
        )+
    };
}

infer_type!(AttributeType::String => String);
infer_type!(AttributeType::Bool => bool);
infer_type!(AttributeType::Int64 => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
infer_type!(AttributeType::Float64 => f32, f64);

impl<T: InferType> InferType for Option<T> {
    fn attribute_type() -> AttributeType {
        T::attribute_type()
    }

    fn is_optional() -> bool {
        true
    }
}

impl<T: InferType> InferType for Vec<T> {
    fn attribute_type() -> AttributeType {
        AttributeType::list(T::attribute_type())
    }
}

impl<T: InferType> InferType for HashMap<String, T> {
    fn attribute_type() -> AttributeType {
        AttributeType::map(T::attribute_type())
    }
}

impl<T: InferType> InferType for BTreeMap<String, T> {
    fn attribute_type() -> AttributeType {
        AttributeType::map(T::attribute_type())
    }
}

/// An input attribute for a field of type `T`.
///
/// Required unless `T` is an `Option`.
pub fn input<T: InferType>() -> Attribute {
    let flags = if T::is_optional() {
        AttributeFlags::optional()
    } else {
        AttributeFlags::required()
    };
    Attribute::new(T::attribute_type(), flags)
}

/// A provider-computed output attribute for a field of type `T`.
pub fn output<T: InferType>() -> Attribute {
    Attribute::new(T::attribute_type(), AttributeFlags::computed())
}

/// A record type whose fields are projected into a resource schema.
///
/// The names returned here must match the record's serde field names.
pub trait InferSchema {
    /// The record's fields, in declaration order.
    fn attributes() -> Vec<(&'static str, Attribute)>;
}

/// A resource controller.
///
/// `create` is the only required operation. With `preview` set, the host is
/// planning and the resource must not do real work; outputs that only a real
/// run can produce are left unset.
#[async_trait::async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Type name of the resource, in CamelCase (e.g. `Random`).
    const NAME: &'static str;

    /// Inputs accepted by the resource.
    type Args: InferSchema + Serialize + DeserializeOwned + PartialEq + Send + Sync;

    /// State of a created resource.
    type State: InferSchema + Serialize + Send;

    /// Create the resource, returning its ID and state.
    async fn create(
        &self,
        name: &str,
        input: Self::Args,
        preview: bool,
    ) -> Result<(String, Self::State), ProviderError>;
}

/// Build the schema of a resource from its args and state types.
///
/// Args attributes are kept as declared. State attributes that are not also
/// args become computed outputs.
pub fn infer_schema<R: Resource>() -> Schema {
    let mut schema = Schema::v0();
    for (name, attr) in R::Args::attributes() {
        schema = schema.with_attribute(name, attr);
    }
    for (name, attr) in R::State::attributes() {
        if schema.attribute(name).is_none() {
            schema = schema.with_attribute(name, attr.into_computed());
        }
    }
    schema
}

/// The host-facing type token for a resource: `<provider>_<snake_case name>`.
pub fn resource_token(provider: &str, resource_name: &str) -> String {
    format!("{}_{}", provider, to_snake_case(resource_name))
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Object-safe view of a registered [`Resource`].
#[async_trait::async_trait]
trait RegisteredResource: Send + Sync {
    fn schema(&self) -> Schema;

    fn check_config(&self, config: Value) -> Result<(), serde_json::Error>;

    async fn plan(
        &self,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError>;

    async fn create(&self, name: &str, planned_state: Value)
        -> Result<CreatedResource, ProviderError>;
}

struct Inferred<R: Resource>(R);

#[async_trait::async_trait]
impl<R: Resource> RegisteredResource for Inferred<R> {
    fn schema(&self) -> Schema {
        infer_schema::<R>()
    }

    fn check_config(&self, config: Value) -> Result<(), serde_json::Error> {
        serde_json::from_value::<R::Args>(config).map(|_| ())
    }

    async fn plan(
        &self,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let Some(prior_state) = prior_state else {
            let args: R::Args = serde_json::from_value(proposed_state)?;
            let (_, state) = self.0.create(name, args, true).await?;
            let planned_state = serde_json::to_value(&state)?;
            let changes = match &planned_state {
                Value::Object(fields) => fields
                    .iter()
                    .map(|(path, value)| AttributeChange::added(path.clone(), value.clone()))
                    .collect(),
                _ => Vec::new(),
            };
            return Ok(PlanResult::with_changes(planned_state, changes, false));
        };

        if proposed_state.is_null() {
            return Ok(PlanResult::no_change(Value::Null));
        }

        let prior_args: R::Args = serde_json::from_value(prior_state.clone())?;
        let proposed_args: R::Args = serde_json::from_value(proposed_state)?;
        if prior_args == proposed_args {
            return Ok(PlanResult::no_change(prior_state));
        }

        let changes = diff_fields(
            &serde_json::to_value(&prior_args)?,
            &serde_json::to_value(&proposed_args)?,
        );
        let (_, state) = self.0.create(name, proposed_args, true).await?;
        Ok(PlanResult::with_changes(
            serde_json::to_value(&state)?,
            changes,
            true,
        ))
    }

    async fn create(
        &self,
        name: &str,
        planned_state: Value,
    ) -> Result<CreatedResource, ProviderError> {
        let args: R::Args = serde_json::from_value(planned_state)?;
        let (id, state) = self.0.create(name, args, false).await?;
        Ok(CreatedResource::new(id, serde_json::to_value(&state)?))
    }
}

fn diff_fields(before: &Value, after: &Value) -> Vec<AttributeChange> {
    let empty = serde_json::Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let paths: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    paths
        .into_iter()
        .filter_map(|path| {
            let old = before.get(path);
            let new = after.get(path);
            (old != new).then(|| AttributeChange::new(path.clone(), old.cloned(), new.cloned()))
        })
        .collect()
}

/// A provider assembled from typed resources.
pub struct InferredProvider {
    name: String,
    version: String,
    resources: BTreeMap<String, Box<dyn RegisteredResource>>,
}

impl InferredProvider {
    /// Create a provider with no resources.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Register a resource under `<provider>_<snake_case(R::NAME)>`.
    ///
    /// A second registration of the same token replaces the first.
    pub fn with_resource<R: Resource>(mut self, resource: R) -> Self {
        let token = resource_token(&self.name, R::NAME);
        debug!(provider = %self.name, resource_type = %token, "Registering resource");
        if self
            .resources
            .insert(token.clone(), Box::new(Inferred(resource)))
            .is_some()
        {
            warn!(resource_type = %token, "Resource registered twice, keeping the last one");
        }
        self
    }

    /// The provider name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The provider version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Registered resource type tokens, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn RegisteredResource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }
}

#[async_trait::async_trait]
impl ProviderService for InferredProvider {
    fn schema(&self) -> ProviderSchema {
        self.resources
            .iter()
            .fold(ProviderSchema::new(), |schema, (token, resource)| {
                schema.with_resource(token.clone(), resource.schema())
            })
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            resources: self.resource_types(),
            capabilities: Default::default(),
        }
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        match config {
            Value::Null => Ok(vec![]),
            Value::Object(fields) if fields.is_empty() => Ok(vec![]),
            Value::Object(fields) => Ok(vec![Diagnostic::warning(format!(
                "Provider '{}' takes no configuration",
                self.name
            ))
            .with_detail(format!(
                "Ignoring: {}",
                fields.keys().cloned().collect::<Vec<_>>().join(", ")
            ))]),
            other => Err(ProviderError::Configuration(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let Ok(resource) = self.resource(resource_type) else {
            return Ok(vec![Diagnostic::error(format!(
                "Unknown resource type: {}",
                resource_type
            ))]);
        };
        match resource.check_config(config) {
            Ok(()) => Ok(vec![]),
            Err(e) => Ok(vec![Diagnostic::error(format!(
                "Invalid configuration for {}",
                resource_type
            ))
            .with_detail(e.to_string())]),
        }
    }

    async fn plan(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.resource(resource_type)?
            .plan(name, prior_state, proposed_state)
            .await
    }

    async fn create(
        &self,
        resource_type: &str,
        name: &str,
        planned_state: Value,
    ) -> Result<CreatedResource, ProviderError> {
        if planned_state.is_null() {
            return Err(ProviderError::InvalidRequest(format!(
                "create of {} '{}' has no planned state",
                resource_type, name
            )));
        }
        self.resource(resource_type)?
            .create(name, planned_state)
            .await
    }

    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?;
        debug!(resource_type, id, "State is host-managed, returning it unchanged");
        Ok(current_state)
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        _prior_state: Value,
        _planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?;
        Err(ProviderError::Unimplemented(format!(
            "{} '{}' cannot be updated in place; changes require replacement",
            resource_type, id
        )))
    }

    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        _current_state: Value,
    ) -> Result<(), ProviderError> {
        self.resource(resource_type)?;
        debug!(resource_type, id, "Nothing to delete");
        Ok(())
    }
}
