//! Function registration
//!
//! A [`SomaFunction`] pairs a typed async handler with the metadata the
//! transport layer advertises: provider description, function name and JSON
//! Schemas derived from the input and output types. [`FunctionRegistry`]
//! erases the types so invocations can be routed by
//! `(provider type id, function name)` with JSON parameters.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RegistryError;

/// How callers authenticate against a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderCredentialController {
    NoAuth,
    ApiKey,
}

/// Provider a function belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderController {
    pub type_id: String,
    pub name: String,
    pub documentation: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub credential_controllers: Vec<ProviderCredentialController>,
}

impl ProviderController {
    /// Provider without credentials
    pub fn new(
        type_id: impl Into<String>,
        name: impl Into<String>,
        documentation: impl Into<String>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            name: name.into(),
            documentation: documentation.into(),
            categories: Vec::new(),
            credential_controllers: vec![ProviderCredentialController::NoAuth],
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_credential_controllers(
        mut self,
        credential_controllers: Vec<ProviderCredentialController>,
    ) -> Self {
        self.credential_controllers = credential_controllers;
        self
    }
}

/// Metadata advertised for a function; schemas are JSON Schema documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
    pub description: String,
    pub parameters: String,
    pub output: String,
}

/// Error reported back to the caller of a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackError {
    pub message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CallbackError {}

/// Outcome of a JSON invocation; `Ok` holds the serialized output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeFunctionResponse {
    pub result: Result<String, CallbackError>,
}

impl InvokeFunctionResponse {
    pub fn success(output: String) -> Self {
        Self { result: Ok(output) }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            result: Err(CallbackError::new(message)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Typed function handler
#[async_trait]
pub trait FunctionHandler<I, O>: Send + Sync {
    async fn call(&self, input: I) -> anyhow::Result<O>;
}

#[async_trait]
impl<I, O, F, Fut> FunctionHandler<I, O> for F
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    async fn call(&self, input: I) -> anyhow::Result<O> {
        (self)(input).await
    }
}

/// A typed function and its metadata
pub struct SomaFunction<I, O> {
    provider_controller: ProviderController,
    metadata: FunctionMetadata,
    handler: Arc<dyn FunctionHandler<I, O>>,
}

impl<I, O> Clone for SomaFunction<I, O> {
    fn clone(&self) -> Self {
        Self {
            provider_controller: self.provider_controller.clone(),
            metadata: self.metadata.clone(),
            handler: self.handler.clone(),
        }
    }
}

fn schema_string<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string(&schema).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to serialize JSON schema");
        "{}".to_string()
    })
}

/// Create a function
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct Assessment { claim: InsuranceClaim }
///
/// #[derive(Serialize, JsonSchema)]
/// struct ApprovalResult { approved: bool }
///
/// let approve = create_soma_function(
///     ProviderController::new("approve-claim", "Approve Claim", "Approve a claim"),
///     "approve-claim",
///     "Approve a claim",
///     |input: Assessment| async move {
///         Ok(ApprovalResult { approved: input.claim.amount < 1000.0 })
///     },
/// );
/// ```
pub fn create_soma_function<I, O>(
    provider_controller: ProviderController,
    name: impl Into<String>,
    description: impl Into<String>,
    handler: impl FunctionHandler<I, O> + 'static,
) -> SomaFunction<I, O>
where
    I: JsonSchema,
    O: JsonSchema,
{
    SomaFunction {
        provider_controller,
        metadata: FunctionMetadata {
            name: name.into(),
            description: description.into(),
            parameters: schema_string::<I>(),
            output: schema_string::<O>(),
        },
        handler: Arc::new(handler),
    }
}

impl<I, O> SomaFunction<I, O> {
    pub fn provider_controller(&self) -> &ProviderController {
        &self.provider_controller
    }

    pub fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Call the handler with a typed input
    pub async fn invoke(&self, input: I) -> anyhow::Result<O> {
        self.handler.call(input).await
    }
}

impl<I, O> SomaFunction<I, O>
where
    I: DeserializeOwned,
    O: Serialize,
{
    /// Call the handler with JSON parameters
    ///
    /// Parse failures, handler errors and serialization failures are all
    /// reported as a [`CallbackError`]; this never returns an `Err` itself.
    pub async fn invoke_json(&self, parameters: &str) -> InvokeFunctionResponse {
        let input: I = match serde_json::from_str(parameters) {
            Ok(input) => input,
            Err(e) => {
                debug!(function = %self.metadata.name, error = %e, "Invalid function parameters");
                return InvokeFunctionResponse::failure(format!("invalid parameters: {e}"));
            }
        };

        let output = match self.handler.call(input).await {
            Ok(output) => output,
            Err(e) => {
                warn!(function = %self.metadata.name, error = %e, "Function handler failed");
                return InvokeFunctionResponse::failure(format!("{e:#}"));
            }
        };

        match serde_json::to_string(&output) {
            Ok(json) => InvokeFunctionResponse::success(json),
            Err(e) => InvokeFunctionResponse::failure(format!("failed to serialize output: {e}")),
        }
    }
}

impl<I, O> fmt::Debug for SomaFunction<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SomaFunction")
            .field("provider", &self.provider_controller.type_id)
            .field("metadata", &self.metadata)
            .finish()
    }
}

// ============================================================================
// Type-erased registry
// ============================================================================

/// Type-erased function interface
///
/// Lets the registry hold functions of different input/output types; all
/// parameters and results are JSON strings.
#[async_trait]
pub trait AnyFunction: Send + Sync {
    fn provider_controller(&self) -> &ProviderController;

    fn metadata(&self) -> &FunctionMetadata;

    async fn invoke_json(&self, parameters: &str) -> InvokeFunctionResponse;
}

#[async_trait]
impl<I, O> AnyFunction for SomaFunction<I, O>
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    fn provider_controller(&self) -> &ProviderController {
        &self.provider_controller
    }

    fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }

    async fn invoke_json(&self, parameters: &str) -> InvokeFunctionResponse {
        SomaFunction::invoke_json(self, parameters).await
    }
}

/// Functions known to this process, keyed by `(provider type id, function name)`
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<(String, String), Arc<dyn AnyFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, replacing any function with the same key
    ///
    /// Returns `true` if the function was not registered before.
    pub fn register<I, O>(&self, function: SomaFunction<I, O>) -> bool
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
    {
        let key = (
            function.provider_controller.type_id.clone(),
            function.metadata.name.clone(),
        );
        let is_new = self
            .functions
            .write()
            .insert(key.clone(), Arc::new(function))
            .is_none();
        if is_new {
            info!(provider = %key.0, function = %key.1, "Function registered");
        } else {
            debug!(provider = %key.0, function = %key.1, "Function re-registered");
        }
        is_new
    }

    pub fn get(&self, provider_type_id: &str, function_name: &str) -> Option<Arc<dyn AnyFunction>> {
        self.functions
            .read()
            .get(&(provider_type_id.to_string(), function_name.to_string()))
            .cloned()
    }

    /// Invoke a registered function with JSON parameters
    pub async fn invoke(
        &self,
        provider_type_id: &str,
        function_name: &str,
        parameters: &str,
    ) -> Result<InvokeFunctionResponse, RegistryError> {
        let function = self
            .get(provider_type_id, function_name)
            .ok_or_else(|| RegistryError::UnknownFunction {
                provider: provider_type_id.to_string(),
                function: function_name.to_string(),
            })?;
        Ok(function.invoke_json(parameters).await)
    }

    /// Distinct providers of all registered functions, sorted by type id
    pub fn providers(&self) -> Vec<ProviderController> {
        let mut providers: HashMap<String, ProviderController> = HashMap::new();
        for function in self.functions.read().values() {
            let provider = function.provider_controller();
            providers
                .entry(provider.type_id.clone())
                .or_insert_with(|| provider.clone());
        }
        let mut providers: Vec<_> = providers.into_values().collect();
        providers.sort_by(|a, b| a.type_id.cmp(&b.type_id));
        providers
    }

    /// Metadata of the functions registered for a provider, sorted by name
    pub fn functions_for(&self, provider_type_id: &str) -> Vec<FunctionMetadata> {
        let mut metadata: Vec<_> = self
            .functions
            .read()
            .iter()
            .filter(|((provider, _), _)| provider == provider_type_id)
            .map(|(_, function)| function.metadata().clone())
            .collect();
        metadata.sort_by(|a, b| a.name.cmp(&b.name));
        metadata
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct ClaimInput {
        amount: f64,
    }

    #[derive(Debug, Serialize, JsonSchema)]
    struct ApprovalResult {
        approved: bool,
    }

    fn approve_claim() -> SomaFunction<ClaimInput, ApprovalResult> {
        create_soma_function(
            ProviderController::new("approve-claim", "Approve Claim", "Approve a claim"),
            "approve-claim",
            "Approve a claim",
            |input: ClaimInput| async move {
                if input.amount < 0.0 {
                    anyhow::bail!("negative amount");
                }
                Ok(ApprovalResult {
                    approved: input.amount < 1000.0,
                })
            },
        )
    }

    #[test]
    fn test_metadata_carries_schemas() {
        let function = approve_claim();
        let parameters: serde_json::Value =
            serde_json::from_str(&function.metadata().parameters).unwrap();
        let output: serde_json::Value = serde_json::from_str(&function.metadata().output).unwrap();

        assert_eq!(parameters["title"], "ClaimInput");
        assert!(parameters["properties"]["amount"].is_object());
        assert_eq!(output["title"], "ApprovalResult");
    }

    #[test]
    fn test_credential_controller_wire_format() {
        let json = serde_json::to_value(ProviderCredentialController::NoAuth).unwrap();
        assert_eq!(json, serde_json::json!({"type": "NoAuth"}));
    }

    #[tokio::test]
    async fn test_invoke_json() {
        let function = approve_claim();

        let ok = function.invoke_json(r#"{"amount": 250.0}"#).await;
        assert_eq!(ok.result, Ok(r#"{"approved":true}"#.to_string()));

        let failed = function.invoke_json(r#"{"amount": -1.0}"#).await;
        assert_eq!(failed.result, Err(CallbackError::new("negative amount")));

        let invalid = function.invoke_json("not json").await;
        assert!(!invalid.is_success());
    }

    #[tokio::test]
    async fn test_registry_routes_by_provider_and_name() {
        let registry = FunctionRegistry::new();
        assert!(registry.register(approve_claim()));
        assert!(!registry.register(approve_claim()));
        assert_eq!(registry.len(), 1);

        let response = registry
            .invoke("approve-claim", "approve-claim", r#"{"amount": 5000.0}"#)
            .await
            .unwrap();
        assert_eq!(response.result, Ok(r#"{"approved":false}"#.to_string()));

        let unknown = registry.invoke("approve-claim", "reject-claim", "{}").await;
        assert!(matches!(unknown, Err(RegistryError::UnknownFunction { .. })));

        assert_eq!(registry.providers().len(), 1);
        assert_eq!(registry.functions_for("approve-claim")[0].name, "approve-claim");
    }
}
