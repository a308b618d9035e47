//! Tool — a named, schema-validated capability.
//!
//! A tool declares typed parameters and owns their validation: the handler
//! is never invoked with arguments that fail the schema. Tools from any
//! source (local closures, external protocol servers) are expressed as the
//! same `Tool` value, so the engine never branches on provenance.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterKind {
    fn json_type(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Object => "object",
            ParameterKind::Array => "array",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,

    /// Declared type
    pub kind: ParameterKind,

    /// Description shown to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the parameter must be present and non-empty
    #[serde(default)]
    pub required: bool,

    /// Allowed values, if constrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,

    /// Substituted when the model sends an empty string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Nested parameters (object kind)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ToolParameter>,

    /// Element schema (array kind)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ToolParameter>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            required: false,
            enum_values: Vec::new(),
            default: None,
            properties: Vec::new(),
            items: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<serde_json::Value>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_properties(mut self, properties: Vec<ToolParameter>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_items(mut self, items: ToolParameter) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// Render this parameter as a JSON-Schema fragment for the provider
    /// catalog, recursing through nested object properties and array items.
    fn schema(&self) -> serde_json::Value {
        let mut schema = serde_json::Map::new();
        schema.insert("type".into(), self.kind.json_type().into());
        if let Some(desc) = &self.description {
            schema.insert("description".into(), desc.clone().into());
        }
        if !self.enum_values.is_empty() {
            schema.insert("enum".into(), self.enum_values.clone().into());
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        if self.kind == ParameterKind::Object && !self.properties.is_empty() {
            let mut props = serde_json::Map::new();
            let mut required = Vec::new();
            for p in &self.properties {
                props.insert(p.name.clone(), p.schema());
                if p.required {
                    required.push(serde_json::Value::from(p.name.clone()));
                }
            }
            schema.insert("properties".into(), props.into());
            if !required.is_empty() {
                schema.insert("required".into(), required.into());
            }
        }
        if self.kind == ParameterKind::Array
            && let Some(items) = &self.items
        {
            schema.insert("items".into(), items.schema());
        }
        serde_json::Value::Object(schema)
    }
}

/// Render a parameter list as the JSON-Schema object the provider catalog
/// expects.
pub fn parameters_schema(parameters: &[ToolParameter]) -> serde_json::Value {
    let mut props = serde_json::Map::new();
    let mut required = Vec::new();
    for p in parameters {
        props.insert(p.name.clone(), p.schema());
        if p.required {
            required.push(serde_json::Value::from(p.name.clone()));
        }
    }
    let mut schema = serde_json::Map::new();
    schema.insert("type".into(), "object".into());
    schema.insert("properties".into(), props.into());
    if !required.is_empty() {
        schema.insert("required".into(), required.into());
    }
    serde_json::Value::Object(schema)
}

/// Validate and normalize arguments against a parameter list.
///
/// Applied in order per parameter: required presence (missing, null, and
/// empty string all count as absent), type check for present non-empty
/// values (numeric-looking strings coerce to numbers in place), enum
/// membership, then default substitution for empty strings. Returns the
/// normalized argument object; the caller only invokes the handler on `Ok`.
pub fn validate_arguments(
    parameters: &[ToolParameter],
    arguments: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    let mut args = match arguments {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "arguments must be a JSON object, got {other}"
            )));
        }
    };

    for param in parameters {
        let value = args.get(&param.name);
        let is_empty_string = matches!(value, Some(serde_json::Value::String(s)) if s.is_empty());
        let is_absent = value.is_none() || matches!(value, Some(serde_json::Value::Null));

        if param.required && (is_absent || is_empty_string) {
            return Err(ToolError::InvalidArguments(format!(
                "Missing required parameter '{}'",
                param.name
            )));
        }

        if is_absent {
            continue;
        }

        if !is_empty_string {
            if let Some(value) = args.get_mut(&param.name) {
                match param.kind {
                    ParameterKind::String => {
                        if !value.is_string() {
                            return Err(type_mismatch(param, value));
                        }
                    }
                    ParameterKind::Number => {
                        if let serde_json::Value::String(s) = &*value {
                            // Numeric-looking strings coerce in place.
                            let parsed = s
                                .parse::<i64>()
                                .map(serde_json::Value::from)
                                .or_else(|_| s.parse::<f64>().map(serde_json::Value::from));
                            match parsed {
                                Ok(number) => *value = number,
                                Err(_) => return Err(type_mismatch(param, value)),
                            }
                        } else if !value.is_number() {
                            return Err(type_mismatch(param, value));
                        }
                    }
                    ParameterKind::Boolean => {
                        if !value.is_boolean() {
                            return Err(type_mismatch(param, value));
                        }
                    }
                    ParameterKind::Object => {
                        if !value.is_object() {
                            return Err(type_mismatch(param, value));
                        }
                    }
                    ParameterKind::Array => {
                        if !value.is_array() {
                            return Err(type_mismatch(param, value));
                        }
                    }
                }

                if !param.enum_values.is_empty() && !param.enum_values.contains(&*value) {
                    return Err(ToolError::InvalidArguments(format!(
                        "Parameter '{}' must be one of {:?}",
                        param.name, param.enum_values
                    )));
                }
            }
        } else if let Some(default) = &param.default {
            args.insert(param.name.clone(), default.clone());
        }
    }

    Ok(serde_json::Value::Object(args))
}

fn type_mismatch(param: &ToolParameter, value: &serde_json::Value) -> ToolError {
    ToolError::InvalidArguments(format!(
        "Parameter '{}' expected {}, got {value}",
        param.name,
        param.kind.json_type()
    ))
}

/// Error type tool handlers may fail with; wrapped by `Tool::execute`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type HandlerFuture = BoxFuture<'static, Result<serde_json::Value, HandlerError>>;

type Handler =
    Arc<dyn Fn(serde_json::Value, Option<serde_json::Value>) -> HandlerFuture + Send + Sync>;

/// A named, schema-validated capability with an async handler.
#[derive(Clone)]
pub struct Tool {
    /// Unique tool ID
    pub id: String,

    /// Unique tool name, as exposed to the model
    pub name: String,

    /// Description sent to the model
    pub description: String,

    /// Declared parameters
    pub parameters: Vec<ToolParameter>,

    handler: Handler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

impl Tool {
    /// Create a tool from a name, description, and async handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            handler: Arc::new(move |args, env| Box::pin(handler(args, env))),
        }
    }

    /// Declare a parameter.
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Validate arguments and invoke the handler.
    ///
    /// The handler only ever sees arguments that passed validation. Handler
    /// failures come back wrapped with this tool's name.
    pub async fn execute(
        &self,
        arguments: serde_json::Value,
        environment: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError> {
        let arguments = validate_arguments(&self.parameters, arguments)?;
        (self.handler)(arguments, environment.cloned())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: parameters_schema(&self.parameters),
        }
    }
}

/// Lookup and execution of tools by name.
///
/// The engine resolves tools through this contract at call time; local
/// handlers and externally-hosted tools register through the same interface.
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Look up a tool by name.
    fn get_by_name(&self, name: &str) -> Option<&Tool>;

    /// All tool definitions (for sending to the LLM).
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a tool by name with pre-parsed arguments.
    async fn execute_by_name(
        &self,
        name: &str,
        arguments: serde_json::Value,
        environment: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError>;
}

/// An in-process registry backed by a HashMap.
#[derive(Debug, Default)]
pub struct LocalToolRegistry {
    tools: HashMap<String, Tool>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Tool) {
        tracing::debug!(tool = %tool.name, "Registered tool");
        self.tools.insert(tool.name.clone(), tool);
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

#[async_trait::async_trait]
impl ToolRegistry for LocalToolRegistry {
    fn get_by_name(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    async fn execute_by_name(
        &self,
        name: &str,
        arguments: serde_json::Value,
        environment: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments, environment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> Tool {
        Tool::new("echo", "Echoes back the input", |args, _env| async move {
            Ok(args["text"].clone())
        })
        .with_parameter(ToolParameter::new("text", ParameterKind::String).required())
    }

    #[tokio::test]
    async fn execute_validated_tool() {
        let tool = echo_tool();
        let out = tool
            .execute(json!({"text": "hello world"}), None)
            .await
            .unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[tokio::test]
    async fn required_missing_null_or_empty_fails() {
        let tool = echo_tool();
        for args in [json!({}), json!({"text": null}), json!({"text": ""})] {
            let err = tool.execute(args, None).await.unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn numeric_string_coerces_in_place() {
        let tool = Tool::new("price", "Report the observed value", |args, _env| async move {
            Ok(args["x"].clone())
        })
        .with_parameter(ToolParameter::new("x", ParameterKind::Number).required());

        let out = tool.execute(json!({"x": "42"}), None).await.unwrap();
        assert_eq!(out, json!(42));

        let out = tool.execute(json!({"x": "2.5"}), None).await.unwrap();
        assert_eq!(out, json!(2.5));

        let err = tool.execute(json!({"x": "not a number"}), None).await;
        assert!(err.is_err());
    }

    #[test]
    fn object_must_be_non_null_non_array() {
        let params = vec![ToolParameter::new("cfg", ParameterKind::Object)];
        assert!(validate_arguments(&params, json!({"cfg": {"a": 1}})).is_ok());
        assert!(validate_arguments(&params, json!({"cfg": [1, 2]})).is_err());
        assert!(validate_arguments(&params, json!({"cfg": "x"})).is_err());
    }

    #[test]
    fn array_must_be_array() {
        let params = vec![ToolParameter::new("xs", ParameterKind::Array)];
        assert!(validate_arguments(&params, json!({"xs": [1, 2]})).is_ok());
        assert!(validate_arguments(&params, json!({"xs": {"a": 1}})).is_err());
    }

    #[test]
    fn enum_membership_enforced() {
        let params = vec![
            ToolParameter::new("side", ParameterKind::String)
                .with_enum(vec![json!("buy"), json!("sell")]),
        ];
        assert!(validate_arguments(&params, json!({"side": "buy"})).is_ok());
        assert!(validate_arguments(&params, json!({"side": "hold"})).is_err());
        // Absent optional values skip the enum check.
        assert!(validate_arguments(&params, json!({})).is_ok());
    }

    #[test]
    fn empty_string_substitutes_default() {
        let params = vec![
            ToolParameter::new("currency", ParameterKind::String).with_default(json!("USD")),
        ];
        let out = validate_arguments(&params, json!({"currency": ""})).unwrap();
        assert_eq!(out["currency"], json!("USD"));

        // Non-empty values are left alone.
        let out = validate_arguments(&params, json!({"currency": "EUR"})).unwrap();
        assert_eq!(out["currency"], json!("EUR"));
    }

    #[tokio::test]
    async fn handler_error_wrapped_with_tool_name() {
        let tool = Tool::new("flaky", "Always fails", |_args, _env| async move {
            Err::<serde_json::Value, HandlerError>("socket closed".into())
        });
        let err = tool.execute(json!({}), None).await.unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, reason } => {
                assert_eq!(tool_name, "flaky");
                assert!(reason.contains("socket closed"));
            }
            other => panic!("expected ExecutionFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn handler_sees_environment() {
        let tool = Tool::new("whoami", "Reads the environment", |_args, env| async move {
            Ok(env.unwrap_or_default()["user"].clone())
        });
        let out = tool
            .execute(json!({}), Some(&json!({"user": "ada"})))
            .await
            .unwrap();
        assert_eq!(out, json!("ada"));
    }

    #[test]
    fn definition_renders_json_schema() {
        let tool = Tool::new("order", "Place an order", |_a, _e| async move { Ok(json!(null)) })
            .with_parameter(
                ToolParameter::new("symbol", ParameterKind::String)
                    .required()
                    .with_description("Ticker symbol"),
            )
            .with_parameter(
                ToolParameter::new("filters", ParameterKind::Object).with_properties(vec![
                    ToolParameter::new("limit", ParameterKind::Number).required(),
                ]),
            )
            .with_parameter(
                ToolParameter::new("tags", ParameterKind::Array)
                    .with_items(ToolParameter::new("tag", ParameterKind::String)),
            );

        let def = tool.to_definition();
        assert_eq!(def.name, "order");
        assert_eq!(def.parameters["type"], json!("object"));
        assert_eq!(def.parameters["required"], json!(["symbol"]));
        assert_eq!(
            def.parameters["properties"]["symbol"]["description"],
            json!("Ticker symbol")
        );
        assert_eq!(
            def.parameters["properties"]["filters"]["properties"]["limit"]["type"],
            json!("number")
        );
        assert_eq!(
            def.parameters["properties"]["filters"]["required"],
            json!(["limit"])
        );
        assert_eq!(
            def.parameters["properties"]["tags"]["items"]["type"],
            json!("string")
        );
    }

    #[tokio::test]
    async fn registry_register_lookup_execute() {
        let mut registry = LocalToolRegistry::new();
        registry.register(echo_tool());

        assert!(registry.get_by_name("echo").is_some());
        assert!(registry.get_by_name("nonexistent").is_none());
        assert_eq!(registry.definitions().len(), 1);

        let out = registry
            .execute_by_name("echo", json!({"text": "hi"}), None)
            .await
            .unwrap();
        assert_eq!(out, json!("hi"));

        let err = registry
            .execute_by_name("nonexistent", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
