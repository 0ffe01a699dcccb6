use std::collections::HashMap;
use std::fmt::{self, Display};
use std::pin::Pin;

use wayfarer_model::{ModelTool, ToolCallRequest};

use crate::tool::{AnyTool, Error, Tool, ToolObject, ToolResult};

/// A tool call request violated the registry's contract.
///
/// Contract violations are turn-fatal: unlike a failing tool, they are
/// not fed back to the model as data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractError {
    /// The request named a tool that is not registered.
    UnknownTool {
        /// The requested tool name.
        name: String,
    },
    /// The request's arguments did not satisfy the tool's input schema,
    /// e.g. a required parameter was missing.
    InvalidArguments {
        /// The tool whose contract was violated.
        tool: String,
        /// What was wrong with the arguments.
        reason: String,
    },
}

impl Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::UnknownTool { name } => {
                write!(f, "unknown tool: {name}")
            }
            ContractError::InvalidArguments { tool, reason } => {
                write!(f, "invalid arguments for {tool}: {reason}")
            }
        }
    }
}

impl std::error::Error for ContractError {}

/// A finished tool call, pairing the originating request with its result.
#[derive(Debug)]
pub struct CompletedCall {
    /// The request as issued by the model.
    pub request: ToolCallRequest,
    /// The outcome of running the tool.
    pub result: ToolResult,
}

/// A fixed, named set of tools offered to the model.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Box<dyn ToolObject>>,
}

impl Registry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Box::new(AnyTool(tool)));
    }

    /// Whether a tool with the given name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the declarations of all registered tools, for offering to
    /// the model.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<ModelTool> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Executes a batch of tool call requests.
    ///
    /// The whole batch is validated before anything runs: an unknown tool
    /// name or arguments that fail the input contract reject the batch
    /// with a [`ContractError`] without dispatching any call. Validated
    /// calls then fan out onto independent tasks, and the results are
    /// re-assembled in the original request order regardless of
    /// completion order. A panicking tool is caught at the task boundary
    /// and reported as an error result.
    pub async fn dispatch(
        &self,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<CompletedCall>, ContractError> {
        type BoxedCallFuture =
            Pin<Box<dyn Future<Output = ToolResult> + Send>>;

        let mut validated: Vec<(ToolCallRequest, BoxedCallFuture)> =
            Vec::with_capacity(requests.len());
        for req in requests {
            let Some(tool) = self.tools.get(&req.name) else {
                warn!("tool not found: {}", req.name);
                return Err(ContractError::UnknownTool { name: req.name });
            };
            let future =
                tool.start(req.arguments.clone()).map_err(|reason| {
                    warn!("bad arguments for {}: {reason}", req.name);
                    ContractError::InvalidArguments {
                        tool: req.name.clone(),
                        reason,
                    }
                })?;
            validated.push((req, future));
        }

        let running: Vec<_> = validated
            .into_iter()
            .map(|(req, future)| {
                trace!("spawning tool call {} ({})", req.id, req.name);
                (req, tokio::spawn(future))
            })
            .collect();

        let mut completed = Vec::with_capacity(running.len());
        for (request, handle) in running {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    error!("tool {} panicked", request.name);
                    Err(Error::execution_error()
                        .with_reason("The tool crashed while executing."))
                }
                Err(_) => Err(Error::execution_error()
                    .with_reason("The tool was stopped before finishing.")),
            };
            completed.push(CompletedCall { request, result });
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::Deserialize;
    use serde_json::{Value, json};
    use tokio::time::sleep;

    use super::*;

    static EMPTY_SCHEMA: &Value = &Value::Null;

    #[derive(Deserialize)]
    struct DelayedEchoInput {
        text: String,
        #[serde(default)]
        delay_ms: u64,
    }

    struct DelayedEchoTool;

    impl Tool for DelayedEchoTool {
        type Input = DelayedEchoInput;

        fn name(&self) -> &str {
            "delayed_echo"
        }

        fn description(&self) -> &str {
            "Echoes text after an optional delay"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            input: DelayedEchoInput,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            async move {
                sleep(Duration::from_millis(input.delay_ms)).await;
                Ok(input.text)
            }
        }
    }

    struct PanickingTool;

    impl Tool for PanickingTool {
        type Input = Value;

        fn name(&self) -> &str {
            "panicking"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            _input: Value,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            async { panic!("boom") }
        }
    }

    fn echo_registry() -> Registry {
        let mut registry = Registry::new();
        registry.add_tool(DelayedEchoTool);
        registry
    }

    fn echo_request(id: &str, text: &str, delay_ms: u64) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: "delayed_echo".to_owned(),
            arguments: json!({ "text": text, "delay_ms": delay_ms }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_request_order() {
        let registry = echo_registry();
        // The first request finishes last; order must not change.
        let requests = vec![
            echo_request("tool:1", "slow", 50),
            echo_request("tool:2", "medium", 20),
            echo_request("tool:3", "fast", 0),
        ];

        let completed = registry.dispatch(requests).await.unwrap();
        let outputs: Vec<_> = completed
            .iter()
            .map(|call| {
                (
                    call.request.id.as_str(),
                    call.result.as_deref().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            outputs,
            vec![
                ("tool:1", "slow"),
                ("tool:2", "medium"),
                ("tool:3", "fast"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_rejects_the_batch() {
        let registry = echo_registry();
        let requests = vec![
            echo_request("tool:1", "hello", 0),
            ToolCallRequest {
                id: "tool:2".to_owned(),
                name: "not_a_tool".to_owned(),
                arguments: json!({}),
            },
        ];

        let err = registry.dispatch(requests).await.unwrap_err();
        assert_eq!(
            err,
            ContractError::UnknownTool {
                name: "not_a_tool".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_required_argument_is_a_contract_error() {
        let registry = echo_registry();
        let requests = vec![ToolCallRequest {
            id: "tool:1".to_owned(),
            name: "delayed_echo".to_owned(),
            arguments: json!({ "delay_ms": 5 }),
        }];

        let err = registry.dispatch(requests).await.unwrap_err();
        assert!(matches!(
            err,
            ContractError::InvalidArguments { ref tool, .. } if tool == "delayed_echo"
        ));
    }

    #[tokio::test]
    async fn test_declared_default_fills_missing_optional_argument() {
        let registry = echo_registry();
        let requests = vec![ToolCallRequest {
            id: "tool:1".to_owned(),
            name: "delayed_echo".to_owned(),
            arguments: json!({ "text": "hi" }),
        }];

        let completed = registry.dispatch(requests).await.unwrap();
        assert_eq!(completed[0].result.as_deref().unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_panicking_tool_becomes_an_error_result() {
        let mut registry = Registry::new();
        registry.add_tool(PanickingTool);
        registry.add_tool(DelayedEchoTool);
        let requests = vec![
            ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "panicking".to_owned(),
                arguments: json!({}),
            },
            echo_request("tool:2", "still fine", 0),
        ];

        let completed = registry.dispatch(requests).await.unwrap();
        assert!(completed[0].result.is_err());
        assert_eq!(completed[1].result.as_deref().unwrap(), "still fine");
    }

    #[test]
    fn test_definitions_are_sorted_by_name() {
        let mut registry = Registry::new();
        registry.add_tool(DelayedEchoTool);
        registry.add_tool(PanickingTool);
        let names: Vec<_> = registry
            .definitions()
            .into_iter()
            .map(|def| def.name)
            .collect();
        assert_eq!(names, vec!["delayed_echo", "panicking"]);
    }
}
