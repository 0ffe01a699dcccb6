//! Tool call supports.

mod error;
mod registry;

use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use registry::{CompletedCall, ContractError, Registry};

/// The result of a tool call.
///
/// An `Err` here is data, not control flow: it is rendered into the
/// transcript so the model can see what went wrong and adapt.
pub type ToolResult = Result<String, Error>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain
/// any internal state.
///
/// The tool can be context-aware, meaning it can access additional
/// information about the current execution context, such as a data source
/// or an API credential. To do this, make the context an immutable state
/// of the tool, which can be set during initialization, and copy it when
/// executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    ///
    /// Required parameters are plain fields; optional parameters are
    /// `Option<T>` or carry a serde default.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of
    /// `self`, and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> &Value;

    /// Validates the arguments and starts the execution future.
    ///
    /// Returns the deserialization failure reason when the arguments do
    /// not satisfy the input contract; the caller treats that as a
    /// contract violation, not as a tool failure.
    fn start(
        &self,
        arguments: Value,
    ) -> Result<Pin<Box<dyn Future<Output = ToolResult> + Send>>, String>;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        self.0.parameter_schema()
    }

    #[inline]
    fn start(
        &self,
        arguments: Value,
    ) -> Result<Pin<Box<dyn Future<Output = ToolResult> + Send>>, String> {
        let input: T::Input = serde_json::from_value(arguments)
            .map_err(|err| err.to_string())?;
        Ok(Box::pin(self.0.execute(input)))
    }
}
