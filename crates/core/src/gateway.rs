//! The model gateway client.
//!
//! All traffic to the remote text-generation service flows through this
//! module, and it is the only place that knows how a [`Transcript`] maps
//! onto the provider's message vocabulary.

use std::fmt::{self, Display};
use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use tracing::Instrument;
use wayfarer_model::{
    AssistantMessage, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ModelTool, ToolCallRequest, ToolCallResult,
};

use crate::delivery::{DeliverySink, StreamEvent};
use crate::transcript::{Transcript, Turn};

/// The gateway could not obtain a usable model response.
#[derive(Debug)]
pub struct GatewayError(Box<dyn ModelProviderError>);

impl GatewayError {
    /// Returns the kind of the underlying provider error.
    #[inline]
    pub fn kind(&self) -> wayfarer_model::ErrorKind {
        self.0.kind()
    }

    /// Whether the failed request is worth retrying.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.0.kind().is_retryable()
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// A completely received reply from the model.
///
/// A reply with a non-empty `tool_calls` list asks the loop to execute
/// tools and come back; an empty list means `text` is the final answer
/// for this round.
#[derive(Clone, Debug)]
pub struct GatewayReply {
    /// The generated text, assembled from the streamed fragments.
    pub text: String,
    /// Tool calls requested by the model, in the order they were issued.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl GatewayReply {
    /// Whether this reply carries a final answer rather than tool
    /// requests.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

type SendRequestResult = Result<GatewayReply, GatewayError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Option<Arc<dyn DeliverySink>>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that drives its event stream to
/// completion and presents a type-erased interface to the loop.
#[derive(Clone)]
pub struct GatewayClient {
    handler_fn: HandlerFn,
}

impl GatewayClient {
    /// Creates a gateway client backed by the given provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `GatewayClient` doesn't
        // have a generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, sink| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    collect_response::<P>(resp_or_err, sink).await
                }
                .instrument(trace_span!("gateway req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and collects the full reply.
    ///
    /// Text fragments are forwarded to `sink` in production order as
    /// they arrive; a sink whose consumer has gone away is ignored
    /// rather than treated as a fault.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        sink: Option<Arc<dyn DeliverySink>>,
    ) -> SendRequestResult {
        (self.handler_fn)(req, sink).await
    }
}

/// Maps a transcript onto the provider's message vocabulary.
///
/// The transcript must contain at least one turn; the loop guarantees
/// this by appending the user turn before the first request.
pub(crate) fn build_request(
    system_prompt: Option<&str>,
    transcript: &Transcript,
    tools: Vec<ModelTool>,
) -> ModelRequest {
    debug_assert!(!transcript.is_empty());

    let mut messages =
        Vec::with_capacity(transcript.len() + usize::from(system_prompt.is_some()));
    if let Some(prompt) = system_prompt {
        messages.push(ModelMessage::System(prompt.to_owned()));
    }
    for turn in transcript.turns() {
        messages.push(match turn {
            Turn::User(text) => ModelMessage::User(text.clone()),
            Turn::Assistant { text, tool_calls } => {
                ModelMessage::Assistant(AssistantMessage {
                    text: text.clone(),
                    tool_calls: tool_calls.clone(),
                })
            }
            Turn::ToolResult {
                call_id, content, ..
            } => ModelMessage::Tool(ToolCallResult {
                id: call_id.clone(),
                content: render_tool_content(content),
            }),
        });
    }
    ModelRequest { messages, tools }
}

/// Renders a tool outcome as text the model can read. Failures become
/// structured error payloads so the model can adapt instead of the turn
/// aborting.
fn render_tool_content(content: &Result<String, String>) -> String {
    match content {
        Ok(output) => output.clone(),
        Err(reason) => serde_json::json!({ "error": reason }).to_string(),
    }
}

async fn collect_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    sink: Option<Arc<dyn DeliverySink>>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(GatewayError(Box::new(err)));
        }
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(GatewayError(Box::new(err)));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                text.push_str(&delta);
                if let Some(sink) = &sink {
                    sink.emit(StreamEvent::Delta { text: delta }).await.ok();
                }
            }
            ModelResponseEvent::ToolCall(req) => {
                tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(GatewayReply {
        text,
        tool_calls,
        finish_reason,
    })
}
