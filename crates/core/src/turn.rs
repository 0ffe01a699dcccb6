//! The tool-augmented conversation loop.
//!
//! One user turn is driven through a small state machine: ask the model,
//! execute any tools it requested, feed the results back, and ask again,
//! until a round produces no tool requests. Every terminal path appends
//! an assistant turn (possibly a degraded one) so the caller always gets
//! a user-visible reply, except when the turn was cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tokio::time::sleep;
use wayfarer_model::ModelRequest;

use crate::delivery::{DeliverySink, StreamEvent};
use crate::gateway::{GatewayClient, GatewayError, build_request};
use crate::tool::{ContractError, Registry};
use crate::transcript::Transcript;

/// The reply used when the round cap is hit.
const ROUND_LIMIT_REPLY: &str = "I couldn't finish putting this together \
within a reasonable number of steps. Could you narrow the request and try \
again?";

/// The reply used when the model service stays unavailable.
const GATEWAY_FAILURE_REPLY: &str = "I couldn't retrieve a response right \
now. Please try again in a moment.";

/// The reply used when a tool request violated its contract.
const CONTRACT_FAILURE_REPLY: &str = "Something went wrong while looking \
that up, so I had to stop. Please try again.";

/// Tunables for driving one user turn.
#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Maximum model-invocation rounds per user turn. Exceeding the cap
    /// ends the turn with a degraded reply instead of looping forever.
    pub max_rounds: usize,
    /// How many times a retryable gateway failure is retried before the
    /// turn gives up. The gateway is called at most `1 + gateway_retries`
    /// times per round.
    pub gateway_retries: usize,
    /// Initial delay before the first gateway retry; subsequent retries
    /// back off exponentially from here.
    pub retry_initial_delay: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            gateway_retries: 1,
            retry_initial_delay: Duration::from_millis(250),
        }
    }
}

/// A handle for abandoning an in-flight turn.
///
/// Cancellation is cooperative: tool calls already dispatched run to
/// completion and their results stay in the transcript, but no further
/// model invocations are issued.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnEnd {
    /// The model produced a final answer.
    Completed,
    /// The round cap was hit; a degraded reply was appended.
    RoundLimit,
    /// The gateway kept failing; a failure reply was appended.
    GatewayFailed(GatewayError),
    /// A tool request violated its contract; a degraded reply was
    /// appended.
    Contract(ContractError),
    /// The caller abandoned the turn; no reply was appended.
    Cancelled,
}

/// The summary of a finished turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The terminal state of the turn.
    pub end: TurnEnd,
    /// How many model rounds were run.
    pub rounds: usize,
}

impl TurnOutcome {
    /// Whether the turn ended with a genuine model answer.
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self.end, TurnEnd::Completed)
    }
}

/// Drives user turns against a gateway and a tool registry.
pub struct TurnLoop {
    gateway: GatewayClient,
    registry: Registry,
    config: TurnConfig,
    system_prompt: Option<String>,
}

impl TurnLoop {
    /// Creates a loop with the default configuration and no system
    /// prompt.
    pub fn new(gateway: GatewayClient, registry: Registry) -> Self {
        Self {
            gateway,
            registry,
            config: TurnConfig::default(),
            system_prompt: None,
        }
    }

    /// Replaces the configuration.
    #[inline]
    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the system prompt sent with every request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Returns the tool registry.
    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs one user turn to completion.
    ///
    /// The input is appended to the transcript as a user turn, then the
    /// loop alternates between model invocations and tool execution
    /// until the model answers without tool requests, a bound is hit, or
    /// the turn is cancelled. Text fragments are forwarded to `sink` as
    /// they arrive, and a final [`StreamEvent::Done`] is emitted when
    /// the turn ends.
    pub async fn run_turn(
        &self,
        transcript: &mut Transcript,
        input: impl Into<String>,
        sink: Option<Arc<dyn DeliverySink>>,
        cancel: &CancelToken,
    ) -> TurnOutcome {
        transcript.push_user(input);
        let tools = self.registry.definitions();

        let mut rounds = 0;
        let end = loop {
            if cancel.is_cancelled() {
                debug!("turn cancelled after {rounds} round(s)");
                break TurnEnd::Cancelled;
            }
            if rounds >= self.config.max_rounds {
                warn!("round cap of {} hit", self.config.max_rounds);
                transcript.push_assistant(ROUND_LIMIT_REPLY, vec![]);
                break TurnEnd::RoundLimit;
            }
            rounds += 1;

            let request =
                build_request(self.system_prompt.as_deref(), transcript, tools.clone());
            let reply = match self
                .request_with_retry(request, sink.clone(), cancel)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    error!("gateway gave up: {err}");
                    transcript.push_assistant(GATEWAY_FAILURE_REPLY, vec![]);
                    break TurnEnd::GatewayFailed(err);
                }
            };

            if reply.is_final() {
                transcript.push_assistant(reply.text, vec![]);
                break TurnEnd::Completed;
            }

            transcript
                .push_assistant(reply.text, reply.tool_calls.clone());
            match self.registry.dispatch(reply.tool_calls).await {
                Ok(completed) => {
                    for call in completed {
                        let content = call
                            .result
                            .map_err(|err| err.reason().into_owned());
                        transcript.push_tool_result(
                            call.request.id,
                            call.request.name,
                            content,
                        );
                    }
                }
                Err(err) => {
                    error!("tool contract violation: {err}");
                    transcript.push_assistant(CONTRACT_FAILURE_REPLY, vec![]);
                    break TurnEnd::Contract(err);
                }
            }
        };

        if let Some(sink) = sink {
            // Degraded replies never pass through the gateway, so they
            // are delivered here before the stream is closed off.
            let degraded = match &end {
                TurnEnd::RoundLimit => Some(ROUND_LIMIT_REPLY),
                TurnEnd::GatewayFailed(_) => Some(GATEWAY_FAILURE_REPLY),
                TurnEnd::Contract(_) => Some(CONTRACT_FAILURE_REPLY),
                TurnEnd::Completed | TurnEnd::Cancelled => None,
            };
            if let Some(text) = degraded {
                sink.emit(StreamEvent::Delta {
                    text: text.to_owned(),
                })
                .await
                .ok();
            }
            sink.emit(StreamEvent::Done).await.ok();
        }
        TurnOutcome { end, rounds }
    }

    /// Sends one request, retrying retryable failures a bounded number
    /// of times with exponential backoff.
    async fn request_with_retry(
        &self,
        request: ModelRequest,
        sink: Option<Arc<dyn DeliverySink>>,
        cancel: &CancelToken,
    ) -> Result<crate::gateway::GatewayReply, GatewayError> {
        let mut policy = ExponentialBackoff {
            initial_interval: self.config.retry_initial_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempts = 0;
        loop {
            match self
                .gateway
                .send_request(request.clone(), sink.clone())
                .await
            {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    attempts += 1;
                    if !err.is_retryable()
                        || attempts > self.config.gateway_retries
                        || cancel.is_cancelled()
                    {
                        return Err(err);
                    }
                    let delay = policy
                        .next_backoff()
                        .unwrap_or(self.config.retry_initial_delay);
                    warn!(
                        "gateway attempt {attempts} failed ({err}), \
                         retrying in {delay:?}"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
