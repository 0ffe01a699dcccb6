//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use wayfarer_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

/// Error type for [`TestModelProvider`].
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The response produced by [`TestModelProvider`].
#[derive(Debug)]
pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
            return Poll::Ready(Ok(this.events.pop_front()));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A scripted fake model for testing purpose.
///
/// Before sending requests, set up the script with one [`PresetResponse`]
/// per model round. The round a request belongs to is derived from the
/// number of assistant messages it carries, so retried requests replay
/// the same round. If the script has no preset for a round, an error is
/// returned.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    rounds: Vec<PresetResponse>,
    remaining_failures: Arc<Mutex<Vec<Option<u64>>>>,
    requests_sent: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends the preset response for the next model round.
    pub fn add_round(&mut self, preset: PresetResponse) {
        self.remaining_failures
            .lock()
            .expect("failure state lock poisoned")
            .push(preset.failures);
        self.rounds.push(preset);
    }

    /// Sets the delay between produced events.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns how many requests have been sent to this provider,
    /// including failed attempts. Clones share the counter.
    #[inline]
    pub fn requests_sent(&self) -> usize {
        self.requests_sent.load(Ordering::Relaxed)
    }

    fn respond(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);

        // Each finished round appends exactly one assistant message, so
        // the assistant count identifies the round being replayed.
        let round = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::Assistant(_)))
            .count();
        let Some(preset) = self.rounds.get(round) else {
            return Err(Error {
                message: "no preset for this round",
                kind: ErrorKind::Other,
            });
        };

        let mut remaining = self
            .remaining_failures
            .lock()
            .expect("failure state lock poisoned");
        let failures = &mut remaining[round];
        match failures {
            // `Some(0)` in the preset means "fail forever".
            Some(0) => {
                return Err(Error {
                    message: "injected failure",
                    kind: preset.failure_kind,
                });
            }
            Some(n) => {
                *n -= 1;
                let exhausted = *n == 0;
                if exhausted {
                    *failures = None;
                }
                return Err(Error {
                    message: "injected failure",
                    kind: preset.failure_kind,
                });
            }
            None => {}
        }
        drop(remaining);

        let mut events: VecDeque<ModelResponseEvent> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));

        Ok(TestModelResponse {
            events,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("rounds", &self.rounds.len())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.respond(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use wayfarer_model::{AssistantMessage, ToolCallRequest};

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        let mut finish_reason = None;
        loop {
            let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
            else {
                break;
            };
            match event {
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
        (msg, tool_call, finish_reason.unwrap())
    }

    #[tokio::test]
    async fn test_rounds_follow_assistant_count() {
        let mut provider = TestModelProvider::default();
        provider.add_round(PresetResponse::with_events(vec![
            PresetEvent::MessageDelta("Checking ".to_owned()),
            PresetEvent::MessageDelta("flights.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "search_flights".to_owned(),
                arguments: json!({ "origin": "Warsaw" }),
            }),
        ]));
        provider.add_round(PresetResponse::with_fragments(["All set."]));

        let mut req = ModelRequest {
            messages: vec![ModelMessage::User("Plan my trip".to_owned())],
            tools: vec![],
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Checking flights.");
        assert_eq!(tool_call.unwrap().name, "search_flights");
        assert_eq!(reason, ModelFinishReason::ToolCalls);

        req.messages.push(ModelMessage::Assistant(
            AssistantMessage::text_only("Checking flights."),
        ));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "All set.");
        assert!(tool_call.is_none());
        assert_eq!(reason, ModelFinishReason::Stop);

        assert_eq!(provider.requests_sent(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_then_success() {
        let mut provider = TestModelProvider::default();
        provider
            .add_round(PresetResponse::with_fragments(["Hi."]).with_failures(2));

        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hello".to_owned())],
            tools: vec![],
        };
        for _ in 0..2 {
            let err = provider.send_request(&req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unreachable);
        }
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "Hi.");
    }

    #[tokio::test]
    async fn test_script_exhaustion_is_an_error() {
        let provider = TestModelProvider::default();
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hello".to_owned())],
            tools: vec![],
        };
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
