//! Exercises the provider contract with a minimal in-process model.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::{Pin, pin};
use std::task::{self, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use wayfarer_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};

#[derive(Debug)]
struct EchoProviderError(ErrorKind);

impl Display for EchoProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoProviderError {}

impl ModelProviderError for EchoProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct EchoResponse {
    fragments: VecDeque<String>,
    completed: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoResponse {
    fn new(input: &str) -> Self {
        let fragments = format!("You said {input}")
            .split(' ')
            .map(|word| format!("{word} "))
            .collect();
        Self {
            fragments,
            completed: false,
            sleep: None,
        }
    }
}

impl ModelResponse for EchoResponse {
    type Error = EchoProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let Some(fragment) = this.fragments.pop_front() else {
                if this.completed {
                    return Poll::Ready(Ok(None));
                }
                this.completed = true;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            };
            return Poll::Ready(Ok(Some(ModelResponseEvent::MessageDelta(
                fragment,
            ))));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A provider that streams the last user message back, word by word.
struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoProviderError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.clone()),
            _ => None,
        });
        let result = match last_user {
            Some(text) => Ok(EchoResponse::new(&text)),
            None => Err(EchoProviderError(ErrorKind::Other)),
        };
        ready(result)
    }
}

#[tokio::test]
async fn test_events_arrive_in_order_and_complete() {
    let provider = EchoProvider;
    let req = ModelRequest {
        messages: vec![ModelMessage::User("hello there".to_owned())],
        tools: vec![],
    };

    let resp = provider.send_request(&req).await.unwrap();
    let mut resp = pin!(resp);

    let mut text = String::new();
    let mut completed = false;
    loop {
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap();
        match event {
            Some(ModelResponseEvent::MessageDelta(delta)) => {
                assert!(!completed, "delta after completion");
                text.push_str(&delta);
            }
            Some(ModelResponseEvent::Completed(reason)) => {
                assert_eq!(reason, ModelFinishReason::Stop);
                completed = true;
            }
            Some(other) => panic!("unexpected event: {other:?}"),
            None => break,
        }
    }
    assert!(completed);
    assert_eq!(text, "You said hello there ");

    // Polling after exhaustion keeps returning `None`.
    let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
        .await
        .unwrap();
    assert!(event.is_none());
}

#[tokio::test]
async fn test_request_without_user_message_fails() {
    let provider = EchoProvider;
    let req = ModelRequest {
        messages: vec![ModelMessage::System("be nice".to_owned())],
        tools: vec![],
    };
    let err = provider.send_request(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(!err.kind().is_retryable());
}
