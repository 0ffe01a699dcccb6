use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::Value;
use wayfarer_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Tool calls under assembly, in arrival order. The service streams
    // them in fragments that have to be patched together by index, so
    // they are only turned into events once the stream has finished.
    tool_calls: Vec<ToolCall>,
    pending: VecDeque<ModelResponseEvent>,
    finish_reason: Option<ModelFinishReason>,
    exhausted: bool,
}

impl PartialState {
    fn merge_tool_calls(&mut self, deltas: Vec<ToolCall>) {
        for delta in deltas {
            if delta.index.is_none() {
                // A complete call delivered in one piece.
                self.tool_calls.push(delta);
                continue;
            }
            let Some(partial) = self
                .tool_calls
                .iter_mut()
                .find(|call| call.index == delta.index)
            else {
                self.tool_calls.push(delta);
                continue;
            };
            // Patch the partial tool call.
            if let Some(id) = delta.id {
                partial.id.get_or_insert_default().push_str(&id);
            }
            if let Some(ty) = delta.r#type {
                partial.r#type.get_or_insert_default().push_str(&ty);
            }
            if let Some(function) = delta.function {
                match &mut partial.function {
                    Some(partial_func) => {
                        if let Some(name) = function.name {
                            partial_func
                                .name
                                .get_or_insert_default()
                                .push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            partial_func
                                .arguments
                                .get_or_insert_default()
                                .push_str(&arguments);
                        }
                    }
                    None => partial.function = Some(function),
                }
            }
        }
    }

    /// Marks the upstream stream as finished and queues the assembled
    /// tool calls plus the completion event.
    fn finish(&mut self) -> Result<(), Error> {
        if self.exhausted {
            return Ok(());
        }
        self.exhausted = true;

        let has_tool_calls = !self.tool_calls.is_empty();
        for call in self.tool_calls.drain(..) {
            let request = into_tool_call_request(call)?;
            self.pending
                .push_back(ModelResponseEvent::ToolCall(request));
        }
        let reason = self.finish_reason.take().unwrap_or(if has_tool_calls {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        });
        self.pending
            .push_back(ModelResponseEvent::Completed(reason));
        Ok(())
    }
}

fn into_tool_call_request(call: ToolCall) -> Result<ToolCallRequest, Error> {
    let id = call.id.unwrap_or_default();
    let name = call
        .function
        .as_ref()
        .and_then(|f| f.name.clone())
        .unwrap_or_default();
    let arguments = match call
        .function
        .as_ref()
        .and_then(|f| f.arguments.as_deref())
    {
        None | Some("") => Value::Object(Default::default()),
        Some(args) => serde_json::from_str(args).map_err(|err| {
            Error::new(
                format!("malformed tool call arguments: {err}"),
                ErrorKind::MalformedOutput,
            )
        })?,
    };
    Ok(ToolCallRequest {
        id,
        name,
        arguments,
    })
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_calls: Default::default(),
            pending: Default::default(),
            finish_reason: Default::default(),
            exhausted: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            // The stream has been exhausted.
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new
        // future for the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.exhausted {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finish()?;
                continue;
            }
            Err(err) => {
                return Err(Error::new(
                    format!("{err:?}"),
                    ErrorKind::MalformedOutput,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finish()?;
            continue;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::MalformedOutput)
            })?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone())
            != &chunk.id
        {
            return Err(Error::new(
                "chunk id mismatch",
                ErrorKind::MalformedOutput,
            ));
        }

        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(finish_reason) = choice.finish_reason {
            partial_state.finish_reason =
                Some(if finish_reason == "tool_calls" {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                });
            continue;
        }

        if let Some(tool_calls) = choice.delta.tool_calls {
            partial_state.merge_tool_calls(tool_calls);
        }
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                return Ok((
                    Some(ModelResponseEvent::MessageDelta(content)),
                    partial_state,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(sse: Sse) -> Vec<ModelResponseEvent> {
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = Vec::new();
        loop {
            let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
            else {
                break;
            };
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streamed_tool_calls_are_assembled() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(include_bytes!(
                "../fixtures/test_response.txt"
            ))]
            .into(),
        );
        let events = collect_events(Sse::new(chunks)).await;

        assert_eq!(
            events[0],
            ModelResponseEvent::MessageDelta("Let me check.".to_owned())
        );
        let ModelResponseEvent::ToolCall(first) = &events[1] else {
            panic!("expected a tool call, got {:?}", events[1]);
        };
        assert_eq!(first.id, "call_flights");
        assert_eq!(first.name, "search_flights");
        assert_eq!(
            first.arguments,
            json!({
                "origin": "Warsaw",
                "destination": "Paris",
                "date": "2025-07-10",
            })
        );
        let ModelResponseEvent::ToolCall(second) = &events[2] else {
            panic!("expected a tool call, got {:?}", events[2]);
        };
        assert_eq!(second.id, "call_lodging");
        assert_eq!(second.name, "find_lodging");
        assert_eq!(
            events[3],
            ModelResponseEvent::Completed(ModelFinishReason::ToolCalls)
        );
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_text_only_response() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Bon \"},\"finish_reason\":null}]}\n\n",
                ),
                Bytes::from_static(
                    b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"voyage!\"},\"finish_reason\":null}]}\n\n",
                ),
                Bytes::from_static(
                    b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                ),
                Bytes::from_static(b"data: [DONE]\n\n"),
            ]
            .into(),
        );
        let events = collect_events(Sse::new(chunks)).await;
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta("Bon ".to_owned()),
                ModelResponseEvent::MessageDelta("voyage!".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_chunk_id_mismatch_is_malformed_output() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"a\"},\"finish_reason\":null}]}\n\n",
                ),
                Bytes::from_static(
                    b"data: {\"id\":\"c2\",\"choices\":[{\"delta\":{\"content\":\"b\"},\"finish_reason\":null}]}\n\n",
                ),
            ]
            .into(),
        );
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(ModelResponseEvent::MessageDelta("a".to_owned()))
        );
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(
            wayfarer_model::ModelProviderError::kind(&err),
            ErrorKind::MalformedOutput
        );
    }
}
