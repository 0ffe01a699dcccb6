//! Converts loop output into an externally consumable stream.
//!
//! The loop produces text fragments; callers consume them through a
//! bounded channel whose receiving half is a [`futures_util::Stream`].
//! A slow consumer exerts backpressure by making the producer wait on
//! [`DeliverySink::emit`] — fragments are buffered or block, never
//! dropped. Completion is signalled with a distinct [`StreamEvent::Done`]
//! event so the consumer can tell "more coming" from "done".

use std::fmt::{self, Display};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One wire-level event of a streamed reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text fragment. More events may follow.
    Delta {
        /// The fragment payload.
        text: String,
    },
    /// The stream has completed; no further fragments follow.
    Done,
}

impl StreamEvent {
    /// Encodes this event as one server-sent-event frame.
    pub fn to_sse(&self) -> String {
        let payload = serde_json::to_string(self)
            .expect("stream events always serialize");
        format!("data: {payload}\n\n")
    }
}

/// The consumer half of the stream has gone away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Closed;

impl Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream consumer has gone away")
    }
}

impl std::error::Error for Closed {}

/// A destination for stream events.
///
/// Implementations must preserve the order events were emitted in. An
/// `Err(Closed)` tells the producer the consumer is gone; producers
/// treat that as an abandoned stream, not as a fault.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Delivers one event, waiting if the consumer is behind.
    async fn emit(&self, event: StreamEvent) -> Result<(), Closed>;
}

/// Creates a bounded emitter/stream pair with the given capacity.
pub fn channel(capacity: usize) -> (Emitter, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (Emitter { tx }, FragmentStream { rx })
}

/// The producing half of a delivery channel.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
}

#[async_trait]
impl DeliverySink for Emitter {
    async fn emit(&self, event: StreamEvent) -> Result<(), Closed> {
        self.tx.send(event).await.map_err(|_| Closed)
    }
}

/// The consuming half of a delivery channel.
pub struct FragmentStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl FragmentStream {
    /// Receives the next event, or `None` once the producer is done and
    /// the channel is drained.
    #[inline]
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for FragmentStream {
    type Item = StreamEvent;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_encoding() {
        let delta = StreamEvent::Delta {
            text: "Day ".to_owned(),
        };
        assert_eq!(
            delta.to_sse(),
            "data: {\"type\":\"delta\",\"text\":\"Day \"}\n\n"
        );
        assert_eq!(StreamEvent::Done.to_sse(), "data: {\"type\":\"done\"}\n\n");
    }

    #[tokio::test]
    async fn test_fragments_arrive_in_order_with_terminal_done() {
        let (emitter, mut stream) = channel(16);

        for fragment in ["Day ", "1: ", "Arrive."] {
            emitter
                .emit(StreamEvent::Delta {
                    text: fragment.to_owned(),
                })
                .await
                .unwrap();
        }
        emitter.emit(StreamEvent::Done).await.unwrap();
        drop(emitter);

        let mut fragments = Vec::new();
        let mut done = false;
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Delta { text } => {
                    assert!(!done, "fragment after completion");
                    fragments.push(text);
                }
                StreamEvent::Done => done = true,
            }
        }
        assert!(done);
        assert_eq!(fragments.concat(), "Day 1: Arrive.");
    }

    #[tokio::test]
    async fn test_slow_consumer_blocks_producer_without_losing_events() {
        let (emitter, mut stream) = channel(1);

        let producer = tokio::spawn(async move {
            for i in 0..16u32 {
                emitter
                    .emit(StreamEvent::Delta {
                        text: i.to_string(),
                    })
                    .await
                    .unwrap();
            }
            emitter.emit(StreamEvent::Done).await.unwrap();
        });

        // Drain slowly; the producer must wait rather than drop.
        let mut seen = Vec::new();
        while let Some(event) = stream.next_event().await {
            tokio::task::yield_now().await;
            if let StreamEvent::Delta { text } = event {
                seen.push(text.parse::<u32>().unwrap());
            }
        }
        producer.await.unwrap();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_emit_after_consumer_drop_reports_closed() {
        let (emitter, stream) = channel(1);
        drop(stream);
        let err = emitter
            .emit(StreamEvent::Delta {
                text: "hi".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, Closed);
    }
}
