//! The append-only conversation transcript.

use wayfarer_model::ToolCallRequest;

/// One exchange unit in a conversation.
///
/// Turns are immutable once appended; their position in the transcript is
/// the sole sequencing mechanism.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    /// A user utterance.
    User(String),
    /// An assistant message.
    Assistant {
        /// The generated text, possibly empty for pure tool-call rounds.
        text: String,
        /// Tool calls the model requested in this round. Carried so the
        /// gateway can rebuild the provider session from the transcript
        /// alone.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// The outcome of a single tool call.
    ToolResult {
        /// Identifier of the originating tool call request.
        call_id: String,
        /// Name of the tool that ran.
        tool_name: String,
        /// Success payload or a human-readable failure description,
        /// never both.
        content: Result<String, String>,
    },
}

/// An ordered sequence of [`Turn`]s owned by one conversation session.
///
/// The transcript grows monotonically by append and is never truncated
/// or reordered. Readers that run concurrently with the loop should use
/// [`Transcript::snapshot`], which hands out a copy rather than a live
/// reference.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user turn.
    #[inline]
    pub fn push_user<S: Into<String>>(&mut self, text: S) {
        self.turns.push(Turn::User(text.into()));
    }

    /// Appends an assistant turn.
    #[inline]
    pub fn push_assistant<S: Into<String>>(
        &mut self,
        text: S,
        tool_calls: Vec<ToolCallRequest>,
    ) {
        self.turns.push(Turn::Assistant {
            text: text.into(),
            tool_calls,
        });
    }

    /// Appends a tool result turn.
    #[inline]
    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Result<String, String>,
    ) {
        self.turns.push(Turn::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content,
        });
    }

    /// Returns the turns in order of appending.
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns a point-in-time copy of the transcript.
    #[inline]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the text of the most recent assistant turn, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}
