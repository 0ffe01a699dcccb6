use std::sync::Arc;

use wayfarer_core::delivery::DeliverySink;
use wayfarer_core::tool::Registry;
use wayfarer_core::{
    CancelToken, GatewayClient, Transcript, Turn, TurnConfig, TurnLoop,
    TurnOutcome,
};
use wayfarer_model::ModelProvider;

use crate::tools::{
    AttractionsTool, Catalog, FlightSearchTool, LodgingSearchTool,
    WebSearchTool,
};

/// Renders the built-in travel-planner system prompt.
///
/// `current_date` should be today's date in `YYYY-MM-DD` form; the model
/// resolves relative dates like "tomorrow" against it.
pub fn default_system_prompt(current_date: &str) -> String {
    include_str!("./system_prompt.md").replace("{{CURRENT_DATE}}", current_date)
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    gateway: GatewayClient,
    system_prompt: Option<String>,
    turn_config: TurnConfig,
    catalog: Option<Catalog>,
    web_search_api_key: Option<String>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            gateway: GatewayClient::new(provider),
            system_prompt: None,
            turn_config: TurnConfig::default(),
            catalog: None,
            web_search_api_key: None,
        }
    }

    /// Sets the system prompt for the session.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Replaces the loop configuration.
    #[inline]
    pub fn with_turn_config(mut self, config: TurnConfig) -> Self {
        self.turn_config = config;
        self
    }

    /// Replaces the built-in demo catalog with the given travel data.
    #[inline]
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Enables the web search tool with the given Tavily API key.
    #[inline]
    pub fn with_web_search<S: Into<String>>(mut self, api_key: S) -> Self {
        self.web_search_api_key = Some(api_key.into());
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let catalog = Arc::new(self.catalog.unwrap_or_else(Catalog::demo));

        let mut registry = Registry::new();
        registry.add_tool(FlightSearchTool::new(Arc::clone(&catalog)));
        registry.add_tool(LodgingSearchTool::new(Arc::clone(&catalog)));
        registry.add_tool(AttractionsTool::new(Arc::clone(&catalog)));
        if let Some(api_key) = self.web_search_api_key {
            registry.add_tool(WebSearchTool::new(api_key));
        } else {
            debug!("no web search key configured, tool not offered");
        }

        let mut turn_loop = TurnLoop::new(self.gateway, registry)
            .with_config(self.turn_config);
        if let Some(prompt) = self.system_prompt {
            turn_loop = turn_loop.with_system_prompt(prompt);
        }

        Session {
            turn_loop,
            transcript: Transcript::new(),
            cancel: CancelToken::new(),
        }
    }
}

/// A chat session: one conversation transcript plus the loop that
/// advances it.
///
/// Each session owns its transcript; concurrent sessions never share
/// state. Messages are processed one at a time.
pub struct Session {
    turn_loop: TurnLoop,
    transcript: Transcript,
    cancel: CancelToken,
}

impl Session {
    /// Sends a message and waits for the turn to finish.
    ///
    /// The reply is appended to the transcript; read it with
    /// [`Session::last_reply`] or [`Session::snapshot`].
    pub async fn send_message(&mut self, message: &str) -> TurnOutcome {
        self.turn_loop
            .run_turn(&mut self.transcript, message, None, &self.cancel)
            .await
    }

    /// Sends a message, streaming reply fragments into `sink` as they
    /// are generated.
    pub async fn send_message_streaming(
        &mut self,
        message: &str,
        sink: Arc<dyn DeliverySink>,
    ) -> TurnOutcome {
        self.turn_loop
            .run_turn(&mut self.transcript, message, Some(sink), &self.cancel)
            .await
    }

    /// Returns the text of the most recent assistant reply, if any.
    #[inline]
    pub fn last_reply(&self) -> Option<&str> {
        self.transcript.last_assistant_text()
    }

    /// Returns a point-in-time copy of the conversation so far.
    #[inline]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.transcript.snapshot()
    }

    /// Returns a token that abandons the session's in-flight turn when
    /// cancelled.
    #[inline]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}
