use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::agents::Agent;
use crate::config::{ClientConfig, ConfigSnapshot};
use crate::errors::{OllamaError, OllamaResult, Phase};
use crate::models::request::{ChatRequest, DeleteRequest, EmbedRequest, GenerateRequest};
use crate::models::response::{ChatResponse, EmbedResponse, GenerateResponse, ListResponse};
use crate::stream::{ChatStream, GenerateStream, LineStream};
use crate::turn::{self, Probe};

/// Blocking client for an Ollama server.
///
/// Cloning is cheap: clones share the connection pool and the registered agents.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    config: ClientConfig,
    agents: Vec<Arc<dyn Agent>>,
}

impl OllamaClient {
    pub fn new(config: ClientConfig) -> OllamaResult<Self> {
        let client = Self::build_transport(&config)?;
        Ok(Self {
            client,
            config,
            agents: Vec::new(),
        })
    }

    /// Create a client whose host is resolved from `snapshot`, unless `explicit` is given.
    pub fn from_snapshot(explicit: Option<&str>, snapshot: &ConfigSnapshot) -> OllamaResult<Self> {
        Self::new(ClientConfig::from_snapshot(explicit, snapshot))
    }

    fn build_transport(config: &ClientConfig) -> OllamaResult<Client> {
        Ok(Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.io_timeout())
            .build()?)
    }

    fn reconfigure(self, config: ClientConfig) -> OllamaResult<Self> {
        Ok(Self {
            client: Self::build_transport(&config)?,
            config,
            agents: self.agents,
        })
    }

    pub fn with_connect_timeout(self, timeout: Duration) -> OllamaResult<Self> {
        let config = self.config.clone().with_connect_timeout(timeout);
        self.reconfigure(config)
    }

    pub fn with_read_timeout(self, timeout: Duration) -> OllamaResult<Self> {
        let config = self.config.clone().with_read_timeout(timeout);
        self.reconfigure(config)
    }

    pub fn with_write_timeout(self, timeout: Duration) -> OllamaResult<Self> {
        let config = self.config.clone().with_write_timeout(timeout);
        self.reconfigure(config)
    }

    /// Register an agent. Agents are tried in the order they were added.
    pub fn with_agent<A: Agent + 'static>(mut self, agent: A) -> Self {
        self.agents.push(Arc::new(agent));
        self
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.config.host.trim_end_matches('/'), endpoint)
    }

    /// Send a request and reject any non-2xx status.
    fn execute(&self, request: RequestBuilder, phase: Phase) -> OllamaResult<Response> {
        let response = request
            .send()
            .map_err(|err| OllamaError::from_transport(err, phase))?;

        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), phase = %phase, "received response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .map_err(|err| OllamaError::from_transport(err, phase))?;
        Err(OllamaError::RequestFailed {
            status: status.as_u16(),
            body,
        })
    }

    fn read_json<T: DeserializeOwned>(response: Response, phase: Phase) -> OllamaResult<T> {
        let body = response
            .bytes()
            .map_err(|err| OllamaError::from_transport(err, phase))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(OllamaError::EmptyBody);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Generate a completion for a prompt and wait for the full response.
    pub fn generate(&self, request: &GenerateRequest) -> OllamaResult<GenerateResponse> {
        let phase = Phase::Generating;
        let payload = request.streaming(false);
        let response = self.execute(self.client.post(self.url("generate")).json(&payload), phase)?;
        Self::read_json(response, phase)
    }

    /// Generate a completion for a prompt, decoding records as they arrive.
    pub fn generate_stream(&self, request: &GenerateRequest) -> OllamaResult<GenerateStream> {
        let phase = Phase::Generating;
        let payload = request.streaming(true);
        let response = self.execute(self.client.post(self.url("generate")).json(&payload), phase)?;
        Ok(LineStream::from_response(response, phase))
    }

    /// Run one chat turn.
    ///
    /// Registered agents get the first chance to answer the last user message
    /// (unless `request.use_agents` is false); otherwise the model answers.
    /// On success exactly one assistant message has been appended to
    /// `request.messages` before this returns.
    pub fn chat(&self, request: &mut ChatRequest) -> OllamaResult<ChatResponse> {
        Self::ensure_history(request)?;

        if let Probe::Answered { message, .. } =
            turn::probe(&self.agents, &request.messages, request.use_agents)
        {
            request.messages.push(message.clone());
            return Ok(ChatResponse::local(request.model.clone(), message));
        }

        let phase = Phase::Chatting;
        let payload = request.streaming(false);
        let response = self.execute(self.client.post(self.url("chat")).json(&payload), phase)?;
        let chat: ChatResponse = Self::read_json(response, phase)?;

        let message = chat.message.clone().ok_or(OllamaError::EmptyBody)?;
        request.messages.push(message);
        Ok(chat)
    }

    /// Run one streamed chat turn.
    ///
    /// An agent answer is appended to `request.messages` and delivered as a
    /// single completed record. A model answer is streamed as it arrives and is
    /// not appended; callers accumulate the streamed content themselves.
    pub fn chat_stream(&self, request: &mut ChatRequest) -> OllamaResult<ChatStream> {
        Self::ensure_history(request)?;

        if let Probe::Answered { message, .. } =
            turn::probe(&self.agents, &request.messages, request.use_agents)
        {
            request.messages.push(message.clone());
            let response = ChatResponse::local(request.model.clone(), message);
            return Ok(ChatStream::Agent(Some(response)));
        }

        let phase = Phase::Chatting;
        let payload = request.streaming(true);
        let response = self.execute(self.client.post(self.url("chat")).json(&payload), phase)?;
        Ok(ChatStream::Model(LineStream::from_response(response, phase)))
    }

    fn ensure_history(request: &ChatRequest) -> OllamaResult<()> {
        if request.messages.is_empty() {
            return Err(OllamaError::InvalidRequest(
                "chat request must carry at least one message".to_string(),
            ));
        }
        Ok(())
    }

    /// Compute an embedding for a prompt.
    pub fn embed(&self, request: &EmbedRequest) -> OllamaResult<EmbedResponse> {
        let phase = Phase::Embedding;
        let response = self.execute(self.client.post(self.url("embeddings")).json(request), phase)?;
        Self::read_json(response, phase)
    }

    /// List the models available on the server.
    pub fn list(&self) -> OllamaResult<ListResponse> {
        let phase = Phase::Listing;
        let response = self.execute(self.client.get(self.url("tags")), phase)?;
        Self::read_json(response, phase)
    }

    /// Delete a model from the server.
    pub fn delete(&self, request: &DeleteRequest) -> OllamaResult<()> {
        let phase = Phase::Deleting;
        self.execute(self.client.delete(self.url("delete")).json(request), phase)?;
        Ok(())
    }
}
