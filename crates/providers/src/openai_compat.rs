//! OpenAI-compatible provider implementation.
//!
//! Works with Groq (the default endpoint), OpenAI, OpenRouter, Ollama, vLLM,
//! and any other endpoint exposing `/chat/completions` with function calling.
//!
//! One client type serves both collaborators of the pipeline:
//! - as a [`Proposer`] it sends the thread history plus the action
//!   definitions and turns returned tool calls into proposed actions
//! - as a [`Judge`] it sends the rendered judgment request as a single user
//!   message, without tools, and returns the raw text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taxmate_core::{
    ActionDefinition, ActionKind, AgentError, Judge, JudgmentError, JudgmentRequest, Message,
    MessageRole, ProposalRequest, ProposedAction, Proposer,
};
use tracing::{debug, warn};

/// An OpenAI-compatible chat-completions client.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            client: Self::http_client(Duration::from_secs(120)),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Bound every HTTP request to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Self::http_client(timeout);
        self
    }

    fn http_client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            })
    }

    /// Convert thread messages to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    MessageRole::Human => "user".into(),
                    MessageRole::Agent => "assistant".into(),
                    MessageRole::System => "system".into(),
                    MessageRole::ToolResult => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.actions.is_empty() {
                    None
                } else {
                    Some(
                        m.actions
                            .iter()
                            .map(|a| ApiToolCall {
                                id: a.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: a.kind.as_str().into(),
                                    arguments: a.arguments_json(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.correlation_id.clone(),
            })
            .collect()
    }

    /// Convert action definitions to OpenAI tool format.
    fn to_api_tools(actions: &[ActionDefinition]) -> Vec<ApiToolDefinition> {
        actions
            .iter()
            .map(|a| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: a.name.clone(),
                    description: a.description.clone(),
                    parameters: a.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turn an API tool call into a proposed action.
    ///
    /// Unknown function names and unparseable arguments are malformed
    /// responses: the agent asked for something the pipeline cannot govern.
    fn to_proposed_action(call: ApiToolCall) -> Result<ProposedAction, AgentError> {
        let kind: ActionKind = call
            .function
            .name
            .parse()
            .map_err(|e: taxmate_core::ActionError| AgentError::MalformedResponse(e.to_string()))?;

        let raw = call.function.arguments.trim();
        let arguments: serde_json::Value = if raw.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(raw).map_err(|e| {
                AgentError::MalformedResponse(format!(
                    "arguments for {kind} are not valid JSON: {e}"
                ))
            })?
        };

        if !arguments.is_object() {
            return Err(AgentError::MalformedResponse(format!(
                "arguments for {kind} are not a JSON object"
            )));
        }

        Ok(ProposedAction::with_id(call.id, kind, arguments))
    }

    fn to_message(choice: ApiChoiceMessage) -> Result<Message, AgentError> {
        let actions = choice
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(Self::to_proposed_action)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Message::agent_with_actions(
            choice.content.unwrap_or_default(),
            actions,
        ))
    }

    /// POST a chat-completions body and return the first choice.
    async fn complete(&self, body: serde_json::Value) -> Result<ApiChoiceMessage, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(e.to_string())
                } else {
                    AgentError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(AgentError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(AgentError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(AgentError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                provider = %self.name,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| AgentError::MalformedResponse("No choices in response".into()))
    }
}

#[async_trait]
impl Proposer for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn propose(&self, request: ProposalRequest) -> Result<Message, AgentError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": self.temperature,
            "stream": false,
        });

        if !request.actions.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.actions));
        }

        debug!(
            provider = %self.name,
            model = %self.model,
            messages = request.messages.len(),
            "Sending proposal request"
        );

        let choice = self.complete(body).await?;
        Self::to_message(choice)
    }
}

#[async_trait]
impl Judge for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn judge(&self, request: &JudgmentRequest) -> Result<String, JudgmentError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.render() }],
            "temperature": self.temperature,
            "stream": false,
        });

        debug!(
            provider = %self.name,
            model = %self.model,
            action = %request.action.kind,
            "Sending judgment request"
        );

        let choice = self.complete(body).await.map_err(|e| match e {
            AgentError::MalformedResponse(m) => JudgmentError::Malformed(m),
            other => JudgmentError::Unavailable(other.to_string()),
        })?;

        match choice.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(JudgmentError::Malformed(
                "judgment response has no text".into(),
            )),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
