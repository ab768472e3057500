//! Chat completions over any OpenAI-compatible endpoint (OpenAI, Ollama,
//! LM Studio, vLLM).

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, TokenUsage, ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_RETRY_SECS: u64 = 5;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireCall<'a> {
    id: &'a str,
    r#type: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    /// JSON-encoded, as the API expects.
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ReplyCall>>,
}

#[derive(Deserialize)]
struct ReplyCall {
    id: String,
    function: ReplyFunction,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl<'a> WireMessage<'a> {
    fn from_message(message: &'a Message) -> Self {
        let mut wire = WireMessage {
            role: message.role.as_str(),
            content: Some(message.content.text()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        match &message.content {
            Content::Text { .. } => {}
            Content::ToolCalls { text, calls } => {
                wire.content = text.as_deref();
                wire.tool_calls = calls
                    .iter()
                    .map(|call| WireCall {
                        id: &call.id,
                        r#type: "function",
                        function: WireFunction {
                            name: &call.name,
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect();
            }
            Content::ToolResult { call_id, .. } => wire.tool_call_id = Some(call_id.as_str()),
        }
        wire
    }
}

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    context_window: usize,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    /// Build from configuration. The key comes from `api_key` or the variable
    /// named by `api_key_env`; endpoints on localhost run without one.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let local = config
            .base_url
            .as_deref()
            .is_some_and(|u| u.contains("localhost") || u.contains("127.0.0.1"));
        let api_key = match config.resolve_api_key() {
            Some(key) => key,
            None if local => "local".to_string(),
            None => {
                return Err(LlmError::AuthFailed {
                    provider: format!("{} (env var '{}' not set)", config.provider, config.api_key_env),
                });
            }
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ApiRequest {
                message: format!("building HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            context_window: config.context_window,
            timeout_secs: config.timeout_secs,
        })
    }

    fn request_body<'a>(request: &'a CompletionRequest, model: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request
                .tools
                .iter()
                .flatten()
                .map(|t| WireTool {
                    r#type: "function",
                    function: t,
                })
                .collect(),
        }
    }

    fn parse_response(body: &str, model: &str) -> Result<CompletionResponse, LlmError> {
        let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| LlmError::ResponseParse {
            message: format!("invalid chat completion: {}", e),
        })?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "no choices in response".to_string(),
            })?
            .message;

        let calls: Vec<ToolCall> = reply
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::Object(Default::default())),
            })
            .collect();
        let text = reply.content.filter(|t| !t.is_empty());
        let message = if calls.is_empty() {
            Message::assistant(text.unwrap_or_default())
        } else {
            Message::tool_calls(text, calls)
        };

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        Ok(CompletionResponse {
            message,
            usage,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }

    fn map_http_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED => LlmError::AuthFailed {
                provider: "openai-compatible".to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_SECS),
            },
            s if s.is_server_error() => LlmError::ApiRequest {
                message: format!("server error ({}): {}", s, body),
            },
            s => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", s, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.as_deref().unwrap_or(&self.model);
        debug!(url = %url, model = %model, messages = request.messages.len(), "Chat completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(&request, model))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("reading response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(Self::map_http_error(status, retry_after, &body));
        }
        Self::parse_response(&body, model)
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyed(model: &str) -> LlmConfig {
        LlmConfig {
            model: model.into(),
            api_key: Some("sk-test".into()),
            context_window: 16_385,
            ..Default::default()
        }
    }

    #[test]
    fn test_context_window_and_model_from_config() {
        let provider = OpenAiCompatibleProvider::new(&keyed("gpt-3.5-turbo")).unwrap();
        assert_eq!(provider.context_window(), 16_385);
        assert_eq!(provider.model_name(), "gpt-3.5-turbo");
        assert_eq!(provider.base_url, OPENAI_URL);
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/v1/".into()),
            api_key_env: "AISEARCH_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_remote_endpoint_without_key_fails() {
        let config = LlmConfig {
            api_key_env: "AISEARCH_TEST_UNSET_KEY".into(),
            api_key: None,
            ..Default::default()
        };
        let err = OpenAiCompatibleProvider::new(&config).err().unwrap();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert!(err.to_string().contains("AISEARCH_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_request_body_for_function_calling_turns() {
        let call = ToolCall {
            id: "c1".into(),
            name: "vector_tool_essay".into(),
            arguments: json!({"input": "Viaweb"}),
        };
        let request = CompletionRequest {
            messages: vec![
                Message::system("Use the tools."),
                Message::user("Who bought Viaweb?"),
                Message::tool_calls(None, vec![call]),
                Message::tool_result("c1", "Yahoo", false),
            ],
            tools: Some(vec![ToolDefinition {
                name: "vector_tool_essay".into(),
                description: "facts".into(),
                parameters: json!({"type": "object"}),
            }]),
            temperature: 0.1,
            max_tokens: None,
            model: None,
        };
        let body = serde_json::to_value(OpenAiCompatibleProvider::request_body(&request, "gpt-4")).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"][1]["content"], "Who bought Viaweb?");
        assert_eq!(body["messages"][2]["content"], Value::Null);
        assert_eq!(body["messages"][2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"input\":\"Viaweb\"}"
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "c1");
        assert_eq!(body["tools"][0]["function"]["name"], "vector_tool_essay");
    }

    #[test]
    fn test_parse_text_reply_with_usage() {
        let body = json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "Yahoo"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body.to_string(), "gpt-3.5-turbo").unwrap();
        assert_eq!(resp.message.content.text(), "Yahoo");
        assert_eq!(resp.usage.input_tokens, 12);
        assert_eq!(resp.model, "gpt-3.5-turbo-0125");
    }

    #[test]
    fn test_parse_tool_call_reply() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "summary_tool_essay", "arguments": "{\"input\": \"summarize\"}"}},
                {"id": "call_2", "type": "function", "function": {"name": "vector_tool_essay", "arguments": "not json"}}
            ]}}]
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body.to_string(), "gpt-4").unwrap();
        let calls = resp.message.content.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "summary_tool_essay");
        assert_eq!(calls[0].arguments["input"], "summarize");
        assert_eq!(calls[1].arguments, json!({}));
        assert_eq!(resp.model, "gpt-4");
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_reply_without_choices() {
        let err = OpenAiCompatibleProvider::parse_response("{}", "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
        let err = OpenAiCompatibleProvider::parse_response("<html>", "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_errors() {
        let err = OpenAiCompatibleProvider::map_http_error(StatusCode::UNAUTHORIZED, None, "");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        let err = OpenAiCompatibleProvider::map_http_error(StatusCode::TOO_MANY_REQUESTS, Some(20), "");
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 20 }));
        let err = OpenAiCompatibleProvider::map_http_error(StatusCode::TOO_MANY_REQUESTS, None, "");
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 5 }));
        let err = OpenAiCompatibleProvider::map_http_error(StatusCode::BAD_GATEWAY, None, "upstream down");
        assert!(err.to_string().contains("server error"));
    }
}
