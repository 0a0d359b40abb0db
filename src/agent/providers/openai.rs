//! `OpenAI` completion provider over the `async-openai` crate.
//!
//! Works with any `OpenAI`-compatible endpoint through the base URL
//! override in [`AgentConfig`]. Search-preview models reject sampling and
//! response-format parameters, so those are left out for them.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// Completion provider for `OpenAI`-compatible chat APIs.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider from the configured key and optional base URL.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
        }
    }

    fn to_sdk_message(turn: &ChatMessage) -> ChatCompletionRequestMessage {
        let text = turn.content.clone();
        match turn.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(text),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(text),
                name: None,
            }),
            #[allow(deprecated)]
            Role::Assistant => {
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(text)),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let search_model = is_search_model(&request.model);
        // Empty history turns carry nothing and some gateways reject them.
        let messages = request
            .messages
            .iter()
            .filter(|turn| turn.role == Role::System || !turn.content.trim().is_empty())
            .map(Self::to_sdk_message)
            .collect();

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request
                .temperature
                .filter(|&t| t != 0.0 && !search_model),
            max_completion_tokens: request.max_tokens,
            response_format: (request.json_mode && !search_model)
                .then_some(ResponseFormat::JsonObject),
            ..Default::default()
        }
    }
}

/// Search-preview models only take model, messages and token limits.
fn is_search_model(model: &str) -> bool {
    model.contains("search")
}

fn map_error(error: OpenAIError) -> AgentError {
    match error {
        OpenAIError::Reqwest(e) => AgentError::ApiRequest {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        },
        OpenAIError::ApiError(api) => AgentError::ApiRequest {
            message: match api.code {
                Some(code) => format!("{} ({code})", api.message),
                None => api.message,
            },
            status: None,
        },
        OpenAIError::JSONDeserialize(e) => AgentError::ResponseParse {
            message: format!("malformed completion response: {e}"),
            content: String::new(),
        },
        other => AgentError::ApiRequest {
            message: other.to_string(),
            status: None,
        },
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let response = self
            .client
            .chat()
            .create(Self::build_request(request))
            .await
            .map_err(map_error)?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(AgentError::ResponseParse {
                message: format!("{} returned no choices", request.model),
                content: String::new(),
            });
        };

        let finish_reason = choice
            .finish_reason
            .map(|reason| format!("{reason:?}").to_lowercase());
        if finish_reason.as_deref() == Some("length") {
            warn!(model = %request.model, "completion truncated at max tokens");
        }

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });
        debug!(
            model = %request.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "completion received"
        );

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{assistant_message, system_message, user_message};

    fn request(model: &str, json_mode: bool, temperature: f32) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![
                system_message("route"),
                user_message("check my recent emails"),
                assistant_message(""),
                user_message("what about Jubilo?"),
            ],
            temperature: Some(temperature),
            max_tokens: Some(300),
            json_mode,
        }
    }

    #[test]
    fn test_history_roles_map_to_sdk_messages() {
        assert!(matches!(
            OpenAiProvider::to_sdk_message(&system_message("s")),
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            OpenAiProvider::to_sdk_message(&assistant_message("You have 2 emails.")),
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }

    #[test]
    fn test_json_request_keeps_format_and_drops_empty_turns() {
        let built = OpenAiProvider::build_request(&request("gpt-4o-mini", true, 0.0));
        assert!(built.response_format.is_some());
        assert!(built.temperature.is_none());
        assert_eq!(built.messages.len(), 3);
        assert_eq!(built.max_completion_tokens, Some(300));
    }

    #[test]
    fn test_search_model_omits_sampling_parameters() {
        let built = OpenAiProvider::build_request(&request("gpt-4o-search-preview", true, 0.3));
        assert!(built.response_format.is_none());
        assert!(built.temperature.is_none());

        let answer = OpenAiProvider::build_request(&request("gpt-4o", false, 0.3));
        assert_eq!(answer.temperature, Some(0.3));
    }
}
