use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

/// Timing and token counts reported on the final record of an exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

impl ChatResponse {
    /// A completed response carrying a message that did not come from the model.
    pub fn local<M: Into<String>>(model: M, message: Message) -> Self {
        Self {
            model: model.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            message: Some(message),
            done: true,
            done_reason: Some("stop".to_string()),
            metrics: Metrics::default(),
        }
    }

    /// Text of the carried message, or an empty string.
    pub fn content(&self) -> &str {
        self.message
            .as_ref()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f64>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub parent_model: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Role;

    const FINAL_CHAT_RECORD: &str = r#"{
        "model": "llama3",
        "created_at": "2024-07-01T10:00:00.000Z",
        "message": {"role": "assistant", "content": "Hello!"},
        "done": true,
        "done_reason": "stop",
        "total_duration": 5191566416,
        "load_duration": 2154458,
        "prompt_eval_count": 26,
        "prompt_eval_duration": 383809000,
        "eval_count": 298,
        "eval_duration": 4799921000
    }"#;

    #[test]
    fn test_final_chat_record() -> serde_json::Result<()> {
        let response: ChatResponse = serde_json::from_str(FINAL_CHAT_RECORD)?;
        assert!(response.done);
        assert_eq!(response.done_reason.as_deref(), Some("stop"));
        assert_eq!(response.content(), "Hello!");
        assert_eq!(response.metrics.eval_count, Some(298));
        assert_eq!(response.metrics.total_duration, Some(5191566416));
        Ok(())
    }

    #[test]
    fn test_intermediate_generate_record() -> serde_json::Result<()> {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3","created_at":"x","response":"The","done":false}"#)?;
        assert!(!response.done);
        assert!(response.done_reason.is_none());
        assert_eq!(response.metrics, Metrics::default());
        assert_eq!(response.response, "The");
        Ok(())
    }

    #[test]
    fn test_local_response_is_complete() {
        let response = ChatResponse::local("llama3", Message::assistant("18°C"));
        assert!(response.done);
        assert!(response.done_reason.is_some());
        assert_eq!(response.content(), "18°C");
        assert_eq!(response.message.map(|m| m.role), Some(Role::Assistant));
    }

    #[test]
    fn test_list_response() -> serde_json::Result<()> {
        let response: ListResponse = serde_json::from_str(
            r#"{"models":[{
                "name": "codellama:13b",
                "model": "codellama:13b",
                "modified_at": "2023-11-04T14:56:49.277302595-07:00",
                "size": 7365960935,
                "digest": "9f438cb9cd581fc025612d27f7c1a6669ff83a8bb0ed86c94fcf4c5440555697",
                "details": {
                    "format": "gguf",
                    "family": "llama",
                    "families": null,
                    "parameter_size": "13B",
                    "quantization_level": "Q4_0"
                }
            }]}"#,
        )?;
        assert_eq!(response.models.len(), 1);
        let details = response.models[0].details.as_ref();
        assert_eq!(details.and_then(|d| d.family.as_deref()), Some("llama"));
        assert_eq!(response.models[0].size, Some(7365960935));
        Ok(())
    }
}
