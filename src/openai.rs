use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::error::FlowError;
use crate::flows::{PromptRequest, PromptService};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completions client that asks for JSON matching the request's schema.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: OPENAI_API_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.require_api_key()?;
        let mut client = Self::new(api_key, config.openai_model.clone());
        client.api_url = config.openai_api_url.clone();
        Ok(client)
    }

    fn build_request(&self, request: &PromptRequest) -> OpenAiRequest {
        let user_content = match &request.attachment {
            None => MessageContent::Text(request.prompt.clone()),
            Some(attachment) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: request.prompt.clone(),
                },
                attachment_part(attachment),
            ]),
        };

        OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(request.system.clone()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: request.name.to_string(),
                    schema: request.output_schema.clone(),
                    strict: false,
                },
            },
            temperature: 0.2,
        }
    }
}

fn attachment_part(attachment: &Attachment) -> ContentPart {
    if attachment.is_image() {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: attachment.to_data_uri(),
            },
        }
    } else {
        ContentPart::File {
            file: FileData {
                filename: "document".to_string(),
                file_data: attachment.to_data_uri(),
            },
        }
    }
}

impl PromptService for OpenAiClient {
    async fn generate(&self, request: PromptRequest) -> Result<Value, FlowError> {
        let body = self.build_request(&request);
        tracing::debug!(flow = request.name, model = %self.model, "Sending prompt");

        let resp = self
            .http
            .post(&self.api_url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| FlowError::Service(format!("request failed: {}", err)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| FlowError::Service(format!("response read failed: {}", err)))?;

        if !status.is_success() {
            return Err(FlowError::Service(format!("API error: {} - {}", status, text)));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&text)
            .map_err(|err| FlowError::Service(format!("response parse failed: {}", err)))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::Service("response missing choices".to_string()))?
            .message
            .content;

        match content {
            None => Ok(Value::Null),
            Some(content) if content.trim().is_empty() => Ok(Value::Null),
            Some(content) => serde_json::from_str(&content)
                .map_err(|err| FlowError::Service(format!("reply is not JSON: {}", err))),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
