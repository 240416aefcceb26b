pub mod postprocess;

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use common::{error::AppError, utils::config::AppConfig};

/// Documents are truncated to this many characters before extraction to
/// stay inside the model's context window.
pub const EXTRACTION_CONTENT_LIMIT: usize = 8000;

pub static EXTRACTION_SYSTEM_MESSAGE: &str = r#"You are an entity extraction system. Given a document, extract entities and relations.

Rules:
- type must be one of: Person, Company, Topic
- For Person: include email if available
- For Company: include domain if available (e.g. "acme.com")
- For Topic: use a short normalized label (2-4 words max)
- evidence must be a short span from the text (max 120 chars)
- qualifiers.time and qualifiers.location can be empty if not present
- qualifiers.confidence is 0-1 based on how explicit the relation is
- Only extract entities actually mentioned in the text
- If no entities found, return {"entities": [], "relations": []}
- Do NOT hallucinate entities not present in the text"#;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExtractedEntity {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RelationQualifiers {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExtractedRelation {
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub to_name: String,
    #[serde(rename = "type", default)]
    pub relation_type: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub qualifiers: Option<RelationQualifiers>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

pub fn get_extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["Person", "Company", "Topic"] },
                        "name": { "type": "string" },
                        "email": { "type": "string" },
                        "domain": { "type": "string" },
                        "evidence": { "type": "string" }
                    },
                    "required": ["type", "name", "email", "domain", "evidence"],
                    "additionalProperties": false
                }
            },
            "relations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "from_name": { "type": "string" },
                        "to_name": { "type": "string" },
                        "type": { "type": "string" },
                        "evidence": { "type": "string" },
                        "qualifiers": {
                            "type": "object",
                            "properties": {
                                "time": { "type": "string" },
                                "location": { "type": "string" },
                                "confidence": { "type": "number" }
                            },
                            "required": ["time", "location", "confidence"],
                            "additionalProperties": false
                        }
                    },
                    "required": ["from_name", "to_name", "type", "evidence", "qualifiers"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["entities", "relations"],
        "additionalProperties": false
    })
}

/// LLM extraction client. Strict JSON output at temperature zero; a parse
/// failure is downgraded to an empty result with a warning so the pipeline
/// keeps moving, while transport failures bubble for retry.
#[derive(Clone)]
pub struct ExtractionClient {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl ExtractionClient {
    pub fn new(client: Arc<Client<OpenAIConfig>>, config: &AppConfig) -> Self {
        Self {
            client,
            model: config.extraction_model.clone(),
        }
    }

    pub async fn extract(
        &self,
        content_text: &str,
        title: &str,
        author_name: &str,
        author_email: &str,
        source_type: &str,
    ) -> Result<ExtractionResult, AppError> {
        let content: String = content_text.chars().take(EXTRACTION_CONTENT_LIMIT).collect();

        let user_message = format!(
            "Extract entities and relations from this document.\n\n\
             Title: {title}\n\
             Author: {author_name} <{author_email}>\n\
             Source: {source_type}\n\n\
             Content:\n{content}",
            title = if title.is_empty() { "(no title)" } else { title },
            author_name = if author_name.is_empty() { "unknown" } else { author_name },
            author_email = if author_email.is_empty() { "unknown" } else { author_email },
        );

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Entities and relations extracted from the document".into()),
                name: "entity_relation_extraction".into(),
                schema: Some(get_extraction_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .messages([
                ChatCompletionRequestSystemMessage::from(EXTRACTION_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .response_format(response_format)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let Some(content) = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
        else {
            warn!("extraction returned no content, treating as empty result");
            return Ok(ExtractionResult::default());
        };

        match serde_json::from_str::<ExtractionResult>(content) {
            Ok(result) => Ok(result),
            Err(err) => {
                let preview: String = content.chars().take(200).collect();
                warn!(error = %err, preview = %preview, "failed to parse extraction JSON");
                Ok(ExtractionResult::default())
            }
        }
    }
}
