//! Citation-constrained answer composition over retrieved context.

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{error::AppError, utils::config::AppConfig};

use crate::{GraphFact, RetrievalOutput, RetrievedChunk};

pub const QUOTE_MAX_CHARS: usize = 200;

pub static ANSWER_SYSTEM_MESSAGE: &str = r#"You are a knowledge assistant. Answer the user's question using ONLY the provided context.

Context consists of:
1. CHUNKS: Relevant text excerpts from documents (each has a [CHUNK_ID])
2. FACTS: Knowledge graph relationships between entities

Rules:
- Only use information present in the context. Do not use prior knowledge.
- If the context doesn't contain enough information, say so honestly.
- When you use information from a chunk, cite it by including the chunk_id in square brackets, e.g. [chunk-abc123].
- Be concise and direct.
- Answer in the same language as the user's question.

Return your answer as valid JSON with this schema:
{
  "answer": "Your answer with [chunk-id] citations inline...",
  "cited_chunk_ids": ["chunk-id-1", "chunk-id-2"]
}"#;

pub static NO_CONTEXT_ANSWER: &str =
    "No relevant documents found. Make sure documents have been ingested and processed.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub quote: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
struct AnswerPayload {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    cited_chunk_ids: Vec<String>,
}

/// Format retrieved chunks and facts into the model's context block.
pub fn build_context_prompt(chunks: &[RetrievedChunk], facts: &[GraphFact]) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !chunks.is_empty() {
        parts.push("=== CHUNKS ===".to_string());
        for chunk in chunks {
            let title = chunk.doc_title.as_deref().unwrap_or("untitled");
            let source = chunk.doc_source_type.as_deref().unwrap_or("unknown");
            parts.push(format!("[{}] (source: {source}, doc: {title})", chunk.chunk_id));
            parts.push(chunk.text.clone());
            parts.push(String::new());
        }
    }

    if !facts.is_empty() {
        parts.push("=== KNOWLEDGE GRAPH FACTS ===".to_string());
        for fact in facts {
            let evidence = fact
                .evidence
                .as_deref()
                .filter(|e| !e.is_empty())
                .map(|e| {
                    let preview: String = e.chars().take(100).collect();
                    format!(" (evidence: {preview})")
                })
                .unwrap_or_default();
            parts.push(format!(
                "- {} --[{}]--> {}{}",
                fact.from_name, fact.relation, fact.to_name, evidence
            ));
        }
        parts.push(String::new());
    }

    parts.join("\n")
}

/// Keep only citations whose chunk id was actually retrieved; everything
/// the model invented is dropped.
pub fn filter_citations(cited_chunk_ids: &[String], chunks: &[RetrievedChunk]) -> Vec<Citation> {
    let mut citations = Vec::new();
    for chunk_id in cited_chunk_ids {
        let Some(chunk) = chunks.iter().find(|c| &c.chunk_id == chunk_id) else {
            continue;
        };
        if citations.iter().any(|c: &Citation| &c.chunk_id == chunk_id) {
            continue;
        }
        citations.push(Citation {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            url: chunk.doc_url.clone(),
            title: chunk.doc_title.clone(),
            quote: chunk.text.chars().take(QUOTE_MAX_CHARS).collect(),
        });
    }
    citations
}

/// Answer model client. Strict JSON at temperature zero; a malformed
/// response degrades to the raw string with no citations.
#[derive(Clone)]
pub struct AnswerClient {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl AnswerClient {
    pub fn new(client: Arc<Client<OpenAIConfig>>, config: &AppConfig) -> Self {
        Self {
            client,
            model: config.answer_model.clone(),
        }
    }

    pub async fn compose(
        &self,
        prompt: &str,
        retrieval: &RetrievalOutput,
    ) -> Result<ComposedAnswer, AppError> {
        if retrieval.chunks.is_empty() {
            return Ok(ComposedAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
            });
        }

        let context = build_context_prompt(&retrieval.chunks, &retrieval.facts);
        let user_message = format!("Context:\n{context}\n\nQuestion: {prompt}");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .messages([
                ChatCompletionRequestSystemMessage::from(ANSWER_SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .response_format(ResponseFormat::JsonObject)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let raw = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let payload = match serde_json::from_str::<AnswerPayload>(&raw) {
            Ok(payload) => payload,
            Err(err) => {
                let preview: String = raw.chars().take(200).collect();
                warn!(error = %err, preview = %preview, "failed to parse answer JSON, using raw text");
                AnswerPayload {
                    answer: raw,
                    cited_chunk_ids: Vec::new(),
                }
            }
        };

        let citations = filter_citations(&payload.cited_chunk_ids, &retrieval.chunks);

        info!(
            chunks = retrieval.chunks.len(),
            facts = retrieval.facts.len(),
            citation_count = citations.len(),
            "query answered"
        );

        Ok(ComposedAnswer {
            answer: payload.answer,
            citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len() as i64,
            score: 0.9,
            doc_title: Some("Quarterly Report".to_string()),
            doc_url: Some("https://example.com/doc".to_string()),
            doc_source_type: Some("mail".to_string()),
        }
    }

    fn fact(from: &str, relation: &str, to: &str, evidence: Option<&str>) -> GraphFact {
        GraphFact {
            from_key: format!("topic:{}", from.to_lowercase()),
            from_name: from.to_string(),
            relation: relation.to_string(),
            to_key: format!("topic:{}", to.to_lowercase()),
            to_name: to.to_string(),
            document_id: "d1".to_string(),
            evidence: evidence.map(str::to_string),
        }
    }

    #[test]
    fn context_prompt_contains_chunks_and_facts_blocks() {
        let chunks = vec![chunk("c1", "Alice works at Acme.")];
        let facts = vec![fact("Alice", "WORKS_AT", "Acme", Some("Alice works at Acme."))];

        let prompt = build_context_prompt(&chunks, &facts);

        assert!(prompt.contains("=== CHUNKS ==="));
        assert!(prompt.contains("[c1] (source: mail, doc: Quarterly Report)"));
        assert!(prompt.contains("Alice works at Acme."));
        assert!(prompt.contains("=== KNOWLEDGE GRAPH FACTS ==="));
        assert!(prompt.contains("- Alice --[WORKS_AT]--> Acme (evidence: Alice works at Acme.)"));
    }

    #[test]
    fn context_prompt_omits_empty_blocks() {
        let prompt = build_context_prompt(&[], &[]);
        assert!(prompt.is_empty());

        let prompt = build_context_prompt(&[chunk("c1", "text")], &[]);
        assert!(!prompt.contains("KNOWLEDGE GRAPH FACTS"));
    }

    #[test]
    fn citations_filtered_to_retrieved_chunk_ids() {
        let chunks = vec![
            chunk("c1", "first chunk"),
            chunk("c2", "second chunk"),
            chunk("c3", "third chunk"),
        ];

        // The model cited one real chunk and one invented id
        let cited = vec!["c2".to_string(), "c99".to_string()];
        let citations = filter_citations(&cited, &chunks);

        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].chunk_id, "c2");
        assert_eq!(citations[0].quote, "second chunk");
        assert_eq!(citations[0].title.as_deref(), Some("Quarterly Report"));
    }

    #[test]
    fn duplicate_citations_are_collapsed() {
        let chunks = vec![chunk("c1", "the chunk")];
        let cited = vec!["c1".to_string(), "c1".to_string()];
        let citations = filter_citations(&cited, &chunks);
        assert_eq!(citations.len(), 1);
    }

    #[test]
    fn quotes_are_truncated() {
        let long_text = "y".repeat(500);
        let chunks = vec![chunk("c1", &long_text)];
        let citations = filter_citations(&["c1".to_string()], &chunks);
        assert_eq!(citations[0].quote.chars().count(), QUOTE_MAX_CHARS);
    }

    #[tokio::test]
    async fn empty_retrieval_yields_canned_answer_without_model_call() {
        // Client points nowhere; compose must not touch it for empty context
        let client = AnswerClient::new(Arc::new(Client::new()), &AppConfig::default());
        let retrieval = RetrievalOutput::default();

        let composed = client.compose("anything", &retrieval).await.expect("compose");
        assert_eq!(composed.answer, NO_CONTEXT_ANSWER);
        assert!(composed.citations.is_empty());
    }

    #[test]
    fn answer_payload_parses_and_defaults() {
        let parsed: AnswerPayload =
            serde_json::from_str(r#"{"answer": "Alice works at Acme [c1].", "cited_chunk_ids": ["c1"]}"#)
                .expect("parse");
        assert_eq!(parsed.cited_chunk_ids, vec!["c1".to_string()]);

        let partial: AnswerPayload = serde_json::from_str(r#"{"answer": "no ids"}"#).expect("parse");
        assert!(partial.cited_chunk_ids.is_empty());
    }
}
