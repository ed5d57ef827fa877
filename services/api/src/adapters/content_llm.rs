//! services/api/src/adapters/content_llm.rs
//!
//! This module contains the adapter for the content-writing LLM.
//! It implements the `ContentGenerationService` port from the `core` crate.
//!
//! Every prompt asks for a strict JSON-schema response, so the model's output
//! is decoded straight into typed structs.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use blogsmith_core::{
    domain::{BlogIdea, Keyword},
    ports::{ContentGenerationService, PortError, PortResult},
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const SYSTEM_INSTRUCTIONS: &str = "You are an experienced content strategist and blog writer. \
You write clear, engaging, SEO-aware content in natural language. \
Always answer with JSON that matches the requested schema exactly.";

const IDEAS_TEMPLATE: &str = "Brainstorm between 3 and 7 engaging blog post ideas about the topic '{topic}'{audience}. \
For each idea give a catchy, specific title and a short outline listing the main sections the post would cover.";

const ARTICLE_TEMPLATE: &str = "Write a comprehensive, SEO-optimized blog post based on the title: '{title}' and outline: '{outline}'. \
Ensure it is engaging, informative, and uses natural language. Aim for approximately 800-1000 words. \
Include an introduction, several main sections with relevant subheadings, and a concise conclusion.";

const KEYWORDS_TEMPLATE: &str = "Based on the blog post topic '{title}' and the general content theme '{outline}', \
suggest 5-7 trending, long-tail keywords with low competition that could easily rank on Google. \
For each keyword, provide a very brief explanation (1-2 sentences) of why it's a good choice for SEO.";

//=========================================================================================
// Structured Output Payloads
//=========================================================================================

#[derive(Deserialize)]
struct IdeasPayload {
    ideas: Vec<IdeaPayload>,
}

#[derive(Deserialize)]
struct IdeaPayload {
    title: String,
    outline: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticlePayload {
    full_content: String,
}

#[derive(Deserialize)]
struct KeywordsPayload {
    keywords: Vec<KeywordPayload>,
}

#[derive(Deserialize)]
struct KeywordPayload {
    keyword: String,
    explanation: String,
}

fn ideas_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "ideas": {
                "type": "array",
                "description": "Blog post ideas, between 3 and 7 of them.",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "description": "The blog post title." },
                        "outline": { "type": "string", "description": "A short outline of the post." }
                    },
                    "required": ["title", "outline"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["ideas"],
        "additionalProperties": false
    })
}

fn article_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "fullContent": { "type": "string", "description": "The generated full blog post content." }
        },
        "required": ["fullContent"],
        "additionalProperties": false
    })
}

fn keywords_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "keywords": {
                "type": "array",
                "description": "Between 5 and 7 SEO keywords.",
                "items": {
                    "type": "object",
                    "properties": {
                        "keyword": { "type": "string", "description": "A relevant SEO keyword." },
                        "explanation": { "type": "string", "description": "A brief explanation of the keyword's SEO value." }
                    },
                    "required": ["keyword", "explanation"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["keywords"],
        "additionalProperties": false
    })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContentGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiContentAdapter {
    client: Client<OpenAIConfig>,
    ideas_model: String,
    article_model: String,
    keywords_model: String,
}

impl OpenAiContentAdapter {
    /// Creates a new `OpenAiContentAdapter`.
    pub fn new(
        client: Client<OpenAIConfig>,
        ideas_model: String,
        article_model: String,
        keywords_model: String,
    ) -> Self {
        Self {
            client,
            ideas_model,
            article_model,
            keywords_model,
        }
    }

    /// Sends one prompt and decodes the schema-constrained reply.
    async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        schema_name: &str,
        schema: serde_json::Value,
        prompt: String,
    ) -> PortResult<T> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema_name.to_string(),
                    schema: Some(schema),
                    strict: Some(true),
                },
            })
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| {
                PortError::Unexpected(format!("The {} response contained no choices.", schema_name))
            })?;

        if let Some(refusal) = message.refusal {
            return Err(PortError::Unexpected(format!("The model refused: {}", refusal)));
        }
        let content = message.content.ok_or_else(|| {
            PortError::Unexpected(format!("The {} response contained no text content.", schema_name))
        })?;
        debug!("Received {} bytes of {} output", content.len(), schema_name);

        serde_json::from_str(&content).map_err(|e| {
            PortError::Unexpected(format!("The {} response did not match its schema: {}", schema_name, e))
        })
    }
}

//=========================================================================================
// `ContentGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentGenerationService for OpenAiContentAdapter {
    async fn generate_ideas(&self, topic: &str, audience: Option<&str>) -> PortResult<Vec<BlogIdea>> {
        let audience = audience
            .map(|a| format!(" for an audience of {}", a))
            .unwrap_or_default();
        let prompt = IDEAS_TEMPLATE
            .replace("{topic}", topic)
            .replace("{audience}", &audience);

        let payload: IdeasPayload = self
            .complete_json(&self.ideas_model, "blog_ideas", ideas_schema(), prompt)
            .await?;
        Ok(payload
            .ideas
            .into_iter()
            .map(|i| BlogIdea {
                title: i.title,
                outline: i.outline,
            })
            .collect())
    }

    async fn generate_article(&self, title: &str, outline: &str) -> PortResult<String> {
        let prompt = ARTICLE_TEMPLATE
            .replace("{title}", title)
            .replace("{outline}", outline);

        let payload: ArticlePayload = self
            .complete_json(&self.article_model, "blog_article", article_schema(), prompt)
            .await?;
        Ok(payload.full_content)
    }

    async fn generate_keywords(&self, title: &str, outline: &str) -> PortResult<Vec<Keyword>> {
        let prompt = KEYWORDS_TEMPLATE
            .replace("{title}", title)
            .replace("{outline}", outline);

        let payload: KeywordsPayload = self
            .complete_json(&self.keywords_model, "seo_keywords", keywords_schema(), prompt)
            .await?;
        Ok(payload
            .keywords
            .into_iter()
            .map(|k| Keyword {
                keyword: k.keyword,
                explanation: k.explanation,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_payload_uses_camel_case() {
        let payload: ArticlePayload =
            serde_json::from_str(r##"{"fullContent":"# Title\n\nBody"}"##).unwrap();
        assert_eq!(payload.full_content, "# Title\n\nBody");
    }

    #[test]
    fn schemas_require_every_property() {
        for schema in [ideas_schema(), article_schema(), keywords_schema()] {
            let properties = schema["properties"].as_object().unwrap();
            let required: Vec<_> = schema["required"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap())
                .collect();
            assert_eq!(properties.len(), required.len());
            assert_eq!(schema["additionalProperties"], false);
        }
    }

    #[test]
    fn ideas_prompt_mentions_the_audience_when_given() {
        let prompt = IDEAS_TEMPLATE
            .replace("{topic}", "sustainable living")
            .replace("{audience}", " for an audience of beginners");
        assert!(prompt.contains("'sustainable living' for an audience of beginners."));
    }
}
