
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::GeminiConfig;
use crate::embeddings::Embedder;
use crate::http::HttpClient;
use crate::rag::Generator;
use crate::{RagError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";
const TASK_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_RETRIEVAL_QUERY: &str = "RETRIEVAL_QUERY";

/// Client for the Gemini REST API, used for both embeddings and generation
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    generation_model: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: &'a str) -> Self {
        Self {
            role,
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

fn embedding_error(error: anyhow::Error) -> RagError {
    RagError::Embedding(format!("{:#}", error))
}

fn generation_error(error: anyhow::Error) -> RagError {
    RagError::Generation(format!("{:#}", error))
}

/// Model names are accepted with or without the `models/` prefix
fn bare_model_name(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let http = HttpClient::new(
            Duration::from_secs(config.timeout_secs),
            config.retry_attempts,
        );

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            embedding_model: bare_model_name(&config.embedding_model).to_string(),
            generation_model: bare_model_name(&config.generation_model).to_string(),
            http,
        })
    }

    #[inline]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    fn model_url(&self, model: &str, method: &str) -> anyhow::Result<Url> {
        let raw = format!(
            "{}/models/{}:{}",
            self.base_url.as_str().trim_end_matches('/'),
            model,
            method
        );
        Url::parse(&raw).with_context(|| format!("Failed to build Gemini URL {}", raw))
    }

    fn post(&self, url: &Url, body: &str) -> anyhow::Result<String> {
        self.http.with_retry(url.path(), |agent| {
            agent
                .post(url.as_str())
                .header(API_KEY_HEADER, self.api_key.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn embed_request<'a>(&self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(None, text),
            task_type,
        }
    }

    fn generate_request(prompt: &str) -> anyhow::Result<String> {
        serde_json::to_string(&GenerateContentRequest {
            contents: vec![Content::text(Some("user"), prompt)],
        })
        .context("Failed to serialize generation request")
    }
}

impl Embedder for GeminiClient {
    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.embed_request(text, TASK_RETRIEVAL_DOCUMENT))
                .collect(),
        };

        let url = self
            .model_url(&self.embedding_model, "batchEmbedContents")
            .map_err(embedding_error)?;
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")
            .map_err(embedding_error)?;

        let response_text = self
            .post(&url, &request_json)
            .context("Failed to generate batch embeddings")
            .map_err(embedding_error)?;

        let response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")
            .map_err(embedding_error)?;

        if response.embeddings.len() != texts.len() {
            warn!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            );
        }

        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .filter(|values| !values.is_empty())
            .collect())
    }

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating query embedding (length: {})", text.len());

        let url = self
            .model_url(&self.embedding_model, "embedContent")
            .map_err(embedding_error)?;
        let request_json = serde_json::to_string(&self.embed_request(text, TASK_RETRIEVAL_QUERY))
            .context("Failed to serialize embedding request")
            .map_err(embedding_error)?;

        let response_text = self
            .post(&url, &request_json)
            .context("Failed to generate query embedding")
            .map_err(embedding_error)?;

        let response: EmbedContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")
            .map_err(embedding_error)?;

        if response.embedding.values.is_empty() {
            return Err(embedding_error(anyhow!("Embedding response was empty")));
        }

        Ok(response.embedding.values)
    }
}

impl Generator for GeminiClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = self
            .model_url(&self.generation_model, "generateContent")
            .map_err(generation_error)?;
        let request_json = Self::generate_request(prompt).map_err(generation_error)?;

        let response_text = self
            .post(&url, &request_json)
            .context("Failed to generate content")
            .map_err(generation_error)?;

        let response: GenerateContentResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")
            .map_err(generation_error)?;

        if let Some(reason) = response.block_reason() {
            return Err(generation_error(anyhow!("Prompt was blocked: {}", reason)));
        }

        let text = response.text();
        if text.is_empty() {
            let finish_reason = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(generation_error(anyhow!(
                "Model returned no text ({})",
                finish_reason
            )));
        }

        Ok(text)
    }

    #[inline]
    fn generate_stream(
        &self,
        prompt: &str,
        on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()> {
        let mut url = self
            .model_url(&self.generation_model, "streamGenerateContent")
            .map_err(generation_error)?;
        url.query_pairs_mut().append_pair("alt", "sse");
        let request_json = Self::generate_request(prompt).map_err(generation_error)?;

        let response = self
            .http
            .with_streaming_retry(url.path(), |agent| {
                agent
                    .post(url.as_str())
                    .header(API_KEY_HEADER, self.api_key.as_str())
                    .header("Content-Type", "application/json")
                    .send(request_json.as_str())
            })
            .context("Failed to start content stream")
            .map_err(generation_error)?;

        let reader = BufReader::new(response.into_body().into_reader());
        let mut fragments = 0usize;

        for line in reader.lines() {
            let line = line
                .context("Failed to read content stream")
                .map_err(generation_error)?;

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }

            let event: GenerateContentResponse = serde_json::from_str(data)
                .context("Failed to parse stream event")
                .map_err(generation_error)?;

            if let Some(reason) = event.block_reason() {
                return Err(generation_error(anyhow!("Prompt was blocked: {}", reason)));
            }

            let text = event.text();
            if text.is_empty() {
                continue;
            }

            fragments += 1;
            if !on_fragment(&text) {
                debug!("Stream consumer went away after {} fragments", fragments);
                return Ok(());
            }
        }

        debug!("Content stream finished with {} fragments", fragments);
        Ok(())
    }
}
