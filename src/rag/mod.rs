// Retrieval-augmented query module
// Embeds a question, retrieves nearby chunks and asks the generation model

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::vector_store::VectorIndex;

/// Answer returned when retrieval finds nothing and the policy is [`NoContextPolicy::Refuse`]
pub const NO_CONTEXT_RESPONSE: &str =
    "I couldn't find any relevant information in the textbook to answer that question.";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// A hosted text generation model.
///
/// Calls block; async callers should run them on a blocking thread.
pub trait Generator: Send + Sync {
    /// Generate a complete answer for `prompt`
    fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate an answer fragment by fragment.
    ///
    /// `on_fragment` is called once per non-empty fragment, in order. When it
    /// returns `false` the consumer has gone away and the implementation stops
    /// reading the upstream response.
    fn generate_stream(
        &self,
        prompt: &str,
        on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()>;
}

/// What to do when retrieval returns no usable text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoContextPolicy {
    /// Return [`NO_CONTEXT_RESPONSE`] without calling the model
    #[default]
    Refuse,
    /// Ask the model for a general answer without textbook context
    GeneralKnowledge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub collection: String,
    pub top_k: usize,
    pub no_context_policy: NoContextPolicy,
    pub textbook_title: String,
}

impl RetrievalSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant.collection.clone(),
            top_k: config.retrieval.top_k,
            no_context_policy: config.retrieval.no_context_policy,
            textbook_title: config.retrieval.textbook_title.clone(),
        }
    }
}

/// Outcome of the retrieval half of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedQuery {
    /// Nothing relevant was found and the model must not be asked
    Refused,
    /// Prompt ready for the generation model
    Prompt(String),
}

/// Answers questions about the textbook from the vector collection.
///
/// Holds no per-request state; one instance serves every request.
#[derive(Clone)]
pub struct RagService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    settings: RetrievalSettings,
}

impl std::fmt::Debug for RagService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RagService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            settings,
        }
    }

    #[inline]
    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Texts of the nearest chunks, in hit order. Hits without text are skipped.
    #[inline]
    pub fn retrieve_context(&self, query: &str) -> Result<Vec<String>> {
        let vector = self.embedder.embed_query(query)?;
        let hits = self
            .index
            .search(&self.settings.collection, &vector, self.settings.top_k)?;

        let total = hits.len();
        let texts: Vec<String> = hits
            .iter()
            .filter_map(|hit| hit.text())
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .collect();

        if texts.len() < total {
            warn!("{} of {} hits carried no text", total - texts.len(), total);
        }
        debug!("Retrieved {} context chunks", texts.len());
        Ok(texts)
    }

    #[inline]
    pub fn system_instruction(&self) -> String {
        format!(
            "You are a helpful AI assistant for the '{}'. Answer the user's question based ONLY on the provided context. If the answer is not in the context, state that you cannot answer from the provided information.",
            self.settings.textbook_title
        )
    }

    /// Prompt constrained to the retrieved `context`
    #[inline]
    pub fn build_prompt(&self, query: &str, context: &[String]) -> String {
        format!(
            "{}\n\nContext:\n{}\n\nQuestion:\n{}\n\nAnswer:",
            self.system_instruction(),
            context.join(CONTEXT_SEPARATOR),
            query
        )
    }

    /// Prompt used when nothing was retrieved and general answers are allowed
    #[inline]
    pub fn build_general_prompt(&self, query: &str) -> String {
        format!(
            "{}\n\nQuestion:\n{}\n\nAnswer: (No specific context found, providing a general answer related to robotics if possible)",
            self.system_instruction(),
            query
        )
    }

    /// Retrieve context and decide how the model should be asked
    #[inline]
    pub fn prepare(&self, query: &str) -> Result<PreparedQuery> {
        let context = self.retrieve_context(query)?;

        if !context.is_empty() {
            return Ok(PreparedQuery::Prompt(self.build_prompt(query, &context)));
        }

        match self.settings.no_context_policy {
            NoContextPolicy::Refuse => {
                info!("No relevant context found, refusing to answer");
                Ok(PreparedQuery::Refused)
            }
            NoContextPolicy::GeneralKnowledge => {
                info!("No relevant context found, asking for a general answer");
                Ok(PreparedQuery::Prompt(self.build_general_prompt(query)))
            }
        }
    }

    /// Answer `query` in one piece
    #[inline]
    pub fn answer(&self, query: &str) -> Result<String> {
        match self.prepare(query)? {
            PreparedQuery::Refused => Ok(NO_CONTEXT_RESPONSE.to_string()),
            PreparedQuery::Prompt(prompt) => self.generator.generate(&prompt),
        }
    }

    /// Answer `query` fragment by fragment into `sink`.
    ///
    /// A refusal is delivered as a single fragment. `sink` returning `false`
    /// stops generation early.
    #[inline]
    pub fn answer_stream(&self, query: &str, sink: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        match self.prepare(query)? {
            PreparedQuery::Refused => {
                sink(NO_CONTEXT_RESPONSE);
                Ok(())
            }
            PreparedQuery::Prompt(prompt) => self.generator.generate_stream(&prompt, sink),
        }
    }
}
