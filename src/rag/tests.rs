use super::*;
use crate::RagError;
use crate::vector_store::{HitPayload, SearchHit, VectorRecord};
use std::sync::Mutex;

struct FixedEmbedder;

impl Embedder for FixedEmbedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Embedding("unreachable".to_string()))
    }

    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding("service unavailable".to_string()))
    }
}

/// Returns the same hits for every search and records the requested limits
struct StubIndex {
    hits: Vec<SearchHit>,
    searches: Mutex<Vec<(String, usize)>>,
}

impl StubIndex {
    fn with_texts(texts: &[Option<&str>]) -> Self {
        let hits = texts
            .iter()
            .enumerate()
            .map(|(i, text)| SearchHit {
                id: serde_json::json!(i),
                score: 1.0 - i as f32 * 0.1,
                payload: Some(HitPayload {
                    source: Some("docs/chapter.md".to_string()),
                    chunk_index: Some(i),
                    text: text.map(str::to_string),
                }),
            })
            .collect();
        Self {
            hits,
            searches: Mutex::new(Vec::new()),
        }
    }
}

impl VectorIndex for StubIndex {
    fn list_collections(&self) -> Result<Vec<String>> {
        Ok(vec!["textbook".to_string()])
    }

    fn recreate_collection(&self, _name: &str, _dimension: u32) -> Result<()> {
        Ok(())
    }

    fn upsert(&self, _name: &str, _records: &[VectorRecord]) -> Result<()> {
        Ok(())
    }

    fn search(&self, name: &str, _vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.searches
            .lock()
            .expect("lock")
            .push((name.to_string(), limit));
        Ok(self.hits.iter().take(limit).cloned().collect())
    }
}

/// Echoes its prompt back, as one answer or word by word
#[derive(Default)]
struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
}

impl EchoGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

impl Generator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        Ok(prompt.to_string())
    }

    fn generate_stream(
        &self,
        prompt: &str,
        on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        for word in prompt.split_inclusive(' ') {
            if !on_fragment(word) {
                break;
            }
        }
        Ok(())
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation("model overloaded".to_string()))
    }

    fn generate_stream(
        &self,
        _prompt: &str,
        _on_fragment: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()> {
        Err(RagError::Generation("model overloaded".to_string()))
    }
}

fn settings(policy: NoContextPolicy) -> RetrievalSettings {
    RetrievalSettings {
        collection: "textbook".to_string(),
        top_k: 3,
        no_context_policy: policy,
        textbook_title: "Humanoid Robotics Textbook".to_string(),
    }
}

fn service(
    index: Arc<StubIndex>,
    generator: Arc<EchoGenerator>,
    policy: NoContextPolicy,
) -> RagService {
    RagService::new(Arc::new(FixedEmbedder), index, generator, settings(policy))
}

#[test]
fn settings_follow_config() {
    let config = Config::default();
    let settings = RetrievalSettings::from_config(&config);

    assert_eq!(settings.collection, "humanoid_robotics_textbook");
    assert_eq!(settings.top_k, 3);
    assert_eq!(settings.no_context_policy, NoContextPolicy::Refuse);
}

#[test]
fn policy_names_are_snake_case() {
    let json = serde_json::to_string(&NoContextPolicy::GeneralKnowledge).expect("serialize");
    assert_eq!(json, "\"general_knowledge\"");
    let parsed: NoContextPolicy = serde_json::from_str("\"refuse\"").expect("deserialize");
    assert_eq!(parsed, NoContextPolicy::Refuse);
}

#[test]
fn prompt_contains_instruction_context_and_question() {
    let index = Arc::new(StubIndex::with_texts(&[
        Some("Bipedal robots balance using the zero moment point."),
        Some("Actuators convert energy into motion."),
        Some("Sensors provide proprioceptive feedback."),
    ]));
    let generator = Arc::new(EchoGenerator::default());
    let rag = service(Arc::clone(&index), Arc::clone(&generator), NoContextPolicy::Refuse);

    let question = "How do humanoid robots keep their balance?";
    let answer = rag.answer(question).expect("should answer");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert_eq!(&answer, prompt);

    assert!(prompt.starts_with(&rag.system_instruction()));
    assert!(prompt.contains("'Humanoid Robotics Textbook'"));
    assert!(prompt.contains(
        "Context:\nBipedal robots balance using the zero moment point.\n\nActuators convert energy into motion.\n\nSensors provide proprioceptive feedback.\n\n"
    ));
    assert!(prompt.contains(&format!("Question:\n{}\n\nAnswer:", question)));
    assert!(prompt.ends_with("Answer:"));

    assert_eq!(
        index.searches.lock().expect("lock").as_slice(),
        &[("textbook".to_string(), 3)]
    );
}

#[test]
fn hits_without_text_are_skipped() {
    let index = Arc::new(StubIndex::with_texts(&[
        Some("First passage."),
        None,
        Some("Third passage."),
    ]));
    let rag = service(
        index,
        Arc::new(EchoGenerator::default()),
        NoContextPolicy::Refuse,
    );

    let context = rag.retrieve_context("anything").expect("should retrieve");
    assert_eq!(context, vec!["First passage.", "Third passage."]);
}

#[test]
fn no_hits_refuses_without_calling_the_model() {
    let index = Arc::new(StubIndex::with_texts(&[]));
    let generator = Arc::new(EchoGenerator::default());
    let rag = service(index, Arc::clone(&generator), NoContextPolicy::Refuse);

    let answer = rag.answer("What is a servo?").expect("refusal is not an error");

    assert_eq!(answer, NO_CONTEXT_RESPONSE);
    assert!(generator.prompts().is_empty());
}

#[test]
fn hits_without_any_text_count_as_no_context() {
    let index = Arc::new(StubIndex::with_texts(&[None, Some("   ")]));
    let rag = service(
        index,
        Arc::new(EchoGenerator::default()),
        NoContextPolicy::Refuse,
    );

    assert_eq!(
        rag.prepare("question").expect("should prepare"),
        PreparedQuery::Refused
    );
}

#[test]
fn no_hits_with_general_knowledge_asks_the_model() {
    let index = Arc::new(StubIndex::with_texts(&[]));
    let generator = Arc::new(EchoGenerator::default());
    let rag = service(index, Arc::clone(&generator), NoContextPolicy::GeneralKnowledge);

    let answer = rag.answer("What is a servo?").expect("should answer");

    assert!(!answer.contains("Context:"));
    assert!(answer.contains("Question:\nWhat is a servo?"));
    assert!(answer.contains("No specific context found"));
    assert_eq!(generator.prompts().len(), 1);
}

#[test]
fn stream_delivers_generated_fragments() {
    let index = Arc::new(StubIndex::with_texts(&[Some("Gears reduce speed.")]));
    let rag = service(
        index,
        Arc::new(EchoGenerator::default()),
        NoContextPolicy::Refuse,
    );

    let mut collected = String::new();
    rag.answer_stream("Why gears?", &mut |fragment| {
        collected.push_str(fragment);
        true
    })
    .expect("should stream");

    assert_eq!(
        collected,
        rag.build_prompt("Why gears?", &["Gears reduce speed.".to_string()])
    );
}

#[test]
fn stream_stops_when_sink_declines() {
    let index = Arc::new(StubIndex::with_texts(&[Some("Gears reduce speed.")]));
    let rag = service(
        index,
        Arc::new(EchoGenerator::default()),
        NoContextPolicy::Refuse,
    );

    let mut fragments = 0;
    rag.answer_stream("Why gears?", &mut |_| {
        fragments += 1;
        fragments < 2
    })
    .expect("should stream");

    assert_eq!(fragments, 2);
}

#[test]
fn stream_refusal_is_a_single_fragment() {
    let rag = service(
        Arc::new(StubIndex::with_texts(&[])),
        Arc::new(EchoGenerator::default()),
        NoContextPolicy::Refuse,
    );

    let mut fragments = Vec::new();
    rag.answer_stream("question", &mut |fragment| {
        fragments.push(fragment.to_string());
        true
    })
    .expect("should stream");

    assert_eq!(fragments, vec![NO_CONTEXT_RESPONSE]);
}

#[test]
fn embedding_failure_propagates() {
    let rag = RagService::new(
        Arc::new(FailingEmbedder),
        Arc::new(StubIndex::with_texts(&[Some("text")])),
        Arc::new(EchoGenerator::default()),
        settings(NoContextPolicy::Refuse),
    );

    let error = rag.answer("question").expect_err("should fail");
    assert_eq!(error.kind(), crate::ErrorKind::Embedding);
}

#[test]
fn generation_failure_propagates() {
    let rag = RagService::new(
        Arc::new(FixedEmbedder),
        Arc::new(StubIndex::with_texts(&[Some("text")])),
        Arc::new(FailingGenerator),
        settings(NoContextPolicy::Refuse),
    );

    let error = rag.answer("question").expect_err("should fail");
    assert!(matches!(error, RagError::Generation(ref m) if m == "model overloaded"));
}
