//! Integration tests for the RAG pipelines.
//!
//! These tests wire readers, splitters, indexes, query engines, evaluators
//! and agents together against a MockLlmProvider and the local embedder, so
//! every flow runs offline.

use aisearch_core::{Brain, Embedder, LocalEmbedder, MockLlmProvider};
use aisearch_rag::{
    CompareToolRetriever, DirectoryReader, Evaluator, FaithfulnessEvaluator, LlmQuestionGenerator,
    ObjectIndex, QueryEngine, QueryEngineTool, ReActAgent, RelevancyEvaluator, ResponseMode,
    ResponseSynthesizer, SentenceSplitter, SubQuestionQueryEngine, SummaryIndex, Tool, ToolSource,
    VectorStoreIndex,
};
use std::sync::Arc;
use tempfile::TempDir;

// --- Helpers ---

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(LocalEmbedder::new(256))
}

fn write_corpus(dir: &TempDir) {
    std::fs::write(
        dir.path().join("early_years.txt"),
        "Before college the author wrote short stories and programmed an IBM 1401.",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("viaweb.md"),
        "# Viaweb\n\nViaweb was an online store builder. Yahoo bought Viaweb in 1998.",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("painting.html"),
        "<html><body><p>The author studied painting at RISD.</p></body></html>",
    )
    .unwrap();
}

async fn vector_index(dir: &TempDir) -> VectorStoreIndex {
    let documents = DirectoryReader::from_dir(dir.path()).load_data().await.unwrap();
    assert_eq!(documents.len(), 3);
    VectorStoreIndex::from_documents(&documents, &SentenceSplitter::new(256, 20).unwrap(), embedder())
        .await
        .unwrap()
}

fn react_action(tool: &str, input: &str) -> String {
    format!(
        "Thought: I need to use a tool to help me answer the question.\nAction: {tool}\nAction Input: {{\"input\": \"{input}\"}}"
    )
}

// --- Vector pipeline ---

#[tokio::test]
async fn test_vector_pipeline_build_persist_reload_query_evaluate() {
    let corpus = TempDir::new().unwrap();
    write_corpus(&corpus);
    let storage = TempDir::new().unwrap();

    let index = vector_index(&corpus).await;
    index.persist(storage.path()).unwrap();
    let loaded = VectorStoreIndex::load(storage.path(), None, embedder()).unwrap();
    assert_eq!(loaded.len(), index.len());

    let provider = Arc::new(MockLlmProvider::with_response("YES"));
    provider.queue_text("Yahoo bought Viaweb in 1998.");
    let brain = Brain::new(provider.clone());

    let engine = loaded.as_query_engine(brain.clone(), 2, ResponseMode::Compact);
    let query = "Who bought Viaweb?";
    let response = engine.query(query).await.unwrap();
    assert_eq!(response.response, "Yahoo bought Viaweb in 1998.");
    assert_eq!(response.source_nodes.len(), 2);
    assert!(
        response.source_nodes[0].text().contains("Yahoo"),
        "best match first"
    );

    let faithfulness = FaithfulnessEvaluator::new(brain.clone())
        .evaluate_response(query, &response)
        .await
        .unwrap();
    assert_eq!(faithfulness.passing, Some(true));
    assert_eq!(faithfulness.score, Some(1.0));

    let relevancy = RelevancyEvaluator::new(brain)
        .evaluate_response(query, &response)
        .await
        .unwrap();
    assert_eq!(relevancy.passing, Some(true));

    let prompt = provider.prompt_at(0).unwrap();
    assert!(prompt.contains("Query: Who bought Viaweb?"));
}

#[tokio::test]
async fn test_vector_and_summary_indexes_share_a_storage_dir() {
    let corpus = TempDir::new().unwrap();
    write_corpus(&corpus);
    let storage = TempDir::new().unwrap();

    let mut vector = vector_index(&corpus).await;
    vector.set_index_id("vector_index");
    vector.persist(storage.path()).unwrap();

    let mut summary = SummaryIndex::new(vector.nodes().unwrap());
    summary.set_index_id("summary_index");
    summary.persist(storage.path()).unwrap();

    let vector = VectorStoreIndex::load(storage.path(), Some("vector_index"), embedder()).unwrap();
    let summary = SummaryIndex::load(storage.path(), Some("summary_index")).unwrap();
    assert_eq!(summary.nodes().unwrap().len(), vector.len());
    assert!(VectorStoreIndex::load(storage.path(), None, embedder()).is_err());
}

// --- Sub-question pipeline ---

#[tokio::test]
async fn test_sub_question_engine_over_index_tools() {
    let corpus = TempDir::new().unwrap();
    write_corpus(&corpus);
    let index = vector_index(&corpus).await;

    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(
        r#"```json
{"items": [
    {"sub_question": "Who bought Viaweb?", "tool_name": "essay"},
    {"sub_question": "Where did the author study painting?", "tool_name": "essay"}
]}
```"#,
    );
    provider.queue_text("Yahoo.");
    provider.queue_text("RISD.");
    provider.queue_text("Yahoo bought Viaweb and the author studied at RISD.");
    let brain = Brain::new(provider.clone());

    let tool: Arc<dyn Tool> = Arc::new(QueryEngineTool::from_defaults(
        Arc::new(index.as_query_engine(brain.clone(), 1, ResponseMode::Compact)),
        "essay",
        "Paul Graham's essay about his life",
    ));
    let engine = SubQuestionQueryEngine::new(
        Arc::new(LlmQuestionGenerator::new(brain.clone())),
        vec![tool],
        ResponseSynthesizer::new(brain, ResponseMode::Compact),
    )
    .use_async(false);

    let response = engine
        .query("Who bought Viaweb and where did the author study painting?")
        .await
        .unwrap();
    assert_eq!(
        response.response,
        "Yahoo bought Viaweb and the author studied at RISD."
    );
    assert_eq!(provider.request_count(), 4);

    let final_prompt = provider.prompt_at(3).unwrap();
    assert!(final_prompt.contains("Sub question: Who bought Viaweb?\nResponse: Yahoo."));
    assert!(final_prompt.contains("Response: RISD."));
    assert!(response.metadata.contains_key("sub_qa"));
}

// --- Agentic pipeline ---

#[tokio::test]
async fn test_react_agent_over_retrieved_tools() {
    let corpus = TempDir::new().unwrap();
    write_corpus(&corpus);
    let index = vector_index(&corpus).await;

    let provider = Arc::new(MockLlmProvider::new());
    let brain = Brain::new(provider.clone());
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(QueryEngineTool::from_defaults(
            Arc::new(index.as_query_engine(brain.clone(), 1, ResponseMode::Compact)),
            "vector_tool_essay",
            "Useful for questions about the company Viaweb and who bought it",
        )),
        Arc::new(QueryEngineTool::from_defaults(
            Arc::new(SummaryIndex::new(index.nodes().unwrap()).as_query_engine(
                brain.clone(),
                ResponseMode::TreeSummarize,
            )),
            "summary_tool_essay",
            "Useful for summarizing the whole essay",
        )),
    ];
    let object_index = ObjectIndex::from_tools(&tools, embedder()).await.unwrap();
    let retriever = CompareToolRetriever::new(Arc::new(object_index.as_retriever(1)), brain.clone());
    let agent = ReActAgent::new(brain, ToolSource::Retriever(Arc::new(retriever)));

    provider.queue_text(&react_action("vector_tool_essay", "Who bought Viaweb?"));
    provider.queue_text("Yahoo bought Viaweb.");
    provider.queue_text("Thought: I can answer without using any more tools.\nAnswer: Yahoo.");

    let response = agent.chat("Which company bought Viaweb?").await.unwrap();
    assert_eq!(response.response, "Yahoo.");
    assert!(!response.source_nodes.is_empty(), "tool sources are kept");

    let header = provider.requests()[0].messages[0].content.text().to_string();
    assert!(header.contains("vector_tool_essay"));
    assert!(header.contains("compare_tool"));
    assert!(!header.contains("summary_tool_essay"), "only the top tool is offered");

    let observation_turn = provider.prompt_at(2).unwrap();
    assert!(observation_turn.contains("Observation: Yahoo bought Viaweb."));
}

#[tokio::test]
async fn test_react_agent_reports_unknown_tool_and_recovers() {
    let provider = Arc::new(MockLlmProvider::new());
    let brain = Brain::new(provider.clone());
    let agent = ReActAgent::new(brain, ToolSource::Fixed(Vec::new()));

    provider.queue_text(&react_action("missing_tool", "anything"));
    provider.queue_text("Thought: I cannot answer the question with the provided tools.\nAnswer: Unknown.");

    let response = agent.chat("What is the answer?").await.unwrap();
    assert_eq!(response.response, "Unknown.");
    let retry = provider.prompt_at(1).unwrap();
    assert!(retry.contains("No such tool named `missing_tool`"));
}
