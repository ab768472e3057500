//! Semantic chunking against a sentence-split baseline on the same corpus.

use super::{PipelineContext, VECTOR_INDEX_ID};
use crate::display;
use aisearch_rag::node_parser::nodes_from_documents;
use aisearch_rag::{
    DirectoryReader, Evaluator, FaithfulnessEvaluator, QueryEngine, RelevancyEvaluator,
    ResponseMode, Retriever, SemanticSplitter, SentenceSplitter, TransformComponent,
    VectorStoreIndex,
};
use std::path::Path;

const STORE: &str = "basic-semantic-context-store";
const RETRIEVER_TOP_K: usize = 2;
const BASE_CHUNK_SIZE: usize = 512;

async fn build(
    ctx: &PipelineContext,
    splitter: &dyn TransformComponent,
    documents: &[aisearch_rag::Document],
    store: &Path,
) -> anyhow::Result<VectorStoreIndex> {
    let nodes = splitter.transform(nodes_from_documents(documents)).await?;
    println!("{}", display::chunks(&nodes));
    let mut index = VectorStoreIndex::build(nodes, ctx.embedder.clone()).await?;
    index.set_index_id(VECTOR_INDEX_ID);
    index.persist(store)?;
    Ok(index)
}

pub async fn run(ctx: &PipelineContext) -> anyhow::Result<()> {
    let base_store = ctx.store_dir(STORE).join("1");
    let semantic_store = ctx.store_dir(STORE).join("2");

    let (semantic, base) = if ctx.load_from_storage {
        (
            VectorStoreIndex::load(&semantic_store, Some(VECTOR_INDEX_ID), ctx.embedder.clone())?,
            VectorStoreIndex::load(&base_store, Some(VECTOR_INDEX_ID), ctx.embedder.clone())?,
        )
    } else {
        let documents = DirectoryReader::from_dir(&ctx.paths.data_dir)
            .load_data()
            .await?;
        let semantic_splitter = SemanticSplitter::new(ctx.embedder.clone())
            .with_buffer_size(1)
            .with_breakpoint_percentile(95.0);
        let base_splitter = SentenceSplitter::new(BASE_CHUNK_SIZE, ctx.config.settings.chunk_overlap)?;
        (
            build(ctx, &semantic_splitter, &documents, &semantic_store).await?,
            build(ctx, &base_splitter, &documents, &base_store).await?,
        )
    };

    println!("*** Semantic Splitter ***");
    query(ctx, &semantic).await?;
    println!("*** Base Splitter ***");
    query(ctx, &base).await?;
    Ok(())
}

async fn query(ctx: &PipelineContext, index: &VectorStoreIndex) -> anyhow::Result<()> {
    let engine = index
        .as_query_engine(
            ctx.brain()?,
            ctx.config.settings.similarity_top_k,
            ResponseMode::Compact,
        )
        .with_synthesizer(ctx.synthesizer(ctx.brain()?, ResponseMode::Compact));
    let retriever = index.as_retriever(RETRIEVER_TOP_K);
    let faithfulness = FaithfulnessEvaluator::new(ctx.brain()?);
    let relevancy = RelevancyEvaluator::new(ctx.brain()?);

    println!("{}", display::RULE);
    println!("Vector pipeline started\n");
    for question in &ctx.questions {
        println!("{}\n", display::SEPARATOR);
        let response = engine.query(question).await?;
        display::print_answer(question, &response);
        println!();

        println!("Retrieved nodes ->");
        for node in retriever.retrieve(question).await? {
            println!();
            println!("{}", display::node(&node));
        }

        println!();
        println!("*** Response Evaluation ***");
        let faithful = faithfulness.evaluate_response(question, &response).await?;
        display::print_evaluation("Faithfulness", &faithful);
        println!();
        let relevant = relevancy.evaluate_response(question, &response).await?;
        display::print_evaluation("Relevancy", &relevant);
    }
    println!();
    println!("Vector pipeline finished");
    println!("{}\n", display::RULE);
    Ok(())
}
