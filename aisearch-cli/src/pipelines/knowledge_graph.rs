//! Knowledge graph RAG over the essay, backed by the in-process store or Neo4j.

use super::{PipelineContext, VECTOR_INDEX_ID, answer_and_evaluate, answer_questions};
use crate::display;
use aisearch_core::config::GraphStoreConfig;
use aisearch_rag::{
    DirectoryReader, GraphStore, KgBuildOptions, KgRetrieverMode, KgRetrieverOptions,
    KnowledgeGraphIndex, Neo4jConfig, Neo4jGraphStore, ResponseMode, SimpleGraphStore,
};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

const STORE: &str = "graph-context-store";

/// The external graph store, or `None` for the in-process one.
async fn external_store(config: &GraphStoreConfig) -> anyhow::Result<Option<Arc<dyn GraphStore>>> {
    match config.store.as_str() {
        "simple" => Ok(None),
        "neo4j" => {
            let password = std::env::var(&config.neo4j_password_env).with_context(|| {
                format!("Neo4j password variable {} is not set", config.neo4j_password_env)
            })?;
            let store = Neo4jGraphStore::connect(Neo4jConfig {
                url: config.neo4j_url.clone(),
                user: config.neo4j_user.clone(),
                password,
                database: config.neo4j_database.clone(),
            })
            .await?;
            Ok(Some(Arc::new(store)))
        }
        other => anyhow::bail!("unknown graph store '{}' (expected simple or neo4j)", other),
    }
}

async fn load_or_build(ctx: &PipelineContext) -> anyhow::Result<KnowledgeGraphIndex> {
    let store = ctx.store_dir(STORE);
    let external = external_store(&ctx.config.graph).await?;
    if ctx.load_from_storage {
        return Ok(KnowledgeGraphIndex::load(
            &store,
            Some(VECTOR_INDEX_ID),
            external,
            ctx.embedder.clone(),
        )?);
    }

    let documents = DirectoryReader::from_dir(&ctx.paths.data_dir)
        .load_data()
        .await?;
    let graph_store = external.unwrap_or_else(|| Arc::new(SimpleGraphStore::new()));
    info!(store = graph_store.name(), documents = documents.len(), "Building knowledge graph");
    let mut index = KnowledgeGraphIndex::from_documents(
        &documents,
        &ctx.sentence_splitter()?,
        &ctx.brain()?,
        graph_store,
        ctx.embedder.clone(),
        &KgBuildOptions {
            max_triplets_per_chunk: 2,
            include_embeddings: true,
        },
    )
    .await?;
    index.set_index_id(VECTOR_INDEX_ID);
    index.persist(&store).await?;
    Ok(index)
}

/// `evaluate` adds faithfulness and relevancy judgements to every answer.
pub async fn run(ctx: &PipelineContext, evaluate: bool) -> anyhow::Result<()> {
    let index = load_or_build(ctx).await?;
    let engine = index
        .as_query_engine(
            ctx.brain()?,
            KgRetrieverOptions {
                mode: KgRetrieverMode::Hybrid,
                similarity_top_k: 5,
                include_text: true,
                ..Default::default()
            },
            ResponseMode::TreeSummarize,
        )
        .with_synthesizer(ctx.synthesizer(ctx.brain()?, ResponseMode::TreeSummarize));

    if evaluate {
        println!("Knowledge Graph started");
        answer_and_evaluate(ctx, &engine).await?;
        println!("Knowledge Graph finished");
        println!("{}", display::RULE);
    } else {
        println!("Graph");
        answer_questions(ctx, &engine).await?;
        println!("Graph done");
    }
    Ok(())
}
