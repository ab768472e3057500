//! Plain vector RAG over the essay directory.

use super::{PipelineContext, VECTOR_INDEX_ID, answer_and_evaluate, answer_questions};
use crate::display;
use aisearch_rag::{DirectoryReader, ResponseMode, VectorStoreIndex};
use tracing::info;

const STORE: &str = "basic-context-store";

/// Build or reload the essay vector index persisted under `vector_index`.
pub async fn load_or_build(ctx: &PipelineContext) -> anyhow::Result<VectorStoreIndex> {
    let store = ctx.store_dir(STORE);
    if ctx.load_from_storage {
        return Ok(VectorStoreIndex::load(
            &store,
            Some(VECTOR_INDEX_ID),
            ctx.embedder.clone(),
        )?);
    }
    let documents = DirectoryReader::from_dir(&ctx.paths.data_dir)
        .load_data()
        .await?;
    info!(documents = documents.len(), dir = %ctx.paths.data_dir.display(), "Loaded documents");
    let mut index =
        VectorStoreIndex::from_documents(&documents, &ctx.sentence_splitter()?, ctx.embedder.clone())
            .await?;
    index.set_index_id(VECTOR_INDEX_ID);
    index.persist(&store)?;
    Ok(index)
}

/// `evaluate` adds faithfulness and relevancy judgements to every answer.
pub async fn run(ctx: &PipelineContext, evaluate: bool) -> anyhow::Result<()> {
    let index = load_or_build(ctx).await?;
    let engine = index
        .as_query_engine(
            ctx.brain()?,
            ctx.config.settings.similarity_top_k,
            ResponseMode::Compact,
        )
        .with_synthesizer(ctx.synthesizer(ctx.brain()?, ResponseMode::Compact));

    if evaluate {
        println!("Basic vector started");
        answer_and_evaluate(ctx, &engine).await?;
        println!("Basic vector finished");
        println!("{}", display::RULE);
    } else {
        println!("Basic");
        answer_questions(ctx, &engine).await?;
        println!("Basic done");
    }
    Ok(())
}
