//! Multi-document agents: one function-calling agent per documentation page,
//! arbitrated by a top-level ReAct agent that retrieves the agents as tools.

use super::PipelineContext;
use crate::display;
use aisearch_core::persistence::{atomic_write_json, load_json, load_lines, save_lines};
use aisearch_rag::readers::html;
use aisearch_rag::{
    CompareToolRetriever, DirectoryReader, Document, FunctionCallingAgent, LlmRerank, Node, ObjectIndex,
    ObjectRetriever, QueryEngine, QueryEngineTool, ReActAgent, RerankingRetriever, ResponseMode,
    SummaryIndex, Tool, ToolSource, TransformComponent, VectorStoreIndex,
};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const BASE_STORE: &str = "docs.llamaindex.ai";
const FILE_LIST: &str = "files.txt";
const PATH_KEY: &str = "path";
const SUMMARY_QUERY: &str = "Extract a concise 1-2 line summary of this document";
const TOP_AGENT_PROMPT: &str = "You are an agent designed to answer queries about the documentation.
Please always use the tools provided to answer a question. Do not rely on prior knowledge.";

/// Storage layout of the agentic pipeline.
struct Layout {
    base: PathBuf,
}

impl Layout {
    fn file_list(&self) -> PathBuf {
        self.base.join(FILE_LIST)
    }

    fn vector_index(&self, key: &str) -> PathBuf {
        self.base.join("vector-index").join(key)
    }

    fn summary_index(&self, key: &str) -> PathBuf {
        self.base.join("summary-index").join(key)
    }

    fn summary(&self, key: &str) -> PathBuf {
        self.base
            .join("summary-extracted")
            .join(format!("{}_summary.json", key))
    }
}

/// Parent directory name, underscore, file stem.
pub fn doc_key(path: &Path) -> String {
    let stem = |p: Option<&Path>| {
        p.and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    format!("{}_{}", stem(path.parent()), stem(Some(path)))
}

fn agent_prompt(key: &str) -> String {
    format!(
        "You are a specialized agent designed to answer queries about the `{}.html` part of the LlamaIndex docs.
You must ALWAYS use at least one of the tools provided when answering a question; do NOT rely on prior knowledge.",
        key
    )
}

/// HTML pages under `dir`, sorted by path.
fn html_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    Ok(DirectoryReader::from_dir(dir)
        .with_required_exts(&["html"])
        .list_files()?)
}

/// Load up to `doc_limit` pages with the first `toc_skip` elements removed,
/// and record their keys in the file list.
async fn load_documents(ctx: &PipelineContext, layout: &Layout) -> anyhow::Result<Vec<Document>> {
    let settings = &ctx.config.agentic;
    let files = html_files(&ctx.resolve(&settings.source_dir))?;
    println!("{}", display::RULE);
    println!("Loaded {} files", files.len());

    let total = files.len();
    let mut documents = Vec::new();
    let mut keys = Vec::new();
    for (idx, path) in files.into_iter().take(settings.doc_limit).enumerate() {
        info!(file = idx, limit = settings.doc_limit, total, "Loading page");
        let elements = match html::load_elements(&path).await {
            Ok(elements) => elements,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable page");
                continue;
            }
        };
        let document = Document::new(html::page_body(&elements, settings.toc_skip))
            .with_metadata(PATH_KEY, path.display().to_string());
        println!("Loaded document : {}", path.display());
        keys.push(doc_key(&path));
        documents.push(document);
    }
    save_lines(&layout.file_list(), &keys)?;
    Ok(documents)
}

/// A function-calling agent over one page, with the page's summary.
async fn build_doc_agent(
    ctx: &PipelineContext,
    layout: &Layout,
    key: &str,
    nodes: Option<Vec<Node>>,
) -> anyhow::Result<(FunctionCallingAgent, String)> {
    let (vector_index, summary_index) = match nodes {
        Some(nodes) => {
            let vector_index = VectorStoreIndex::build(nodes.clone(), ctx.embedder.clone()).await?;
            vector_index.persist(&layout.vector_index(key))?;
            let summary_index = SummaryIndex::new(nodes);
            summary_index.persist(&layout.summary_index(key))?;
            (vector_index, summary_index)
        }
        None => (
            VectorStoreIndex::load(&layout.vector_index(key), None, ctx.embedder.clone())?,
            SummaryIndex::load(&layout.summary_index(key), None)?,
        ),
    };

    let vector_engine = vector_index
        .as_query_engine(
            ctx.brain()?,
            ctx.config.settings.similarity_top_k,
            ResponseMode::Compact,
        )
        .with_synthesizer(ctx.synthesizer(ctx.brain()?, ResponseMode::Compact));
    let summary_engine = summary_index
        .as_query_engine(ctx.brain()?, ResponseMode::TreeSummarize)
        .with_synthesizer(
            ctx.synthesizer(ctx.brain()?, ResponseMode::TreeSummarize)
                .use_async(false),
        );

    let summary_path = layout.summary(key);
    let summary = match load_json::<String>(&summary_path)? {
        Some(summary) if ctx.load_from_storage => summary,
        _ => {
            let summary = summary_engine.query(SUMMARY_QUERY).await?.response;
            atomic_write_json(&summary_path, &summary)?;
            summary
        }
    };

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(QueryEngineTool::from_defaults(
            Arc::new(vector_engine),
            format!("vector_tool_{}", key),
            "Useful for questions related to specific facts",
        )),
        Arc::new(QueryEngineTool::from_defaults(
            Arc::new(summary_engine),
            format!("summary_tool_{}", key),
            "Useful for summarization questions",
        )),
    ];
    let agent = FunctionCallingAgent::new(ctx.brain()?, tools).with_system_prompt(agent_prompt(key));
    println!("File key : {}", key);
    println!("Summary : {}\n", summary);
    Ok((agent, summary))
}

/// One `tool_<key>` per page, each wrapping that page's agent.
async fn build_doc_tools(ctx: &PipelineContext, layout: &Layout) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    if ctx.load_from_storage {
        let keys = load_lines(&layout.file_list())?.with_context(|| {
            format!(
                "no {} in {}; run without --load-from-storage first",
                FILE_LIST,
                layout.base.display()
            )
        })?;
        for key in keys {
            let (agent, summary) = build_doc_agent(ctx, layout, &key, None).await?;
            tools.push(Arc::new(QueryEngineTool::from_defaults(
                Arc::new(agent),
                format!("tool_{}", key),
                summary,
            )));
        }
        return Ok(tools);
    }

    if layout.base.exists() {
        tokio::fs::remove_dir_all(&layout.base)
            .await
            .with_context(|| format!("clearing {}", layout.base.display()))?;
    }
    let documents = load_documents(ctx, layout).await?;
    let splitter = ctx.sentence_splitter()?;
    for document in documents {
        let key = document
            .metadata
            .get(PATH_KEY)
            .map(|p| doc_key(Path::new(p)))
            .unwrap_or_else(|| document.id.clone());
        let nodes = splitter
            .transform(aisearch_rag::node_parser::nodes_from_documents(std::slice::from_ref(
                &document,
            )))
            .await?;
        let (agent, summary) = build_doc_agent(ctx, layout, &key, Some(nodes)).await?;
        tools.push(Arc::new(QueryEngineTool::from_defaults(
            Arc::new(agent),
            format!("tool_{}", key),
            summary,
        )));
    }
    Ok(tools)
}

pub async fn run(ctx: &PipelineContext) -> anyhow::Result<()> {
    let layout = Layout {
        base: ctx.store_dir(BASE_STORE),
    };
    let tools = build_doc_tools(ctx, &layout).await?;
    if tools.is_empty() {
        anyhow::bail!("no document agents were built");
    }
    info!(agents = tools.len(), "Document agents ready");

    let settings = &ctx.config.agentic;
    let object_index = ObjectIndex::from_tools(&tools, ctx.embedder.clone()).await?;
    let reranked = RerankingRetriever::new(
        Arc::new(object_index.as_node_retriever(settings.tool_top_k)),
        Arc::new(LlmRerank::new(ctx.brain()?, settings.rerank_top_n)),
    );
    let object_retriever = ObjectRetriever::new(Arc::new(reranked), object_index.mapping().clone());
    let tool_retriever = CompareToolRetriever::new(Arc::new(object_retriever), ctx.brain()?);
    let top_agent = ReActAgent::new(ctx.brain()?, ToolSource::Retriever(Arc::new(tool_retriever)))
        .with_system_prompt(TOP_AGENT_PROMPT);

    println!("{}", display::RULE);
    println!("Agentic RAG started\n");
    for question in &ctx.questions {
        println!("{}\n", display::SEPARATOR);
        println!("Q : {}", question);
        let response = top_agent.query(question).await?;
        println!("A : {}", response);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_doc_key_joins_parent_and_stem() {
        assert_eq!(
            doc_key(Path::new("/data/docs.llamaindex.ai/understanding/index.html")),
            "understanding_index"
        );
        assert_eq!(doc_key(Path::new("page.html")), "_page");
    }

    #[test]
    fn test_layout_paths() {
        let layout = Layout {
            base: PathBuf::from("/store"),
        };
        assert_eq!(layout.file_list(), PathBuf::from("/store/files.txt"));
        assert_eq!(
            layout.summary("a_b"),
            PathBuf::from("/store/summary-extracted/a_b_summary.json")
        );
        assert_eq!(layout.vector_index("a_b"), PathBuf::from("/store/vector-index/a_b"));
    }

    #[test]
    fn test_html_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("guides")).unwrap();
        std::fs::write(dir.path().join("guides/b.html"), "<p>b</p>").unwrap();
        std::fs::write(dir.path().join("guides/a.HTML"), "<p>a</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        let files = html_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.HTML", "b.html"]);
        assert!(html_files(&dir.path().join("missing")).is_err());
    }
}
