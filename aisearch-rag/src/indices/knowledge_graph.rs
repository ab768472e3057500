//! Knowledge graph index.
//!
//! Building asks the LLM for `(subject, predicate, object)` triplets per
//! chunk, writes them to a [`GraphStore`] and keeps a keyword table from
//! triplet entities to the chunks they came from. Retrieval extracts keywords
//! from the question, follows them through the table and the graph, and can
//! additionally rank triplets by embedding similarity.

use crate::error::{RagError, Result};
use crate::graph_stores::{GraphStore, SimpleGraphStore, Triplet};
use crate::node_parser::{TransformComponent, nodes_from_documents};
use crate::prompts;
use crate::query_engine::RetrieverQueryEngine;
use crate::response::{ResponseMode, ResponseSynthesizer};
use crate::retrievers::Retriever;
use crate::schema::{Document, MetadataMode, Node, NodeWithScore};
use crate::storage::{DocStore, IndexStruct, StorageContext, persist_merged};
use aisearch_core::{Brain, Embedder, cosine_similarity};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entities longer than this (in bytes) are treated as extraction noise.
const MAX_OBJECT_LENGTH: usize = 128;

pub const KG_SEQUENCE_HEADER: &str = "The following are knowledge sequence in max depth 2 in the form of directed graph like:\n`subject -[predicate]->, object, <-[predicate_next_hop]-, object_next_hop ...`";

/// Parse `(subject, predicate, object)` lines. Malformed lines are skipped.
pub fn parse_triplets(response: &str) -> Vec<Triplet> {
    let mut triplets = Vec::new();
    for line in response.lines() {
        let line = line.trim();
        if !line.starts_with('(') || !line.ends_with(')') {
            continue;
        }
        let parts: Vec<&str> = line[1..line.len() - 1].split(',').collect();
        if parts.len() != 3 {
            continue;
        }
        if parts.iter().any(|p| p.len() > MAX_OBJECT_LENGTH) {
            continue;
        }
        let cleaned: Vec<String> = parts
            .iter()
            .map(|p| capitalize(p.trim().trim_matches('"').trim()))
            .collect();
        if cleaned.iter().any(|p| p.is_empty()) {
            continue;
        }
        let triplet = Triplet::new(&cleaned[0], &cleaned[1], &cleaned[2]);
        if !triplets.contains(&triplet) {
            triplets.push(triplet);
        }
    }
    triplets
}

/// First letter upper case, the rest lower case.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Keywords after `KEYWORDS:`; multi-word keywords also contribute their words.
pub fn parse_keywords(response: &str) -> Vec<String> {
    let body = match response.find("KEYWORDS:") {
        Some(pos) => &response[pos + "KEYWORDS:".len()..],
        None => response,
    };
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |k: &str| {
        let k = k.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '.');
        if !k.is_empty() && !keywords.iter().any(|e| e.eq_ignore_ascii_case(k)) {
            keywords.push(k.to_string());
        }
    };
    for keyword in body.lines().next().unwrap_or_default().split(',') {
        push(keyword);
        let words: Vec<&str> = keyword.split_whitespace().collect();
        if words.len() > 1 {
            for word in words {
                push(word);
            }
        }
    }
    keywords
}

/// Options for building a knowledge graph index.
#[derive(Debug, Clone)]
pub struct KgBuildOptions {
    pub max_triplets_per_chunk: usize,
    pub include_embeddings: bool,
}

impl Default for KgBuildOptions {
    fn default() -> Self {
        Self {
            max_triplets_per_chunk: 10,
            include_embeddings: false,
        }
    }
}

pub struct KnowledgeGraphIndex {
    index_id: String,
    table: Arc<BTreeMap<String, BTreeSet<String>>>,
    embedding_dict: Arc<BTreeMap<String, Vec<f32>>>,
    docstore: Arc<DocStore>,
    graph_store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeGraphIndex {
    pub async fn build(
        nodes: Vec<Node>,
        brain: &Brain,
        graph_store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        options: &KgBuildOptions,
    ) -> Result<Self> {
        let mut table: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut embedding_dict = BTreeMap::new();
        let mut docstore = DocStore::default();
        let max = options.max_triplets_per_chunk.to_string();

        for node in nodes {
            let prompt = prompts::render(
                prompts::KG_TRIPLET_EXTRACT,
                &[
                    ("max_knowledge_triplets", max.as_str()),
                    ("text", &node.get_content(MetadataMode::Llm)),
                ],
            );
            let response = brain.predict(&prompt).await?;
            let mut triplets = parse_triplets(&response);
            triplets.truncate(options.max_triplets_per_chunk);
            debug!(node = %node.id, triplets = triplets.len(), "Extracted triplets");

            for triplet in &triplets {
                graph_store.upsert_triplet(triplet).await?;
                for keyword in [&triplet.subject, &triplet.object] {
                    table
                        .entry(keyword.clone())
                        .or_default()
                        .insert(node.id.clone());
                }
            }
            if options.include_embeddings && !triplets.is_empty() {
                let rendered: Vec<String> = triplets.iter().map(|t| t.to_string()).collect();
                let vectors = embedder.embed_batch(&rendered).await?;
                embedding_dict.extend(rendered.into_iter().zip(vectors));
            }
            docstore.add(node);
        }

        info!(
            nodes = docstore.len(),
            keywords = table.len(),
            store = graph_store.name(),
            "Built knowledge graph index"
        );
        Ok(Self {
            index_id: uuid::Uuid::new_v4().to_string(),
            table: Arc::new(table),
            embedding_dict: Arc::new(embedding_dict),
            docstore: Arc::new(docstore),
            graph_store,
            embedder,
        })
    }

    pub async fn from_documents(
        documents: &[Document],
        splitter: &dyn TransformComponent,
        brain: &Brain,
        graph_store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        options: &KgBuildOptions,
    ) -> Result<Self> {
        let nodes = splitter.transform(nodes_from_documents(documents)).await?;
        Self::build(nodes, brain, graph_store, embedder, options).await
    }

    pub fn set_index_id(&mut self, index_id: impl Into<String>) {
        self.index_id = index_id.into();
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        &self.graph_store
    }

    pub fn keywords(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    /// Persist the index. Triplets are written too unless the graph lives in
    /// an external database.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        let mut ctx = StorageContext {
            docstore: (*self.docstore).clone(),
            ..Default::default()
        };
        ctx.index_store.add(IndexStruct::KnowledgeGraph {
            index_id: self.index_id.clone(),
            table: (*self.table).clone(),
            embedding_dict: (*self.embedding_dict).clone(),
        });
        if self.graph_store.name() == "simple" {
            ctx.graph_store = Some(crate::storage::GraphData {
                triplets: self.graph_store.triplets().await?,
            });
        }
        persist_merged(dir, ctx)?;
        Ok(())
    }

    /// Load from `dir`. With `graph_store` set, triplets are read from it
    /// instead of from the persisted graph file.
    pub fn load(
        dir: &Path,
        index_id: Option<&str>,
        graph_store: Option<Arc<dyn GraphStore>>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let ctx = StorageContext::from_persist_dir(dir)?;
        let IndexStruct::KnowledgeGraph {
            index_id,
            table,
            embedding_dict,
        } = ctx.index_struct(index_id)?
        else {
            return Err(RagError::index(
                "persisted index is not a knowledge graph index",
            ));
        };
        let graph_store = match graph_store {
            Some(store) => store,
            None => {
                let data = ctx.graph_store.clone().ok_or_else(|| {
                    RagError::storage(format!(
                        "no graph store persisted in {}",
                        dir.display()
                    ))
                })?;
                Arc::new(SimpleGraphStore::from_data(&data)) as Arc<dyn GraphStore>
            }
        };
        Ok(Self {
            index_id: index_id.clone(),
            table: Arc::new(table.clone()),
            embedding_dict: Arc::new(embedding_dict.clone()),
            docstore: Arc::new(ctx.docstore.clone()),
            graph_store,
            embedder,
        })
    }

    pub fn as_retriever(&self, brain: Brain, options: KgRetrieverOptions) -> KgRetriever {
        KgRetriever {
            brain,
            table: self.table.clone(),
            embedding_dict: self.embedding_dict.clone(),
            docstore: self.docstore.clone(),
            graph_store: self.graph_store.clone(),
            embedder: self.embedder.clone(),
            options,
        }
    }

    pub fn as_query_engine(
        &self,
        brain: Brain,
        options: KgRetrieverOptions,
        mode: ResponseMode,
    ) -> RetrieverQueryEngine {
        let retriever = self.as_retriever(brain.clone(), options);
        RetrieverQueryEngine::new(Arc::new(retriever), ResponseSynthesizer::new(brain, mode))
    }
}

/// How the knowledge graph retriever finds triplets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KgRetrieverMode {
    Keyword,
    Embedding,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct KgRetrieverOptions {
    pub mode: KgRetrieverMode,
    /// Triplets taken by embedding similarity.
    pub similarity_top_k: usize,
    /// Attach the text of the chunks the matched keywords came from.
    pub include_text: bool,
    pub max_keywords_per_query: usize,
    pub num_chunks_per_query: usize,
    pub graph_store_query_depth: usize,
    pub max_knowledge_sequence: usize,
}

impl Default for KgRetrieverOptions {
    fn default() -> Self {
        Self {
            mode: KgRetrieverMode::Keyword,
            similarity_top_k: 2,
            include_text: true,
            max_keywords_per_query: 10,
            num_chunks_per_query: 10,
            graph_store_query_depth: 2,
            max_knowledge_sequence: 30,
        }
    }
}

pub struct KgRetriever {
    brain: Brain,
    table: Arc<BTreeMap<String, BTreeSet<String>>>,
    embedding_dict: Arc<BTreeMap<String, Vec<f32>>>,
    docstore: Arc<DocStore>,
    graph_store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    options: KgRetrieverOptions,
}

impl KgRetriever {
    async fn query_keywords(&self, query: &str) -> Result<Vec<String>> {
        let prompt = prompts::render(
            prompts::QUERY_KEYWORD_EXTRACT,
            &[
                ("max_keywords", &self.options.max_keywords_per_query.to_string()),
                ("question", query),
            ],
        );
        let response = self.brain.predict(&prompt).await?;
        Ok(parse_keywords(&response))
    }

    /// Table keys equal (ignoring case) to one of `keywords`.
    fn matching_keys(&self, keywords: &[String]) -> Vec<String> {
        let wanted: BTreeSet<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        self.table
            .keys()
            .filter(|k| wanted.contains(&k.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Node ids ranked by how many matched keywords point at them.
    fn rank_chunks(&self, keys: &[String]) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for key in keys {
            if let Some(ids) = self.table.get(key) {
                for id in ids {
                    *counts.entry(id.as_str()).or_default() += 1;
                }
            }
        }
        let mut ranked: Vec<(String, usize)> =
            counts.into_iter().map(|(id, n)| (id.to_string(), n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.options.num_chunks_per_query);
        ranked
    }

    async fn similar_triplets(&self, query: &str) -> Result<Vec<String>> {
        if self.embedding_dict.is_empty() {
            warn!("Embedding retrieval requested but the index holds no triplet embeddings");
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await?;
        let mut scored: Vec<(&String, f32)> = self
            .embedding_dict
            .iter()
            .map(|(t, e)| (t, cosine_similarity(&query_embedding, e)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(self.options.similarity_top_k)
            .map(|(t, _)| t.clone())
            .collect())
    }
}

/// Subject of a rendered `(s, p, o)` triplet.
fn triplet_subject(rendered: &str) -> Option<&str> {
    rendered
        .strip_prefix('(')
        .and_then(|r| r.split(',').next())
        .map(str::trim)
}

#[async_trait]
impl Retriever for KgRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>> {
        let mut rel_texts: Vec<String> = Vec::new();
        let mut keys: Vec<String> = Vec::new();

        if matches!(
            self.options.mode,
            KgRetrieverMode::Keyword | KgRetrieverMode::Hybrid
        ) {
            let keywords = self.query_keywords(query).await?;
            keys = self.matching_keys(&keywords);
            debug!(?keywords, matched = keys.len(), "Query keywords");
            let rel_map = self
                .graph_store
                .get_rel_map(
                    &keys,
                    self.options.graph_store_query_depth,
                    self.options.max_knowledge_sequence,
                )
                .await?;
            for triplets in rel_map.values() {
                for t in triplets {
                    let text = t.to_string();
                    if !rel_texts.contains(&text) {
                        rel_texts.push(text);
                    }
                }
            }
        }

        if matches!(
            self.options.mode,
            KgRetrieverMode::Embedding | KgRetrieverMode::Hybrid
        ) {
            for text in self.similar_triplets(query).await? {
                if let Some(subject) = triplet_subject(&text)
                    && self.table.contains_key(subject)
                    && !keys.iter().any(|k| k == subject)
                {
                    keys.push(subject.to_string());
                }
                if !rel_texts.contains(&text) {
                    rel_texts.push(text);
                }
            }
        }

        let mut results = Vec::new();
        if self.options.include_text {
            for (id, hits) in self.rank_chunks(&keys) {
                if let Some(node) = self.docstore.get(&id) {
                    results.push(NodeWithScore::new(node.clone(), Some(hits as f32)));
                }
            }
        }

        if !rel_texts.is_empty() {
            rel_texts.truncate(self.options.max_knowledge_sequence);
            let mut node = Node::new(format!("{}\n{}", KG_SEQUENCE_HEADER, rel_texts.join("\n")));
            node.metadata
                .insert("kg_rel_texts".into(), rel_texts.join("; "));
            node.metadata.insert("kg_keywords".into(), keys.join(", "));
            node.excluded_llm_metadata_keys = vec!["kg_rel_texts".into(), "kg_keywords".into()];
            node.excluded_embed_metadata_keys = node.excluded_llm_metadata_keys.clone();
            results.push(NodeWithScore::new(node, Some(1000.0)));
        }

        info!(
            nodes = results.len(),
            triplets = rel_texts.len(),
            "Knowledge graph retrieval"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_parser::SentenceSplitter;
    use aisearch_core::{LocalEmbedder, MockLlmProvider};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_triplets_skips_malformed() {
        let response = "(Author, wrote, essays)\nnot a triplet\n(a, b)\n(\"Viaweb\", ACQUIRED BY, Yahoo)\n(, x, y)";
        assert_eq!(
            parse_triplets(response),
            vec![
                Triplet::new("Author", "Wrote", "Essays"),
                Triplet::new("Viaweb", "Acquired by", "Yahoo"),
            ]
        );
    }

    #[test]
    fn test_parse_triplets_drops_long_terms() {
        let long = "x".repeat(200);
        assert!(parse_triplets(&format!("({long}, is, long)")).is_empty());
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            parse_keywords("KEYWORDS: Viaweb, Paul Graham, 'Yahoo'"),
            vec!["Viaweb", "Paul Graham", "Paul", "Graham", "Yahoo"]
        );
    }

    async fn build(provider: Arc<MockLlmProvider>, include_embeddings: bool) -> KnowledgeGraphIndex {
        let brain = Brain::new(provider);
        let docs = vec![
            Document::new("The author founded Viaweb."),
            Document::new("Yahoo bought Viaweb in 1998."),
        ];
        KnowledgeGraphIndex::from_documents(
            &docs,
            &SentenceSplitter::new(512, 0).unwrap(),
            &brain,
            Arc::new(SimpleGraphStore::new()),
            Arc::new(LocalEmbedder::new(128)),
            &KgBuildOptions {
                max_triplets_per_chunk: 2,
                include_embeddings,
            },
        )
        .await
        .unwrap()
    }

    fn provider() -> Arc<MockLlmProvider> {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("(Author, founded, Viaweb)");
        provider.queue_text("(Yahoo, bought, Viaweb)\n(Viaweb, sold in, 1998)\n(Yahoo, is, company)");
        provider
    }

    #[tokio::test]
    async fn test_build_respects_triplet_limit() {
        let index = build(provider(), false).await;
        let triplets = index.graph_store().triplets().await.unwrap();
        assert_eq!(triplets.len(), 3);
        assert_eq!(index.keywords(), vec!["1998", "Author", "Viaweb", "Yahoo"]);
    }

    #[tokio::test]
    async fn test_keyword_retrieval_returns_text_and_sequence() {
        let provider = provider();
        let index = build(provider.clone(), false).await;
        provider.queue_text("KEYWORDS: viaweb");
        let retriever = index.as_retriever(Brain::new(provider.clone()), KgRetrieverOptions::default());
        let hits = retriever.retrieve("Who bought Viaweb?").await.unwrap();

        assert_eq!(hits.len(), 3, "two chunks plus the knowledge sequence");
        let sequence = hits.last().unwrap();
        assert!(sequence.text().starts_with(KG_SEQUENCE_HEADER));
        assert!(sequence.text().contains("(Viaweb, Sold in, 1998)"));
    }

    #[tokio::test]
    async fn test_hybrid_uses_embeddings_without_keyword_hits() {
        let provider = provider();
        let index = build(provider.clone(), true).await;
        provider.queue_text("KEYWORDS: nothing");
        let retriever = index.as_retriever(
            Brain::new(provider.clone()),
            KgRetrieverOptions {
                mode: KgRetrieverMode::Hybrid,
                similarity_top_k: 1,
                ..Default::default()
            },
        );
        let hits = retriever.retrieve("author founded").await.unwrap();
        let sequence = hits.last().unwrap();
        assert!(sequence.text().contains("(Author, Founded, Viaweb)"));
        assert!(hits.iter().any(|h| h.text() == "The author founded Viaweb."));
    }

    #[tokio::test]
    async fn test_persist_and_reload_with_graph() {
        let dir = TempDir::new().unwrap();
        let index = build(provider(), true).await;
        index.persist(dir.path()).await.unwrap();

        let loaded = KnowledgeGraphIndex::load(
            dir.path(),
            None,
            None,
            Arc::new(LocalEmbedder::new(128)),
        )
        .unwrap();
        assert_eq!(loaded.keywords(), index.keywords());
        assert_eq!(
            loaded.graph_store().triplets().await.unwrap(),
            index.graph_store().triplets().await.unwrap()
        );
    }
}
