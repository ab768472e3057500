//! Persistent storage for indexes.
//!
//! A persist directory holds one JSON file per store:
//!
//! - `docstore.json`: nodes by id (embeddings stripped)
//! - `index_store.json`: index structures by index id
//! - `vector_store.json`: node embeddings by node id
//! - `graph_store.json`: knowledge graph triplets (only for graph indexes)

use crate::error::{RagError, Result};
use crate::graph_stores::Triplet;
use crate::schema::Node;
use aisearch_core::cosine_similarity;
use aisearch_core::persistence::{atomic_write_json, load_json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DOCSTORE_FILE: &str = "docstore.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";
pub const VECTOR_STORE_FILE: &str = "vector_store.json";
pub const GRAPH_STORE_FILE: &str = "graph_store.json";

/// Nodes by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocStore {
    nodes: BTreeMap<String, Node>,
}

impl DocStore {
    pub fn add(&mut self, mut node: Node) {
        node.embedding = None;
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes for `ids`, in that order. Missing ids are an index error.
    pub fn get_many(&self, ids: &[String]) -> Result<Vec<Node>> {
        ids.iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| RagError::index(format!("node {} missing from docstore", id)))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn merge(&mut self, other: DocStore) {
        self.nodes.extend(other.nodes);
    }

    fn retain(&mut self, keep: &BTreeSet<&str>) {
        self.nodes.retain(|id, _| keep.contains(id.as_str()));
    }
}

/// Serialized form of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexStruct {
    Vector {
        index_id: String,
        node_ids: Vec<String>,
    },
    List {
        index_id: String,
        node_ids: Vec<String>,
    },
    KnowledgeGraph {
        index_id: String,
        /// Keyword (triplet subject or object) to the ids of nodes it came from.
        table: BTreeMap<String, BTreeSet<String>>,
        /// Rendered triplet to its embedding.
        #[serde(default)]
        embedding_dict: BTreeMap<String, Vec<f32>>,
    },
}

impl IndexStruct {
    pub fn index_id(&self) -> &str {
        match self {
            IndexStruct::Vector { index_id, .. }
            | IndexStruct::List { index_id, .. }
            | IndexStruct::KnowledgeGraph { index_id, .. } => index_id,
        }
    }

    /// Ids of the docstore nodes this index can reach.
    pub fn node_ids(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            IndexStruct::Vector { node_ids, .. } | IndexStruct::List { node_ids, .. } => {
                Box::new(node_ids.iter().map(String::as_str))
            }
            IndexStruct::KnowledgeGraph { table, .. } => {
                Box::new(table.values().flatten().map(String::as_str))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IndexStruct::Vector { .. } => "vector",
            IndexStruct::List { .. } => "list",
            IndexStruct::KnowledgeGraph { .. } => "knowledge_graph",
        }
    }
}

/// Index structures by index id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStore {
    structs: BTreeMap<String, IndexStruct>,
}

impl IndexStore {
    pub fn add(&mut self, index: IndexStruct) {
        self.structs.insert(index.index_id().to_string(), index);
    }

    pub fn get(&self, index_id: &str) -> Option<&IndexStruct> {
        self.structs.get(index_id)
    }

    pub fn index_ids(&self) -> Vec<String> {
        self.structs.keys().cloned().collect()
    }
}

/// In-memory embedding store with exhaustive cosine search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleVectorStore {
    embeddings: BTreeMap<String, Vec<f32>>,
}

impl SimpleVectorStore {
    pub fn add(&mut self, node_id: impl Into<String>, embedding: Vec<f32>) {
        self.embeddings.insert(node_id.into(), embedding);
    }

    pub fn get(&self, node_id: &str) -> Option<&Vec<f32>> {
        self.embeddings.get(node_id)
    }

    /// The `top_k` most similar ids among `candidates`, best first.
    pub fn query(&self, query: &[f32], top_k: usize, candidates: &[String]) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = candidates
            .iter()
            .filter_map(|id| {
                self.embeddings
                    .get(id)
                    .map(|e| (id.clone(), cosine_similarity(query, e)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    fn merge(&mut self, other: SimpleVectorStore) {
        self.embeddings.extend(other.embeddings);
    }

    fn retain(&mut self, keep: &BTreeSet<&str>) {
        self.embeddings.retain(|id, _| keep.contains(id.as_str()));
    }
}

/// Persisted triplets of an in-process graph store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    pub triplets: Vec<Triplet>,
}

/// The set of stores an index is persisted into.
#[derive(Debug, Clone, Default)]
pub struct StorageContext {
    pub docstore: DocStore,
    pub index_store: IndexStore,
    pub vector_store: SimpleVectorStore,
    pub graph_store: Option<GraphData>,
}

impl StorageContext {
    /// Load every store from `dir`. The directory must exist and contain an index store.
    pub fn from_persist_dir(dir: &Path) -> Result<Self> {
        let index_path = dir.join(INDEX_STORE_FILE);
        if !index_path.exists() {
            return Err(RagError::storage(format!(
                "no {} in {}; build the index first",
                INDEX_STORE_FILE,
                dir.display()
            )));
        }
        let index_store = load_json(&index_path)?.unwrap_or_default();
        let docstore = load_json(&dir.join(DOCSTORE_FILE))?.unwrap_or_default();
        let vector_store = load_json(&dir.join(VECTOR_STORE_FILE))?.unwrap_or_default();
        let graph_store = load_json(&dir.join(GRAPH_STORE_FILE))?;
        Ok(Self {
            docstore,
            index_store,
            vector_store,
            graph_store,
        })
    }

    /// Load `dir` when it holds stores, else start empty.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        if dir.join(INDEX_STORE_FILE).exists() {
            Self::from_persist_dir(dir)
        } else {
            Ok(Self::default())
        }
    }

    /// Add another context's contents (later wins on id clashes).
    pub fn merge(&mut self, other: StorageContext) {
        self.docstore.merge(other.docstore);
        for (_, index) in other.index_store.structs {
            self.index_store.add(index);
        }
        self.vector_store.merge(other.vector_store);
        if other.graph_store.is_some() {
            self.graph_store = other.graph_store;
        }
    }

    /// Drop nodes and embeddings no index refers to. Returns how many nodes went.
    pub fn prune_unreferenced(&mut self) -> usize {
        let before = self.docstore.len();
        let keep: BTreeSet<&str> = self
            .index_store
            .structs
            .values()
            .flat_map(IndexStruct::node_ids)
            .collect();
        self.docstore.retain(&keep);
        self.vector_store.retain(&keep);
        before - self.docstore.len()
    }

    /// Write every store to `dir`, creating it if needed.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        atomic_write_json(&dir.join(DOCSTORE_FILE), &self.docstore)?;
        atomic_write_json(&dir.join(INDEX_STORE_FILE), &self.index_store)?;
        atomic_write_json(&dir.join(VECTOR_STORE_FILE), &self.vector_store)?;
        if let Some(graph) = &self.graph_store {
            atomic_write_json(&dir.join(GRAPH_STORE_FILE), graph)?;
        }
        info!(
            dir = %dir.display(),
            nodes = self.docstore.len(),
            indexes = self.index_store.structs.len(),
            "Persisted storage context"
        );
        Ok(())
    }

    /// The index struct for `index_id`, or the only one when `index_id` is `None`.
    pub fn index_struct(&self, index_id: Option<&str>) -> Result<&IndexStruct> {
        match index_id {
            Some(id) => self
                .index_store
                .get(id)
                .ok_or_else(|| RagError::index(format!("no index with id '{}'", id))),
            None => {
                let mut all = self.index_store.structs.values();
                match (all.next(), all.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(RagError::index("storage holds no index")),
                    _ => Err(RagError::index(
                        "storage holds several indexes; an index id is required",
                    )),
                }
            }
        }
    }
}

/// Merge `context` into whatever is already persisted at `dir` and write it
/// back. An index rebuilt under an existing id replaces the old one, and the
/// nodes only the old one used are dropped.
pub fn persist_merged(dir: &Path, context: StorageContext) -> Result<PathBuf> {
    let mut existing = StorageContext::load_or_default(dir)?;
    existing.merge(context);
    let pruned = existing.prune_unreferenced();
    if pruned > 0 {
        debug!(dir = %dir.display(), pruned, "Dropped unreferenced nodes");
    }
    existing.persist(dir)?;
    Ok(dir.to_path_buf())
}
