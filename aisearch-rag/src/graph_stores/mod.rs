//! Graph stores for knowledge graph indexes.

pub mod neo4j;
pub mod simple;

pub use neo4j::{Neo4jConfig, Neo4jGraphStore};
pub use simple::SimpleGraphStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A `(subject, relation, object)` fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.relation, self.object)
    }
}

/// Storage for knowledge graph triplets.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Outgoing `(relation, object)` pairs of `subject`.
    async fn get(&self, subject: &str) -> Result<Vec<(String, String)>>;

    async fn upsert_triplet(&self, triplet: &Triplet) -> Result<()>;

    async fn delete(&self, triplet: &Triplet) -> Result<()>;

    /// Triplets reachable from each subject within `depth` hops, at most
    /// `limit` per subject.
    async fn get_rel_map(
        &self,
        subjects: &[String],
        depth: usize,
        limit: usize,
    ) -> Result<BTreeMap<String, Vec<Triplet>>>;

    /// Every stored triplet.
    async fn triplets(&self) -> Result<Vec<Triplet>>;

    fn name(&self) -> &str;
}
