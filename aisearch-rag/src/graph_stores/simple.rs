//! In-process graph store backed by a petgraph directed graph.

use super::{GraphStore, Triplet};
use crate::error::Result;
use crate::storage::GraphData;
use async_trait::async_trait;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    graph: StableDiGraph<String, String>,
    index: HashMap<String, NodeIndex>,
}

impl Inner {
    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn outgoing(&self, subject: &str) -> Vec<(String, String)> {
        let Some(idx) = self.index.get(subject) else {
            return Vec::new();
        };
        let mut rels: Vec<(String, String)> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| (e.weight().clone(), self.graph[e.target()].clone()))
            .collect();
        rels.sort();
        rels
    }

    fn rel_map(&self, subject: &str, depth: usize, limit: usize, out: &mut Vec<Triplet>) {
        if depth == 0 {
            return;
        }
        for (relation, object) in self.outgoing(subject).into_iter().take(limit) {
            let triplet = Triplet::new(subject, relation, object.clone());
            if out.contains(&triplet) {
                continue;
            }
            out.push(triplet);
            self.rel_map(&object, depth - 1, limit, out);
        }
    }
}

/// Graph store kept in memory and persisted as a triplet list.
#[derive(Debug, Default)]
pub struct SimpleGraphStore {
    inner: RwLock<Inner>,
}

impl SimpleGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: &GraphData) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            for t in &data.triplets {
                let s = inner.node(&t.subject);
                let o = inner.node(&t.object);
                inner.graph.add_edge(s, o, t.relation.clone());
            }
        }
        store
    }

    pub fn to_data(&self) -> GraphData {
        GraphData {
            triplets: self.all_triplets(),
        }
    }

    fn all_triplets(&self) -> Vec<Triplet> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut triplets: Vec<Triplet> = inner
            .graph
            .edge_references()
            .map(|e| {
                Triplet::new(
                    inner.graph[e.source()].clone(),
                    e.weight().clone(),
                    inner.graph[e.target()].clone(),
                )
            })
            .collect();
        triplets.sort();
        triplets
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().map(|i| i.graph.node_count()).unwrap_or(0)
    }
}

fn poisoned() -> crate::error::RagError {
    crate::error::RagError::graph_store("graph lock poisoned")
}

#[async_trait]
impl GraphStore for SimpleGraphStore {
    async fn get(&self, subject: &str) -> Result<Vec<(String, String)>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.outgoing(subject))
    }

    async fn upsert_triplet(&self, triplet: &Triplet) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let s = inner.node(&triplet.subject);
        let o = inner.node(&triplet.object);
        let exists = inner
            .graph
            .edges_directed(s, Direction::Outgoing)
            .any(|e| e.target() == o && e.weight() == &triplet.relation);
        if !exists {
            inner.graph.add_edge(s, o, triplet.relation.clone());
        }
        Ok(())
    }

    async fn delete(&self, triplet: &Triplet) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let (Some(&s), Some(&o)) = (
            inner.index.get(&triplet.subject),
            inner.index.get(&triplet.object),
        ) else {
            return Ok(());
        };
        let edge = inner
            .graph
            .edges_directed(s, Direction::Outgoing)
            .find(|e| e.target() == o && e.weight() == &triplet.relation)
            .map(|e| e.id());
        if let Some(edge) = edge {
            inner.graph.remove_edge(edge);
        }
        // Entities left without any relation disappear.
        for idx in [s, o] {
            let isolated = inner.graph.neighbors_undirected(idx).next().is_none();
            if isolated && let Some(name) = inner.graph.remove_node(idx) {
                inner.index.remove(&name);
            }
        }
        Ok(())
    }

    async fn get_rel_map(
        &self,
        subjects: &[String],
        depth: usize,
        limit: usize,
    ) -> Result<BTreeMap<String, Vec<Triplet>>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut map = BTreeMap::new();
        for subject in subjects {
            let mut triplets = Vec::new();
            inner.rel_map(subject, depth, limit, &mut triplets);
            if !triplets.is_empty() {
                map.insert(subject.clone(), triplets);
            }
        }
        Ok(map)
    }

    async fn triplets(&self) -> Result<Vec<Triplet>> {
        Ok(self.all_triplets())
    }

    fn name(&self) -> &str {
        "simple"
    }
}
