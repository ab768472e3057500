//! Neo4j-backed graph store, spoken to over the HTTP transactional Cypher API.

use super::{GraphStore, Triplet};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info};

const NODE_LABEL: &str = "Entity";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// HTTP endpoint, e.g. `http://localhost:7474`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// A Cypher statement with parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub parameters: Value,
}

impl Statement {
    fn new(cypher: impl Into<String>, parameters: Value) -> Self {
        Self {
            cypher: cypher.into(),
            parameters,
        }
    }
}

/// Relation names become relationship types: upper case, spaces to underscores,
/// anything else outside `[A-Z0-9_]` dropped.
pub fn relation_type(relation: &str) -> String {
    let upper: String = relation
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if upper.is_empty() {
        "RELATED_TO".to_string()
    } else {
        upper
    }
}

pub(crate) fn constraint_statement() -> Statement {
    Statement::new(
        format!("CREATE CONSTRAINT IF NOT EXISTS FOR (n:{NODE_LABEL}) REQUIRE n.id IS UNIQUE"),
        json!({}),
    )
}

pub(crate) fn get_statement(subject: &str) -> Statement {
    Statement::new(
        format!(
            "MATCH (n1:{NODE_LABEL})-[r]->(n2:{NODE_LABEL}) WHERE n1.id = $subj RETURN type(r), n2.id"
        ),
        json!({ "subj": subject }),
    )
}

pub(crate) fn upsert_statement(triplet: &Triplet) -> Statement {
    Statement::new(
        format!(
            "MERGE (n1:{NODE_LABEL} {{id: $subj}}) MERGE (n2:{NODE_LABEL} {{id: $obj}}) MERGE (n1)-[:`{}`]->(n2)",
            relation_type(&triplet.relation)
        ),
        json!({ "subj": triplet.subject, "obj": triplet.object }),
    )
}

pub(crate) fn delete_statements(triplet: &Triplet) -> Vec<Statement> {
    let params = json!({ "subj": triplet.subject, "obj": triplet.object });
    vec![
        Statement::new(
            format!(
                "MATCH (n1:{NODE_LABEL})-[r:`{}`]->(n2:{NODE_LABEL}) WHERE n1.id = $subj AND n2.id = $obj DELETE r",
                relation_type(&triplet.relation)
            ),
            params.clone(),
        ),
        Statement::new(
            format!(
                "MATCH (n:{NODE_LABEL}) WHERE n.id IN [$subj, $obj] AND NOT (n)--() DELETE n"
            ),
            params,
        ),
    ]
}

pub(crate) fn rel_map_statement(subjects: &[String], depth: usize, limit: usize) -> Statement {
    Statement::new(
        format!(
            "MATCH p=(n1:{NODE_LABEL})-[*1..{}]->() WHERE n1.id IN $subjs \
             UNWIND relationships(p) AS rel \
             WITH DISTINCT n1.id AS subj, startNode(rel).id AS s, type(rel) AS r, endNode(rel).id AS o \
             RETURN subj, s, r, o LIMIT $limit",
            depth.max(1)
        ),
        json!({ "subjs": subjects, "limit": limit * subjects.len().max(1) }),
    )
}

pub(crate) fn all_triplets_statement() -> Statement {
    Statement::new(
        format!("MATCH (n1:{NODE_LABEL})-[r]->(n2:{NODE_LABEL}) RETURN n1.id, type(r), n2.id"),
        json!({}),
    )
}

/// Rows of the first result, each a list of column values, or the first error.
pub(crate) fn parse_rows(body: &Value) -> Result<Vec<Vec<Value>>> {
    if let Some(err) = body["errors"].as_array().and_then(|e| e.first()) {
        return Err(RagError::graph_store(format!(
            "{}: {}",
            err["code"].as_str().unwrap_or("Neo.Unknown"),
            err["message"].as_str().unwrap_or("unknown error")
        )));
    }
    let rows = body["results"]
        .as_array()
        .and_then(|r| r.first())
        .and_then(|r| r["data"].as_array())
        .map(|data| {
            data.iter()
                .filter_map(|d| d["row"].as_array().cloned())
                .collect()
        })
        .unwrap_or_default();
    Ok(rows)
}

fn row_strings(row: &[Value]) -> Vec<String> {
    row.iter()
        .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
        .collect()
}

/// Graph store persisting triplets in a Neo4j database.
pub struct Neo4jGraphStore {
    client: reqwest::Client,
    config: Neo4jConfig,
}

impl Neo4jGraphStore {
    /// Connect and make sure the entity id constraint exists.
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        let store = Self {
            client: reqwest::Client::new(),
            config,
        };
        store.run(&[constraint_statement()]).await?;
        info!(url = %store.config.url, database = %store.config.database, "Connected to Neo4j");
        Ok(store)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }

    /// Run statements in one transaction and return the rows of the last one.
    async fn run(&self, statements: &[Statement]) -> Result<Vec<Vec<Value>>> {
        let body = json!({
            "statements": statements
                .iter()
                .map(|s| json!({ "statement": s.cypher, "parameters": s.parameters }))
                .collect::<Vec<_>>()
        });
        debug!(statements = statements.len(), "Running Cypher");
        let resp = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let json: Value = resp.json().await?;
        if !status.is_success() {
            return Err(RagError::graph_store(format!("HTTP {}: {}", status, json)));
        }
        if let Some(err) = json["errors"].as_array().and_then(|e| e.first()) {
            return Err(RagError::graph_store(err.to_string()));
        }
        let last = json["results"]
            .as_array()
            .and_then(|r| r.last())
            .cloned()
            .unwrap_or(Value::Null);
        parse_rows(&json!({ "results": [last], "errors": [] }))
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn get(&self, subject: &str) -> Result<Vec<(String, String)>> {
        let rows = self.run(&[get_statement(subject)]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row_strings(row).as_slice() {
                [rel, obj] => Some((rel.clone(), obj.clone())),
                _ => None,
            })
            .collect())
    }

    async fn upsert_triplet(&self, triplet: &Triplet) -> Result<()> {
        self.run(&[upsert_statement(triplet)]).await?;
        Ok(())
    }

    async fn delete(&self, triplet: &Triplet) -> Result<()> {
        self.run(&delete_statements(triplet)).await?;
        Ok(())
    }

    async fn get_rel_map(
        &self,
        subjects: &[String],
        depth: usize,
        limit: usize,
    ) -> Result<BTreeMap<String, Vec<Triplet>>> {
        if subjects.is_empty() || depth == 0 {
            return Ok(BTreeMap::new());
        }
        let rows = self
            .run(&[rel_map_statement(subjects, depth, limit)])
            .await?;
        let mut map: BTreeMap<String, Vec<Triplet>> = BTreeMap::new();
        for row in rows {
            if let [subj, s, r, o] = row_strings(&row).as_slice() {
                let entry = map.entry(subj.clone()).or_default();
                if entry.len() < limit {
                    entry.push(Triplet::new(s.clone(), r.clone(), o.clone()));
                }
            }
        }
        Ok(map)
    }

    async fn triplets(&self) -> Result<Vec<Triplet>> {
        let rows = self.run(&[all_triplets_statement()]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row_strings(row).as_slice() {
                [s, r, o] => Some(Triplet::new(s.clone(), r.clone(), o.clone())),
                _ => None,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "neo4j"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type() {
        assert_eq!(relation_type("worked at"), "WORKED_AT");
        assert_eq!(relation_type("is mother-of"), "IS_MOTHER_OF");
        assert_eq!(relation_type("`drop`"), "DROP");
        assert_eq!(relation_type("  "), "RELATED_TO");
    }

    #[test]
    fn test_upsert_statement_uses_parameters() {
        let stmt = upsert_statement(&Triplet::new("Author", "worked at", "Y Combinator"));
        assert!(stmt.cypher.contains("MERGE (n1:Entity {id: $subj})"));
        assert!(stmt.cypher.contains("-[:`WORKED_AT`]->"));
        assert_eq!(stmt.parameters["obj"], "Y Combinator");
    }

    #[test]
    fn test_rel_map_statement_depth() {
        let stmt = rel_map_statement(&["Author".to_string()], 2, 30);
        assert!(stmt.cypher.contains("[*1..2]"));
        assert_eq!(stmt.parameters["limit"], 30);
    }

    #[test]
    fn test_parse_rows_and_errors() {
        let ok = json!({
            "results": [{ "columns": ["type(r)", "n2.id"], "data": [{ "row": ["WROTE", "Essays"] }] }],
            "errors": []
        });
        let rows = parse_rows(&ok).unwrap();
        assert_eq!(row_strings(&rows[0]), vec!["WROTE", "Essays"]);

        let err = json!({
            "results": [],
            "errors": [{ "code": "Neo.ClientError.Security.Unauthorized", "message": "bad credentials" }]
        });
        let e = parse_rows(&err).unwrap_err();
        assert!(e.to_string().contains("Unauthorized"));
    }
}
