use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use opscout_core::config::KnowledgeConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::KnowledgeQuery;
use opscout_core::types::Record;

/// Knowledge gateway over the Neo4j HTTP transactional endpoint.
///
/// Every query runs in its own auto-committed transaction; the full result
/// set is materialized before returning.
pub struct Neo4jClient {
    http: reqwest::Client,
    endpoint: String,
    user: Option<String>,
    password: Option<String>,
}

impl Neo4jClient {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: commit_endpoint(&config.url, &config.database),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }
}

fn commit_endpoint(url: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", url.trim_end_matches('/'), database)
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize, Debug)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<RowData>,
}

#[derive(Deserialize, Debug)]
struct RowData {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Convert a transactional-endpoint response body into keyed records.
fn into_records(response: CommitResponse) -> Result<Vec<Record>> {
    if let Some(err) = response.errors.first() {
        return Err(OpscoutError::KnowledgeQuery(format!(
            "{}: {}",
            err.code, err.message
        )));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    Ok(result
        .data
        .into_iter()
        .map(|data| {
            result
                .columns
                .iter()
                .cloned()
                .zip(data.row)
                .collect::<Record>()
        })
        .collect())
}

impl KnowledgeQuery for Neo4jClient {
    fn query(&self, cypher: &str, params: serde_json::Value) -> BoxFuture<'_, Result<Vec<Record>>> {
        let body = serde_json::to_value(CommitRequest {
            statements: vec![Statement {
                statement: cypher,
                parameters: params,
            }],
        });

        Box::pin(async move {
            let body = body?;
            let mut req = self.http.post(&self.endpoint).json(&body);
            if let Some(ref user) = self.user {
                req = req.basic_auth(user, self.password.as_deref());
            }

            let response = req
                .send()
                .await
                .map_err(|e| OpscoutError::KnowledgeQuery(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(OpscoutError::KnowledgeQuery(format!(
                    "HTTP {}: {}",
                    status, text
                )));
            }

            let parsed: CommitResponse = response
                .json()
                .await
                .map_err(|e| OpscoutError::KnowledgeQuery(e.to_string()))?;

            let records = into_records(parsed)?;
            debug!(rows = records.len(), "Knowledge query complete");
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_endpoint() {
        assert_eq!(
            commit_endpoint("http://localhost:7474/", "neo4j"),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn test_into_records_zips_columns() {
        let response: CommitResponse = serde_json::from_value(serde_json::json!({
            "results": [{
                "columns": ["year", "patent_count"],
                "data": [
                    {"row": ["2019", 3], "meta": [null, null]},
                    {"row": ["2020", 5], "meta": [null, null]}
                ]
            }],
            "errors": []
        }))
        .unwrap();

        let records = into_records(response).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["year"], "2019");
        assert_eq!(records[1]["patent_count"], 5);
    }

    #[test]
    fn test_into_records_surfaces_errors() {
        let response: CommitResponse = serde_json::from_value(serde_json::json!({
            "results": [],
            "errors": [{
                "code": "Neo.ClientError.Statement.SyntaxError",
                "message": "Invalid input"
            }]
        }))
        .unwrap();

        let err = into_records(response).unwrap_err();
        assert!(err.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_into_records_empty() {
        let response: CommitResponse =
            serde_json::from_value(serde_json::json!({"results": [], "errors": []})).unwrap();
        assert!(into_records(response).unwrap().is_empty());
    }
}
