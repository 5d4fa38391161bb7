use anyhow::anyhow;
use plastmem_shared::{APP_ENV, AppError};
use serde::{Deserialize, Serialize};

/// One document's relevance against the query, as reported by the cross-encoder.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RankedDocument {
  pub index: usize,
  pub relevance_score: f32,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
  model: &'a str,
  query: &'a str,
  documents: &'a [String],
}

#[derive(Deserialize)]
struct RerankResponse {
  results: Vec<RankedDocument>,
}

/// Cross-encoder rerank: `(query, documents[]) -> ordered (index, relevance_score)[]`.
///
/// The reranker is treated as a black-box HTTP endpoint sharing the LLM
/// provider's base URL, per a Cohere-style `/v1/rerank` contract. Callers
/// fall back to the original (RRF) order on any failure.
pub async fn rerank(query: &str, documents: &[String]) -> Result<Vec<RankedDocument>, AppError> {
  if documents.is_empty() {
    return Ok(vec![]);
  }

  let client = reqwest::Client::new();
  let url = format!("{}/rerank", APP_ENV.llm_base_url.trim_end_matches('/'));

  let body = RerankRequest {
    model: &APP_ENV.reranker_model,
    query,
    documents,
  };

  let response = client
    .post(&url)
    .bearer_auth(&APP_ENV.llm_api_key)
    .json(&body)
    .send()
    .await?
    .error_for_status()?
    .json::<RerankResponse>()
    .await?;

  if response.results.iter().any(|r| r.index >= documents.len()) {
    return Err(AppError::new(anyhow!("rerank returned out-of-range index")));
  }

  Ok(response.results)
}
