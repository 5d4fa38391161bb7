use std::env;
use std::sync::LazyLock;

fn required_env(key: &str) -> String {
  env::var(key).unwrap_or_else(|_| panic!("env {key} must be set"))
}

fn optional_env(key: &str, default: &str) -> String {
  env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Consolidation interval floor, per the spec's operational knob contract.
const MIN_CONSOLIDATION_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_CONSOLIDATION_INTERVAL_SECONDS: u64 = 300;

pub struct AppEnv {
  pub database_url: String,

  pub llm_base_url: String,
  pub llm_api_key: String,
  pub extractor_model: String,
  pub consolidator_model: String,
  pub reflector_model: String,
  pub embedding_model: String,
  pub reranker_model: String,

  /// Seconds between consolidation sweeps. Clamped to a 10s floor.
  pub consolidation_interval_seconds: u64,
}

impl AppEnv {
  fn new() -> Self {
    dotenvy::dotenv().ok();

    let consolidation_interval_seconds = optional_env("CONSOLIDATION_INTERVAL_SECONDS", "300")
      .parse::<u64>()
      .unwrap_or(DEFAULT_CONSOLIDATION_INTERVAL_SECONDS)
      .max(MIN_CONSOLIDATION_INTERVAL_SECONDS);

    Self {
      database_url: required_env("DATABASE_URL"),

      llm_base_url: required_env("LLM_BASE_URL"),
      llm_api_key: required_env("LLM_API_KEY"),
      extractor_model: optional_env("EXTRACTOR_MODEL", "gpt-4o-mini"),
      consolidator_model: optional_env("CONSOLIDATOR_MODEL", "gpt-4o-mini"),
      reflector_model: optional_env("REFLECTOR_MODEL", "gpt-4o"),
      embedding_model: required_env("EMBEDDING_MODEL"),
      reranker_model: optional_env("RERANKER_MODEL", "rerank-multilingual-v3.0"),

      consolidation_interval_seconds,
    }
  }
}

pub static APP_ENV: LazyLock<AppEnv> = LazyLock::new(AppEnv::new);
