use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum FactType {
  #[sea_orm(string_value = "world")]
  World,
  #[sea_orm(string_value = "experience")]
  Experience,
  #[sea_orm(string_value = "observation")]
  Observation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
  #[sea_orm(string_value = "event")]
  Event,
  #[sea_orm(string_value = "conversation")]
  Conversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
  #[sea_orm(string_value = "semantic")]
  Semantic,
  #[sea_orm(string_value = "temporal")]
  Temporal,
  #[sea_orm(string_value = "entity")]
  Entity,
  #[sea_orm(string_value = "causes")]
  Causes,
  #[sea_orm(string_value = "caused_by")]
  CausedBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
  #[sea_orm(string_value = "new")]
  New,
  #[sea_orm(string_value = "strengthening")]
  Strengthening,
  #[sea_orm(string_value = "stable")]
  Stable,
  #[sea_orm(string_value = "weakening")]
  Weakening,
  #[sea_orm(string_value = "stale")]
  Stale,
}
