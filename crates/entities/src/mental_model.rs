use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A curated free-text summary with its own embedding and refresh trigger.
/// Unique per `(bank, entity_id)` when `entity_id` is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mental_model")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub bank: Uuid,
  pub name: String,
  pub description: Option<String>,
  pub content: String,

  #[sea_orm(column_type = "Custom(\"vector(1024)\".to_owned())")]
  pub embedding: PgVector,

  pub source_query: Option<String>,
  pub entity_id: Option<Uuid>,
  pub source_observation_ids: Vec<Uuid>,
  pub tags: Vec<String>,
  pub max_tokens: i32,
  /// `{refresh_after_consolidation: bool}`.
  pub trigger: serde_json::Value,
  pub last_refreshed_at: Option<DateTimeWithTimeZone>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::bank::Entity",
    from = "Column::Bank",
    to = "super::bank::Column::Id"
  )]
  Bank,
}

impl Related<super::bank::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Bank.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
