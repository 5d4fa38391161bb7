use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::{FactKind, FactType, FreshnessStatus};

/// Atomic memory record: either a raw fact written by Retain or an
/// Observation synthesised by Consolidation. Text/embedding/proof_count/
/// source_memory_ids are mutated only by the consolidation update path.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memory_unit")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub bank: Uuid,

  pub text: String,
  pub context: Option<String>,

  pub fact_type: FactType,
  pub fact_kind: Option<FactKind>,

  pub what: Option<String>,
  pub who: Vec<String>,
  pub when_desc: Option<String>,
  pub where_desc: Option<String>,
  pub why_desc: Option<String>,

  pub event_date: Option<DateTimeWithTimeZone>,
  pub occurred_start: Option<DateTimeWithTimeZone>,
  pub occurred_end: Option<DateTimeWithTimeZone>,

  pub mentioned_at: DateTimeWithTimeZone,
  pub created_at: DateTimeWithTimeZone,

  #[sea_orm(column_type = "Custom(\"vector(1024)\".to_owned())")]
  pub embedding: PgVector,

  pub tags: Vec<String>,

  pub consolidated_at: Option<DateTimeWithTimeZone>,

  /// Non-empty only when `fact_type == Observation`; `proof_count == len(source_memory_ids)`.
  pub proof_count: i32,
  pub source_memory_ids: Vec<Uuid>,
  /// JSONB array of `{previous_text, changed_at, reason, source_memory_id}`.
  pub history: serde_json::Value,

  pub freshness_status: Option<FreshnessStatus>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::bank::Entity",
    from = "Column::Bank",
    to = "super::bank::Column::Id"
  )]
  Bank,
  #[sea_orm(has_many = "super::unit_entity::Entity")]
  UnitEntity,
}

impl Related<super::bank::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Bank.def()
  }
}

impl Related<super::unit_entity::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::UnitEntity.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
