use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Optional sub-unit detail, created externally and read by Reflect's
/// `expand` tool.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunk")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub memory_unit_id: Uuid,
  pub chunk_index: i32,
  pub text: String,

  #[sea_orm(column_type = "Custom(\"vector(1024)\".to_owned())")]
  pub embedding: Option<PgVector>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::memory_unit::Entity",
    from = "Column::MemoryUnitId",
    to = "super::memory_unit::Column::Id"
  )]
  MemoryUnit,
}

impl Related<super::memory_unit::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::MemoryUnit.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
