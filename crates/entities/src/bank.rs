use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A tenant of memory: one agent/user's isolated scope. Created externally;
/// cascades on delete to every row that names it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bank")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub mission: Option<String>,
  /// Three soft personality axes, each 1..=5. Only ends (>=4, <=2) emit
  /// disposition guidance into the Reflect prompt.
  pub disposition: Vec<i16>,
  /// Absolute per-bank rules, in priority order.
  pub directives: Vec<String>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::memory_unit::Entity")]
  MemoryUnit,
  #[sea_orm(has_many = "super::entity::Entity")]
  Entity,
  #[sea_orm(has_many = "super::mental_model::Entity")]
  MentalModel,
}

impl Related<super::memory_unit::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::MemoryUnit.def()
  }
}

impl Related<super::entity::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Entity.def()
  }
}

impl Related<super::mental_model::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::MentalModel.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
