use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unit <-> Entity M:N join, created during Retain and duplicated onto
/// Observations by Consolidation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_entity")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub unit_id: Uuid,
  #[sea_orm(primary_key, auto_increment = false)]
  pub entity_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::memory_unit::Entity",
    from = "Column::UnitId",
    to = "super::memory_unit::Column::Id"
  )]
  MemoryUnit,
  #[sea_orm(
    belongs_to = "super::entity::Entity",
    from = "Column::EntityId",
    to = "super::entity::Column::Id"
  )]
  Entity,
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

impl ActiveModelBehavior for ActiveModel {}
