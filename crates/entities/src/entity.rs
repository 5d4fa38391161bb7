use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Canonical reference to a person/thing, created during Retain's entity
/// resolution. `mention_count`/`last_seen` are bumped on every mention.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entity")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub bank: Uuid,
  pub canonical_name: String,
  pub entity_type: String,
  pub mention_count: i32,
  pub last_seen: DateTimeWithTimeZone,
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
