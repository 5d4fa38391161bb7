use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unordered entity pair seen in the same unit. `entity_id_1 < entity_id_2`
/// is enforced by every writer; at most one row per pair per bank.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entity_cooccurrence")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub entity_id_1: Uuid,
  #[sea_orm(primary_key, auto_increment = false)]
  pub entity_id_2: Uuid,
  pub bank: Uuid,
  pub cooccurrence_count: i32,
  pub last_cooccurred: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
