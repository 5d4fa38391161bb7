use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::LinkType;

/// Directed typed edge between two units of the same bank. Never updated
/// after insert; duplicate inserts are `ON CONFLICT DO NOTHING`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memory_link")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub bank: Uuid,
  pub from_unit: Uuid,
  pub to_unit: Uuid,
  pub link_type: LinkType,
  pub weight: f64,
  pub entity_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
