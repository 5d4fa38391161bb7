use sea_orm_migration::{
  prelude::*,
  schema::{integer, string, timestamp_with_time_zone, uuid},
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Entity::Table)
          .if_not_exists()
          .col(uuid(Entity::Id).primary_key())
          .col(uuid(Entity::Bank))
          .col(string(Entity::CanonicalName))
          .col(string(Entity::EntityType))
          .col(integer(Entity::MentionCount).default(1))
          .col(timestamp_with_time_zone(Entity::LastSeen).default(Expr::current_timestamp()))
          .foreign_key(
            ForeignKey::create()
              .from(Entity::Table, Entity::Bank)
              .to(Bank::Table, Bank::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(UnitEntity::Table)
          .if_not_exists()
          .col(uuid(UnitEntity::UnitId))
          .col(uuid(UnitEntity::EntityId))
          .primary_key(
            Index::create()
              .col(UnitEntity::UnitId)
              .col(UnitEntity::EntityId),
          )
          .foreign_key(
            ForeignKey::create()
              .from(UnitEntity::Table, UnitEntity::UnitId)
              .to(MemoryUnit::Table, MemoryUnit::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .from(UnitEntity::Table, UnitEntity::EntityId)
              .to(Entity::Table, Entity::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(EntityCooccurrence::Table)
          .if_not_exists()
          .col(uuid(EntityCooccurrence::EntityId1))
          .col(uuid(EntityCooccurrence::EntityId2))
          .col(uuid(EntityCooccurrence::Bank))
          .col(integer(EntityCooccurrence::CooccurrenceCount).default(1))
          .col(timestamp_with_time_zone(EntityCooccurrence::LastCooccurred).default(Expr::current_timestamp()))
          .primary_key(
            Index::create()
              .col(EntityCooccurrence::EntityId1)
              .col(EntityCooccurrence::EntityId2),
          )
          .foreign_key(
            ForeignKey::create()
              .from(EntityCooccurrence::Table, EntityCooccurrence::EntityId1)
              .to(Entity::Table, Entity::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .from(EntityCooccurrence::Table, EntityCooccurrence::EntityId2)
              .to(Entity::Table, Entity::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    // Backs the ON CONFLICT (bank, LOWER(canonical_name)) upsert used by entity resolution.
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE UNIQUE INDEX idx_entity_bank_name ON entity (bank, LOWER(canonical_name));",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_unit_entity_entity ON unit_entity (entity_id);",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "ALTER TABLE entity_cooccurrence ADD CONSTRAINT entity_cooccurrence_ordered_pair \
         CHECK (entity_id_1 < entity_id_2);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(EntityCooccurrence::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(UnitEntity::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(Entity::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
enum Bank {
  Table,
  Id,
}

#[derive(Iden)]
enum MemoryUnit {
  Table,
  Id,
}

#[derive(Iden)]
pub enum Entity {
  Table,
  Id,
  Bank,
  CanonicalName,
  EntityType,
  MentionCount,
  LastSeen,
}

#[derive(Iden)]
pub enum UnitEntity {
  Table,
  UnitId,
  EntityId,
}

#[derive(Iden)]
pub enum EntityCooccurrence {
  Table,
  EntityId1,
  EntityId2,
  Bank,
  CooccurrenceCount,
  LastCooccurred,
}
