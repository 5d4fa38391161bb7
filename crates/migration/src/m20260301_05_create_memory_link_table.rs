use sea_orm_migration::{
  prelude::*,
  schema::{double, pk_bigint, text, uuid, uuid_null},
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
          .table(MemoryLink::Table)
          .if_not_exists()
          .col(pk_bigint(MemoryLink::Id))
          .col(uuid(MemoryLink::Bank))
          .col(uuid(MemoryLink::FromUnit))
          .col(uuid(MemoryLink::ToUnit))
          .col(text(MemoryLink::LinkType))
          .col(double(MemoryLink::Weight).default(1.0))
          .col(uuid_null(MemoryLink::EntityId))
          .foreign_key(
            ForeignKey::create()
              .from(MemoryLink::Table, MemoryLink::FromUnit)
              .to(MemoryUnit::Table, MemoryUnit::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .from(MemoryLink::Table, MemoryLink::ToUnit)
              .to(MemoryUnit::Table, MemoryUnit::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    // Collapses NULL entity_id into a sentinel so the unique index covers
    // entity-typed and non-entity-typed links alike.
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE UNIQUE INDEX idx_memory_link_unique ON memory_link \
         (from_unit, to_unit, link_type, COALESCE(entity_id, '00000000-0000-0000-0000-000000000000'));",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_link_from ON memory_link (bank, from_unit);",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_link_to ON memory_link (bank, to_unit);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemoryLink::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
enum MemoryUnit {
  Table,
  Id,
}

#[derive(Iden)]
pub enum MemoryLink {
  Table,
  Id,
  Bank,
  FromUnit,
  ToUnit,
  LinkType,
  Weight,
  EntityId,
}
