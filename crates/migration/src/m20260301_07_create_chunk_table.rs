use sea_orm_migration::{
  prelude::*,
  schema::{custom, integer, pk_bigint, text, uuid},
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
          .table(Chunk::Table)
          .if_not_exists()
          .col(pk_bigint(Chunk::Id))
          .col(uuid(Chunk::MemoryUnitId))
          .col(integer(Chunk::ChunkIndex))
          .col(text(Chunk::Text))
          .col(custom(Chunk::Embedding, "vector(1024)"))
          .foreign_key(
            ForeignKey::create()
              .from(Chunk::Table, Chunk::MemoryUnitId)
              .to(MemoryUnit::Table, MemoryUnit::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE UNIQUE INDEX idx_chunk_unit_index ON chunk (memory_unit_id, chunk_index);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Chunk::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
enum MemoryUnit {
  Table,
  Id,
}

#[derive(Iden)]
pub enum Chunk {
  Table,
  Id,
  MemoryUnitId,
  ChunkIndex,
  Text,
  Embedding,
}
