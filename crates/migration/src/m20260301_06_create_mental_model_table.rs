use sea_orm_migration::{
  prelude::*,
  schema::{custom, integer, text, text_null, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid, uuid_null},
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
          .table(MentalModel::Table)
          .if_not_exists()
          .col(uuid(MentalModel::Id).primary_key())
          .col(uuid(MentalModel::Bank))
          .col(text(MentalModel::Name))
          .col(text_null(MentalModel::Description))
          .col(text(MentalModel::Content))
          .col(custom(MentalModel::Embedding, "vector(1024) NOT NULL"))
          .col(text_null(MentalModel::SourceQuery))
          .col(uuid_null(MentalModel::EntityId))
          .col(custom(MentalModel::SourceObservationIds, "UUID[] NOT NULL DEFAULT '{}'"))
          .col(custom(MentalModel::Tags, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(integer(MentalModel::MaxTokens).default(512))
          .col(custom(
            MentalModel::Trigger,
            "JSONB NOT NULL DEFAULT '{\"refresh_after_consolidation\": false}'",
          ))
          .col(timestamp_with_time_zone_null(MentalModel::LastRefreshedAt))
          .col(timestamp_with_time_zone(MentalModel::CreatedAt).default(Expr::current_timestamp()))
          .col(timestamp_with_time_zone(MentalModel::UpdatedAt).default(Expr::current_timestamp()))
          .foreign_key(
            ForeignKey::create()
              .from(MentalModel::Table, MentalModel::Bank)
              .to(Bank::Table, Bank::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .from(MentalModel::Table, MentalModel::EntityId)
              .to(MemoryEntity::Table, MemoryEntity::Id)
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
        "CREATE UNIQUE INDEX idx_mental_model_entity ON mental_model (bank, entity_id) WHERE entity_id IS NOT NULL;",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_mental_model_embedding ON mental_model USING hnsw (embedding vector_ip_ops);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MentalModel::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
enum Bank {
  Table,
  Id,
}

#[derive(Iden)]
enum MemoryEntity {
  #[sea_orm(iden = "entity")]
  Table,
  Id,
}

#[derive(Iden)]
pub enum MentalModel {
  Table,
  Id,
  Bank,
  Name,
  Description,
  Content,
  Embedding,
  SourceQuery,
  EntityId,
  SourceObservationIds,
  Tags,
  MaxTokens,
  Trigger,
  LastRefreshedAt,
  CreatedAt,
  UpdatedAt,
}
