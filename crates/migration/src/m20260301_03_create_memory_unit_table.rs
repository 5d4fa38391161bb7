use sea_orm_migration::{
  prelude::*,
  schema::{custom, integer, text, text_null, timestamp_with_time_zone, timestamp_with_time_zone_null, uuid},
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
          .table(MemoryUnit::Table)
          .if_not_exists()
          .col(uuid(MemoryUnit::Id).primary_key())
          .col(uuid(MemoryUnit::Bank))
          .col(text(MemoryUnit::Text))
          .col(text_null(MemoryUnit::Context))
          .col(text(MemoryUnit::FactType))
          .col(text_null(MemoryUnit::FactKind))
          .col(text_null(MemoryUnit::What))
          .col(custom(MemoryUnit::Who, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(text_null(MemoryUnit::WhenDesc))
          .col(text_null(MemoryUnit::WhereDesc))
          .col(text_null(MemoryUnit::WhyDesc))
          .col(timestamp_with_time_zone_null(MemoryUnit::EventDate))
          .col(timestamp_with_time_zone_null(MemoryUnit::OccurredStart))
          .col(timestamp_with_time_zone_null(MemoryUnit::OccurredEnd))
          .col(timestamp_with_time_zone(MemoryUnit::MentionedAt).default(Expr::current_timestamp()))
          .col(timestamp_with_time_zone(MemoryUnit::CreatedAt).default(Expr::current_timestamp()))
          .col(custom(MemoryUnit::Embedding, "vector(1024) NOT NULL"))
          .col(custom(MemoryUnit::Tags, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(timestamp_with_time_zone_null(MemoryUnit::ConsolidatedAt))
          .col(integer(MemoryUnit::ProofCount).default(0))
          .col(custom(MemoryUnit::SourceMemoryIds, "UUID[] NOT NULL DEFAULT '{}'"))
          .col(custom(MemoryUnit::History, "JSONB NOT NULL DEFAULT '[]'"))
          .col(text_null(MemoryUnit::FreshnessStatus))
          .foreign_key(
            ForeignKey::create()
              .from(MemoryUnit::Table, MemoryUnit::Bank)
              .to(Bank::Table, Bank::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    // Cosine/inner-product ANN search over the unit-norm embedding.
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_unit_embedding ON memory_unit USING hnsw (embedding vector_ip_ops);",
      ))
      .await?;

    // Trigram similarity for the keyword search leg (§4.2 Phase A).
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_unit_text_trgm ON memory_unit USING gin (text gin_trgm_ops);",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_unit_context_trgm ON memory_unit USING gin (context gin_trgm_ops);",
      ))
      .await?;

    // Scheduler scan: unconsolidated raw facts, oldest first.
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_unit_unconsolidated ON memory_unit (bank, created_at ASC) \
         WHERE consolidated_at IS NULL AND fact_type IN ('world', 'experience');",
      ))
      .await?;

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE INDEX idx_memory_unit_bank ON memory_unit (bank);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemoryUnit::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
pub enum Bank {
  Table,
  Id,
}

#[derive(Iden)]
pub enum MemoryUnit {
  Table,

  Id,
  Bank,
  Text,
  Context,
  FactType,
  FactKind,
  What,
  Who,
  WhenDesc,
  WhereDesc,
  WhyDesc,
  EventDate,
  OccurredStart,
  OccurredEnd,
  MentionedAt,
  CreatedAt,
  Embedding,
  Tags,
  ConsolidatedAt,
  ProofCount,
  SourceMemoryIds,
  History,
  FreshnessStatus,
}
