use sea_orm_migration::{prelude::*, sea_orm::Statement};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    let backend = manager.get_database_backend();
    let conn = manager.get_connection();

    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE EXTENSION IF NOT EXISTS vector;",
      ))
      .await?;
    conn
      .execute_raw(Statement::from_string(
        backend,
        "CREATE EXTENSION IF NOT EXISTS pg_trgm;",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
    // Extensions are left installed; dropping them would affect other schemas.
    Ok(())
  }
}
