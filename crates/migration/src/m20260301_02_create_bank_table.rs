use sea_orm_migration::{
  prelude::*,
  schema::{custom, text_null, timestamp_with_time_zone, uuid},
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Bank::Table)
          .if_not_exists()
          .col(uuid(Bank::Id).primary_key())
          .col(text_null(Bank::Mission))
          .col(custom(Bank::Disposition, "SMALLINT[] NOT NULL DEFAULT '{3,3,3}'"))
          .col(custom(Bank::Directives, "TEXT[] NOT NULL DEFAULT '{}'"))
          .col(
            timestamp_with_time_zone(Bank::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Bank::Table).to_owned())
      .await
  }
}

#[derive(Iden)]
pub enum Bank {
  Table,
  Id,
  Mission,
  Disposition,
  Directives,
  CreatedAt,
}
