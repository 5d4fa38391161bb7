pub use sea_orm_migration::*;

mod m20260301_01_enable_extensions;
mod m20260301_02_create_bank_table;
mod m20260301_03_create_memory_unit_table;
mod m20260301_04_create_entity_tables;
mod m20260301_05_create_memory_link_table;
mod m20260301_06_create_mental_model_table;
mod m20260301_07_create_chunk_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260301_01_enable_extensions::Migration),
      Box::new(m20260301_02_create_bank_table::Migration),
      Box::new(m20260301_03_create_memory_unit_table::Migration),
      Box::new(m20260301_04_create_entity_tables::Migration),
      Box::new(m20260301_05_create_memory_link_table::Migration),
      Box::new(m20260301_06_create_mental_model_table::Migration),
      Box::new(m20260301_07_create_chunk_table::Migration),
    ]
  }
}
