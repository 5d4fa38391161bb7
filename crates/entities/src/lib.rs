pub mod bank;
pub mod chunk;
pub mod entity;
pub mod entity_cooccurrence;
pub mod enums;
pub mod memory_link;
pub mod memory_unit;
pub mod mental_model;
pub mod unit_entity;

pub use enums::{FactKind, FactType, FreshnessStatus, LinkType};

pub use bank::Entity as Bank;
pub use chunk::Entity as Chunk;
pub use entity::Entity as MemoryEntity;
pub use entity_cooccurrence::Entity as EntityCooccurrence;
pub use memory_link::Entity as MemoryLink;
pub use memory_unit::Entity as MemoryUnit;
pub use mental_model::Entity as MentalModel;
pub use unit_entity::Entity as UnitEntity;
