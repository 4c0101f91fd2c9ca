//! Data structures for civilization, unit, structure and technology tables.
//!
//! Every type here has built-in defaults and deserializes from RON, so a
//! host can override any table without touching code.
//!
//! **Note:** This module contains no IO. Reading files is the host's job.

mod building_data;
mod civilization_data;
mod tech_data;
mod unit_data;

pub use building_data::{StructureCatalog, StructureData};
pub use civilization_data::{standard_technologies, BonusTable, CivilizationData};
pub use tech_data::{TechEffect, TechnologyData};
pub use unit_data::{UnitCatalog, UnitData, UnitStats};
