//! Catalog readers and metadata importers.
//!
//! - [`DatCatalog`] streams machines out of Logiqx / MAME XML DAT files.
//! - [`MetadataTable`] assigns attributes from JSON or CSV files.
//! - [`GroupTable`] holds hand-curated group merges and splits.

pub mod dat;
pub mod error;
pub mod groups;
pub mod metadata;

pub use dat::{CatalogSource, DatCatalog, DatReader, MachineIter, MemoryCatalog};
pub use error::CatalogError;
pub use groups::{GroupOverrides, GroupTable, SplitRule};
pub use metadata::{MetadataSource, MetadataTable};
