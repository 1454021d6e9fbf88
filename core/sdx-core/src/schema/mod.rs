//! Schema registry: document descriptions, table/column descriptions, DDL.

pub mod ddl;
pub mod description;
pub mod registry;
pub mod table;

pub use description::{
    DocumentDescription, DocumentDescriptionBuilder, DocumentType, IndexingOption,
    PropertyDescription, TypeName,
};
pub use registry::SchemaRegistry;
pub use table::{ColumnDescription, ColumnType, IndexType, TableDescription};
